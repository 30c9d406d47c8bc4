use super::value::{DataType, Value};

/// A single row with typed values
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    fields: Vec<Value>,
}

impl Tuple {
    /// Create a new tuple
    pub fn new(fields: Vec<Value>) -> Self {
        Self { fields }
    }

    /// Get the number of fields
    pub fn size(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a field by index
    pub fn get_field(&self, idx: usize) -> Option<&Value> {
        self.fields.get(idx)
    }

    /// Type of field `idx`
    pub fn field_type(&self, idx: usize) -> Option<DataType> {
        self.fields.get(idx).map(Value::data_type)
    }

    /// Get all fields
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<Value> {
        self.fields
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(fields: Vec<Value>) -> Self {
        Self::new(fields)
    }
}
