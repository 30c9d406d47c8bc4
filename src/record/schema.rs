use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};
use super::tuple::Tuple;
use super::value::{DataType, Value};

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// Get the size of this column in bytes
    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Ordered field list describing a fixed-width tuple layout
///
/// Field order defines both tuple order and on-page byte order. There is no
/// null bitmap or padding: field `i` starts at the sum of the widths of
/// fields `0..i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDesc {
    columns: Vec<ColumnDef>,
    offsets: Vec<usize>,
    length: usize,
}

impl TupleDesc {
    /// Create a schema, rejecting duplicate field names
    pub fn new(columns: Vec<ColumnDef>) -> RecordResult<Self> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(RecordError::DuplicateField(col.name.clone()));
            }
        }
        Ok(Self::build(columns))
    }

    /// Create a schema from parallel type and name lists
    pub fn from_parts(types: &[DataType], names: &[&str]) -> RecordResult<Self> {
        if types.len() != names.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "{} types but {} names",
                types.len(),
                names.len()
            )));
        }

        Self::new(
            types
                .iter()
                .zip(names)
                .map(|(&data_type, &name)| ColumnDef::new(name, data_type))
                .collect(),
        )
    }

    fn build(columns: Vec<ColumnDef>) -> Self {
        let mut offsets = Vec::with_capacity(columns.len());
        let mut length = 0;
        for col in &columns {
            offsets.push(length);
            length += col.size();
        }

        Self {
            columns,
            offsets,
            length,
        }
    }

    /// Concatenate two schemas: `left`'s fields followed by `right`'s
    ///
    /// Names are kept verbatim and may collide. With duplicates,
    /// [`index_of`](Self::index_of) resolves to the first match, so callers
    /// that need to address the right-hand copy must do so by position.
    pub fn merge(left: &TupleDesc, right: &TupleDesc) -> TupleDesc {
        let columns = left
            .columns
            .iter()
            .chain(right.columns.iter())
            .cloned()
            .collect();
        Self::build(columns)
    }

    /// Get all columns
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Number of fields
    pub fn size(&self) -> usize {
        self.columns.len()
    }

    /// Total serialized length in bytes
    pub fn length(&self) -> usize {
        self.length
    }

    /// Get a specific column
    pub fn column(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Find field index by name
    pub fn index_of(&self, name: &str) -> RecordResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| RecordError::FieldNotFound(name.to_string()))
    }

    /// Byte offset of field `index` within a serialized tuple
    pub fn offset_of(&self, index: usize) -> RecordResult<usize> {
        self.offsets
            .get(index)
            .copied()
            .ok_or(RecordError::FieldIndexOutOfRange {
                index,
                size: self.columns.len(),
            })
    }

    /// Whether the tuple's arity and field types match this schema
    pub fn compatible(&self, tuple: &Tuple) -> bool {
        tuple.size() == self.columns.len()
            && tuple
                .fields()
                .iter()
                .zip(&self.columns)
                .all(|(value, col)| value.data_type() == col.data_type)
    }

    /// Write `tuple` into the first `length()` bytes of `buf`
    pub fn serialize(&self, buf: &mut [u8], tuple: &Tuple) -> RecordResult<()> {
        if !self.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {}, got {}",
                self.describe(),
                describe_tuple(tuple)
            )));
        }
        if buf.len() < self.length {
            return Err(RecordError::InvalidBuffer {
                expected: self.length,
                actual: buf.len(),
            });
        }

        for ((value, col), &offset) in tuple.fields().iter().zip(&self.columns).zip(&self.offsets)
        {
            value.encode_into(&mut buf[offset..offset + col.size()])?;
        }

        Ok(())
    }

    /// Read a tuple from the first `length()` bytes of `buf`
    pub fn deserialize(&self, buf: &[u8]) -> RecordResult<Tuple> {
        if buf.len() < self.length {
            return Err(RecordError::InvalidBuffer {
                expected: self.length,
                actual: buf.len(),
            });
        }

        let fields = self
            .columns
            .iter()
            .zip(&self.offsets)
            .map(|(col, &offset)| Value::decode(&buf[offset..offset + col.size()], col.data_type))
            .collect::<RecordResult<Vec<_>>>()?;

        Ok(Tuple::new(fields))
    }

    fn describe(&self) -> String {
        let types: Vec<String> = self.columns.iter().map(|c| c.data_type.to_string()).collect();
        format!("({})", types.join(", "))
    }
}

fn describe_tuple(tuple: &Tuple) -> String {
    let types: Vec<String> = tuple
        .fields()
        .iter()
        .map(|v| v.data_type().to_string())
        .collect();
    format!("({})", types.join(", "))
}
