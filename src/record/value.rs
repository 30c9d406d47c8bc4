use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};

/// Width of a TEXT field in bytes
pub const TEXT_SIZE: usize = 64;

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Int,    // 4 bytes
    Double, // 8 bytes
    Text,   // TEXT_SIZE bytes (fixed length)
}

impl DataType {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Double => 8,
            DataType::Text => TEXT_SIZE,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

/// Represents a single field value
///
/// Ordering compares the variant first and the payload second, so values of
/// different types never compare equal.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Int(i32),
    Double(f64),
    Text(String),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::Double(_) => DataType::Double,
            Value::Text(_) => DataType::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Write the value into `out`, which must be exactly `data_type().size()` bytes
    /// TEXT is zero-padded, or truncated at the last character boundary within TEXT_SIZE
    pub fn encode_into(&self, out: &mut [u8]) -> RecordResult<()> {
        let expected = self.data_type().size();
        if out.len() != expected {
            return Err(RecordError::InvalidBuffer {
                expected,
                actual: out.len(),
            });
        }

        match self {
            Value::Int(i) => out.copy_from_slice(&i.to_le_bytes()),
            Value::Double(d) => out.copy_from_slice(&d.to_le_bytes()),
            Value::Text(s) => {
                let mut end = s.len().min(TEXT_SIZE);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                out[..end].copy_from_slice(&s.as_bytes()[..end]);
                out[end..].fill(0);
            }
        }

        Ok(())
    }

    /// Decode a value of `data_type` from exactly `data_type.size()` bytes
    pub fn decode(bytes: &[u8], data_type: DataType) -> RecordResult<Self> {
        if bytes.len() != data_type.size() {
            return Err(RecordError::InvalidBuffer {
                expected: data_type.size(),
                actual: bytes.len(),
            });
        }

        match data_type {
            DataType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Value::Int(i32::from_le_bytes(buf)))
            }
            DataType::Double => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Double(f64::from_le_bytes(buf)))
            }
            DataType::Text => {
                // Find the first null byte (string terminator)
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = String::from_utf8(bytes[..end].to_vec())
                    .map_err(|e| RecordError::Deserialization(format!("Invalid UTF-8: {}", e)))?;
                Ok(Value::Text(s))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}
