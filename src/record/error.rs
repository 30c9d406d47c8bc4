use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Tuple is not compatible with schema: {0}")]
    SchemaMismatch(String),

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Field index {index} out of range for schema with {size} fields")]
    FieldIndexOutOfRange { index: usize, size: usize },

    #[error("Invalid slot: page_id={0}, slot_id={1}")]
    InvalidSlot(usize, usize),

    #[error("Slot is empty: page_id={0}, slot_id={1}")]
    EmptySlot(usize, usize),

    #[error("Slot {slot} out of range for page holding {size} tuples")]
    SlotOutOfRange { slot: usize, size: usize },

    #[error("Page full: capacity {0}")]
    PageFull(usize),

    #[error("Tuple length {0} is too large for a page")]
    TupleTooLarge(usize),

    #[error("Invalid key field {index}: {reason}")]
    InvalidKeyField { index: usize, reason: String },

    #[error("Invalid buffer: expected {expected} bytes, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
