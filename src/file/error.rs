use std::io;
use thiserror::Error;

use super::PageId;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already registered: {0}")]
    FileAlreadyRegistered(String),

    #[error("Page out of range: {file} page {page} (file has {num_pages} pages)")]
    PageOutOfRange {
        file: String,
        page: usize,
        num_pages: usize,
    },

    #[error("Page not resident in buffer pool: {0}")]
    PageNotResident(PageId),

    #[error("File {file} has length {len}, which is not a whole number of pages")]
    MisalignedFile { file: String, len: u64 },

    #[error("Short I/O on {file} page {page}: transferred {actual} of {expected} bytes")]
    ShortIo {
        file: String,
        page: usize,
        expected: usize,
        actual: usize,
    },
}

pub type FileResult<T> = Result<T, FileError>;
