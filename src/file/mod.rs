mod buffer_pool;
mod error;
mod file_manager;

pub use buffer_pool::BufferPool;
pub use error::{FileError, FileResult};
pub use file_manager::{DbFile, FileManager, IoStats, MemFile, PageStore};

use std::fmt;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Number of pages in the buffer pool
/// 64 pages × 4KB = 256KB of cached data per engine
pub const DEFAULT_POOL_SIZE: usize = 64;

/// One fixed-size block of bytes, the unit of I/O and caching
pub type Page = [u8; PAGE_SIZE];

/// Address of a page: owning file name plus 0-based page index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId {
    pub file: String,
    pub page: usize,
}

impl PageId {
    pub fn new(file: impl Into<String>, page: usize) -> Self {
        Self {
            file: file.into(),
            page,
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.page)
    }
}
