use ahash::AHashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, Page};

/// Page I/O counters for one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub reads: usize,
    pub writes: usize,
}

/// Page-granularity storage for one named file
///
/// Page 0 always exists and the page count only grows. A write at
/// `index == num_pages()` appends a page; anything further out is rejected.
pub trait PageStore {
    /// File identity, also used as the buffer pool key component
    fn name(&self) -> &str;

    /// Number of pages currently stored
    fn num_pages(&self) -> usize;

    /// Fill `page` with the bytes at offset `index * PAGE_SIZE`
    fn read_page(&mut self, page: &mut Page, index: usize) -> FileResult<()>;

    /// Write `page` at offset `index * PAGE_SIZE`, appending when `index == num_pages()`
    fn write_page(&mut self, page: &Page, index: usize) -> FileResult<()>;

    /// Push buffered writes to stable storage
    fn sync(&mut self) -> FileResult<()> {
        Ok(())
    }

    fn io_stats(&self) -> IoStats;
}

/// Page store backed by a regular file
pub struct DbFile {
    name: String,
    path: PathBuf,
    file: File,
    num_pages: usize,
    stats: IoStats,
}

impl DbFile {
    /// Open (or create) the file at `path` under the identity `name`
    /// An empty file gets a zeroed first page so that page 0 always exists
    pub fn open<P: AsRef<Path>>(name: &str, path: P) -> FileResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(FileError::MisalignedFile {
                file: name.to_string(),
                len,
            });
        }

        let num_pages = if len == 0 {
            let empty = [0u8; PAGE_SIZE];
            file.seek(SeekFrom::Start(0))?;
            let written = write_full(&mut file, &empty)?;
            if written != PAGE_SIZE {
                return Err(FileError::ShortIo {
                    file: name.to_string(),
                    page: 0,
                    expected: PAGE_SIZE,
                    actual: written,
                });
            }
            1
        } else {
            (len / PAGE_SIZE as u64) as usize
        };

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            file,
            num_pages,
            stats: IoStats::default(),
        })
    }

    /// On-disk location of this file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PageStore for DbFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_pages(&self) -> usize {
        self.num_pages
    }

    fn read_page(&mut self, page: &mut Page, index: usize) -> FileResult<()> {
        self.stats.reads += 1;

        if index >= self.num_pages {
            return Err(FileError::PageOutOfRange {
                file: self.name.clone(),
                page: index,
                num_pages: self.num_pages,
            });
        }

        let offset = (index * PAGE_SIZE) as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let bytes_read = read_full(&mut self.file, page)?;
        if bytes_read != PAGE_SIZE {
            return Err(FileError::ShortIo {
                file: self.name.clone(),
                page: index,
                expected: PAGE_SIZE,
                actual: bytes_read,
            });
        }

        Ok(())
    }

    fn write_page(&mut self, page: &Page, index: usize) -> FileResult<()> {
        self.stats.writes += 1;

        if index > self.num_pages {
            return Err(FileError::PageOutOfRange {
                file: self.name.clone(),
                page: index,
                num_pages: self.num_pages,
            });
        }

        let offset = (index * PAGE_SIZE) as u64;
        self.file.seek(SeekFrom::Start(offset))?;

        let bytes_written = write_full(&mut self.file, page)?;
        if bytes_written != PAGE_SIZE {
            return Err(FileError::ShortIo {
                file: self.name.clone(),
                page: index,
                expected: PAGE_SIZE,
                actual: bytes_written,
            });
        }
        // Note: Don't sync on every write - sync() is called by the buffer pool on flush_all()

        if index == self.num_pages {
            self.num_pages += 1;
        }

        Ok(())
    }

    fn sync(&mut self) -> FileResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.stats
    }
}

/// Page store held entirely in memory, for scratch tables and tests
pub struct MemFile {
    name: String,
    pages: Vec<Box<Page>>,
    stats: IoStats,
}

impl MemFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pages: vec![Box::new([0u8; PAGE_SIZE])],
            stats: IoStats::default(),
        }
    }
}

impl PageStore for MemFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_pages(&self) -> usize {
        self.pages.len()
    }

    fn read_page(&mut self, page: &mut Page, index: usize) -> FileResult<()> {
        self.stats.reads += 1;
        let stored = self.pages.get(index).ok_or_else(|| FileError::PageOutOfRange {
            file: self.name.clone(),
            page: index,
            num_pages: self.pages.len(),
        })?;
        page.copy_from_slice(&stored[..]);
        Ok(())
    }

    fn write_page(&mut self, page: &Page, index: usize) -> FileResult<()> {
        self.stats.writes += 1;
        match index.cmp(&self.pages.len()) {
            std::cmp::Ordering::Less => self.pages[index].copy_from_slice(page),
            std::cmp::Ordering::Equal => self.pages.push(Box::new(*page)),
            std::cmp::Ordering::Greater => {
                return Err(FileError::PageOutOfRange {
                    file: self.name.clone(),
                    page: index,
                    num_pages: self.pages.len(),
                });
            }
        }
        Ok(())
    }

    fn io_stats(&self) -> IoStats {
        self.stats
    }
}

/// Registry of open page stores, keyed by file name
pub struct FileManager {
    stores: AHashMap<String, Box<dyn PageStore>>,
}

impl FileManager {
    /// Create an empty file manager
    pub fn new() -> Self {
        Self {
            stores: AHashMap::new(),
        }
    }

    /// Register a store under its own name
    pub fn add(&mut self, store: Box<dyn PageStore>) -> FileResult<()> {
        let name = store.name().to_string();
        if self.stores.contains_key(&name) {
            return Err(FileError::FileAlreadyRegistered(name));
        }
        self.stores.insert(name, store);
        Ok(())
    }

    /// Unregister a store and hand it back to the caller
    pub fn remove(&mut self, name: &str) -> FileResult<Box<dyn PageStore>> {
        self.stores
            .remove(name)
            .ok_or_else(|| FileError::FileNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> FileResult<&dyn PageStore> {
        self.stores
            .get(name)
            .map(|store| store.as_ref())
            .ok_or_else(|| FileError::FileNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> FileResult<&mut dyn PageStore> {
        match self.stores.get_mut(name) {
            Some(store) => Ok(store.as_mut()),
            None => Err(FileError::FileNotFound(name.to_string())),
        }
    }

    /// Check if a file is registered
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Get the number of registered files
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Sync every registered store to stable storage
    pub fn sync_all(&mut self) -> FileResult<()> {
        for store in self.stores.values_mut() {
            store.sync()?;
        }
        Ok(())
    }
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Read until `buf` is full or the file ends, returning the byte count
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Write until `buf` is drained or the file stops accepting bytes
fn write_full(file: &mut File, buf: &[u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.write(&buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}
