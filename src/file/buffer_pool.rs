use lru::LruCache;
use std::num::NonZeroUsize;

use super::error::{FileError, FileResult};
use super::file_manager::FileManager;
use super::{DEFAULT_POOL_SIZE, PAGE_SIZE, Page, PageId};

/// Entry in the buffer pool
struct Frame {
    /// The actual page data
    data: Box<Page>,
    /// Whether this page has been modified since it was loaded or flushed
    dirty: bool,
}

/// Bounded page cache with LRU eviction and dirty write-back
///
/// The pool owns every registered page store, so it is the only path
/// from table files to durable storage. Only [`get_page`](Self::get_page),
/// [`get_page_mut`](Self::get_page_mut) and
/// [`allocate_page`](Self::allocate_page) update recency.
pub struct BufferPool {
    /// Underlying page stores, keyed by file name
    files: FileManager,
    /// Combined frame table and LRU tracker
    cache: LruCache<PageId, Frame>,
    /// Maximum number of resident pages
    capacity: usize,
    /// Buffer recycled from the last eviction (avoids allocation on every load)
    spare: Option<Box<Page>>,
}

impl BufferPool {
    /// Create a new buffer pool with the default capacity
    pub fn new(files: FileManager) -> Self {
        Self::with_capacity(files, DEFAULT_POOL_SIZE)
    }

    /// Create a new buffer pool holding at most `capacity` pages (minimum 1)
    pub fn with_capacity(files: FileManager, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            files,
            cache: LruCache::new(capacity),
            capacity: capacity.get(),
            spare: None,
        }
    }

    /// Get a reference to the file manager
    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Get a mutable reference to the file manager
    /// Writing through a store directly bypasses the cache; resident copies are not refreshed
    pub fn files_mut(&mut self) -> &mut FileManager {
        &mut self.files
    }

    /// Current page count of a registered file
    pub fn num_pages(&self, file: &str) -> FileResult<usize> {
        Ok(self.files.get(file)?.num_pages())
    }

    /// Get a page from the pool, loading it from its store if necessary
    /// Requesting `page == num_pages` appends a zeroed page to the store
    pub fn get_page(&mut self, id: &PageId) -> FileResult<&mut Page> {
        if !self.cache.contains(id) {
            self.load_page(id)?;
        }

        // get_mut promotes the entry to most-recently-used
        match self.cache.get_mut(id) {
            Some(frame) => Ok(&mut *frame.data),
            None => Err(FileError::PageNotResident(id.clone())),
        }
    }

    /// Get a page for modification; the page is marked dirty
    pub fn get_page_mut(&mut self, id: &PageId) -> FileResult<&mut Page> {
        if !self.cache.contains(id) {
            self.load_page(id)?;
        }

        match self.cache.get_mut(id) {
            Some(frame) => {
                frame.dirty = true;
                Ok(&mut *frame.data)
            }
            None => Err(FileError::PageNotResident(id.clone())),
        }
    }

    /// Append a zeroed page to `file` and return its index
    pub fn allocate_page(&mut self, file: &str) -> FileResult<usize> {
        let page = self.num_pages(file)?;
        self.get_page(&PageId::new(file, page))?;
        Ok(page)
    }

    /// Mark a resident page as dirty (modified)
    pub fn mark_dirty(&mut self, id: &PageId) -> FileResult<()> {
        let frame = self
            .cache
            .peek_mut(id)
            .ok_or_else(|| FileError::PageNotResident(id.clone()))?;

        frame.dirty = true;
        Ok(())
    }

    /// Whether a resident page has unflushed modifications
    pub fn is_dirty(&self, id: &PageId) -> FileResult<bool> {
        self.cache
            .peek(id)
            .map(|frame| frame.dirty)
            .ok_or_else(|| FileError::PageNotResident(id.clone()))
    }

    /// Check if a page is resident (does not affect recency)
    pub fn contains(&self, id: &PageId) -> bool {
        self.cache.contains(id)
    }

    /// Flush a specific page to its store if it's resident and dirty
    pub fn flush_page(&mut self, id: &PageId) -> FileResult<()> {
        // peek_mut - flushing is not an access
        if let Some(frame) = self.cache.peek_mut(id)
            && frame.dirty
        {
            self.files.get_mut(&id.file)?.write_page(&frame.data, id.page)?;
            frame.dirty = false;
        }

        Ok(())
    }

    /// Flush every resident page belonging to `file`
    pub fn flush_file(&mut self, file: &str) -> FileResult<()> {
        let pages: Vec<PageId> = self
            .cache
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| key.clone())
            .collect();

        for id in pages {
            self.flush_page(&id)?;
        }

        Ok(())
    }

    /// Flush all dirty pages and sync every store
    pub fn flush_all(&mut self) -> FileResult<()> {
        let dirty_pages: Vec<PageId> = self
            .cache
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(key, _)| key.clone())
            .collect();

        for id in dirty_pages {
            self.flush_page(&id)?;
        }

        self.files.sync_all()?;

        Ok(())
    }

    /// Drop a resident page without writing it back, even if dirty
    pub fn discard_page(&mut self, id: &PageId) {
        if let Some((_, frame)) = self.cache.pop_entry(id) {
            self.spare = Some(frame.data);
        }
    }

    /// Drop every resident page of `file` without writing back
    pub fn discard_file(&mut self, file: &str) {
        let pages: Vec<PageId> = self
            .cache
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| key.clone())
            .collect();

        for id in pages {
            self.discard_page(&id);
        }
    }

    /// Flush all dirty pages, then empty the cache
    pub fn clear(&mut self) -> FileResult<()> {
        self.flush_all()?;
        self.cache.clear();
        Ok(())
    }

    /// Get the number of pages currently in the pool
    pub fn resident_count(&self) -> usize {
        self.cache.len()
    }

    /// Maximum number of resident pages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of dirty pages in the pool
    pub fn dirty_count(&self) -> usize {
        self.cache.iter().filter(|(_, frame)| frame.dirty).count()
    }

    /// Load a page from its store into the pool
    fn load_page(&mut self, id: &PageId) -> FileResult<()> {
        let store = self.files.get(&id.file)?;
        let num_pages = store.num_pages();
        if id.page > num_pages {
            return Err(FileError::PageOutOfRange {
                file: id.file.clone(),
                page: id.page,
                num_pages,
            });
        }

        // Evict until we have space
        while self.cache.len() >= self.capacity {
            self.evict_lru_page()?;
        }

        let mut data = self
            .spare
            .take()
            .unwrap_or_else(|| Box::new([0u8; PAGE_SIZE]));

        let store = self.files.get_mut(&id.file)?;
        if id.page == num_pages {
            // Brand-new page: append it right away so the store never has gaps
            data.fill(0);
            store.write_page(&data, id.page)?;
        } else {
            store.read_page(&mut data, id.page)?;
        }

        self.cache.put(id.clone(), Frame { data, dirty: false });

        Ok(())
    }

    /// Evict the least recently used page, writing it back first if dirty
    fn evict_lru_page(&mut self) -> FileResult<()> {
        // Write back before popping so a failed write leaves the page resident
        if let Some((key, frame)) = self.cache.peek_lru()
            && frame.dirty
        {
            self.files.get_mut(&key.file)?.write_page(&frame.data, key.page)?;
        }

        if let Some((_, frame)) = self.cache.pop_lru() {
            // Recycle the evicted buffer for the next load
            self.spare = Some(frame.data);
        }

        Ok(())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Flush all dirty pages when the pool is dropped
        if let Err(err) = self.flush_all() {
            eprintln!("buffer pool: failed to flush dirty pages on drop: {}", err);
        }
    }
}
