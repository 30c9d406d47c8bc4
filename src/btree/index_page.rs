use super::{read_i32, read_u64, write_i32, write_u64};
use crate::file::PAGE_SIZE;
use crate::record::{RecordError, RecordResult};

/// Internal B+Tree node over a page buffer
///
/// Layout:
/// - `0..8`: number of keys (`u64`)
/// - `8`: 1 if the children are index pages, 0 if they are leaves
/// - `16..16 + 4 * CAPACITY`: keys (`i32`), ascending
/// - then `CAPACITY + 1` child page indexes (`u64`)
///
/// `child(i)` covers keys below `key(i)`; `child(size)` covers keys at or
/// above the last key.
pub struct IndexPage<'a> {
    buffer: &'a mut [u8],
}

impl<'a> IndexPage<'a> {
    pub const HEADER_SIZE: usize = 16;

    /// Maximum number of keys
    pub const CAPACITY: usize = (PAGE_SIZE - Self::HEADER_SIZE - 8) / (4 + 8);

    const FLAG_OFFSET: usize = 8;
    const KEYS_OFFSET: usize = Self::HEADER_SIZE;
    const CHILDREN_OFFSET: usize = Self::KEYS_OFFSET + 4 * Self::CAPACITY;

    /// Wrap an existing page buffer
    pub fn new(buffer: &'a mut [u8]) -> RecordResult<Self> {
        if buffer.len() != PAGE_SIZE {
            return Err(RecordError::InvalidBuffer {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }
        Ok(Self { buffer })
    }

    /// Reset to an empty node
    pub fn init(&mut self, index_children: bool) {
        self.buffer[..Self::HEADER_SIZE].fill(0);
        self.set_index_children(index_children);
    }

    pub fn size(&self) -> usize {
        read_u64(self.buffer, 0) as usize
    }

    fn set_size(&mut self, size: usize) {
        write_u64(self.buffer, 0, size as u64);
    }

    pub fn index_children(&self) -> bool {
        self.buffer[Self::FLAG_OFFSET] != 0
    }

    pub fn set_index_children(&mut self, index_children: bool) {
        self.buffer[Self::FLAG_OFFSET] = u8::from(index_children);
    }

    pub fn key(&self, i: usize) -> i32 {
        read_i32(self.buffer, Self::KEYS_OFFSET + 4 * i)
    }

    fn set_key(&mut self, i: usize, key: i32) {
        write_i32(self.buffer, Self::KEYS_OFFSET + 4 * i, key);
    }

    pub fn child(&self, i: usize) -> usize {
        read_u64(self.buffer, Self::CHILDREN_OFFSET + 8 * i) as usize
    }

    pub fn set_child(&mut self, i: usize, page: usize) {
        write_u64(self.buffer, Self::CHILDREN_OFFSET + 8 * i, page as u64);
    }

    /// Slot of the child whose subtree covers `key`
    pub fn find_child(&self, key: i32) -> usize {
        (0..self.size())
            .find(|&i| key < self.key(i))
            .unwrap_or(self.size())
    }

    /// Insert `key` with `right_child` immediately after it
    /// Returns true if the page is now full and must be split
    pub fn insert(&mut self, key: i32, right_child: usize) -> RecordResult<bool> {
        let size = self.size();
        if size >= Self::CAPACITY {
            return Err(RecordError::PageFull(Self::CAPACITY));
        }

        let pos = (0..size).find(|&i| self.key(i) >= key).unwrap_or(size);

        let keys = Self::KEYS_OFFSET;
        self.buffer
            .copy_within(keys + 4 * pos..keys + 4 * size, keys + 4 * (pos + 1));
        let children = Self::CHILDREN_OFFSET;
        self.buffer.copy_within(
            children + 8 * (pos + 1)..children + 8 * (size + 1),
            children + 8 * (pos + 2),
        );

        self.set_key(pos, key);
        self.set_child(pos + 1, right_child);
        self.set_size(size + 1);

        Ok(size + 1 == Self::CAPACITY)
    }

    /// Move the upper half into `right` and return the promoted key
    ///
    /// The key at `size / 2` moves up to the parent and is kept on neither
    /// side. `right` inherits the children kind of this page.
    pub fn split(&mut self, right: &mut IndexPage<'_>) -> i32 {
        let size = self.size();
        let mid = size / 2;
        let promoted = self.key(mid);
        let moved = size - mid - 1;

        right.init(self.index_children());
        for i in 0..moved {
            right.set_key(i, self.key(mid + 1 + i));
        }
        for i in 0..=moved {
            right.set_child(i, self.child(mid + 1 + i));
        }
        right.set_size(moved);
        self.set_size(mid);

        promoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Page;

    fn fill(page: &mut IndexPage<'_>, keys: &[i32]) {
        page.init(false);
        page.set_child(0, 100);
        for &key in keys {
            page.insert(key, 100 + key as usize).unwrap();
        }
    }

    fn keys_of(page: &IndexPage<'_>) -> Vec<i32> {
        (0..page.size()).map(|i| page.key(i)).collect()
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(IndexPage::CAPACITY, 339);
        assert_eq!(IndexPage::CHILDREN_OFFSET, 16 + 4 * 339);
        assert!(IndexPage::CHILDREN_OFFSET + 8 * (IndexPage::CAPACITY + 1) <= PAGE_SIZE);
    }

    #[test]
    fn test_insert_keeps_keys_sorted() {
        let mut buffer: Page = [0u8; PAGE_SIZE];
        let mut page = IndexPage::new(&mut buffer).unwrap();
        fill(&mut page, &[30, 10, 20]);

        assert_eq!(keys_of(&page), vec![10, 20, 30]);
        // Each right child sits just after its key
        assert_eq!(page.child(0), 100);
        assert_eq!(page.child(1), 110);
        assert_eq!(page.child(2), 120);
        assert_eq!(page.child(3), 130);
    }

    #[test]
    fn test_find_child() {
        let mut buffer: Page = [0u8; PAGE_SIZE];
        let mut page = IndexPage::new(&mut buffer).unwrap();
        fill(&mut page, &[10, 20]);

        assert_eq!(page.find_child(5), 0);
        assert_eq!(page.find_child(10), 1);
        assert_eq!(page.find_child(19), 1);
        assert_eq!(page.find_child(20), 2);
        assert_eq!(page.find_child(i32::MAX), 2);
    }

    #[test]
    fn test_full_after_capacity_keys() {
        let mut buffer: Page = [0u8; PAGE_SIZE];
        let mut page = IndexPage::new(&mut buffer).unwrap();
        page.init(true);

        for key in 0..IndexPage::CAPACITY as i32 - 1 {
            assert!(!page.insert(key, key as usize).unwrap());
        }
        assert!(page.insert(1000, 1000).unwrap());
        assert!(matches!(
            page.insert(2000, 2000),
            Err(RecordError::PageFull(339))
        ));
    }

    #[test]
    fn test_split_promotes_middle_key() {
        let mut left_buf: Page = [0u8; PAGE_SIZE];
        let mut right_buf: Page = [0u8; PAGE_SIZE];
        let mut left = IndexPage::new(&mut left_buf).unwrap();
        let mut right = IndexPage::new(&mut right_buf).unwrap();

        fill(&mut left, &[10, 20, 30, 40, 50]);
        left.set_index_children(true);
        let promoted = left.split(&mut right);

        assert_eq!(promoted, 30);
        assert_eq!(keys_of(&left), vec![10, 20]);
        assert_eq!(keys_of(&right), vec![40, 50]);
        assert_eq!((left.child(0), left.child(2)), (100, 120));
        assert_eq!((right.child(0), right.child(2)), (130, 150));
        assert!(right.index_children());
    }
}
