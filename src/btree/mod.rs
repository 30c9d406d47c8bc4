//! Disk-resident B+Tree table keyed on an INT field
//!
//! The root always lives at page 0 of the tree's file. Internal nodes are
//! [`IndexPage`]s, tuples are stored in [`LeafPage`]s linked left to right
//! for ordered scans. Keys are unique: inserting an existing key replaces
//! the stored tuple.

mod btree_file;
mod index_page;
mod leaf_page;

#[cfg(test)]
mod tests;

pub use btree_file::BTreeFile;
pub use index_page::IndexPage;
pub use leaf_page::LeafPage;

/// Page index of the root node
pub const ROOT_PAGE: usize = 0;

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
