use super::{read_i32, read_u64, write_u64};
use crate::file::PAGE_SIZE;
use crate::record::{DataType, RecordError, RecordResult, SlotId, Tuple, TupleDesc};

/// B+Tree leaf over a page buffer
///
/// Layout: tuple count (`u64`) and next leaf page (`u64`, 0 ends the chain)
/// followed by `capacity` fixed-width tuples sorted by a unique INT key.
pub struct LeafPage<'a> {
    buffer: &'a mut [u8],
    desc: &'a TupleDesc,
    key_offset: usize,
    key_index: usize,
    capacity: usize,
}

impl<'a> LeafPage<'a> {
    pub const HEADER_SIZE: usize = 16;

    /// Tuples per leaf for a given tuple length
    pub fn calculate_capacity(tuple_length: usize) -> usize {
        if tuple_length == 0 {
            return 0;
        }
        (PAGE_SIZE - Self::HEADER_SIZE) / tuple_length
    }

    /// Wrap an existing page buffer
    pub fn new(buffer: &'a mut [u8], desc: &'a TupleDesc, key_index: usize) -> RecordResult<Self> {
        if buffer.len() != PAGE_SIZE {
            return Err(RecordError::InvalidBuffer {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }
        check_key_field(desc, key_index)?;

        let capacity = Self::calculate_capacity(desc.length());
        if capacity == 0 {
            return Err(RecordError::TupleTooLarge(desc.length()));
        }

        let leaf = Self {
            buffer,
            desc,
            key_offset: desc.offset_of(key_index)?,
            key_index,
            capacity,
        };
        if leaf.size() > capacity {
            return Err(RecordError::Deserialization(format!(
                "leaf holds {} tuples but fits at most {}",
                leaf.size(),
                capacity
            )));
        }
        Ok(leaf)
    }

    /// Reset to an empty leaf with no successor
    pub fn init(&mut self) {
        self.buffer[..Self::HEADER_SIZE].fill(0);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        read_u64(self.buffer, 0) as usize
    }

    fn set_size(&mut self, size: usize) {
        write_u64(self.buffer, 0, size as u64);
    }

    /// Page index of the next leaf, 0 if this is the last one
    pub fn next_leaf(&self) -> usize {
        read_u64(self.buffer, 8) as usize
    }

    pub fn set_next_leaf(&mut self, page: usize) {
        write_u64(self.buffer, 8, page as u64);
    }

    fn tuple_offset(&self, slot: SlotId) -> usize {
        Self::HEADER_SIZE + slot * self.desc.length()
    }

    /// Key of the tuple in `slot`, read without decoding the rest of the tuple
    pub fn key_at(&self, slot: SlotId) -> RecordResult<i32> {
        self.check_slot(slot)?;
        Ok(read_i32(self.buffer, self.tuple_offset(slot) + self.key_offset))
    }

    pub fn get_tuple(&self, slot: SlotId) -> RecordResult<Tuple> {
        self.check_slot(slot)?;
        let start = self.tuple_offset(slot);
        self.desc
            .deserialize(&self.buffer[start..start + self.desc.length()])
    }

    /// Slot holding `key`, or the slot where it would be inserted
    pub fn search(&self, key: i32) -> Result<SlotId, SlotId> {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = read_i32(self.buffer, self.tuple_offset(mid) + self.key_offset);
            match probe.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Insert `tuple` keeping keys sorted, replacing any tuple with the same key
    /// Returns true if the leaf is at capacity and must be split
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> RecordResult<bool> {
        let key = tuple_key(tuple, self.key_index)?;
        if !self.desc.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(format!(
                "tuple with {} fields does not fit leaf schema",
                tuple.size()
            )));
        }

        let size = self.size();
        let length = self.desc.length();
        match self.search(key) {
            Ok(slot) => {
                let start = self.tuple_offset(slot);
                self.desc
                    .serialize(&mut self.buffer[start..start + length], tuple)?;
            }
            Err(slot) => {
                if size >= self.capacity {
                    return Err(RecordError::PageFull(self.capacity));
                }

                let start = self.tuple_offset(slot);
                let end = self.tuple_offset(size);
                self.buffer.copy_within(start..end, start + length);
                self.desc
                    .serialize(&mut self.buffer[start..start + length], tuple)?;
                self.set_size(size + 1);
            }
        }

        Ok(self.size() >= self.capacity)
    }

    /// Move tuples from the midpoint onwards into `right` and link it after this leaf
    /// Returns the first key of `right`, which separates the two leaves
    pub fn split(&mut self, right: &mut LeafPage<'_>, right_page: usize) -> RecordResult<i32> {
        let size = self.size();
        let mid = size / 2;
        let moved = size - mid;
        if moved == 0 {
            return Err(RecordError::SlotOutOfRange { slot: mid, size });
        }

        let start = self.tuple_offset(mid);
        let end = self.tuple_offset(size);
        let dest = right.tuple_offset(0);
        right.buffer[dest..dest + (end - start)].copy_from_slice(&self.buffer[start..end]);
        right.set_size(moved);
        right.set_next_leaf(self.next_leaf());

        self.buffer[start..end].fill(0);
        self.set_size(mid);
        self.set_next_leaf(right_page);

        right.key_at(0)
    }

    fn check_slot(&self, slot: SlotId) -> RecordResult<()> {
        let size = self.size();
        if slot >= size || self.tuple_offset(slot) + self.desc.length() > self.buffer.len() {
            return Err(RecordError::SlotOutOfRange { slot, size });
        }
        Ok(())
    }
}

/// Validate that `key_index` names an INT field of `desc`
pub(super) fn check_key_field(desc: &TupleDesc, key_index: usize) -> RecordResult<()> {
    match desc.column(key_index) {
        None => Err(RecordError::InvalidKeyField {
            index: key_index,
            reason: format!("schema has {} fields", desc.size()),
        }),
        Some(col) if col.data_type != DataType::Int => Err(RecordError::InvalidKeyField {
            index: key_index,
            reason: format!("{} is {}, keys must be INT", col.name, col.data_type),
        }),
        Some(_) => Ok(()),
    }
}

/// INT key of `tuple`
pub(super) fn tuple_key(tuple: &Tuple, key_index: usize) -> RecordResult<i32> {
    tuple
        .get_field(key_index)
        .and_then(|v| v.as_int())
        .ok_or_else(|| RecordError::InvalidKeyField {
            index: key_index,
            reason: "tuple has no INT value at the key position".to_string(),
        })
}
