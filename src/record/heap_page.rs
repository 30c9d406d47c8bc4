use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::tuple::Tuple;
use crate::file::PAGE_SIZE;

/// Slot index within a page
pub type SlotId = usize;

/// Heap page view that operates directly on buffer pool memory
///
/// Layout: an occupancy bitmap at the start of the page (slot `i` is bit
/// `7 - i % 8` of byte `i / 8`), and `capacity` fixed-width slots packed
/// against the end of the page. Bytes between the two regions are unused.
pub struct HeapPage<'a> {
    buffer: &'a mut [u8],
    desc: &'a TupleDesc,
    capacity: usize,
    data_start: usize,
}

impl<'a> HeapPage<'a> {
    /// Largest slot count `n` with `n * record_size + ceil(n / 8) <= PAGE_SIZE`
    pub fn calculate_capacity(record_size: usize) -> usize {
        if record_size == 0 {
            return 0;
        }

        let mut capacity = (PAGE_SIZE * 8) / (record_size * 8 + 1);
        while capacity > 0 && capacity * record_size + capacity.div_ceil(8) > PAGE_SIZE {
            capacity -= 1;
        }
        capacity
    }

    /// Wrap a page buffer
    /// The buffer must be exactly PAGE_SIZE bytes
    pub fn new(buffer: &'a mut [u8], desc: &'a TupleDesc) -> RecordResult<Self> {
        if buffer.len() != PAGE_SIZE {
            return Err(RecordError::InvalidBuffer {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let capacity = Self::calculate_capacity(desc.length());
        if capacity == 0 {
            return Err(RecordError::TupleTooLarge(desc.length()));
        }

        let data_start = PAGE_SIZE - capacity * desc.length();
        Ok(Self {
            buffer,
            desc,
            capacity,
            data_start,
        })
    }

    /// Number of slots on the page
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// First occupied slot, or `end()` if the page is empty
    pub fn begin(&self) -> SlotId {
        (0..self.capacity)
            .find(|&slot| !self.is_empty(slot))
            .unwrap_or(self.capacity)
    }

    /// End sentinel
    pub fn end(&self) -> SlotId {
        self.capacity
    }

    /// Next occupied slot after `slot`, or `end()`
    pub fn next(&self, slot: SlotId) -> SlotId {
        (slot + 1..self.capacity)
            .find(|&s| !self.is_empty(s))
            .unwrap_or(self.capacity)
    }

    /// Whether `slot` is free. Slots past the capacity count as free.
    pub fn is_empty(&self, slot: SlotId) -> bool {
        if slot >= self.capacity {
            return true;
        }
        self.buffer[slot / 8] & Self::bit_mask(slot) == 0
    }

    /// Number of occupied slots
    pub fn num_tuples(&self) -> usize {
        (0..self.capacity).filter(|&s| !self.is_empty(s)).count()
    }

    /// Store `tuple` in the first free slot
    /// Returns `Ok(false)` if the page has no free slot
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> RecordResult<bool> {
        let Some(slot) = (0..self.capacity).find(|&s| self.is_empty(s)) else {
            return Ok(false);
        };

        let range = self.slot_range(slot);
        self.desc.serialize(&mut self.buffer[range], tuple)?;
        self.buffer[slot / 8] |= Self::bit_mask(slot);
        Ok(true)
    }

    /// Free `slot`, zeroing its bytes. Slots are never compacted.
    pub fn delete_tuple(&mut self, slot: SlotId, page_id: usize) -> RecordResult<()> {
        if slot >= self.capacity {
            return Err(RecordError::InvalidSlot(page_id, slot));
        }
        if self.is_empty(slot) {
            return Err(RecordError::EmptySlot(page_id, slot));
        }

        self.buffer[slot / 8] &= !Self::bit_mask(slot);
        let range = self.slot_range(slot);
        self.buffer[range].fill(0);
        Ok(())
    }

    /// Read the tuple stored in `slot`
    pub fn get_tuple(&self, slot: SlotId, page_id: usize) -> RecordResult<Tuple> {
        if slot >= self.capacity {
            return Err(RecordError::InvalidSlot(page_id, slot));
        }
        if self.is_empty(slot) {
            return Err(RecordError::EmptySlot(page_id, slot));
        }

        self.desc.deserialize(&self.buffer[self.slot_range(slot)])
    }

    fn slot_range(&self, slot: SlotId) -> std::ops::Range<usize> {
        let start = self.data_start + slot * self.desc.length();
        start..start + self.desc.length()
    }

    fn bit_mask(slot: SlotId) -> u8 {
        0x80 >> (slot % 8)
    }
}
