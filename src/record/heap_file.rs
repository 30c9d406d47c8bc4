use super::error::{RecordError, RecordResult};
use super::heap_page::HeapPage;
use super::schema::TupleDesc;
use super::tuple::Tuple;
use super::{DbTable, TupleId};
use crate::file::{BufferPool, PageId};

/// Unordered table stored as a sequence of heap pages
///
/// New tuples go to the last page, or to a freshly appended page once the
/// last one is full. Iteration follows physical (page, slot) order.
#[derive(Debug, Clone)]
pub struct HeapFile {
    name: String,
    desc: TupleDesc,
}

impl HeapFile {
    /// Create a heap table over the page store registered as `name`
    pub fn new(name: impl Into<String>, desc: TupleDesc) -> RecordResult<Self> {
        if HeapPage::calculate_capacity(desc.length()) == 0 {
            return Err(RecordError::TupleTooLarge(desc.length()));
        }

        Ok(Self {
            name: name.into(),
            desc,
        })
    }

    /// Slots per page for this table's schema
    pub fn page_capacity(&self) -> usize {
        HeapPage::calculate_capacity(self.desc.length())
    }

    fn page_id(&self, page: usize) -> PageId {
        PageId::new(self.name.as_str(), page)
    }

    fn check_page(&self, pool: &BufferPool, id: TupleId) -> RecordResult<()> {
        if id.page_id >= pool.num_pages(&self.name)? {
            return Err(RecordError::InvalidSlot(id.page_id, id.slot_id));
        }
        Ok(())
    }

    /// First occupied slot at or after page `start`
    fn first_from(&self, pool: &mut BufferPool, start: usize) -> RecordResult<TupleId> {
        let num_pages = pool.num_pages(&self.name)?;
        for page in start..num_pages {
            let buffer = pool.get_page(&self.page_id(page))?;
            let heap = HeapPage::new(buffer, &self.desc)?;
            let slot = heap.begin();
            if slot != heap.end() {
                return Ok(TupleId::new(page, slot));
            }
        }

        Ok(TupleId::new(num_pages, 0))
    }
}

impl DbTable for HeapFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn insert_tuple(&self, pool: &mut BufferPool, tuple: &Tuple) -> RecordResult<()> {
        if !self.desc.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(format!(
                "tuple with {} fields does not fit table {}",
                tuple.size(),
                self.name
            )));
        }

        // Page 0 always exists, so there is always a last page to try
        let last = self.page_id(pool.num_pages(&self.name)?.saturating_sub(1));
        let buffer = pool.get_page(&last)?;
        if HeapPage::new(buffer, &self.desc)?.insert_tuple(tuple)? {
            pool.mark_dirty(&last)?;
            return Ok(());
        }

        let fresh = self.page_id(pool.allocate_page(&self.name)?);
        let buffer = pool.get_page_mut(&fresh)?;
        let mut heap = HeapPage::new(buffer, &self.desc)?;
        if !heap.insert_tuple(tuple)? {
            return Err(RecordError::PageFull(heap.capacity()));
        }

        Ok(())
    }

    fn delete_tuple(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<()> {
        self.check_page(pool, id)?;

        let page_id = self.page_id(id.page_id);
        let buffer = pool.get_page(&page_id)?;
        HeapPage::new(buffer, &self.desc)?.delete_tuple(id.slot_id, id.page_id)?;
        pool.mark_dirty(&page_id)?;
        Ok(())
    }

    fn get_tuple(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<Tuple> {
        self.check_page(pool, id)?;

        let buffer = pool.get_page(&self.page_id(id.page_id))?;
        HeapPage::new(buffer, &self.desc)?.get_tuple(id.slot_id, id.page_id)
    }

    fn begin(&self, pool: &mut BufferPool) -> RecordResult<TupleId> {
        self.first_from(pool, 0)
    }

    fn end(&self, pool: &mut BufferPool) -> RecordResult<TupleId> {
        Ok(TupleId::new(pool.num_pages(&self.name)?, 0))
    }

    fn next(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<TupleId> {
        if id.page_id >= pool.num_pages(&self.name)? {
            return self.end(pool);
        }

        let buffer = pool.get_page(&self.page_id(id.page_id))?;
        let heap = HeapPage::new(buffer, &self.desc)?;
        let slot = heap.next(id.slot_id);
        if slot != heap.end() {
            return Ok(TupleId::new(id.page_id, slot));
        }

        self.first_from(pool, id.page_id + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{DbFile, FileManager, MemFile};
    use crate::record::{DataType, TableScan, Value};
    use tempfile::TempDir;

    fn create_test_schema() -> TupleDesc {
        TupleDesc::from_parts(&[DataType::Int, DataType::Text], &["id", "name"]).unwrap()
    }

    fn row(id: i32) -> Tuple {
        Tuple::new(vec![Value::Int(id), Value::Text(format!("name{id}"))])
    }

    fn setup_mem_table(capacity: usize) -> (HeapFile, BufferPool) {
        let mut files = FileManager::new();
        files.add(Box::new(MemFile::new("people"))).unwrap();
        let pool = BufferPool::with_capacity(files, capacity);
        (HeapFile::new("people", create_test_schema()).unwrap(), pool)
    }

    fn collect(table: &HeapFile, pool: &mut BufferPool) -> Vec<Tuple> {
        TableScan::new(table, pool)
            .collect::<RecordResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_empty_table() {
        let (table, mut pool) = setup_mem_table(4);
        assert_eq!(table.begin(&mut pool).unwrap(), table.end(&mut pool).unwrap());
        assert_eq!(table.end(&mut pool).unwrap(), TupleId::new(1, 0));
        assert!(collect(&table, &mut pool).is_empty());
    }

    #[test]
    fn test_insert_fills_last_page_first() {
        let (table, mut pool) = setup_mem_table(4);
        let cap = table.page_capacity();

        for i in 0..cap as i32 {
            table.insert_tuple(&mut pool, &row(i)).unwrap();
        }
        assert_eq!(pool.num_pages("people").unwrap(), 1);

        table.insert_tuple(&mut pool, &row(cap as i32)).unwrap();
        assert_eq!(pool.num_pages("people").unwrap(), 2);
        assert_eq!(
            table.get_tuple(&mut pool, TupleId::new(1, 0)).unwrap(),
            row(cap as i32)
        );
    }

    #[test]
    fn test_scan_order_across_pages() {
        // Pool smaller than the table forces evictions during the scan
        let (table, mut pool) = setup_mem_table(2);
        let total = table.page_capacity() * 3 + 7;

        for i in 0..total as i32 {
            table.insert_tuple(&mut pool, &row(i)).unwrap();
        }

        let tuples = collect(&table, &mut pool);
        assert_eq!(tuples.len(), total);
        for (i, tuple) in tuples.iter().enumerate() {
            assert_eq!(tuple, &row(i as i32));
        }
    }

    #[test]
    fn test_delete_skips_empty_pages() {
        let (table, mut pool) = setup_mem_table(4);
        let cap = table.page_capacity();

        for i in 0..(cap * 2 + 1) as i32 {
            table.insert_tuple(&mut pool, &row(i)).unwrap();
        }
        // Empty the middle page entirely
        for slot in 0..cap {
            table.delete_tuple(&mut pool, TupleId::new(1, slot)).unwrap();
        }

        let last_on_first = TupleId::new(0, cap - 1);
        assert_eq!(
            table.next(&mut pool, last_on_first).unwrap(),
            TupleId::new(2, 0)
        );
        assert_eq!(collect(&table, &mut pool).len(), cap + 1);
    }

    #[test]
    fn test_delete_errors() {
        let (table, mut pool) = setup_mem_table(4);
        table.insert_tuple(&mut pool, &row(1)).unwrap();

        assert!(matches!(
            table.delete_tuple(&mut pool, TupleId::new(0, 1)),
            Err(RecordError::EmptySlot(0, 1))
        ));
        assert!(matches!(
            table.delete_tuple(&mut pool, TupleId::new(5, 0)),
            Err(RecordError::InvalidSlot(5, 0))
        ));

        table.delete_tuple(&mut pool, TupleId::new(0, 0)).unwrap();
        assert!(table.get_tuple(&mut pool, TupleId::new(0, 0)).is_err());
    }

    #[test]
    fn test_incompatible_tuple_allocates_nothing() {
        let (table, mut pool) = setup_mem_table(4);
        let bad = Tuple::new(vec![Value::Double(1.0)]);
        assert!(matches!(
            table.insert_tuple(&mut pool, &bad),
            Err(RecordError::SchemaMismatch(_))
        ));
        assert_eq!(pool.num_pages("people").unwrap(), 1);
    }

    #[test]
    fn test_persists_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("people.dat");
        let table = HeapFile::new("people", create_test_schema()).unwrap();

        {
            let mut files = FileManager::new();
            files.add(Box::new(DbFile::open("people", &path).unwrap())).unwrap();
            let mut pool = BufferPool::with_capacity(files, 2);
            for i in 0..150 {
                table.insert_tuple(&mut pool, &row(i)).unwrap();
            }
        }

        let mut files = FileManager::new();
        files.add(Box::new(DbFile::open("people", &path).unwrap())).unwrap();
        let mut pool = BufferPool::with_capacity(files, 2);
        let tuples = collect(&table, &mut pool);
        assert_eq!(tuples.len(), 150);
        assert_eq!(tuples[149], row(149));
    }
}
