mod error;
mod heap_file;
mod heap_page;
mod schema;
mod tuple;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::HeapFile;
pub use heap_page::{HeapPage, SlotId};
pub use schema::{ColumnDef, TupleDesc};
pub use tuple::Tuple;
pub use value::{DataType, TEXT_SIZE, Value};

use crate::file::BufferPool;
use std::fmt;

/// Position of a tuple within a table file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId {
    pub page_id: usize,
    pub slot_id: SlotId,
}

impl TupleId {
    pub fn new(page_id: usize, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_id)
    }
}

/// Table stored in one page file with a fixed schema
///
/// Cursors are forward-only: start at `begin`, advance with `next` and stop
/// when the cursor equals `end`. Every page access goes through the pool.
pub trait DbTable {
    /// Name of the backing page store
    fn name(&self) -> &str;

    fn tuple_desc(&self) -> &TupleDesc;

    fn insert_tuple(&self, pool: &mut BufferPool, tuple: &Tuple) -> RecordResult<()>;

    fn delete_tuple(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<()>;

    fn get_tuple(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<Tuple>;

    fn begin(&self, pool: &mut BufferPool) -> RecordResult<TupleId>;

    fn end(&self, pool: &mut BufferPool) -> RecordResult<TupleId>;

    fn next(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<TupleId>;
}

/// Iterator over every live tuple of a table, in the table's native order
///
/// Stops after the first error.
pub struct TableScan<'a> {
    table: &'a dyn DbTable,
    pool: &'a mut BufferPool,
    cursor: Option<TupleId>,
    done: bool,
}

impl<'a> TableScan<'a> {
    pub fn new(table: &'a dyn DbTable, pool: &'a mut BufferPool) -> Self {
        Self {
            table,
            pool,
            cursor: None,
            done: false,
        }
    }

    fn advance(&mut self) -> RecordResult<Option<Tuple>> {
        let id = match self.cursor {
            None => self.table.begin(self.pool)?,
            Some(id) => self.table.next(self.pool, id)?,
        };
        self.cursor = Some(id);

        if id == self.table.end(self.pool)? {
            return Ok(None);
        }
        self.table.get_tuple(self.pool, id).map(Some)
    }
}

impl Iterator for TableScan<'_> {
    type Item = RecordResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
