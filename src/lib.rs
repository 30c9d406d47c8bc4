pub mod btree;
pub mod catalog;
pub mod database;
pub mod file;
pub mod query;
pub mod record;

pub use btree::BTreeFile;
pub use catalog::{CatalogError, CatalogMetadata, TableKind, TableMetadata};
pub use database::{Database, DatabaseError, DatabaseResult};
pub use file::{BufferPool, DEFAULT_POOL_SIZE, DbFile, FileError, MemFile, PAGE_SIZE, PageId, PageStore};
pub use query::{ColumnStats, PredicateOp, QueryError, QueryResult};
pub use record::{
    ColumnDef, DataType, DbTable, HeapFile, RecordError, RecordResult, TableScan, Tuple, TupleDesc,
    TupleId, Value,
};
