use ahash::AHashMap;
use csv::ReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::btree::BTreeFile;
use crate::catalog::{CatalogError, CatalogMetadata, TableKind, TableMetadata, table_file_name};
use crate::file::{BufferPool, DEFAULT_POOL_SIZE, DbFile, FileManager, MemFile, PageStore};
use crate::record::{DataType, DbTable, HeapFile, TableScan, Tuple, TupleDesc, TupleId, Value};


#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Page store {store} cannot back table {table}")]
    StoreMismatch { table: String, store: String },

    #[error("Cannot read/write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Line {line}: {message}")]
    ParseError { line: u64, message: String },

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Record error: {0}")]
    RecordError(#[from] crate::record::RecordError),

    #[error("File error: {0}")]
    FileError(#[from] crate::file::FileError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Open tables, keyed by name
#[derive(Default)]
pub struct TableRegistry {
    tables: AHashMap<String, Box<dyn DbTable>>,
}

impl TableRegistry {
    pub fn get(&self, name: &str) -> DatabaseResult<&dyn DbTable> {
        self.tables
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Storage engine: one buffer pool shared by every registered table
///
/// Tables created through [`create_heap_table`](Self::create_heap_table)
/// or [`create_btree_table`](Self::create_btree_table) are recorded in the
/// catalog and reopened by [`open`](Self::open). Tables registered with
/// [`add`](Self::add) live only as long as this engine.
pub struct Database {
    data_dir: Option<PathBuf>,
    catalog: CatalogMetadata,
    pool: BufferPool,
    tables: TableRegistry,
}

impl Database {
    /// Open (or create) a data directory with the default pool size
    pub fn open<P: AsRef<Path>>(data_dir: P) -> DatabaseResult<Self> {
        Self::open_with_capacity(data_dir, DEFAULT_POOL_SIZE)
    }

    /// Open (or create) a data directory, caching at most `capacity` pages
    pub fn open_with_capacity<P: AsRef<Path>>(
        data_dir: P,
        capacity: usize,
    ) -> DatabaseResult<Self> {
        let data_path = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_path)?;

        let catalog = CatalogMetadata::load_or_default(&data_path)?;
        let mut db = Self {
            data_dir: Some(data_path),
            catalog,
            pool: BufferPool::with_capacity(FileManager::new(), capacity),
            tables: TableRegistry::default(),
        };

        for name in db.catalog.table_names() {
            let metadata = db.catalog.get_table(&name)?.clone();
            let store = db.create_store(&metadata.name)?;
            let table = build_table(&metadata)?;
            db.register(table, store)?;
        }

        Ok(db)
    }

    /// Engine whose tables live only in memory
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            data_dir: None,
            catalog: CatalogMetadata::new(),
            pool: BufferPool::with_capacity(FileManager::new(), capacity),
            tables: TableRegistry::default(),
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn catalog(&self) -> &CatalogMetadata {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn buffer_pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    /// Registered tables together with the pool, for operators that read one
    /// table while writing another
    pub fn tables_and_pool(&mut self) -> (&TableRegistry, &mut BufferPool) {
        (&self.tables, &mut self.pool)
    }

    // Table operations
    pub fn create_heap_table(&mut self, name: &str, desc: TupleDesc) -> DatabaseResult<()> {
        self.create_table(TableMetadata {
            name: name.to_string(),
            kind: TableKind::Heap,
            columns: desc.columns().to_vec(),
        })
    }

    pub fn create_btree_table(
        &mut self,
        name: &str,
        desc: TupleDesc,
        key_index: usize,
    ) -> DatabaseResult<()> {
        self.create_table(TableMetadata {
            name: name.to_string(),
            kind: TableKind::Btree { key_index },
            columns: desc.columns().to_vec(),
        })
    }

    fn create_table(&mut self, metadata: TableMetadata) -> DatabaseResult<()> {
        if self.tables.contains(&metadata.name) || self.catalog.contains(&metadata.name) {
            return Err(DatabaseError::TableExists(metadata.name));
        }

        // Validate the schema before touching the disk
        let table = build_table(&metadata)?;

        // A file left behind by a dropped table is not part of the new one
        if let Some(dir) = &self.data_dir {
            let path = dir.join(metadata.file_name());
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        let store = self.create_store(&metadata.name)?;
        self.register(table, store)?;

        self.catalog.add_table(metadata);
        self.save_catalog()
    }

    /// Register a caller-built table backed by `store`
    ///
    /// The store must be named after the table. The table is not recorded in
    /// the catalog.
    pub fn add(&mut self, table: Box<dyn DbTable>, store: Box<dyn PageStore>) -> DatabaseResult<()> {
        if self.tables.contains(table.name()) {
            return Err(DatabaseError::TableExists(table.name().to_string()));
        }
        self.register(table, store)
    }

    /// Detach a table from the engine, flushing its pages first
    /// Its data stays on disk and its catalog entry is kept
    pub fn remove(&mut self, name: &str) -> DatabaseResult<Box<dyn DbTable>> {
        if !self.tables.contains(name) {
            return Err(DatabaseError::TableNotFound(name.to_string()));
        }

        self.pool.flush_file(name)?;
        self.pool.discard_file(name);
        let mut store = self.pool.files_mut().remove(name)?;
        store.sync()?;

        self.tables
            .tables
            .remove(name)
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    /// Remove a table, forget it in the catalog and delete its file
    pub fn drop_table(&mut self, name: &str) -> DatabaseResult<()> {
        self.remove(name)?;

        if self.catalog.contains(name) {
            let metadata = self.catalog.remove_table(name)?;
            self.save_catalog()?;
            if let Some(dir) = &self.data_dir {
                let path = dir.join(metadata.file_name());
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> DatabaseResult<&dyn DbTable> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.names()
    }

    /// Flush every dirty page and detach all tables
    pub fn clear(&mut self) -> DatabaseResult<()> {
        self.pool.clear()?;
        for name in self.tables.names() {
            self.tables.tables.remove(&name);
            let mut store = self.pool.files_mut().remove(&name)?;
            store.sync()?;
        }
        Ok(())
    }

    /// Write every dirty page back to its store
    pub fn flush(&mut self) -> DatabaseResult<()> {
        self.pool.flush_all()?;
        Ok(())
    }

    // Tuple operations
    pub fn insert(&mut self, table: &str, tuple: &Tuple) -> DatabaseResult<()> {
        let table = self.tables.get(table)?;
        table.insert_tuple(&mut self.pool, tuple)?;
        Ok(())
    }

    pub fn delete(&mut self, table: &str, id: TupleId) -> DatabaseResult<()> {
        let table = self.tables.get(table)?;
        table.delete_tuple(&mut self.pool, id)?;
        Ok(())
    }

    pub fn get_tuple(&mut self, table: &str, id: TupleId) -> DatabaseResult<Tuple> {
        let table = self.tables.get(table)?;
        Ok(table.get_tuple(&mut self.pool, id)?)
    }

    /// Insert every row of a headerless CSV file into `table`
    ///
    /// Each row must have exactly one field per column. Returns the number of
    /// rows inserted.
    pub fn load_csv<P: AsRef<Path>>(
        &mut self,
        table: &str,
        file_path: P,
        delimiter: u8,
    ) -> DatabaseResult<usize> {
        let table = self.tables.get(table)?;
        let desc = table.tuple_desc();

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(file_path.as_ref())?;

        let mut total_inserted = 0;
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line());
            if record.len() != desc.size() {
                return Err(DatabaseError::ParseError {
                    line,
                    message: format!("expected {} fields, got {}", desc.size(), record.len()),
                });
            }

            let values = record
                .iter()
                .zip(desc.columns())
                .map(|(field, col)| {
                    parse_value(field, col.data_type).ok_or_else(|| DatabaseError::ParseError {
                        line,
                        message: format!("{:?} is not a valid {} for {}", field, col.data_type, col.name),
                    })
                })
                .collect::<DatabaseResult<Vec<_>>>()?;

            table.insert_tuple(&mut self.pool, &Tuple::new(values))?;
            total_inserted += 1;
        }

        Ok(total_inserted)
    }

    /// Iterate over every tuple of `table`
    pub fn scan(&mut self, table: &str) -> DatabaseResult<TableScan<'_>> {
        let table = self.tables.get(table)?;
        Ok(TableScan::new(table, &mut self.pool))
    }

    fn create_store(&self, name: &str) -> DatabaseResult<Box<dyn PageStore>> {
        let store: Box<dyn PageStore> = match &self.data_dir {
            Some(dir) => Box::new(DbFile::open(name, dir.join(table_file_name(name)))?),
            None => Box::new(MemFile::new(name)),
        };
        Ok(store)
    }

    fn register(&mut self, table: Box<dyn DbTable>, store: Box<dyn PageStore>) -> DatabaseResult<()> {
        if store.name() != table.name() {
            return Err(DatabaseError::StoreMismatch {
                table: table.name().to_string(),
                store: store.name().to_string(),
            });
        }

        self.pool.files_mut().add(store)?;
        self.tables
            .tables
            .insert(table.name().to_string(), table);
        Ok(())
    }

    fn save_catalog(&self) -> DatabaseResult<()> {
        if let Some(dir) = &self.data_dir {
            self.catalog.save(dir)?;
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.pool.flush_all() {
            eprintln!("Warning: failed to flush database on close: {}", e);
        }
    }
}

fn parse_value(field: &str, data_type: DataType) -> Option<Value> {
    match data_type {
        DataType::Int => field.trim().parse().ok().map(Value::Int),
        DataType::Double => field.trim().parse().ok().map(Value::Double),
        DataType::Text => Some(Value::from(field)),
    }
}

fn build_table(metadata: &TableMetadata) -> DatabaseResult<Box<dyn DbTable>> {
    let desc = metadata.tuple_desc()?;
    let table: Box<dyn DbTable> = match metadata.kind {
        TableKind::Heap => Box::new(HeapFile::new(metadata.name.as_str(), desc)?),
        TableKind::Btree { key_index } => {
            Box::new(BTreeFile::new(metadata.name.as_str(), desc, key_index)?)
        }
    };
    Ok(table)
}
