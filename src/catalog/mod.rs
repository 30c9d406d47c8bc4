use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::record::{ColumnDef, RecordResult, TupleDesc};

/// Name of the catalog file inside a data directory
pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Table {0} not found")]
    TableNotFound(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Storage organization of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Heap,
    Btree { key_index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDef>,
}

impl TableMetadata {
    pub fn tuple_desc(&self) -> RecordResult<TupleDesc> {
        TupleDesc::new(self.columns.clone())
    }

    /// File name of the table's page store
    pub fn file_name(&self) -> String {
        table_file_name(&self.name)
    }
}

/// File name used for the pages of table `name`
pub fn table_file_name(name: &str) -> String {
    format!("{}.tbl", name)
}

/// Persistent description of every table in a data directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub tables: HashMap<String, TableMetadata>,
}

impl CatalogMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(db_path: &Path) -> CatalogResult<Self> {
        let catalog_path = db_path.join(CATALOG_FILE);
        let content = fs::read_to_string(&catalog_path)?;
        let catalog = serde_json::from_str(&content)?;
        Ok(catalog)
    }

    /// Load the catalog, or start an empty one if the directory has none yet
    pub fn load_or_default(db_path: &Path) -> CatalogResult<Self> {
        if db_path.join(CATALOG_FILE).exists() {
            Self::load(db_path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, db_path: &Path) -> CatalogResult<()> {
        let catalog_path = db_path.join(CATALOG_FILE);
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(&catalog_path, content)?;
        Ok(())
    }

    pub fn add_table(&mut self, metadata: TableMetadata) {
        self.tables.insert(metadata.name.clone(), metadata);
    }

    pub fn remove_table(&mut self, name: &str) -> CatalogResult<TableMetadata> {
        self.tables
            .remove(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn get_table(&self, name: &str) -> CatalogResult<&TableMetadata> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in sorted order
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}
