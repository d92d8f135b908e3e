//! Database: owns the shared buffer pool and the named tables, and
//! drives the close/open persistence cycle (spec 6 / 4.13).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::merge::spawn_merge_worker;
use crate::persistence;
use crate::table::Table;
use crate::{buffer_pool::BufferPool, EngineConfig};

pub struct Database {
    root: Option<PathBuf>,
    buffer_pool: Arc<BufferPool>,
    tables: HashMap<String, Arc<Table>>,
    config: EngineConfig,
}

impl Database {
    pub fn new(config: EngineConfig) -> Self {
        Database {
            root: None,
            buffer_pool: Arc::new(BufferPool::new(config.buffer_pool_capacity)),
            tables: HashMap::new(),
            config,
        }
    }

    /// Load every persisted table under `path` and adopt it as the
    /// database's working directory.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let root = path.as_ref().to_path_buf();
        persistence::ensure_root(&root)?;

        let buffer_pool = Arc::new(BufferPool::new(config.buffer_pool_capacity));
        buffer_pool.set_root(root.clone());

        let mut db = Database {
            root: Some(root.clone()),
            buffer_pool: buffer_pool.clone(),
            tables: HashMap::new(),
            config,
        };

        for name in persistence::discover_tables(&root)? {
            let table = persistence::load_table(&root, &name, buffer_pool.clone())?;
            let table = Arc::new(table);
            let tx = spawn_merge_worker(&table);
            let _ = table.merge_tx.set(tx);
            db.tables.insert(name, table);
        }

        info!("opened database at {}", root.display());
        Ok(db)
    }

    pub fn create_table(&mut self, name: &str, num_columns: usize, key_column: usize) -> EngineResult<Arc<Table>> {
        if self.tables.contains_key(name) {
            return Err(EngineError::TableExists(name.to_string()));
        }

        let table = Arc::new(Table::new(
            name,
            num_columns,
            key_column,
            self.buffer_pool.clone(),
            Some(self.config.merge_threshold_ratio),
        ));
        let tx = spawn_merge_worker(&table);
        let _ = table.merge_tx.set(tx);

        self.tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    pub fn drop_table(&mut self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).cloned()
    }

    /// Flush every table's pages and metadata to `root` (or the directory
    /// `open` was called with), matching spec 4.13.
    pub fn close(&self) -> EngineResult<()> {
        let Some(root) = self.root.clone() else {
            warn!("close called on a database with no working directory; nothing persisted");
            return Ok(());
        };

        self.buffer_pool.flush_all()?;
        for table in self.tables.values() {
            persistence::save_table(&root, table)?;
        }
        info!("closed database at {}", root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_table() {
        let mut db = Database::new(EngineConfig::default());
        db.create_table("t", 2, 0).unwrap();
        assert!(db.get_table("t").is_some());
        assert!(db.get_table("missing").is_none());
    }

    #[test]
    fn create_table_twice_fails() {
        let mut db = Database::new(EngineConfig::default());
        db.create_table("t", 2, 0).unwrap();
        assert!(db.create_table("t", 2, 0).is_err());
    }

    #[test]
    fn drop_table_removes_it() {
        let mut db = Database::new(EngineConfig::default());
        db.create_table("t", 2, 0).unwrap();
        assert!(db.drop_table("t"));
        assert!(db.get_table("t").is_none());
    }
}
