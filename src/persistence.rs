//! On-disk layout and close/open reconstruction (spec 4.13 / 6).
//!
//! Layout under the database root:
//! `<root>/<table>/<base|tail>_<idx>/page_<col>.dat` (+ `.meta` sidecar)
//! and `<root>/<table>/<table>.meta` for table-level metadata. Physical
//! Page bytes are written by the buffer pool itself (`flush_all`); this
//! module owns the table-level metadata and the scan that rebuilds a
//! table's logical-page vectors and lock map on `open`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::buffer_pool::BufferPool;
use crate::error::{EngineError, EngineResult};
use crate::index::Indexer;
use crate::logical_page::{LogicalPage, PageKind};
use crate::table::{PageAddress, Table, TableInner};

#[derive(Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub num_columns: usize,
    pub key_column: usize,
    pub bid_counter: i64,
    pub tid_counter: i64,
    pub updates: usize,
    pub page_directory: HashMap<i64, PageAddress>,
    pub indexer: Indexer,
    pub num_base_pages: usize,
    pub num_tail_pages: usize,
    pub base_page_records: Vec<usize>,
    pub tail_page_records: Vec<usize>,
    pub merge_threshold: f64,
}

pub fn table_meta_path(root: &Path, table_name: &str) -> std::path::PathBuf {
    root.join(table_name).join(format!("{table_name}.meta"))
}

/// Write a table's metadata file. Physical page bytes themselves are
/// flushed by the caller via `BufferPool::flush_all` beforehand.
pub fn save_table(root: &Path, table: &Table) -> EngineResult<()> {
    let inner = table.inner.lock().unwrap();
    let meta = TableMetadata {
        name: table.name.clone(),
        num_columns: table.num_columns,
        key_column: table.key_column,
        bid_counter: inner.bid_counter,
        tid_counter: inner.tid_counter,
        updates: inner.updates,
        page_directory: inner.page_directory.clone(),
        indexer: inner.indexer.clone(),
        num_base_pages: inner.base_pages.len(),
        num_tail_pages: inner.tail_pages.len(),
        base_page_records: inner.base_pages.iter().map(|p| p.num_records).collect(),
        tail_page_records: inner.tail_pages.iter().map(|p| p.num_records).collect(),
        merge_threshold: table.merge_threshold,
    };
    drop(inner);

    let path = table_meta_path(root, &table.name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(&meta)?;
    fs::write(path, bytes)?;
    info!("persisted table '{}'", table.name);
    Ok(())
}

/// Reconstruct a `Table` from its metadata file and the per-column
/// `.meta` sidecars under its base/tail page directories. Physical page
/// contents are loaded lazily by the buffer pool on first access.
pub fn load_table(root: &Path, table_name: &str, buffer_pool: std::sync::Arc<BufferPool>) -> EngineResult<Table> {
    let path = table_meta_path(root, table_name);
    let bytes = fs::read(&path)?;
    let meta: TableMetadata = serde_json::from_slice(&bytes)?;

    let base_pages = meta
        .base_page_records
        .iter()
        .enumerate()
        .map(|(i, &num_records)| {
            let mut lp = LogicalPage::new(PageKind::Base, i, meta.num_columns);
            lp.num_records = num_records;
            lp
        })
        .collect();

    let tail_pages = meta
        .tail_page_records
        .iter()
        .enumerate()
        .map(|(i, &num_records)| {
            let mut lp = LogicalPage::new(PageKind::Tail, i, meta.num_columns);
            lp.num_records = num_records;
            lp
        })
        .collect();

    let table = Table::new(
        &meta.name,
        meta.num_columns,
        meta.key_column,
        buffer_pool,
        Some(meta.merge_threshold),
    );

    let base_bids: Vec<i64> = {
        let mut inner = table.inner.lock().unwrap();
        *inner = TableInner {
            base_pages,
            tail_pages,
            page_directory: meta.page_directory,
            indexer: meta.indexer,
            bid_counter: meta.bid_counter,
            tid_counter: meta.tid_counter,
            updates: meta.updates,
        };
        inner
            .page_directory
            .keys()
            .copied()
            .filter(|rid| !crate::record::is_tail(*rid))
            .collect()
    };

    // `read_rid_column_pub` takes `inner`'s lock itself, so the snapshot
    // above must have released it first.
    for bid in base_bids {
        match table.read_rid_column_pub(bid, meta.key_column) {
            Ok(key) => {
                table.lock_map.get_or_create(key);
            }
            Err(e) => warn!("load_table: could not pre-load key for bid {bid}: {e}"),
        }
    }

    Ok(table)
}

/// Every top-level directory under `root` that has a `<name>/<name>.meta`
/// file is a persisted table.
pub fn discover_tables(root: &Path) -> EngineResult<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if table_meta_path(root, &name).exists() {
            names.push(name);
        }
    }
    Ok(names)
}

pub fn ensure_root(root: &Path) -> EngineResult<()> {
    fs::create_dir_all(root).map_err(EngineError::from)
}
