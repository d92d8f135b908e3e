//! Table: the base/tail page vectors, page directory, primary index,
//! lock map, and RID counters for one named relation, plus the query
//! operations that walk them (spec 4.3-4.9).
//!
//! `inner`'s mutex only ever guards the shared bookkeeping structures
//! themselves (the page-directory map, the indexer's trees, and the RID
//! counters) for the instant it takes to read or mutate them. It is never
//! held across a whole operation: per-key exclusion is the `LockMap`'s
//! job (spec 4.12), and holding the table mutex for an entire
//! insert/select/update would serialize every key through one lock and
//! make the per-key lock unreachable in practice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::buffer_pool::{BufferPool, PageKey};
use crate::constants::{
    DEFAULT_MERGE_THRESHOLD_RATIO, INDIRECTION_OFFSET, RID_OFFSET, SCHEMA_ENCODING_OFFSET,
    TIMESTAMP_OFFSET,
};
use crate::error::{EngineError, EngineResult};
use crate::index::Indexer;
use crate::lock::LockMap;
use crate::logical_page::{LogicalPage, PageKind};
use crate::merge::MergeSignal;
use crate::record::{current_timestamp, is_tail, schema_mask_has, schema_mask_set, Record};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PageAddress {
    pub kind: PageKind,
    pub page_index: usize,
    pub slot: usize,
}

#[derive(Serialize, Deserialize)]
pub struct TableInner {
    pub base_pages: Vec<LogicalPage>,
    pub tail_pages: Vec<LogicalPage>,
    pub page_directory: std::collections::HashMap<i64, PageAddress>,
    pub indexer: Indexer,
    pub bid_counter: i64,
    pub tid_counter: i64,
    pub updates: usize,
}

pub struct Table {
    pub name: String,
    pub num_columns: usize,
    pub key_column: usize,
    pub buffer_pool: Arc<BufferPool>,
    pub inner: Mutex<TableInner>,
    pub lock_map: LockMap,
    pub merge_threshold: f64,
    pub merge_in_progress: AtomicBool,
    pub merge_tx: OnceLock<Sender<MergeSignal>>,
}

impl Table {
    pub fn new(
        name: &str,
        num_columns: usize,
        key_column: usize,
        buffer_pool: Arc<BufferPool>,
        merge_threshold: Option<f64>,
    ) -> Self {
        Table {
            name: name.to_string(),
            num_columns,
            key_column,
            buffer_pool,
            inner: Mutex::new(TableInner {
                base_pages: Vec::new(),
                tail_pages: Vec::new(),
                page_directory: std::collections::HashMap::new(),
                indexer: Indexer::new(num_columns, key_column),
                bid_counter: 0,
                tid_counter: 1,
                updates: 0,
            }),
            lock_map: LockMap::new(),
            merge_threshold: merge_threshold.unwrap_or(DEFAULT_MERGE_THRESHOLD_RATIO),
            merge_in_progress: AtomicBool::new(false),
            merge_tx: OnceLock::new(),
        }
    }

    fn page_key(&self, kind: PageKind, page_index: usize, column_index: usize) -> PageKey {
        PageKey::new(&self.name, kind, page_index, column_index)
    }

    fn metadata_column(&self, offset: usize) -> usize {
        self.num_columns + offset
    }

    /// Used by `merge.rs`, a separate module that needs the same
    /// single-RID read/write primitives but must never hold `inner`
    /// across its own plan/apply steps (see that module's doc comment).
    pub(crate) fn read_rid_column_pub(&self, rid: i64, column_index: usize) -> EngineResult<i64> {
        self.read_rid_column(rid, column_index)
    }

    pub(crate) fn write_rid_column_pub(&self, rid: i64, column_index: usize, value: i64) -> EngineResult<()> {
        self.write_rid_column(rid, column_index, value)
    }

    pub(crate) fn reset_base_metadata(&self, bid: i64, timestamp: i64) -> EngineResult<()> {
        self.write_rid_column(bid, self.metadata_column(SCHEMA_ENCODING_OFFSET), 0)?;
        self.write_rid_column(bid, self.metadata_column(INDIRECTION_OFFSET), bid)?;
        self.write_rid_column(bid, self.metadata_column(TIMESTAMP_OFFSET), timestamp)?;
        Ok(())
    }

    fn page_address(&self, rid: i64) -> EngineResult<PageAddress> {
        let inner = self.inner.lock().unwrap();
        inner
            .page_directory
            .get(&rid)
            .copied()
            .ok_or(EngineError::CorruptState(format!("no page directory entry for rid {rid}")))
    }

    /// A page-directory entry is written once, at insert or update time,
    /// and never relocated afterwards, so looking up the address and then
    /// touching the buffer pool can safely happen outside the `inner`
    /// lock: the address can't change out from under us.
    fn read_rid_column(&self, rid: i64, column_index: usize) -> EngineResult<i64> {
        let addr = self.page_address(rid)?;
        self.buffer_pool.read(&self.page_key(addr.kind, addr.page_index, column_index), addr.slot)
    }

    fn write_rid_column(&self, rid: i64, column_index: usize, value: i64) -> EngineResult<()> {
        let addr = self.page_address(rid)?;
        self.buffer_pool
            .write(&self.page_key(addr.kind, addr.page_index, column_index), value, Some(addr.slot))?;
        Ok(())
    }

    fn ensure_base_capacity(&self, inner: &mut TableInner) -> usize {
        if inner.base_pages.last().map(|p| p.has_capacity()).unwrap_or(false) {
            return inner.base_pages.len() - 1;
        }
        let page_index = inner.base_pages.len();
        inner.base_pages.push(LogicalPage::new(PageKind::Base, page_index, self.num_columns));
        page_index
    }

    fn ensure_tail_capacity(&self, inner: &mut TableInner) -> usize {
        if inner.tail_pages.last().map(|p| p.has_capacity()).unwrap_or(false) {
            return inner.tail_pages.len() - 1;
        }
        let page_index = inner.tail_pages.len();
        inner.tail_pages.push(LogicalPage::new(PageKind::Tail, page_index, self.num_columns));
        page_index
    }

    /// Read the record's current effective values for every user column,
    /// following the cumulative tail scheme: the newest tail row (if any)
    /// already holds the full current snapshot, so a single hop suffices.
    fn current_row(&self, bid: i64) -> EngineResult<(i64, Vec<i64>)> {
        let indirection = self.read_rid_column(bid, self.metadata_column(INDIRECTION_OFFSET))?;
        let source_rid = if is_tail(indirection) { indirection } else { bid };
        let values = (0..self.num_columns)
            .map(|c| self.read_rid_column(source_rid, c))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok((source_rid, values))
    }

    /// Walk the indirection chain back `relative_version` steps (<= 0).
    fn versioned_row(&self, bid: i64, relative_version: i64) -> EngineResult<(i64, Vec<i64>)> {
        let mut rid = self.read_rid_column(bid, self.metadata_column(INDIRECTION_OFFSET))?;
        let mut v = relative_version;
        while is_tail(rid) && v < 0 {
            rid = self.read_rid_column(rid, self.metadata_column(INDIRECTION_OFFSET))?;
            v += 1;
        }

        let source = if is_tail(rid) { rid } else { bid };
        let values = (0..self.num_columns)
            .map(|c| self.read_rid_column(source, c))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok((source, values))
    }

    fn locate_bids(&self, column: usize, value: i64) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner.indexer.locate(column, value)
    }

    fn locate_range_bids(&self, column: usize, begin: i64, end: i64) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner.indexer.locate_range(column, begin, end)
    }

    // ---- insert ----

    pub fn try_insert(&self, columns: &[i64]) -> EngineResult<()> {
        if columns.len() != self.num_columns {
            return Err(EngineError::ArityMismatch {
                expected: self.num_columns,
                actual: columns.len(),
            });
        }

        let key_value = columns[self.key_column];
        let key_lock = self.lock_map.get_or_create(key_value);
        let guard = key_lock.try_acquire_write().ok_or(EngineError::LockConflict("write"))?;

        if !self.locate_bids(self.key_column, key_value).is_empty() {
            return Err(EngineError::DuplicateKey);
        }

        let (bid, page_index, slot) = {
            let mut inner = self.inner.lock().unwrap();
            let bid = inner.bid_counter;
            inner.bid_counter += 2;
            let page_index = self.ensure_base_capacity(&mut inner);
            let slot = inner.base_pages[page_index].reserve_slot();
            inner.page_directory.insert(
                bid,
                PageAddress {
                    kind: PageKind::Base,
                    page_index,
                    slot,
                },
            );
            (bid, page_index, slot)
        };

        for (c, value) in columns.iter().enumerate() {
            self.buffer_pool
                .write(&self.page_key(PageKind::Base, page_index, c), *value, Some(slot))?;
        }
        self.buffer_pool.write(
            &self.page_key(PageKind::Base, page_index, self.metadata_column(SCHEMA_ENCODING_OFFSET)),
            0,
            Some(slot),
        )?;
        self.buffer_pool
            .write(&self.page_key(PageKind::Base, page_index, self.metadata_column(RID_OFFSET)), bid, Some(slot))?;
        self.buffer_pool.write(
            &self.page_key(PageKind::Base, page_index, self.metadata_column(INDIRECTION_OFFSET)),
            bid,
            Some(slot),
        )?;
        self.buffer_pool.write(
            &self.page_key(PageKind::Base, page_index, self.metadata_column(TIMESTAMP_OFFSET)),
            current_timestamp(),
            Some(slot),
        )?;

        {
            let mut inner = self.inner.lock().unwrap();
            for c in 0..self.num_columns {
                if inner.indexer.is_indexed(c) {
                    inner.indexer.insert(c, columns[c], bid);
                }
            }
        }

        drop(guard);
        Ok(())
    }

    pub fn insert(&self, columns: &[i64]) -> bool {
        match self.try_insert(columns) {
            Ok(()) => true,
            Err(e) => {
                debug!("insert failed: {e}");
                false
            }
        }
    }

    // ---- select ----

    pub fn try_select_version(
        &self,
        search_key: i64,
        search_key_column: usize,
        projected_columns: &[bool],
        relative_version: i64,
    ) -> EngineResult<Vec<Record>> {
        let bids = self.locate_bids(search_key_column, search_key);

        let mut out = Vec::with_capacity(bids.len());
        for bid in bids {
            let primary_key = self.read_rid_column(bid, self.key_column)?;
            let guard = self
                .lock_map
                .get_or_create(primary_key)
                .try_acquire_read()
                .ok_or(EngineError::LockConflict("read"))?;

            let (rid, values) = self.versioned_row(bid, relative_version)?;
            drop(guard);

            let projected = values
                .into_iter()
                .enumerate()
                .filter(|(i, _)| projected_columns.get(*i).copied().unwrap_or(true))
                .map(|(_, v)| v)
                .collect();
            out.push(Record::new(rid, primary_key, projected));
        }
        Ok(out)
    }

    pub fn select_version(
        &self,
        search_key: i64,
        search_key_column: usize,
        projected_columns: &[bool],
        relative_version: i64,
    ) -> Option<Vec<Record>> {
        match self.try_select_version(search_key, search_key_column, projected_columns, relative_version) {
            Ok(records) => Some(records),
            Err(e) => {
                debug!("select_version failed: {e}");
                None
            }
        }
    }

    pub fn select(
        &self,
        search_key: i64,
        search_key_column: usize,
        projected_columns: &[bool],
    ) -> Option<Vec<Record>> {
        self.select_version(search_key, search_key_column, projected_columns, 0)
    }

    // ---- update ----

    pub fn try_update(&self, primary_key: i64, columns: &[Option<i64>]) -> EngineResult<()> {
        if columns.len() != self.num_columns {
            return Err(EngineError::ArityMismatch {
                expected: self.num_columns,
                actual: columns.len(),
            });
        }

        let key_lock = self.lock_map.get_or_create(primary_key);
        let guard = key_lock.try_acquire_write().ok_or(EngineError::LockConflict("write"))?;

        let bids = self.locate_bids(self.key_column, primary_key);
        let bid = *bids.first().ok_or(EngineError::NotFound)?;

        if let Some(new_key) = columns[self.key_column] {
            if new_key != primary_key && !self.locate_bids(self.key_column, new_key).is_empty() {
                return Err(EngineError::DuplicateKey);
            }
        }

        let base_schema = self.read_rid_column(bid, self.metadata_column(SCHEMA_ENCODING_OFFSET))?;
        let base_indirection = self.read_rid_column(bid, self.metadata_column(INDIRECTION_OFFSET))?;
        let (_, current_values) = self.current_row(bid)?;

        let mut new_values = current_values.clone();
        let mut changed_mask = 0i64;
        for (c, maybe_value) in columns.iter().enumerate() {
            if let Some(v) = maybe_value {
                if *v != current_values[c] {
                    new_values[c] = *v;
                    changed_mask = schema_mask_set(changed_mask, c);
                }
            }
        }

        if changed_mask == 0 {
            return Ok(());
        }

        let (page_index, slot, tid) = {
            let mut inner = self.inner.lock().unwrap();
            let page_index = self.ensure_tail_capacity(&mut inner);
            let slot = inner.tail_pages[page_index].reserve_slot();
            let tid = inner.tid_counter;
            inner.tid_counter += 2;
            inner.page_directory.insert(
                tid,
                PageAddress {
                    kind: PageKind::Tail,
                    page_index,
                    slot,
                },
            );
            (page_index, slot, tid)
        };

        for (c, value) in new_values.iter().enumerate() {
            self.buffer_pool
                .write(&self.page_key(PageKind::Tail, page_index, c), *value, Some(slot))?;
        }
        let new_schema = base_schema | changed_mask;
        self.buffer_pool.write(
            &self.page_key(PageKind::Tail, page_index, self.metadata_column(SCHEMA_ENCODING_OFFSET)),
            new_schema,
            Some(slot),
        )?;
        self.buffer_pool
            .write(&self.page_key(PageKind::Tail, page_index, self.metadata_column(RID_OFFSET)), tid, Some(slot))?;
        self.buffer_pool.write(
            &self.page_key(PageKind::Tail, page_index, self.metadata_column(INDIRECTION_OFFSET)),
            base_indirection,
            Some(slot),
        )?;
        self.buffer_pool.write(
            &self.page_key(PageKind::Tail, page_index, self.metadata_column(TIMESTAMP_OFFSET)),
            current_timestamp(),
            Some(slot),
        )?;

        self.write_rid_column(bid, self.metadata_column(INDIRECTION_OFFSET), tid)?;
        if new_schema != base_schema {
            self.write_rid_column(bid, self.metadata_column(SCHEMA_ENCODING_OFFSET), new_schema)?;
        }

        let should_merge = {
            let mut inner = self.inner.lock().unwrap();
            for c in 0..self.num_columns {
                if schema_mask_has(changed_mask, c) && inner.indexer.is_indexed(c) {
                    inner.indexer.update(c, current_values[c], new_values[c], bid);
                }
            }
            inner.updates += 1;
            self.should_merge_locked(&inner)
        };

        if columns[self.key_column].is_some() && columns[self.key_column] != Some(primary_key) {
            self.lock_map.rename(primary_key, columns[self.key_column].unwrap());
        }

        drop(guard);
        if should_merge {
            self.trigger_merge();
        }
        Ok(())
    }

    pub fn update(&self, primary_key: i64, columns: &[Option<i64>]) -> bool {
        match self.try_update(primary_key, columns) {
            Ok(()) => true,
            Err(e) => {
                debug!("update failed: {e}");
                false
            }
        }
    }

    // ---- increment ----

    pub fn increment(&self, primary_key: i64, column: usize) -> bool {
        let Some(records) = self.select(primary_key, self.key_column, &vec![true; self.num_columns]) else {
            return false;
        };
        let Some(record) = records.first() else {
            return false;
        };
        let mut columns = vec![None; self.num_columns];
        columns[column] = Some(record.columns[column] + 1);
        self.update(primary_key, &columns)
    }

    // ---- sum ----

    pub fn try_sum_version(
        &self,
        start_key: i64,
        end_key: i64,
        agg_column: usize,
        relative_version: i64,
    ) -> EngineResult<i64> {
        let bids = self.locate_range_bids(self.key_column, start_key, end_key);
        if bids.is_empty() {
            return Err(EngineError::RangeEmpty);
        }

        let mut total = 0i64;
        for bid in bids {
            let primary_key = self.read_rid_column(bid, self.key_column)?;
            let guard = self
                .lock_map
                .get_or_create(primary_key)
                .try_acquire_read()
                .ok_or(EngineError::LockConflict("read"))?;
            let (_, values) = self.versioned_row(bid, relative_version)?;
            drop(guard);
            total += values[agg_column];
        }
        Ok(total)
    }

    pub fn sum_version(
        &self,
        start_key: i64,
        end_key: i64,
        agg_column: usize,
        relative_version: i64,
    ) -> Option<i64> {
        match self.try_sum_version(start_key, end_key, agg_column, relative_version) {
            Ok(total) => Some(total),
            Err(e) => {
                debug!("sum_version failed: {e}");
                None
            }
        }
    }

    pub fn sum(&self, start_key: i64, end_key: i64, agg_column: usize) -> Option<i64> {
        self.sum_version(start_key, end_key, agg_column, 0)
    }

    // ---- delete ----

    pub fn delete(&self, primary_key: i64) -> bool {
        let key_lock = self.lock_map.get_or_create(primary_key);
        let Some(_guard) = key_lock.try_acquire_write() else {
            return false;
        };

        let bids = self.locate_bids(self.key_column, primary_key);
        let Some(bid) = bids.first().copied() else {
            return false;
        };

        let mut inner = self.inner.lock().unwrap();
        inner.indexer.remove(self.key_column, primary_key, bid);
        true
    }

    // ---- secondary indexes ----

    pub fn create_index(&self, column: usize) -> bool {
        if column >= self.num_columns {
            return false;
        }
        let bids: Vec<i64> = {
            let inner = self.inner.lock().unwrap();
            inner.page_directory.keys().copied().filter(|rid| !is_tail(*rid)).collect()
        };

        let mut rows = Vec::with_capacity(bids.len());
        for bid in bids {
            match self.current_row(bid) {
                Ok((_, values)) => rows.push((values[column], bid)),
                Err(e) => warn!("create_index: skipping bid {bid}: {e}"),
            }
        }

        let mut inner = self.inner.lock().unwrap();
        inner.indexer.create_index(column, rows);
        true
    }

    pub fn drop_index(&self, column: usize) -> bool {
        if column == self.key_column || column >= self.num_columns {
            return false;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.indexer.drop_index(column, self.key_column);
        true
    }

    // ---- merge ----

    fn should_merge_locked(&self, inner: &TableInner) -> bool {
        let total_base = inner.base_pages.iter().map(|p| p.num_records).sum::<usize>();
        if total_base == 0 {
            return false;
        }
        (inner.updates as f64 / total_base as f64) > self.merge_threshold
    }

    pub fn should_merge(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        self.should_merge_locked(&inner)
    }

    fn trigger_merge(&self) {
        if let Some(tx) = self.merge_tx.get() {
            let _ = tx.send(MergeSignal::Run);
        }
    }

    /// Run the merge algorithm synchronously (spec 4.11). Safe to call
    /// directly (on-demand) or from the background merge worker.
    pub fn merge(&self) -> bool {
        if self
            .merge_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let result = crate::merge::run_merge(self);
        self.merge_in_progress.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("merge failed: {e}");
                false
            }
        }
    }
}
