//! Background merge engine.
//!
//! Mirrors the teacher's `start_merge_thread` channel pattern (a dedicated
//! thread parked on `rx.recv()`), but the worker holds only a `Weak<Table>`:
//! holding a strong `Arc` there would keep the table alive forever since the
//! thread blocks in `recv` for the table's whole lifetime. The `Table` owns
//! the `Sender` (see `table.rs`'s `merge_tx`), so dropping its last `Arc`
//! closes the channel and the thread exits on its own.
//!
//! Merge plans and applies each base record's consolidation under that
//! record's own per-key write lock (the same `KeyLock` `Table::update`
//! acquires), never the table-wide `inner` mutex held for the whole span.
//! That way a concurrent `update()` on the bid being merged can't land
//! between the plan and apply phases and get silently overwritten by
//! merge's now-stale snapshot (spec 5's merge-concurrency requirement):
//! either the update completes first and merge observes its result, or
//! merge holds the lock first and the update waits its turn. If the key
//! is already locked when merge reaches it, merge just skips that bid for
//! this pass -- it will be picked up the next time merge runs.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread;

use log::{info, warn};

use crate::constants::{INDIRECTION_OFFSET, SCHEMA_ENCODING_OFFSET, TIMESTAMP_OFFSET};
use crate::error::EngineResult;
use crate::record::{is_tail, schema_mask_has};
use crate::table::Table;

pub enum MergeSignal {
    Run,
}

pub fn spawn_merge_worker(table: &Arc<Table>) -> Sender<MergeSignal> {
    let (tx, rx): (Sender<MergeSignal>, Receiver<MergeSignal>) = mpsc::channel();
    let weak: Weak<Table> = Arc::downgrade(table);

    thread::spawn(move || {
        for signal in rx {
            let MergeSignal::Run = signal;
            let Some(table) = weak.upgrade() else {
                break;
            };
            info!("merge worker: running merge for '{}'", table.name);
            table.merge();
        }
    });

    tx
}

/// The merge algorithm itself (spec 4.11). Runs under `Table::merge`'s
/// `merge_in_progress` guard, so only one invocation is ever in flight.
pub fn run_merge(table: &Table) -> EngineResult<()> {
    let base_snapshot: Vec<i64> = {
        let inner = table.inner.lock().unwrap();
        inner
            .page_directory
            .keys()
            .copied()
            .filter(|rid| !is_tail(*rid))
            .collect()
    };

    let mut merged = 0usize;
    let mut skipped = 0usize;
    for bid in base_snapshot {
        match merge_one_bid(table, bid) {
            Ok(true) => merged += 1,
            Ok(false) => skipped += 1,
            Err(e) => warn!("merge: skipping bid {bid}: {e}"),
        }
    }
    if skipped > 0 {
        info!("merge: deferred {skipped} record(s) held by concurrent writers");
    }

    {
        let mut inner = table.inner.lock().unwrap();
        inner.updates = 0;
    }

    let indexed_columns: Vec<usize> = {
        let inner = table.inner.lock().unwrap();
        (0..table.num_columns).filter(|c| inner.indexer.is_indexed(*c)).collect()
    };
    for column in indexed_columns {
        if column != table.key_column {
            table.create_index(column);
        }
    }

    info!("merge: consolidated {merged} base record(s) for '{}'", table.name);
    Ok(())
}

/// Plan and apply the merge for a single base record while holding its
/// primary key's write lock, so the plan (read) and apply (write) phases
/// observe and mutate a consistent snapshot. Returns `false` if the key
/// is already locked by someone else or there was nothing to merge.
fn merge_one_bid(table: &Table, bid: i64) -> EngineResult<bool> {
    let primary_key = table.read_rid_column_pub(bid, table.key_column)?;
    let key_lock = table.lock_map.get_or_create(primary_key);
    let Some(_guard) = key_lock.try_acquire_write() else {
        return Ok(false);
    };

    let Some(plan) = plan_merge_for_bid(table, bid)? else {
        return Ok(false);
    };

    for (c, value) in plan.values.iter().enumerate() {
        table.write_rid_column_pub(bid, c, *value)?;
    }
    table.reset_base_metadata(bid, plan.timestamp)?;
    Ok(true)
}

struct MergePlan {
    values: Vec<i64>,
    timestamp: i64,
}

fn plan_merge_for_bid(table: &Table, bid: i64) -> EngineResult<Option<MergePlan>> {
    let metadata_col = |offset: usize| table.num_columns + offset;
    let indirection = table.read_rid_column_pub(bid, metadata_col(INDIRECTION_OFFSET))?;
    if indirection == bid {
        return Ok(None);
    }

    let schema = table.read_rid_column_pub(bid, metadata_col(SCHEMA_ENCODING_OFFSET))?;

    let mut captured = vec![false; table.num_columns];
    let mut values = vec![0i64; table.num_columns];
    let mut newest_timestamp = None;
    let mut rid = indirection;

    while is_tail(rid) {
        let tail_timestamp = table.read_rid_column_pub(rid, metadata_col(TIMESTAMP_OFFSET))?;
        if newest_timestamp.is_none() {
            newest_timestamp = Some(tail_timestamp);
        }

        let mut all_captured = true;
        for c in 0..table.num_columns {
            if schema_mask_has(schema, c) && !captured[c] {
                values[c] = table.read_rid_column_pub(rid, c)?;
                captured[c] = true;
            }
            if !captured[c] {
                all_captured = false;
            }
        }
        if all_captured {
            break;
        }

        rid = table.read_rid_column_pub(rid, metadata_col(INDIRECTION_OFFSET))?;
    }

    for c in 0..table.num_columns {
        if !captured[c] {
            values[c] = table.read_rid_column_pub(bid, c)?;
        }
    }

    Ok(Some(MergePlan {
        values,
        timestamp: newest_timestamp.unwrap_or(0),
    }))
}
