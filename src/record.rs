//! Record identifiers and the record shape returned to callers.
//!
//! RIDs use a parity scheme: even RIDs name base records, odd RIDs name
//! tail records. The two counters advance independently by 2 so neither
//! parity is ever reused.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns whether `rid` names a base record.
pub fn is_base(rid: i64) -> bool {
    rid % 2 == 0
}

/// Returns whether `rid` names a tail record.
pub fn is_tail(rid: i64) -> bool {
    rid % 2 != 0
}

/// Seconds since the epoch, used for the TIMESTAMP metadata column.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A logical row as handed back from `select`/`select_version`: the
/// record's RID, its primary key (kept even when the key column itself
/// isn't projected), and the effective value of every projected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rid: i64,
    pub key: i64,
    pub columns: Vec<i64>,
}

impl Record {
    pub fn new(rid: i64, key: i64, columns: Vec<i64>) -> Self {
        Record { rid, key, columns }
    }
}

/// Bitmask helpers for the SCHEMA_ENCODING metadata column: bit `i` set
/// means user column `i` has an unmerged update recorded in the tail chain.
pub fn schema_bit(column: usize) -> i64 {
    1 << column
}

pub fn schema_mask_set(mask: i64, column: usize) -> i64 {
    mask | schema_bit(column)
}

pub fn schema_mask_has(mask: i64, column: usize) -> bool {
    mask & schema_bit(column) != 0
}
