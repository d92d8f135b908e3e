//! Per-column ordered secondary indexes.
//!
//! The primary-key column is always indexed. Other columns are indexed
//! on demand via `create_index`/`drop_index` (spec 4.9 / 6); an
//! un-indexed column's `locate`/`locate_range` simply returns nothing,
//! matching the spec's choice not to fall back to a table scan.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Indexer {
    /// One ordered map per column: value -> set of BIDs currently holding it.
    maps: Vec<BTreeMap<i64, BTreeSet<i64>>>,
    enabled: Vec<bool>,
}

impl Indexer {
    pub fn new(num_columns: usize, key_column: usize) -> Self {
        let mut enabled = vec![false; num_columns];
        enabled[key_column] = true;
        Indexer {
            maps: vec![BTreeMap::new(); num_columns],
            enabled,
        }
    }

    pub fn is_indexed(&self, column: usize) -> bool {
        self.enabled.get(column).copied().unwrap_or(false)
    }

    /// Enable indexing on `column` and (re)build it from `rows`, an
    /// iterator of `(value, bid)` pairs taken from the base pages.
    pub fn create_index<I: IntoIterator<Item = (i64, i64)>>(&mut self, column: usize, rows: I) {
        self.enabled[column] = true;
        let map = &mut self.maps[column];
        map.clear();
        for (value, bid) in rows {
            map.entry(value).or_default().insert(bid);
        }
    }

    pub fn drop_index(&mut self, column: usize, key_column: usize) {
        if column == key_column {
            return;
        }
        self.enabled[column] = false;
        self.maps[column].clear();
    }

    pub fn insert(&mut self, column: usize, value: i64, bid: i64) {
        if self.is_indexed(column) {
            self.maps[column].entry(value).or_default().insert(bid);
        }
    }

    pub fn remove(&mut self, column: usize, value: i64, bid: i64) {
        if self.is_indexed(column) {
            if let Some(set) = self.maps[column].get_mut(&value) {
                set.remove(&bid);
                if set.is_empty() {
                    self.maps[column].remove(&value);
                }
            }
        }
    }

    pub fn update(&mut self, column: usize, old_value: i64, new_value: i64, bid: i64) {
        if old_value == new_value {
            return;
        }
        self.remove(column, old_value, bid);
        self.insert(column, new_value, bid);
    }

    /// All BIDs whose `column` currently equals `value`. Empty if the
    /// column isn't indexed.
    pub fn locate(&self, column: usize, value: i64) -> Vec<i64> {
        if !self.is_indexed(column) {
            return Vec::new();
        }
        self.maps[column]
            .get(&value)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All BIDs whose `column` falls within `[begin, end]` inclusive.
    pub fn locate_range(&self, column: usize, begin: i64, end: i64) -> Vec<i64> {
        if !self.is_indexed(column) {
            return Vec::new();
        }
        let (lo, hi) = if begin <= end { (begin, end) } else { (end, begin) };
        self.maps[column]
            .range(lo..=hi)
            .flat_map(|(_, set)| set.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_column_indexed_by_default() {
        let idx = Indexer::new(3, 1);
        assert!(idx.is_indexed(1));
        assert!(!idx.is_indexed(0));
    }

    #[test]
    fn insert_locate_remove() {
        let mut idx = Indexer::new(2, 0);
        idx.insert(0, 10, 100);
        idx.insert(0, 10, 200);
        assert_eq!(idx.locate(0, 10), vec![100, 200]);
        idx.remove(0, 10, 100);
        assert_eq!(idx.locate(0, 10), vec![200]);
    }

    #[test]
    fn range_lookup() {
        let mut idx = Indexer::new(1, 0);
        for v in [1, 5, 10, 15] {
            idx.insert(0, v, v * 10);
        }
        let mut got = idx.locate_range(0, 5, 10);
        got.sort();
        assert_eq!(got, vec![50, 100]);
    }

    #[test]
    fn unindexed_column_returns_empty() {
        let idx = Indexer::new(2, 0);
        assert_eq!(idx.locate(1, 5), Vec::<i64>::new());
    }

    #[test]
    fn create_then_drop_index() {
        let mut idx = Indexer::new(2, 0);
        idx.create_index(1, vec![(3, 6), (4, 8)]);
        assert_eq!(idx.locate(1, 3), vec![6]);
        idx.drop_index(1, 0);
        assert!(!idx.is_indexed(1));
        assert_eq!(idx.locate(1, 3), Vec::<i64>::new());
    }
}
