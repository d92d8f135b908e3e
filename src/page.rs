//! Physical Page: a fixed 4096-byte slab of 512 big-endian `i64` slots.
//!
//! Each slot is either empty or holds a written value; writes append at
//! the next free slot (or the caller's chosen slot, for in-place rewrites
//! during merge). Slots are always occupied contiguously from index 0 --
//! a fresh slot only ever comes from `next_free_slot`, and merge only
//! rewrites slots that are already occupied -- so occupancy is fully
//! described by a single count, the same `num_records` the buffer pool
//! persists to the `.meta` sidecar. Raw bytes map 1:1 onto the on-disk
//! `.dat` layout, so `raw`/`from_raw` are what `persistence.rs` uses to
//! read and write pages without going through the buffer pool.

use crate::constants::CELLS_PER_PAGE;
use crate::error::{EngineError, EngineResult};

#[derive(Clone, Debug)]
pub struct Page {
    cells: Vec<Option<i64>>,
    dirty: bool,
}

impl Page {
    pub fn new() -> Self {
        Page {
            cells: vec![None; CELLS_PER_PAGE],
            dirty: false,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.next_free_slot().is_some()
    }

    fn next_free_slot(&self) -> Option<usize> {
        self.cells.iter().position(|c| c.is_none())
    }

    /// Write `value` to `slot`, or to the next free slot if `slot` is `None`.
    /// Returns the slot actually written to.
    pub fn write(&mut self, value: i64, slot: Option<usize>) -> EngineResult<usize> {
        let slot = match slot {
            Some(s) => {
                if s >= self.cells.len() {
                    return Err(EngineError::OffsetOutOfBounds(s));
                }
                s
            }
            None => self.next_free_slot().ok_or(EngineError::PageFull)?,
        };

        self.cells[slot] = Some(value);
        self.dirty = true;
        Ok(slot)
    }

    pub fn read(&self, slot: usize) -> EngineResult<i64> {
        self.cells
            .get(slot)
            .copied()
            .flatten()
            .ok_or(EngineError::OffsetOutOfBounds(slot))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn num_written(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Serialize to the fixed 4096-byte on-disk layout: each slot is 8
    /// bytes big-endian. An unwritten slot's bytes are meaningless on
    /// their own -- `from_raw`'s `num_written` argument (the same count
    /// kept in the `.meta` sidecar) is what says where real data ends.
    pub fn raw(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CELLS_PER_PAGE * 8);
        for cell in &self.cells {
            buf.extend_from_slice(&cell.unwrap_or(0).to_be_bytes());
        }
        buf
    }

    /// Reconstruct a page from its raw bytes plus the occupancy count
    /// recorded alongside it; the first `num_written` slots are real
    /// data, the rest are empty regardless of their stored bytes.
    pub fn from_raw(bytes: &[u8], num_written: usize) -> EngineResult<Self> {
        if bytes.len() != CELLS_PER_PAGE * 8 {
            return Err(EngineError::CorruptState(format!(
                "expected {} bytes, got {}",
                CELLS_PER_PAGE * 8,
                bytes.len()
            )));
        }

        let mut cells = Vec::with_capacity(CELLS_PER_PAGE);
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            let v = i64::from_be_bytes(arr);
            cells.push(if i < num_written { Some(v) } else { None });
        }

        Ok(Page {
            cells,
            dirty: false,
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let mut p = Page::new();
        let slot = p.write(42, None).unwrap();
        assert_eq!(p.read(slot).unwrap(), 42);
        assert!(p.is_dirty());
    }

    #[test]
    fn fills_up() {
        let mut p = Page::new();
        for i in 0..CELLS_PER_PAGE as i64 {
            p.write(i, None).unwrap();
        }
        assert!(!p.has_capacity());
        assert!(matches!(p.write(1, None), Err(EngineError::PageFull)));
    }

    #[test]
    fn raw_roundtrip() {
        let mut p = Page::new();
        p.write(7, Some(0)).unwrap();
        p.write(-3, Some(1)).unwrap();
        let raw = p.raw();
        let p2 = Page::from_raw(&raw, p.num_written()).unwrap();
        assert_eq!(p2.read(0).unwrap(), 7);
        assert_eq!(p2.read(1).unwrap(), -3);
        assert!(p2.read(2).is_err());
    }

    #[test]
    fn max_value_survives_roundtrip() {
        // Regression: occupancy used to be inferred from an i64::MAX
        // sentinel, which corrupted a slot whose real value was i64::MAX.
        let mut p = Page::new();
        p.write(i64::MAX, Some(0)).unwrap();
        let raw = p.raw();
        let p2 = Page::from_raw(&raw, p.num_written()).unwrap();
        assert_eq!(p2.read(0).unwrap(), i64::MAX);
    }
}
