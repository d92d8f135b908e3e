/// Number of 8-byte cells in one physical page (4096 B / 8 B).
pub const CELLS_PER_PAGE: usize = 512;

/// Physical page size in bytes.
pub const PAGE_SIZE_BYTES: usize = CELLS_PER_PAGE * 8;

/// Number of metadata columns appended after a table's user columns:
/// INDIRECTION, RID, TIMESTAMP, SCHEMA_ENCODING.
pub const NUM_METADATA_COLS: usize = 4;

/// Offset of the INDIRECTION column from the first metadata column.
pub const INDIRECTION_OFFSET: usize = 0;

/// Offset of the RID column from the first metadata column.
pub const RID_OFFSET: usize = 1;

/// Offset of the TIMESTAMP column from the first metadata column.
pub const TIMESTAMP_OFFSET: usize = 2;

/// Offset of the SCHEMA_ENCODING column from the first metadata column.
pub const SCHEMA_ENCODING_OFFSET: usize = 3;

/// Default number of frames kept resident by the buffer pool.
pub const DEFAULT_BUFFER_POOL_CAPACITY: usize = 1000;

/// Default merge-trigger ratio T: merge when `updates / total_base_records > T`.
pub const DEFAULT_MERGE_THRESHOLD_RATIO: f64 = 2.0;
