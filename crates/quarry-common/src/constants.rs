//! System-wide constants for the Quarry storage engine.

// =============================================================================
// Page and Pool Constants
// =============================================================================

/// Default page size in bytes (4 KB).
///
/// Matches the common filesystem block size; every page-sized transfer in the
/// engine uses this unless the pool is configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum supported page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum supported page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

/// Default number of frames in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 128;

/// Default history depth K for the LRU-K replacer.
pub const DEFAULT_REPLACER_K: usize = 2;

// =============================================================================
// Disk Scheduler Constants
// =============================================================================

/// Bound of the disk scheduler's request queue.
///
/// Producers block once this many requests are in flight, which keeps a burst
/// of flushes from growing the queue without bound.
pub const DISK_QUEUE_DEPTH: usize = 64;

// =============================================================================
// WAL Constants
// =============================================================================

/// Maximum size of a single WAL record payload (1 MB).
pub const MAX_WAL_RECORD_SIZE: usize = 1024 * 1024;

/// WAL record header size: lsn (8) + payload length (4).
pub const WAL_RECORD_HEADER_SIZE: usize = 12;
