//! # quarry-storage
//!
//! The buffer pool core of the Quarry storage engine:
//!
//! - A bounded in-memory cache of fixed-size disk pages
//! - LRU-K eviction with per-frame access histories
//! - A single-threaded disk worker fed by a bounded request queue
//! - Scoped page guards tying pin and latch lifetimes to lexical scope
//! - A minimal write-ahead log seam for WAL-before-data ordering
//!
//! Page contents are opaque to this crate; access methods living above the
//! pool decide the layout of the bytes inside each page.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Buffer pool manager, eviction policy, and page guards
pub mod buffer;

/// Disk manager and I/O scheduling
pub mod disk;

/// Write-ahead log seam
pub mod wal;
