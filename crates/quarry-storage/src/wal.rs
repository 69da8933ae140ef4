//! Minimal write-ahead log seam.
//!
//! The buffer pool does not own recovery, but it must be able to honor
//! WAL-before-data ordering: a dirty page stamped with an LSN may not reach
//! the data file until the log is durable up to that LSN. [`LogManager`]
//! provides exactly that surface: `append` assigns LSNs into an in-memory
//! tail, and `flush`/`flush_until` persist the tail and advance the flushed
//! watermark. Replaying the log is a higher layer's job.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use quarry_common::constants::MAX_WAL_RECORD_SIZE;
use quarry_common::types::Lsn;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur in the write-ahead log.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum WalError {
    /// Underlying file I/O failed.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// A record payload exceeded the configured maximum.
    #[error("WAL record of {len} bytes exceeds the {max} byte limit")]
    RecordTooLarge { len: usize, max: usize },
}

#[derive(Debug)]
struct LogTail {
    file: File,
    /// Records appended since the last flush, framed as `lsn | len | payload`.
    buffer: BytesMut,
    next_lsn: Lsn,
    flushed_lsn: Lsn,
}

/// Append-only log with an explicit flushed-LSN watermark.
pub struct LogManager {
    tail: Mutex<LogTail>,
}

impl LogManager {
    /// Opens (or creates) the log file at `path`.
    pub fn open(path: impl AsRef<Path>) -> WalResult<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path.as_ref())?;

        Ok(Self {
            tail: Mutex::new(LogTail {
                file,
                buffer: BytesMut::new(),
                next_lsn: Lsn::FIRST,
                flushed_lsn: Lsn::INVALID,
            }),
        })
    }

    /// Appends a record to the in-memory tail and returns its LSN.
    ///
    /// The record is not durable until a flush covers the returned LSN.
    pub fn append(&self, record: &[u8]) -> WalResult<Lsn> {
        if record.len() > MAX_WAL_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                len: record.len(),
                max: MAX_WAL_RECORD_SIZE,
            });
        }

        let mut tail = self.tail.lock();
        let lsn = tail.next_lsn;
        tail.next_lsn = lsn.next();

        tail.buffer.put_u64(lsn.as_u64());
        tail.buffer.put_u32(record.len() as u32);
        tail.buffer.put_slice(record);
        Ok(lsn)
    }

    /// Persists the buffered tail and returns the new flushed watermark.
    pub fn flush(&self) -> WalResult<Lsn> {
        let mut tail = self.tail.lock();
        if !tail.buffer.is_empty() {
            let pending = tail.buffer.split();
            tail.file.write_all(&pending)?;
            tail.file.sync_data()?;
        }
        tail.flushed_lsn = Lsn::new(tail.next_lsn.as_u64() - 1);
        Ok(tail.flushed_lsn)
    }

    /// Ensures the log is durable at least up to `lsn`.
    ///
    /// A frame stamped with [`Lsn::INVALID`] was never logged, so that call
    /// is a no-op.
    pub fn flush_until(&self, lsn: Lsn) -> WalResult<()> {
        if !lsn.is_valid() || lsn <= self.flushed_lsn() {
            return Ok(());
        }
        self.flush()?;
        Ok(())
    }

    /// Returns the LSN up to which the log is known durable.
    #[inline]
    pub fn flushed_lsn(&self) -> Lsn {
        self.tail.lock().flushed_lsn
    }

    /// Returns the LSN the next append will receive.
    #[inline]
    pub fn next_lsn(&self) -> Lsn {
        self.tail.lock().next_lsn
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tail = self.tail.lock();
        f.debug_struct("LogManager")
            .field("next_lsn", &tail.next_lsn)
            .field("flushed_lsn", &tail.flushed_lsn)
            .field("pending_bytes", &tail.buffer.len())
            .finish()
    }
}
