//! Buffer pool errors.

use quarry_common::types::{FrameId, PageId};
use thiserror::Error;

use crate::disk::DiskError;
use crate::wal::WalError;

/// Result type for buffer pool operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer pool operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BufferError {
    /// No frame is free and none is evictable; every page is pinned.
    #[error("buffer pool exhausted: all {pool_size} frames are pinned")]
    PoolExhausted { pool_size: usize },

    /// The operation targeted a page that is not resident in the pool.
    #[error("page {page_id} is not resident in the buffer pool")]
    PageNotResident { page_id: PageId },

    /// The operation targeted the invalid page id sentinel.
    #[error("invalid page id")]
    InvalidPageId,

    /// A replacer operation named a frame outside the tracked range.
    #[error("frame id {frame_id} is outside the tracked range 0..{num_frames}")]
    FrameOutOfRange { frame_id: FrameId, num_frames: usize },

    /// `remove` was called on a frame that is not evictable.
    #[error("frame {frame_id} is not evictable and cannot be removed")]
    RemoveNonEvictable { frame_id: FrameId },

    /// Disk I/O failed.
    #[error("disk I/O failed: {source}")]
    Disk {
        #[from]
        source: DiskError,
    },

    /// Flushing the write-ahead log failed.
    #[error("write-ahead log flush failed: {source}")]
    Wal {
        #[from]
        source: WalError,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BufferError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a transient condition the caller can retry,
    /// typically after unpinning some pages.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Returns true if this error indicates the storage below the pool is
    /// misbehaving rather than the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disk { .. } | Self::Wal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(BufferError::PoolExhausted { pool_size: 4 }.is_retryable());
        assert!(!BufferError::PageNotResident {
            page_id: PageId::new(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_is_fatal() {
        let err = BufferError::from(DiskError::SchedulerShutdown);
        assert!(err.is_fatal());
        assert!(!BufferError::PoolExhausted { pool_size: 4 }.is_fatal());
    }

    #[test]
    fn test_display_includes_ids() {
        let err = BufferError::FrameOutOfRange {
            frame_id: FrameId::new(9),
            num_frames: 8,
        };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('8'));
    }
}
