//! File-backed page store.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use quarry_common::types::PageId;
use thiserror::Error;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur in the disk layer.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum DiskError {
    /// Underlying file I/O failed.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// A transfer buffer did not match the configured page size.
    #[error("buffer length {len} does not match page size {page_size}")]
    BadBufferLength { len: usize, page_size: usize },

    /// The operation targeted the invalid page id sentinel.
    #[error("operation on the invalid page id")]
    InvalidPageId,

    /// The scheduler's request queue is closed.
    #[error("disk scheduler is shut down")]
    SchedulerShutdown,

    /// The worker dropped a request's completion signal without fulfilling it.
    #[error("disk worker disconnected before completing the request")]
    WorkerDisconnected,
}

/// A synchronous page store over a single database file.
///
/// Pages live at `page_id * page_size` offsets. A page that has never been
/// written reads back as zeroes, so the id allocator above this layer can
/// hand out ids without materializing storage up front.
///
/// The manager takes `&mut self` everywhere and holds no lock: it is owned
/// exclusively by the disk scheduler's worker thread.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    page_size: usize,
    /// Pages released by the pool; they read as zeroes until rewritten.
    freed: HashSet<PageId>,
}

impl DiskManager {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> DiskResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        Ok(Self {
            file,
            page_size,
            freed: HashSet::new(),
        })
    }

    /// Returns the page size this manager was opened with.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads page `page_id` into `buf`.
    ///
    /// `buf` must be exactly one page long. Ranges past the end of the file,
    /// and pages previously deallocated, read as zeroes.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        self.check_transfer(page_id, buf.len())?;

        if self.freed.contains(&page_id) {
            buf.fill(0);
            return Ok(());
        }

        let offset = self.page_offset(page_id);
        let file_len = self.file.metadata()?.len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let available = (file_len - offset).min(self.page_size as u64) as usize;
        self.file.read_exact(&mut buf[..available])?;
        buf[available..].fill(0);
        Ok(())
    }

    /// Writes `buf` to page `page_id`, growing the file as needed.
    ///
    /// Durability is the embedder's concern; no fsync is issued per write.
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        self.check_transfer(page_id, buf.len())?;

        self.file.seek(SeekFrom::Start(self.page_offset(page_id)))?;
        self.file.write_all(buf)?;
        self.freed.remove(&page_id);
        Ok(())
    }

    /// Releases page `page_id`.
    ///
    /// The file is not shrunk; the page's content becomes unspecified and it
    /// reads as zeroes until the next write.
    pub fn deallocate_page(&mut self, page_id: PageId) -> DiskResult<()> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId);
        }
        self.freed.insert(page_id);
        Ok(())
    }

    /// Number of deallocated pages awaiting reuse.
    #[inline]
    pub fn free_page_count(&self) -> usize {
        self.freed.len()
    }

    #[inline]
    fn page_offset(&self, page_id: PageId) -> u64 {
        u64::from(page_id.as_u32()) * self.page_size as u64
    }

    fn check_transfer(&self, page_id: PageId, len: usize) -> DiskResult<()> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId);
        }
        if len != self.page_size {
            return Err(DiskError::BadBufferLength {
                len,
                page_size: self.page_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 4096;

    fn open_manager(dir: &tempfile::TempDir) -> DiskManager {
        DiskManager::open(dir.path().join("test.db"), PAGE_SIZE).unwrap()
    }

    #[test]
    fn test_unwritten_page_reads_zeroes() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        let mut buf = vec![0xffu8; PAGE_SIZE];
        disk.read_page(PageId::new(12), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        let mut page = vec![0u8; PAGE_SIZE];
        page[..5].copy_from_slice(b"Hello");
        disk.write_page(PageId::new(3), &page).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(PageId::new(3), &mut buf).unwrap();
        assert_eq!(&buf[..5], b"Hello");
        assert_eq!(buf, page);
    }

    #[test]
    fn test_partial_tail_zero_filled() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        // Writing page 0 leaves the file exactly one page long; page 0 is
        // fully backed, page 1 is not.
        disk.write_page(PageId::new(0), &vec![7u8; PAGE_SIZE]).unwrap();

        let mut buf = vec![0xffu8; PAGE_SIZE];
        disk.read_page(PageId::new(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_deallocated_page_reads_zeroes() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        disk.write_page(PageId::new(0), &vec![9u8; PAGE_SIZE]).unwrap();
        disk.deallocate_page(PageId::new(0)).unwrap();
        assert_eq!(disk.free_page_count(), 1);

        let mut buf = vec![0xffu8; PAGE_SIZE];
        disk.read_page(PageId::new(0), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        // A rewrite revives the page.
        disk.write_page(PageId::new(0), &vec![5u8; PAGE_SIZE]).unwrap();
        assert_eq!(disk.free_page_count(), 0);
        disk.read_page(PageId::new(0), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 5));
    }

    #[test]
    fn test_bad_buffer_length() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        let mut short = vec![0u8; PAGE_SIZE / 2];
        let err = disk.read_page(PageId::new(0), &mut short).unwrap_err();
        assert!(matches!(err, DiskError::BadBufferLength { .. }));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let dir = tempdir().unwrap();
        let mut disk = open_manager(&dir);

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            disk.read_page(PageId::INVALID, &mut buf),
            Err(DiskError::InvalidPageId)
        ));
        assert!(matches!(
            disk.deallocate_page(PageId::INVALID),
            Err(DiskError::InvalidPageId)
        ));
    }
}
