//! Scoped page guards.
//!
//! A guard ties a frame pin (and optionally the frame latch) to lexical
//! scope: every control-flow path out of the scope releases the pin exactly
//! once. Guards are move-only; a moved-from guard is inert, so a pin can
//! never be released twice.
//!
//! Three variants:
//!
//! - [`PageGuard`]: pin only; data access takes the frame latch transiently.
//! - [`ReadPageGuard`]: pin plus a held shared latch.
//! - [`WritePageGuard`]: pin plus a held exclusive latch.
//!
//! On drop, the latched variants release the latch first, then the pin. The
//! guard's accumulated dirty flag is OR-ed into the frame on release, via
//! [`BufferPoolManager::unpin_page`]. Explicit early release is plain
//! `drop(guard)`.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use quarry_common::types::{FrameId, Lsn, PageId};

use super::frame::Frame;
use super::pool::BufferPoolManager;

/// A pinned reference to one page in the pool.
///
/// Holds no latch: concurrent readers and writers of the page data are
/// still serialized by the frame latch on each access.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame: &'a Frame,
    /// Whether this guard mutated the page; OR-ed into the frame on drop.
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame: &'a Frame) -> Self {
        Self {
            bpm,
            frame,
            dirty: false,
        }
    }

    /// Returns the guarded page's id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.frame.page_id()
    }

    /// Returns the frame the page resides in.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }

    /// Reads the page data under a transiently-held shared latch.
    #[inline]
    pub fn data(&self) -> impl Deref<Target = [u8]> + '_ {
        PageDataRef {
            guard: self.frame.read_data(),
        }
    }

    /// Mutates the page data under a transiently-held exclusive latch.
    ///
    /// Marks the guard dirty.
    #[inline]
    pub fn data_mut(&mut self) -> impl DerefMut<Target = [u8]> + '_ {
        self.dirty = true;
        PageDataMut {
            guard: self.frame.write_data(),
        }
    }

    /// Marks the guard dirty without touching the data.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Converts this guard into one holding the shared frame latch.
    ///
    /// The pin transfers; the source guard is consumed and never unpins.
    pub fn upgrade_read(self) -> ReadPageGuard<'a> {
        let this = ManuallyDrop::new(self);
        let inner = PageGuard {
            bpm: this.bpm,
            frame: this.frame,
            dirty: this.dirty,
        };
        ReadPageGuard {
            lock: this.frame.read_data(),
            inner,
        }
    }

    /// Converts this guard into one holding the exclusive frame latch.
    ///
    /// The pin transfers; the source guard is consumed and never unpins.
    pub fn upgrade_write(self) -> WritePageGuard<'a> {
        let this = ManuallyDrop::new(self);
        let inner = PageGuard {
            bpm: this.bpm,
            frame: this.frame,
            dirty: this.dirty,
        };
        WritePageGuard {
            lock: this.frame.write_data(),
            inner,
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.frame.page_id(), self.dirty);
    }
}

impl std::fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id())
            .field("frame_id", &self.frame_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Helper providing `Deref<Target = [u8]>` over a held read latch.
struct PageDataRef<'a> {
    guard: RwLockReadGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Helper providing `DerefMut<Target = [u8]>` over a held write latch.
struct PageDataMut<'a> {
    guard: RwLockWriteGuard<'a, Box<[u8]>>,
}

impl Deref for PageDataMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for PageDataMut<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

/// A pinned page held under the shared frame latch.
///
/// Field order matters: the latch is released before the pin.
pub struct ReadPageGuard<'a> {
    lock: RwLockReadGuard<'a, Box<[u8]>>,
    inner: PageGuard<'a>,
}

impl ReadPageGuard<'_> {
    /// Returns the guarded page's id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.lock
    }
}

impl std::fmt::Debug for ReadPageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadPageGuard")
            .field("page_id", &self.page_id())
            .finish()
    }
}

/// A pinned page held under the exclusive frame latch.
///
/// Field order matters: the latch is released before the pin.
pub struct WritePageGuard<'a> {
    lock: RwLockWriteGuard<'a, Box<[u8]>>,
    inner: PageGuard<'a>,
}

impl WritePageGuard<'_> {
    /// Returns the guarded page's id.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.inner.page_id()
    }

    /// Returns the page data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.lock
    }

    /// Returns the page data mutably and marks the guard dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.inner.dirty = true;
        &mut self.lock
    }

    /// Marks the guard dirty without touching the data.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.inner.dirty = true;
    }

    /// Stamps the frame with the LSN of the mutation this guard performed.
    ///
    /// The write-back paths will not put this page on disk until the log is
    /// durable up to the stamped LSN.
    #[inline]
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.inner.dirty = true;
        self.inner.frame.set_lsn(lsn);
    }
}

impl std::fmt::Debug for WritePageGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePageGuard")
            .field("page_id", &self.page_id())
            .field("dirty", &self.inner.dirty)
            .finish()
    }
}
