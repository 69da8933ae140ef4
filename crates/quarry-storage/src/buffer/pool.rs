//! Buffer pool manager.
//!
//! The pool keeps at most `pool_size` pages resident, hands out pinned
//! guards, and mediates all I/O through the disk scheduler. One coarse
//! mutex guards the page table, the free list, and the page-id allocator,
//! and is held for the duration of every public operation, including while
//! a miss waits on disk. That serializes misses; the invariants in this
//! module do not depend on the coarse gate, so a finer-grained pool could
//! replace it without changing the contracts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quarry_common::types::{FrameId, PageId};
use tracing::{debug, warn};

use super::config::BufferPoolConfig;
use super::error::{BufferError, BufferResult};
use super::frame::Frame;
use super::guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::LruKReplacer;
use super::BufferPoolStats;
use crate::disk::{DiskManager, DiskRequest, DiskScheduler, IoFuture};
use crate::wal::LogManager;

/// State behind the pool's coarse mutex.
#[derive(Debug)]
struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page, in FIFO order.
    free_list: VecDeque<FrameId>,
    /// Next page id to hand out.
    next_page_id: u32,
}

#[derive(Debug, Default)]
struct PoolCounters {
    fetches: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

/// Manages the cache of pages between disk and memory.
///
/// Frames live in a fixed array; a frame is at all times in exactly one of
/// the free list, the page table's image, or mid-initialization inside a
/// public operation. Pinned frames are never evicted, and dirty frames are
/// written back (WAL first, when configured) before their buffer is reused.
pub struct BufferPoolManager {
    config: BufferPoolConfig,
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    scheduler: DiskScheduler,
    log_manager: Option<Arc<LogManager>>,
    counters: PoolCounters,
}

impl BufferPoolManager {
    /// Creates a pool over `disk`, spawning the disk worker.
    ///
    /// `disk` moves into the worker; `log_manager`, when present, is flushed
    /// up to each frame's LSN before that frame is written back.
    pub fn new(
        config: BufferPoolConfig,
        disk: DiskManager,
        log_manager: Option<Arc<LogManager>>,
    ) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;
        if disk.page_size() != config.page_size {
            return Err(BufferError::config(
                "disk manager page size does not match the pool's",
            ));
        }

        let frames = (0..config.pool_size)
            .map(|i| Frame::new(FrameId::new(i), config.page_size))
            .collect();
        let replacer = LruKReplacer::new(config.pool_size, config.replacer_k);
        let scheduler = DiskScheduler::new(disk, config.queue_depth)?;

        Ok(Self {
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(config.pool_size),
                free_list: (0..config.pool_size).map(FrameId::new).collect(),
                next_page_id: 0,
            }),
            frames,
            replacer,
            scheduler,
            log_manager,
            counters: PoolCounters::default(),
            config,
        })
    }

    // -------------------------------------------------------------------------
    // Public API
    // -------------------------------------------------------------------------

    /// Allocates a fresh page and returns it pinned, zeroed, and clean.
    ///
    /// Fails with [`BufferError::PoolExhausted`] when every frame is pinned.
    pub fn new_page(&self) -> BufferResult<PageGuard<'_>> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;

        frame.write_data().fill(0);
        self.install(&mut state, frame_id, page_id)?;
        Ok(PageGuard::new(self, frame))
    }

    /// Returns page `page_id` pinned, reading it from disk on a miss.
    ///
    /// The miss path blocks on the read's completion signal (and, if a dirty
    /// victim had to be flushed, on that write's signal first). Fails with
    /// [`BufferError::PoolExhausted`] when no frame is free and none is
    /// evictable.
    pub fn fetch_page(&self, page_id: PageId) -> BufferResult<PageGuard<'_>> {
        if !page_id.is_valid() {
            return Err(BufferError::InvalidPageId);
        }

        let mut state = self.state.lock();
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.record_access(frame_id)?;
            self.replacer.set_evictable(frame_id, false)?;
            return Ok(PageGuard::new(self, frame));
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        let (done, future) = DiskScheduler::create_promise();
        let result = self
            .scheduler
            .schedule(DiskRequest::Read {
                page_id,
                buf: self.blank_page(),
                done,
            })
            .and_then(|()| future.wait());
        match result {
            Ok(buf) => frame.write_data().copy_from_slice(&buf),
            Err(err) => {
                // Frame metadata is only updated after successful I/O; the
                // acquired frame goes back to the free list untouched.
                state.free_list.push_back(frame_id);
                return Err(err.into());
            }
        }

        self.install(&mut state, frame_id, page_id)?;
        Ok(PageGuard::new(self, frame))
    }

    /// Fetches `page_id` and takes the shared frame latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> BufferResult<ReadPageGuard<'_>> {
        Ok(self.fetch_page(page_id)?.upgrade_read())
    }

    /// Fetches `page_id` and takes the exclusive frame latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> BufferResult<WritePageGuard<'_>> {
        Ok(self.fetch_page(page_id)?.upgrade_write())
    }

    /// Drops one pin on `page_id`, OR-ing `is_dirty` into the frame's dirty
    /// flag. A clean unpin never clears a dirty bit set earlier.
    ///
    /// Returns `false` if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            self.replacer
                .set_evictable(frame_id, true)
                .expect("frame id from the page table is within the replacer range");
        }
        true
    }

    /// Enqueues a write of `page_id` and clears its dirty bit, without
    /// waiting for the write to land.
    ///
    /// Takes the page's shared latch to snapshot the data, so the caller
    /// must not hold the exclusive latch on this page. Fails with
    /// [`BufferError::PageNotResident`] if the page is not in the pool.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<()> {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(BufferError::PageNotResident { page_id });
        };
        let frame = &self.frames[frame_id.index()];

        let _ = self.schedule_write_back(frame)?;
        frame.set_dirty(false);
        Ok(())
    }

    /// Enqueues a write of every resident page and clears the dirty bits.
    pub fn flush_all_pages(&self) -> BufferResult<()> {
        let state = self.state.lock();
        for &frame_id in state.page_table.values() {
            let frame = &self.frames[frame_id.index()];
            let _ = self.schedule_write_back(frame)?;
            frame.set_dirty(false);
        }
        Ok(())
    }

    /// Removes `page_id` from the pool and tells the disk layer to release
    /// its storage.
    ///
    /// Returns `true` vacuously if the page is not resident, `false` if it
    /// is pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() > 0 {
            return false;
        }

        state.page_table.remove(&page_id);
        self.replacer
            .remove(frame_id)
            .expect("an unpinned resident frame is evictable");
        state.free_list.push_back(frame_id);
        frame.reset();

        if let Err(err) = self.scheduler.schedule(DiskRequest::Deallocate { page_id }) {
            warn!(%page_id, error = %err, "failed to schedule page deallocation");
        }
        debug!(%page_id, frame_id = %frame_id, "deleted page");
        true
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Returns a snapshot of the pool's counters and frame states.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }

        BufferPoolStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            pinned_frames: pinned,
            dirty_frames: dirty,
        }
    }

    /// Returns the number of frames in the pool.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns true if `page_id` is resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pin count of `page_id`, or `None` if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.index()].pin_count())
    }

    /// Returns the number of frames a fetch could use right now: free
    /// frames plus evictable ones.
    pub fn free_frame_count(&self) -> usize {
        let free = self.state.lock().free_list.len();
        free + self.replacer.size()
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Produces a frame for a new resident: the free list first, then the
    /// replacer. An evicted victim is flushed (awaited) if dirty and erased
    /// from the page table before its frame is handed out.
    fn acquire_frame(&self, state: &mut PoolState) -> BufferResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self
            .replacer
            .evict()
            .ok_or(BufferError::PoolExhausted {
                pool_size: self.config.pool_size,
            })?;
        let frame = &self.frames[frame_id.index()];
        debug_assert_eq!(frame.pin_count(), 0, "evicted a pinned frame");

        let old_page = frame.page_id();
        if frame.is_dirty() {
            // The victim's buffer must not be reused until its write has
            // landed, so this flush blocks on the completion signal.
            if let Err(err) = self.write_back_blocking(frame) {
                warn!(page_id = %old_page, error = %err, "victim write-back failed");
                // The victim stays resident and dirty; put it back in the
                // replacer so the pool remains consistent.
                self.replacer.record_access(frame_id)?;
                self.replacer.set_evictable(frame_id, true)?;
                return Err(err);
            }
        }

        state.page_table.remove(&old_page);
        frame.reset();
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(page_id = %old_page, frame_id = %frame_id, "evicted page");
        Ok(frame_id)
    }

    /// Registers `page_id` in `frame_id` with `pin_count = 1`, clean, and
    /// non-evictable.
    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) -> BufferResult<()> {
        let frame = &self.frames[frame_id.index()];
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        Ok(())
    }

    /// Enqueues a write of `frame`'s page, honoring WAL-before-data, and
    /// returns the completion future. Callers decide whether to wait.
    fn schedule_write_back(&self, frame: &Frame) -> BufferResult<IoFuture<()>> {
        if let Some(log) = &self.log_manager {
            log.flush_until(frame.lsn())?;
        }

        let buf = frame.read_data().to_vec().into_boxed_slice();
        let (done, future) = DiskScheduler::create_promise();
        self.scheduler.schedule(DiskRequest::Write {
            page_id: frame.page_id(),
            buf,
            done,
        })?;
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(future)
    }

    fn write_back_blocking(&self, frame: &Frame) -> BufferResult<()> {
        self.schedule_write_back(frame)?.wait()?;
        Ok(())
    }

    fn blank_page(&self) -> Box<[u8]> {
        vec![0u8; self.config.page_size].into_boxed_slice()
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPoolManager")
            .field("pool_size", &self.config.pool_size)
            .field("page_size", &self.config.page_size)
            .field("pages_resident", &self.state.lock().page_table.len())
            .field("stats", &self.stats())
            .finish()
    }
}
