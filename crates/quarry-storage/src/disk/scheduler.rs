//! Disk request scheduling over a dedicated worker thread.
//!
//! The scheduler serializes all I/O against the [`DiskManager`] so callers
//! never coordinate raw file access themselves. Requests flow through a
//! bounded FIFO; each request that has an observable outcome carries the
//! producer half of a one-shot completion pair, and the caller keeps the
//! consumer half to block on.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use quarry_common::types::PageId;
use tracing::{debug, warn};

use super::manager::{DiskError, DiskManager, DiskResult};

/// Producer half of a one-shot completion signal.
///
/// Fulfilled exactly once by the disk worker; consumed on fulfilment.
#[derive(Debug)]
pub struct IoPromise<T>(SyncSender<DiskResult<T>>);

impl<T> IoPromise<T> {
    fn fulfill(self, result: DiskResult<T>) {
        // The receiver may have given up waiting; that is not an error here.
        let _ = self.0.send(result);
    }
}

/// Consumer half of a one-shot completion signal.
#[derive(Debug)]
pub struct IoFuture<T>(Receiver<DiskResult<T>>);

impl<T> IoFuture<T> {
    /// Blocks until the paired promise is fulfilled.
    ///
    /// A worker that dies without fulfilling the promise surfaces as
    /// [`DiskError::WorkerDisconnected`].
    pub fn wait(self) -> DiskResult<T> {
        self.0
            .recv()
            .unwrap_or_else(|_| Err(DiskError::WorkerDisconnected))
    }
}

/// A request for the disk worker.
///
/// Buffers are owned by the request: a read hands its buffer to the worker
/// and receives it back, filled, through the completion signal; a write
/// carries a snapshot of the page so the caller's frame can be reused as
/// soon as the signal fires.
#[derive(Debug)]
pub enum DiskRequest {
    /// Read one page into `buf`; the filled buffer comes back via `done`.
    Read {
        /// Page to read.
        page_id: PageId,
        /// Page-sized destination buffer.
        buf: Box<[u8]>,
        /// Completion signal carrying the filled buffer.
        done: IoPromise<Box<[u8]>>,
    },
    /// Write `buf` as one page.
    Write {
        /// Page to write.
        page_id: PageId,
        /// Page-sized source buffer.
        buf: Box<[u8]>,
        /// Completion signal.
        done: IoPromise<()>,
    },
    /// Release a page. Fire-and-forget; failures are logged by the worker.
    Deallocate {
        /// Page to release.
        page_id: PageId,
    },
}

/// Serializes page I/O onto a single background worker.
///
/// Construction spawns the worker; dropping the scheduler closes the request
/// queue (the shutdown sentinel) and joins the worker, letting in-flight
/// requests complete first.
#[derive(Debug)]
pub struct DiskScheduler {
    queue: Option<SyncSender<DiskRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns the worker around `disk`, with a request queue bounded at
    /// `queue_depth`.
    pub fn new(disk: DiskManager, queue_depth: usize) -> DiskResult<Self> {
        let (tx, rx) = mpsc::sync_channel(queue_depth);
        let worker = thread::Builder::new()
            .name("quarry-disk-io".into())
            .spawn(move || Self::worker_loop(disk, rx))?;

        Ok(Self {
            queue: Some(tx),
            worker: Some(worker),
        })
    }

    /// Creates a fresh one-shot completion pair.
    pub fn create_promise<T>() -> (IoPromise<T>, IoFuture<T>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (IoPromise(tx), IoFuture(rx))
    }

    /// Enqueues `request` for the worker.
    ///
    /// Never blocks on I/O itself, but may block briefly when the queue is
    /// at capacity.
    pub fn schedule(&self, request: DiskRequest) -> DiskResult<()> {
        let queue = self.queue.as_ref().ok_or(DiskError::SchedulerShutdown)?;
        queue
            .send(request)
            .map_err(|_| DiskError::SchedulerShutdown)
    }

    fn worker_loop(mut disk: DiskManager, rx: Receiver<DiskRequest>) {
        // Closing the sender is the only thing that stops this loop; a
        // failing disk manager just fails the request's signal.
        while let Ok(request) = rx.recv() {
            match request {
                DiskRequest::Read { page_id, mut buf, done } => {
                    let result = disk.read_page(page_id, &mut buf).map(|()| buf);
                    if let Err(err) = &result {
                        warn!(%page_id, error = %err, "page read failed");
                    }
                    done.fulfill(result);
                }
                DiskRequest::Write { page_id, buf, done } => {
                    let result = disk.write_page(page_id, &buf);
                    if let Err(err) = &result {
                        warn!(%page_id, error = %err, "page write failed");
                    }
                    done.fulfill(result);
                }
                DiskRequest::Deallocate { page_id } => {
                    if let Err(err) = disk.deallocate_page(page_id) {
                        warn!(%page_id, error = %err, "page deallocation failed");
                    }
                }
            }
        }
        debug!("disk worker shutting down");
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        drop(self.queue.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
