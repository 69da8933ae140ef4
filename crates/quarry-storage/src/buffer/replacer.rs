//! LRU-K eviction policy.
//!
//! The replacer tracks, per frame, the timestamps of its last K accesses.
//! The eviction victim is the evictable frame with the greatest *backward
//! K-distance*: the age of its K-th most recent access, or infinity for
//! frames that have not yet been accessed K times. Frames in the infinite
//! class are ordered among themselves by their earliest recorded access,
//! which degrades to classical LRU until histories fill up.
//!
//! A linear scan over the node store keeps the implementation obviously
//! correct; the pool sizes this engine targets make that a non-issue.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use quarry_common::types::FrameId;

use super::error::{BufferError, BufferResult};

#[derive(Debug)]
struct LruKNode {
    /// Timestamps of the last K accesses, oldest first.
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(k: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(k),
            is_evictable: false,
        }
    }
}

#[derive(Debug)]
struct ReplacerState {
    node_store: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    /// Number of nodes with `is_evictable == true`.
    curr_size: usize,
}

/// Tracks per-frame access history and selects eviction victims by LRU-K.
#[derive(Debug)]
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer tracking at most `num_frames` frames with history
    /// depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState {
                node_store: HashMap::with_capacity(num_frames),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Records an access to `frame_id` at the next timestamp.
    ///
    /// Creates the frame's node on first access, as non-evictable. The
    /// evictable bit is never changed here.
    pub fn record_access(&self, frame_id: FrameId) -> BufferResult<()> {
        self.check_range(frame_id)?;

        let mut state = self.state.lock();
        state.current_timestamp += 1;
        let timestamp = state.current_timestamp;

        let k = self.k;
        let node = state
            .node_store
            .entry(frame_id)
            .or_insert_with(|| LruKNode::new(k));
        node.history.push_back(timestamp);
        while node.history.len() > k {
            node.history.pop_front();
        }
        Ok(())
    }

    /// Flips the evictable bit of `frame_id`'s node.
    ///
    /// No-op if the node does not exist or the bit is unchanged.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> BufferResult<()> {
        self.check_range(frame_id)?;

        let mut state = self.state.lock();
        let Some(node) = state.node_store.get_mut(&frame_id) else {
            return Ok(());
        };
        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
        Ok(())
    }

    /// Erases `frame_id`'s node.
    ///
    /// Silent no-op on an unknown frame; removing a non-evictable frame is
    /// a caller bug and fails.
    pub fn remove(&self, frame_id: FrameId) -> BufferResult<()> {
        self.check_range(frame_id)?;

        let mut state = self.state.lock();
        let Some(node) = state.node_store.get(&frame_id) else {
            return Ok(());
        };
        if !node.is_evictable {
            return Err(BufferError::RemoveNonEvictable { frame_id });
        }
        state.node_store.remove(&frame_id);
        state.curr_size -= 1;
        Ok(())
    }

    /// Selects, erases, and returns the eviction victim, if any.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        // (frame, infinite-distance class, earliest recorded access)
        let mut victim: Option<(FrameId, bool, u64)> = None;
        for (&frame_id, node) in &state.node_store {
            if !node.is_evictable {
                continue;
            }
            let Some(&front) = node.history.front() else {
                continue;
            };
            let infinite = node.history.len() < self.k;
            let better = match victim {
                None => true,
                // The infinite class always loses the race for retention;
                // within a class, the earliest K-th-most-recent access
                // (== the largest backward distance) wins.
                Some((_, v_infinite, v_front)) => {
                    (infinite && !v_infinite) || (infinite == v_infinite && front < v_front)
                }
            };
            if better {
                victim = Some((frame_id, infinite, front));
            }
        }

        let (frame_id, _, _) = victim?;
        state.node_store.remove(&frame_id);
        state.curr_size -= 1;
        Some(frame_id)
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    fn check_range(&self, frame_id: FrameId) -> BufferResult<()> {
        if frame_id.index() >= self.num_frames {
            return Err(BufferError::FrameOutOfRange {
                frame_id,
                num_frames: self.num_frames,
            });
        }
        Ok(())
    }
}
