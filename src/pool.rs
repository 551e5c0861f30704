//! Bounded frame recycling pool
//!
//! Two bounded queues decouple the capture cadence from the encode cadence:
//! `idle` holds recycled buffers waiting to be filled, `ready` holds filled
//! frames waiting for the encoder. Frames move between them by value, so a
//! frame is never in both at once.
//!
//! When `ready` is full the oldest frame is evicted and discarded: a slow
//! encoder loses frames, it never stalls the capture callback.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::types::Frame;

/// Default capacity of both pool queues
pub const DEFAULT_POOL_CAPACITY: usize = 15;

/// Source of frames for the encoder drain loop when it is not fed through
/// an input surface.
pub trait DataProvider: Send + Sync {
    /// Next frame to encode, or `None` when nothing is ready. Must not block.
    fn get_frame(&self) -> Option<Frame>;
    /// Hand a frame back once its bytes have been copied into the encoder
    fn recycle(&self, frame: Frame);
}

/// Destination for converted capture frames.
pub trait FrameSink: Send + Sync {
    /// A buffer of exactly `required_size` bytes to convert into
    fn acquire(&self, required_size: usize) -> Frame;
    /// Hand a filled, timestamped frame downstream. Must not block.
    fn publish(&self, frame: Frame);
}

pub struct FramePool {
    idle_tx: Sender<Frame>,
    idle_rx: Receiver<Frame>,
    ready_tx: Sender<Frame>,
    ready_rx: Receiver<Frame>,
    capacity: usize,
    dropped: AtomicU64,
    published: AtomicU64,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (idle_tx, idle_rx) = bounded(capacity);
        let (ready_tx, ready_rx) = bounded(capacity);
        Self {
            idle_tx,
            idle_rx,
            ready_tx,
            ready_rx,
            capacity,
            dropped: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Take a recycled buffer (or allocate one) sized to exactly `required_size`.
    pub fn acquire_recyclable(&self, required_size: usize) -> Frame {
        match self.idle_rx.try_recv() {
            Ok(mut frame) => {
                if frame.len() != required_size {
                    log::debug!(
                        "Resizing pooled frame {} -> {} bytes",
                        frame.len(),
                        required_size
                    );
                    frame.resize(required_size);
                }
                frame
            }
            Err(_) => Frame::with_size(required_size),
        }
    }

    /// Queue a filled frame for encoding, evicting the oldest if full.
    pub fn publish(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.ready_tx.try_send(frame) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(evicted) = self.ready_rx.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Ready queue full, dropping frame pts={:?}", evicted.pts_us);
                    }
                    frame = rejected;
                }
                // Both ends live in self
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        crate::assert_invariant!(
            self.ready_rx.len() <= self.capacity,
            "Ready queue never exceeds capacity",
            "pool::publish"
        );
    }

    /// Oldest ready frame, if any. Never blocks.
    pub fn consume(&self) -> Option<Frame> {
        self.ready_rx.try_recv().ok()
    }

    /// Return a consumed frame to the idle set; dropped if idle is full.
    pub fn release(&self, mut frame: Frame) {
        frame.reset();
        if self.idle_tx.try_send(frame).is_err() {
            log::debug!("Idle queue full, discarding recycled frame");
        }

        crate::assert_invariant!(
            self.idle_rx.len() <= self.capacity,
            "Idle queue never exceeds capacity",
            "pool::release"
        );
    }

    /// Discard every queued frame, ready and idle
    pub fn clear(&self) {
        while self.ready_rx.try_recv().is_ok() {}
        while self.idle_rx.try_recv().is_ok() {}
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ready_len(&self) -> usize {
        self.ready_rx.len()
    }

    pub fn idle_len(&self) -> usize {
        self.idle_rx.len()
    }

    /// Frames evicted from the ready queue so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn published_frames(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl DataProvider for FramePool {
    fn get_frame(&self) -> Option<Frame> {
        self.consume()
    }

    fn recycle(&self, frame: Frame) {
        self.release(frame);
    }
}

impl FrameSink for FramePool {
    fn acquire(&self, required_size: usize) -> Frame {
        self.acquire_recyclable(required_size)
    }

    fn publish(&self, frame: Frame) {
        FramePool::publish(self, frame);
    }
}
