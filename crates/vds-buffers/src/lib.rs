#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

//! In-memory buffer pool with a producer side and a consumer side.
//!
//! This is the reference implementation of the `vds-core` pool contracts. It is used as the
//! scratch pool, and as a stand-in sink wherever a real encoder/display sink is not available.
//!
//! - Slots move `Free → Dequeued → Queued → Acquired → Free`, or `Dequeued → Free` on
//!   cancel.
//! - Dequeue always hands out the lowest-indexed free slot, so cancel + re-dequeue with the
//!   same format/usage returns the same slot.
//! - Every call is recorded in `history()` before it is validated.

mod consumer;
mod producer;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use vds_core::{
    BufferHandle, ConnectApi, DequeueRequest, Fence, PixelFormat, QueueBufferInput, SourceError,
    Usage, NUM_BUFFER_SLOTS,
};

pub use consumer::QueueConsumer;
pub use producer::QueueProducer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub consumer_usage: Usage,
    pub max_buffer_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "queue".to_string(),
            width: 640,
            height: 480,
            format: PixelFormat::RGBA_8888,
            consumer_usage: Usage::empty(),
            max_buffer_count: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Free,
    Dequeued,
    Queued,
    Acquired,
}

/// One recorded call against the pool, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Dequeue(DequeueRequest),
    RequestBuffer { slot: usize },
    Queue { slot: usize, input: QueueBufferInput },
    Cancel { slot: usize, fence: Fence },
    Acquire,
    Release { slot: usize, fence: Fence },
    Connect { api: ConnectApi },
    Disconnect { api: ConnectApi },
    SetBufferCount { count: usize },
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    buffer: Option<BufferHandle>,
    /// Fence handed to the next owner of the slot.
    fence: Fence,
}

#[derive(Debug)]
pub(crate) struct QueueCore {
    cfg: QueueConfig,
    slots: [Slot; NUM_BUFFER_SLOTS],
    queued: VecDeque<usize>,
    release_all_pending: bool,
    abandoned: bool,
    connected: Option<ConnectApi>,
    fail_next_dequeue: Option<SourceError>,
    history: Vec<QueueEvent>,
}

impl QueueCore {
    fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            slots: std::array::from_fn(|_| Slot {
                state: SlotState::Free,
                buffer: None,
                fence: Fence::NO_FENCE,
            }),
            queued: VecDeque::new(),
            release_all_pending: false,
            abandoned: false,
            connected: None,
            fail_next_dequeue: None,
            history: Vec::new(),
        }
    }

    fn check_alive(&self) -> Result<(), SourceError> {
        if self.abandoned {
            Err(SourceError::NoInit)
        } else {
            Ok(())
        }
    }

    /// Slot in `expected` state, or `BadValue`.
    fn slot_in(&mut self, slot: usize, expected: SlotState) -> Result<&mut Slot, SourceError> {
        match self.slots.get_mut(slot) {
            Some(s) if s.state == expected => Ok(s),
            _ => Err(SourceError::BadValue),
        }
    }
}

/// Shared handle to one pool. Cloning shares the same pool.
#[derive(Debug, Clone)]
pub struct BufferQueue {
    core: Arc<Mutex<QueueCore>>,
}

impl BufferQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            core: Arc::new(Mutex::new(QueueCore::new(cfg))),
        }
    }

    pub fn producer(&self) -> QueueProducer {
        QueueProducer::new(Arc::clone(&self.core))
    }

    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer::new(Arc::clone(&self.core))
    }

    fn lock(&self) -> MutexGuard<'_, QueueCore> {
        self.core.lock()
    }

    // ---- Inspection / fault injection ----

    pub fn name(&self) -> String {
        self.lock().cfg.name.clone()
    }

    pub fn history(&self) -> Vec<QueueEvent> {
        self.lock().history.clone()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Every later call fails with `NoInit`, as when the consumer process dies.
    pub fn abandon(&self) {
        tracing::debug!(queue = %self.name(), "abandoned");
        self.lock().abandoned = true;
    }

    /// The next dequeue fails with `err`; later dequeues behave normally.
    pub fn fail_next_dequeue(&self, err: SourceError) {
        self.lock().fail_next_dequeue = Some(err);
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.lock().slots.get(slot).map(|s| s.state)
    }

    pub fn buffer(&self, slot: usize) -> Option<BufferHandle> {
        self.lock().slots.get(slot).and_then(|s| s.buffer.clone())
    }

    pub fn count_in(&self, state: SlotState) -> usize {
        self.lock().slots.iter().filter(|s| s.state == state).count()
    }

    pub fn config(&self) -> QueueConfig {
        self.lock().cfg.clone()
    }
}
