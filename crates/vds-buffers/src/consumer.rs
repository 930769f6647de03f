use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use vds_core::{AcquiredBuffer, BufferConsumer, Fence, SourceError, Usage, NUM_BUFFER_SLOTS};

use crate::{QueueCore, QueueEvent, SlotState};

/// Consumer side of a [`crate::BufferQueue`].
#[derive(Debug)]
pub struct QueueConsumer {
    core: Arc<Mutex<QueueCore>>,
}

impl QueueConsumer {
    pub(crate) fn new(core: Arc<Mutex<QueueCore>>) -> Self {
        Self { core }
    }
}

impl BufferConsumer for QueueConsumer {
    fn acquire_buffer(&mut self) -> Result<AcquiredBuffer, SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Acquire);
        core.check_alive()?;

        let slot = core
            .queued
            .pop_front()
            .ok_or(SourceError::NoBufferAvailable)?;
        let s = &mut core.slots[slot];
        s.state = SlotState::Acquired;
        let item = AcquiredBuffer {
            slot,
            fence: std::mem::take(&mut s.fence),
            buffer: s.buffer.clone(),
        };

        trace!(queue = %core.cfg.name, slot, "acquire");
        Ok(item)
    }

    fn release_buffer(&mut self, slot: usize, fence: Fence) -> Result<(), SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Release { slot, fence });
        core.check_alive()?;

        let s = core.slot_in(slot, SlotState::Acquired)?;
        s.state = SlotState::Free;
        s.fence = fence;

        trace!(queue = %core.cfg.name, slot, %fence, "release");
        Ok(())
    }

    fn set_consumer_name(&mut self, name: &str) {
        self.core.lock().cfg.name = name.to_string();
    }

    fn set_consumer_usage_bits(&mut self, usage: Usage) -> Result<(), SourceError> {
        self.core.lock().cfg.consumer_usage = usage;
        Ok(())
    }

    fn set_default_buffer_size(&mut self, width: u32, height: u32) -> Result<(), SourceError> {
        if width == 0 || height == 0 {
            return Err(SourceError::BadValue);
        }
        let mut core = self.core.lock();
        core.cfg.width = width;
        core.cfg.height = height;
        Ok(())
    }

    fn set_default_max_buffer_count(&mut self, count: usize) -> Result<(), SourceError> {
        if count == 0 || count > NUM_BUFFER_SLOTS {
            return Err(SourceError::BadValue);
        }
        self.core.lock().cfg.max_buffer_count = count;
        Ok(())
    }

    fn queued_count(&self) -> usize {
        self.core.lock().queued.len()
    }
}
