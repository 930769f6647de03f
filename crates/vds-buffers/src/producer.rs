use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use vds_core::{
    Attribute, BufferHandle, BufferSource, ConnectApi, DequeueFlags, DequeueRequest, DequeuedSlot,
    Fence, GraphicBuffer, QueueBufferInput, QueueBufferOutput, SourceError, NUM_BUFFER_SLOTS,
};

use crate::{QueueCore, QueueEvent, SlotState};

/// Producer side of a [`crate::BufferQueue`].
#[derive(Debug)]
pub struct QueueProducer {
    core: Arc<Mutex<QueueCore>>,
}

impl QueueProducer {
    pub(crate) fn new(core: Arc<Mutex<QueueCore>>) -> Self {
        Self { core }
    }
}

impl QueueCore {
    fn output(&self) -> QueueBufferOutput {
        QueueBufferOutput {
            width: self.cfg.width,
            height: self.cfg.height,
            transform_hint: 0,
            num_pending_buffers: self.queued.len() as u32,
        }
    }
}

impl BufferSource for QueueProducer {
    fn dequeue_buffer(&mut self, request: DequeueRequest) -> Result<DequeuedSlot, SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Dequeue(request));
        core.check_alive()?;
        if let Some(err) = core.fail_next_dequeue.take() {
            return Err(err);
        }

        let max = core.cfg.max_buffer_count.min(NUM_BUFFER_SLOTS);
        let slot = core.slots[..max]
            .iter()
            .position(|s| s.state == SlotState::Free)
            .ok_or(SourceError::WouldBlock)?;

        let width = if request.width == 0 { core.cfg.width } else { request.width };
        let height = if request.height == 0 { core.cfg.height } else { request.height };
        let format = if request.format.is_unspecified() {
            core.cfg.format
        } else {
            request.format
        };
        let usage = request.usage | core.cfg.consumer_usage;

        let mut flags = DequeueFlags::empty();
        if core.release_all_pending {
            core.release_all_pending = false;
            flags |= DequeueFlags::RELEASE_ALL_BUFFERS;
        }

        let name = core.cfg.name.clone();
        let s = &mut core.slots[slot];
        let reusable = s
            .buffer
            .as_ref()
            .is_some_and(|b| b.satisfies(width, height, format, usage));
        if !reusable {
            debug!(queue = %name, slot, width, height, ?format, ?usage, "allocating buffer");
            s.buffer = Some(GraphicBuffer::allocate(width, height, format, usage));
            flags |= DequeueFlags::NEEDS_REALLOCATION;
        }
        s.state = SlotState::Dequeued;
        let fence = std::mem::take(&mut s.fence);

        trace!(queue = %name, slot, ?flags, "dequeue");
        Ok(DequeuedSlot { slot, fence, flags })
    }

    fn request_buffer(&mut self, slot: usize) -> Result<BufferHandle, SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::RequestBuffer { slot });
        core.check_alive()?;
        core.slot_in(slot, SlotState::Dequeued)?
            .buffer
            .clone()
            .ok_or(SourceError::BadValue)
    }

    fn queue_buffer(
        &mut self,
        slot: usize,
        input: &QueueBufferInput,
    ) -> Result<QueueBufferOutput, SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Queue {
            slot,
            input: *input,
        });
        core.check_alive()?;

        let s = core.slot_in(slot, SlotState::Dequeued)?;
        s.state = SlotState::Queued;
        s.fence = input.fence;
        core.queued.push_back(slot);

        trace!(queue = %core.cfg.name, slot, pending = core.queued.len(), "queue");
        Ok(core.output())
    }

    fn cancel_buffer(&mut self, slot: usize, fence: Fence) -> Result<(), SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Cancel { slot, fence });
        core.check_alive()?;

        let s = core.slot_in(slot, SlotState::Dequeued)?;
        s.state = SlotState::Free;
        s.fence = fence;
        Ok(())
    }

    fn connect(
        &mut self,
        api: ConnectApi,
        _producer_controlled_by_app: bool,
    ) -> Result<QueueBufferOutput, SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Connect { api });
        core.check_alive()?;
        if core.connected.is_some() {
            return Err(SourceError::BadValue);
        }
        core.connected = Some(api);
        Ok(core.output())
    }

    fn disconnect(&mut self, api: ConnectApi) -> Result<(), SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::Disconnect { api });
        core.check_alive()?;
        if core.connected != Some(api) {
            return Err(SourceError::BadValue);
        }
        core.connected = None;
        Ok(())
    }

    fn set_buffer_count(&mut self, count: usize) -> Result<(), SourceError> {
        let mut core = self.core.lock();
        core.history.push(QueueEvent::SetBufferCount { count });
        core.check_alive()?;
        if count == 0 || count > NUM_BUFFER_SLOTS {
            return Err(SourceError::BadValue);
        }
        if core.slots.iter().any(|s| s.state == SlotState::Dequeued) {
            return Err(SourceError::InvalidOperation);
        }

        core.cfg.max_buffer_count = count;
        for s in core.slots.iter_mut().filter(|s| s.state == SlotState::Free) {
            s.buffer = None;
        }
        core.release_all_pending = true;
        Ok(())
    }

    fn query(&self, attribute: Attribute) -> Result<u32, SourceError> {
        let core = self.core.lock();
        core.check_alive()?;
        Ok(match attribute {
            Attribute::Width | Attribute::DefaultWidth => core.cfg.width,
            Attribute::Height | Attribute::DefaultHeight => core.cfg.height,
            Attribute::Format => core.cfg.format.0,
            Attribute::ConsumerUsageBits => core.cfg.consumer_usage.bits(),
            Attribute::MinUndequeuedBuffers => 1,
        })
    }
}
