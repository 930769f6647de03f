//! Producer-facing buffer protocol (what the GPU client calls).

use tracing::{debug, error, trace, warn};
use vds_core::{
    Attribute, BufferHandle, ConnectApi, DequeueFlags, DequeueRequest, Fence, PixelFormat,
    QueueBufferInput, QueueBufferOutput, Usage, VdsError,
};
use vds_slots::{producer_to_source, source_to_producer, ProducerSlot, Source};

use super::VirtualDisplaySurface;
use crate::mode::{fb_source_for, CompositionMode};
use crate::protocol::ProtocolState;

/// A buffer handed to the producer, in producer slot numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub slot: ProducerSlot,
    pub fence: Fence,
    pub flags: DequeueFlags,
}

impl VirtualDisplaySurface {
    /// Hands the producer a buffer to render into.
    ///
    /// GLES frames get the output buffer reserved at prepare time (re-fetched if the request
    /// does not fit it); MIXED frames get a scratch buffer.
    pub fn dequeue_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: Usage,
        async_mode: bool,
    ) -> Result<DequeuedBuffer, VdsError> {
        if self.display.is_none() {
            let d = self.sink.dequeue_buffer(DequeueRequest {
                async_mode,
                width,
                height,
                format,
                usage,
            })?;
            return Ok(DequeuedBuffer {
                slot: ProducerSlot(d.slot),
                fence: d.fence,
                flags: d.flags,
            });
        }
        self.protocol
            .expect(&self.name, "dequeueBuffer", ProtocolState::Prepared, "");
        self.protocol.enter(ProtocolState::Gles);

        if !async_mode {
            warn!(
                display = %self.name,
                "dequeueBuffer called with !async despite a zero swap interval"
            );
        }
        trace!(display = %self.name, width, height, ?format, ?usage, "dequeueBuffer");

        match fb_source_for(self.frame.mode) {
            Source::Sink => self.dequeue_output(width, height, format, usage),
            Source::Scratch => {
                let (slot, fence, flags) =
                    self.dequeue_from_source(Source::Scratch, format, usage)?;
                self.frame = self.frame.with_scratch_outstanding(slot);
                Ok(DequeuedBuffer { slot, fence, flags })
            }
        }
    }

    fn dequeue_output(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: Usage,
    ) -> Result<DequeuedBuffer, VdsError> {
        if self.frame.output.is_none() && !self.frame.output_cancelled {
            error!(display = %self.name, "dequeueBuffer: no buffer, bailing out");
            return Err(VdsError::NoBuffer {
                context: "no output buffer",
            });
        }

        let usage = usage | Usage::HW_COMPOSER;
        let fits = match self.frame.output_slot().and_then(|s| self.slots.handle(s)) {
            Some(buf) => {
                buf.usage.contains(usage)
                    && (format.is_unspecified() || format == buf.format)
                    && (width == 0 || width == self.frame.sink_width)
                    && (height == 0 || height == self.frame.sink_height)
            }
            None => false,
        };

        let mut extra = DequeueFlags::empty();
        if !fits {
            // The compositor sees a different output buffer between prepare and set; harmless
            // on a GLES-only frame.
            debug!(
                display = %self.name,
                width,
                height,
                ?format,
                ?usage,
                sink_width = self.frame.sink_width,
                sink_height = self.frame.sink_height,
                "dequeueBuffer: dequeueing new output buffer"
            );
            self.output_format = if format.is_unspecified() {
                self.default_output_format
            } else {
                format
            };
            self.output_usage = usage;
            extra = self.refresh_output_buffer()? & DequeueFlags::RELEASE_ALL_BUFFERS;
        }

        let output = self.frame.output.ok_or(VdsError::NoBuffer {
            context: "no output buffer",
        })?;
        let mut flags = extra;
        if self.frame.output_realloc_pending {
            flags |= DequeueFlags::NEEDS_REALLOCATION;
        }
        self.frame = self.frame.output_delivered();

        Ok(DequeuedBuffer {
            slot: output.slot,
            fence: output.fence,
            flags,
        })
    }

    /// Takes back a rendered buffer.
    ///
    /// MIXED frames route it through the scratch pool so the compositor can read it; GLES frames
    /// keep it for the commit.
    pub fn queue_buffer(
        &mut self,
        slot: ProducerSlot,
        input: &QueueBufferInput,
    ) -> Result<QueueBufferOutput, VdsError> {
        if self.display.is_none() {
            let qbo = self.sink.queue_buffer(slot.index(), input)?;
            self.update_queue_output(qbo);
            return Ok(self.queue_output);
        }
        self.protocol.expect(
            &self.name,
            "queueBuffer",
            ProtocolState::Gles,
            &format!(" pslot={slot}"),
        );
        self.protocol.enter(ProtocolState::GlesDone);
        trace!(display = %self.name, %slot, "queueBuffer");

        if self.frame.mode == CompositionMode::Mixed {
            let native =
                producer_to_source(Source::Scratch, slot).ok_or(VdsError::InvalidSlot(slot.0))?;
            self.scratch.queue_buffer(native, input)?;

            // Acquire straight back; this should be the slot and fence just queued.
            let item = self.scratch_consumer.lock().acquire_buffer()?;
            if item.slot != native {
                warn!(
                    display = %self.name,
                    acquired = item.slot,
                    queued = native,
                    "queueBuffer: acquired a different scratch slot than the one queued"
                );
            }
            let fb_slot = source_to_producer(Source::Scratch, item.slot)
                .ok_or(VdsError::InvalidSlot(item.slot))?;
            self.frame = self.frame.scratch_returned().with_fb(fb_slot, item.fence);
        } else {
            if self.frame.mode != CompositionMode::Gles {
                error!(
                    display = %self.name,
                    mode = %self.frame.mode,
                    "unexpected queueBuffer for compositionType {}",
                    self.frame.mode
                );
            }
            debug_assert_eq!(
                self.frame.mode,
                CompositionMode::Gles,
                "unexpected queueBuffer for compositionType {}",
                self.frame.mode
            );
            // The GPU's completion fence is what the compositor must wait on for both buffers.
            self.frame = self
                .frame
                .with_fb(slot, input.fence)
                .with_output_fence(input.fence);
        }
        Ok(self.queue_output)
    }

    pub fn cancel_buffer(&mut self, slot: ProducerSlot, fence: Fence) -> Result<(), VdsError> {
        if self.display.is_none() {
            self.sink.cancel_buffer(slot.index(), fence)?;
            return Ok(());
        }
        self.protocol.expect(
            &self.name,
            "cancelBuffer",
            ProtocolState::Gles,
            &format!(" pslot={slot}"),
        );
        trace!(display = %self.name, %slot, "cancelBuffer");

        let source = fb_source_for(self.frame.mode);
        let native = producer_to_source(source, slot).ok_or(VdsError::InvalidSlot(slot.0))?;
        self.source_mut(source).cancel_buffer(native, fence)?;

        match source {
            Source::Sink if self.frame.output_slot() == Some(slot) => {
                self.frame = self.frame.with_output_cancelled();
            }
            Source::Scratch if self.frame.scratch_outstanding == Some(slot) => {
                self.frame = self.frame.scratch_returned();
            }
            _ => {}
        }
        // The producer may dequeue again.
        self.protocol.enter(ProtocolState::Prepared);
        Ok(())
    }

    /// Returns the cached buffer for `slot`. Never calls into a pool.
    pub fn request_buffer(&mut self, slot: ProducerSlot) -> Result<BufferHandle, VdsError> {
        if self.display.is_none() {
            return Ok(self.sink.request_buffer(slot.index())?);
        }
        self.protocol.expect(
            &self.name,
            "requestBuffer",
            ProtocolState::Gles,
            &format!(" pslot={slot}"),
        );
        self.slots
            .entry(slot)?
            .handle()
            .cloned()
            .ok_or(VdsError::EmptySlot(slot.0))
    }

    // ---------------------------------------------------------------------------------------------
    // Sink pass-through
    // ---------------------------------------------------------------------------------------------

    pub fn connect(
        &mut self,
        api: ConnectApi,
        producer_controlled_by_app: bool,
    ) -> Result<QueueBufferOutput, VdsError> {
        let qbo = self.sink.connect(api, producer_controlled_by_app)?;
        self.update_queue_output(qbo);
        Ok(self.queue_output)
    }

    pub fn disconnect(&mut self, api: ConnectApi) -> Result<(), VdsError> {
        Ok(self.sink.disconnect(api)?)
    }

    pub fn query(&self, attribute: Attribute) -> Result<u32, VdsError> {
        Ok(self.sink.query(attribute)?)
    }

    pub fn set_buffer_count(&mut self, count: usize) -> Result<(), VdsError> {
        Ok(self.sink.set_buffer_count(count)?)
    }
}
