//! Compositor-driven frame phases.

use tracing::{debug, error, trace, warn};
use vds_core::{clock, Fence, QueueBufferInput, Rect, ScalingMode, VdsError};
use vds_slots::{producer_to_source, Source};

use super::VirtualDisplaySurface;
use crate::frame::OutputConfig;
use crate::mode::CompositionMode;
use crate::protocol::ProtocolState;

impl VirtualDisplaySurface {
    /// Starts a frame. Takes the sink size from the last queue output.
    pub fn begin_frame(&mut self) -> Result<(), VdsError> {
        if self.display.is_none() {
            return Ok(());
        }
        self.protocol
            .expect(&self.name, "beginFrame", ProtocolState::Idle, "");
        self.protocol.enter(ProtocolState::Begun);

        self.frame = self.frame.with_sink(self.queue_output);
        trace!(
            display = %self.name,
            width = self.frame.sink_width,
            height = self.frame.sink_height,
            "beginFrame"
        );
        Ok(())
    }

    /// Fixes the composition mode for this frame and reserves the output buffer.
    pub fn prepare_frame(&mut self, requested: CompositionMode) -> Result<(), VdsError> {
        if self.display.is_none() {
            return Ok(());
        }
        if requested == CompositionMode::Unknown {
            return Err(VdsError::InvalidMode(requested.name()));
        }
        self.protocol
            .expect(&self.name, "prepareFrame", ProtocolState::Begun, "");
        self.protocol.enter(ProtocolState::Prepared);

        let mode = self.policy.decide_mode(requested);
        self.frame = self.frame.with_mode(mode);
        if mode != self.last_mode {
            debug!(display = %self.name, %mode, "prepareFrame: composition type changed to {mode}");
            self.last_mode = mode;
        }

        let reset = self.policy.refresh_output_buffer(
            mode,
            self.output_config(),
            self.default_output_config(),
        );
        if let Some(OutputConfig { format, usage }) = reset {
            // The GPU's format/usage may be a poor fit when the compositor writes the output.
            self.output_format = format;
            self.output_usage = usage;
        }
        if reset.is_some() || self.frame.output.is_none() {
            self.refresh_output_buffer()?;
        }
        Ok(())
    }

    /// Hands the frame's buffers to the compositor.
    ///
    /// `NoBuffer` means an earlier step lost a buffer (typically the sink went away); the
    /// caller should skip this frame.
    pub fn advance_frame(&mut self) -> Result<(), VdsError> {
        let Some(display) = self.display else {
            return Ok(());
        };
        let (expected, detail) = if self.frame.mode == CompositionMode::Hwc {
            (ProtocolState::Prepared, " on HWC frame")
        } else {
            (ProtocolState::GlesDone, " on GLES/MIXED frame")
        };
        self.protocol
            .expect(&self.name, "advanceFrame", expected, detail);
        self.protocol.enter(ProtocolState::Hwc);

        let plan = match self.policy.on_advance(&self.frame) {
            Ok(plan) => plan,
            Err(err) => {
                error!(display = %self.name, %err, "advanceFrame: no buffer, bailing out");
                return Err(err);
            }
        };
        let output = self
            .slots
            .handle(plan.output.slot)
            .cloned()
            .ok_or(VdsError::EmptySlot(plan.output.slot.index()))?;
        let fb = match plan.fb {
            Some(fb) => Some((
                fb.fence,
                self.slots
                    .handle(fb.slot)
                    .cloned()
                    .ok_or(VdsError::EmptySlot(fb.slot.index()))?,
            )),
            None => None,
        };
        trace!(
            display = %self.name,
            out = %plan.output.slot,
            out_fence = %plan.output.fence,
            fb = ?plan.fb.map(|f| f.slot.index()),
            "advanceFrame"
        );

        // The output acquire fence is known by now.
        self.compositor
            .set_output_buffer(display, plan.output.fence, output)?;
        if let Some((fence, buffer)) = fb {
            self.compositor.fb_post(display, fence, buffer)?;
        }
        Ok(())
    }

    /// Finishes the frame: returns the scratch buffer (MIXED) and queues the output buffer to
    /// the sink with the compositor's retire fence.
    ///
    /// Per-frame state is reset even when a pool call fails; the first failure is returned.
    pub fn on_frame_committed(&mut self) -> Result<(), VdsError> {
        let Some(display) = self.display else {
            return Ok(());
        };
        self.protocol
            .expect(&self.name, "onFrameCommitted", ProtocolState::Hwc, "");
        self.protocol.enter(ProtocolState::Idle);

        let release_fence = self.compositor.get_and_reset_release_fence(display);
        let mut result = Ok(());

        // A GPU that gave up on its scratch buffer would otherwise starve the scratch pool.
        if let Some(slot) = self.frame.scratch_outstanding {
            if let Some(native) = producer_to_source(Source::Scratch, slot) {
                warn!(
                    display = %self.name,
                    %slot,
                    "onFrameCommitted: scratch buffer never queued, cancelling"
                );
                if let Err(err) = self.scratch.cancel_buffer(native, Fence::NO_FENCE) {
                    result = Err(err.into());
                }
            }
        }

        if let (CompositionMode::Mixed, Some(fb)) = (self.frame.mode, self.frame.fb) {
            if let Some(native) = producer_to_source(Source::Scratch, fb.slot) {
                trace!(display = %self.name, native, "onFrameCommitted: release scratch");
                let released = self
                    .scratch_consumer
                    .lock()
                    .release_buffer(native, release_fence);
                if let Err(err) = released {
                    if result.is_ok() {
                        result = Err(err.into());
                    }
                }
            }
        }

        if let Some(output) = self.frame.output {
            if let Some(native) = producer_to_source(Source::Sink, output.slot) {
                let retire_fence = self.compositor.get_last_retire_fence(display);
                let input = QueueBufferInput {
                    timestamp: clock::monotonic_ns(),
                    is_auto_timestamp: false,
                    crop: Rect::from_size(self.frame.sink_width, self.frame.sink_height),
                    scaling_mode: ScalingMode::Freeze,
                    transform: 0,
                    async_mode: true,
                    fence: retire_fence,
                };
                trace!(display = %self.name, native, %retire_fence, "onFrameCommitted: queue sink");
                match self.sink.queue_buffer(native, &input) {
                    Ok(qbo) => self.update_queue_output(qbo),
                    Err(err) => {
                        if result.is_ok() {
                            result = Err(err.into());
                        }
                    }
                }
            }
        }

        self.reset_per_frame_state();
        result
    }
}

