//! Per-frame state.
//!
//! `FrameState` is a plain `Copy` value. Every protocol step derives a new snapshot from the
//! previous one (`with_*` / `without_*`) and stores it back; nothing pokes at single fields.

use vds_core::{Fence, PixelFormat, QueueBufferOutput, Usage};
use vds_slots::ProducerSlot;

use crate::mode::CompositionMode;

/// A producer slot together with the fence that guards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFence {
    pub slot: ProducerSlot,
    pub fence: Fence,
}

/// Format/usage requested from the sink for the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: PixelFormat,
    pub usage: Usage,
}

impl OutputConfig {
    /// What the compositor wants when it authors the output buffer itself.
    pub fn compositor_default(format: PixelFormat) -> Self {
        Self {
            format,
            usage: Usage::HW_COMPOSER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameState {
    pub mode: CompositionMode,
    /// Sink buffer the frame is composed into, with its acquire fence.
    pub output: Option<SlotFence>,
    /// Buffer the compositor composites from (GPU output, or the scratch buffer in MIXED).
    pub fb: Option<SlotFence>,
    pub sink_width: u32,
    pub sink_height: u32,
    pub sink_pending_buffers: u32,
    /// The output buffer was (re)fetched and the producer has not been handed it yet.
    pub output_realloc_pending: bool,
    /// The producer cancelled the output buffer; the next dequeue reserves a new one.
    pub output_cancelled: bool,
    /// Scratch buffer handed to the producer that it has neither queued nor cancelled.
    pub scratch_outstanding: Option<ProducerSlot>,
}

impl FrameState {
    /// Post-commit state: no mode, no reserved buffers.
    pub fn reset(self) -> Self {
        Self::default()
    }

    /// Takes the sink geometry from the last queue output the sink reported.
    pub fn with_sink(self, queued: QueueBufferOutput) -> Self {
        Self {
            sink_width: queued.width,
            sink_height: queued.height,
            sink_pending_buffers: queued.num_pending_buffers,
            ..self
        }
    }

    pub fn with_mode(self, mode: CompositionMode) -> Self {
        Self { mode, ..self }
    }

    pub fn with_output(self, slot: ProducerSlot, fence: Fence, realloc: bool) -> Self {
        Self {
            output: Some(SlotFence { slot, fence }),
            output_realloc_pending: realloc,
            output_cancelled: false,
            ..self
        }
    }

    /// Replaces the output acquire fence; no-op while no output is reserved.
    pub fn with_output_fence(self, fence: Fence) -> Self {
        Self {
            output: self.output.map(|o| SlotFence { fence, ..o }),
            ..self
        }
    }

    pub fn without_output(self) -> Self {
        Self {
            output: None,
            output_realloc_pending: false,
            ..self
        }
    }

    pub fn with_output_cancelled(self) -> Self {
        Self {
            output_cancelled: true,
            ..self.without_output()
        }
    }

    pub fn output_delivered(self) -> Self {
        Self {
            output_realloc_pending: false,
            ..self
        }
    }

    pub fn with_fb(self, slot: ProducerSlot, fence: Fence) -> Self {
        Self {
            fb: Some(SlotFence { slot, fence }),
            ..self
        }
    }

    pub fn with_scratch_outstanding(self, slot: ProducerSlot) -> Self {
        Self {
            scratch_outstanding: Some(slot),
            ..self
        }
    }

    pub fn scratch_returned(self) -> Self {
        Self {
            scratch_outstanding: None,
            ..self
        }
    }

    /// True if `slot` carries a buffer this frame still needs.
    pub fn holds(&self, slot: ProducerSlot) -> bool {
        self.output_slot() == Some(slot)
            || self.fb_slot() == Some(slot)
            || self.scratch_outstanding == Some(slot)
    }

    pub fn output_slot(&self) -> Option<ProducerSlot> {
        self.output.map(|o| o.slot)
    }

    pub fn output_fence(&self) -> Fence {
        self.output.map_or(Fence::NO_FENCE, |o| o.fence)
    }

    pub fn fb_slot(&self) -> Option<ProducerSlot> {
        self.fb.map(|f| f.slot)
    }
}
