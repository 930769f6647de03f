//! Hand-off policy.
//!
//! The frame state machine is fixed; what varies between platforms is how a requested mode is
//! finalized, when the output buffer must be re-fetched, and what an advance hands to the
//! compositor. Those decisions sit behind [`HandoffPolicy`], chosen at construction.

use std::fmt;

use vds_core::{VdsConfig, VdsError};

use crate::frame::{FrameState, OutputConfig, SlotFence};
use crate::mode::CompositionMode;

/// Buffers `advance_frame` passes to the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancePlan {
    /// Posted with `set_output_buffer`.
    pub output: SlotFence,
    /// Posted with `fb_post`; `None` on pure HWC frames.
    pub fb: Option<SlotFence>,
}

pub trait HandoffPolicy: Send + fmt::Debug {
    /// Finalizes the mode for this frame. Never returns `Unknown`.
    fn decide_mode(&self, requested: CompositionMode) -> CompositionMode;

    /// Decides at prepare time whether the output buffer must be re-fetched with a different
    /// format/usage. Returns the config to fetch with, or `None` to keep `current`.
    fn refresh_output_buffer(
        &self,
        mode: CompositionMode,
        current: OutputConfig,
        defaults: OutputConfig,
    ) -> Option<OutputConfig>;

    /// Builds the advance hand-off from the frame state, or `NoBuffer` when a required slot is
    /// missing.
    fn on_advance(&self, frame: &FrameState) -> Result<AdvancePlan, VdsError>;
}

/// The stock policy: force-copy upgrades GLES to MIXED, and non-GLES frames go back to the
/// compositor's default output config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StandardHandoff {
    pub force_hwc_copy: bool,
}

impl StandardHandoff {
    pub fn from_config(cfg: &VdsConfig) -> Self {
        Self {
            force_hwc_copy: cfg.force_hwc_copy,
        }
    }
}

impl HandoffPolicy for StandardHandoff {
    fn decide_mode(&self, requested: CompositionMode) -> CompositionMode {
        match requested {
            CompositionMode::Gles if self.force_hwc_copy => CompositionMode::Mixed,
            other => other,
        }
    }

    fn refresh_output_buffer(
        &self,
        mode: CompositionMode,
        current: OutputConfig,
        defaults: OutputConfig,
    ) -> Option<OutputConfig> {
        // Only a GLES frame lets the GPU pick the output format.
        (mode != CompositionMode::Gles && current != defaults).then_some(defaults)
    }

    fn on_advance(&self, frame: &FrameState) -> Result<AdvancePlan, VdsError> {
        let output = frame.output.ok_or(VdsError::NoBuffer {
            context: "no output buffer",
        })?;
        if frame.mode != CompositionMode::Hwc && frame.fb.is_none() {
            return Err(VdsError::NoBuffer {
                context: "no fb buffer",
            });
        }
        Ok(AdvancePlan {
            output,
            fb: frame.fb,
        })
    }
}
