#![forbid(unsafe_code)]

//! Virtual display buffer orchestrator.
//!
//! A [`VirtualDisplaySurface`] sits between three parties:
//! - the GPU client, which sees an ordinary buffer producer (`dequeue_buffer`, `queue_buffer`,
//!   `cancel_buffer`, `request_buffer`);
//! - the hardware compositor, which drives the frame (`begin_frame`, `prepare_frame`,
//!   `advance_frame`, `on_frame_committed`);
//! - two buffer pools: the *sink* that receives finished frames and an internal *scratch* pool
//!   the GPU renders into on MIXED frames.
//!
//! Contract:
//! - Both pools share one producer slot space (see `vds-slots`); the producer never learns
//!   which pool a slot came from.
//! - The composition mode is fixed from `prepare_frame` until `on_frame_committed`.
//! - `advance_frame` fails with [`VdsError::NoBuffer`] when a buffer the frame needs is
//!   missing; the caller skips the frame.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod frame;
pub mod handoff;
pub mod mode;
pub mod protocol;
mod surface;

// ---- Stable re-exports ----
pub use frame::{FrameState, OutputConfig, SlotFence};
pub use handoff::{AdvancePlan, HandoffPolicy, StandardHandoff};
pub use mode::{fb_source_for, CompositionMode};
pub use protocol::{ProtocolChecker, ProtocolState};
pub use surface::{DequeuedBuffer, SurfaceParts, VirtualDisplaySurface};

pub use vds_core::{ProtocolChecks, VdsConfig, VdsError};
pub use vds_slots::{ProducerSlot, Source};
