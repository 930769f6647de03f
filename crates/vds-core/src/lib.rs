#![forbid(unsafe_code)]

//! Shared vocabulary for the virtual display buffer orchestrator.
//!
//! This crate is **contract-only**: value types (fences, buffers, queue descriptors), the
//! collaborator traits for buffer pools and the hardware compositor, errors and config.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod buffer;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod error;
pub mod source;

// ---- Stable re-exports ----
pub use buffer::{
    Attribute, BufferHandle, ConnectApi, DequeueFlags, Fence, GraphicBuffer, PixelFormat,
    QueueBufferInput, QueueBufferOutput, Rect, ScalingMode, Usage,
};
pub use compositor::{Compositor, DisplayId};
pub use config::{ProtocolChecks, VdsConfig, NUM_BUFFER_SLOTS};
pub use error::{CompositorError, SourceError, VdsError};
pub use source::{AcquiredBuffer, BufferConsumer, BufferSource, DequeueRequest, DequeuedSlot};
