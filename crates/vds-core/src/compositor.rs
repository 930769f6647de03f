use std::fmt;

use crate::buffer::{BufferHandle, Fence};
use crate::error::CompositorError;

/// Compositor-side display identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayId(pub i32);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware compositor contract.
///
/// The compositor is shared by every display in the process, so methods take `&self` and
/// implementations synchronize internally.
pub trait Compositor: Send + Sync + fmt::Debug {
    /// Sets the buffer the compositor writes the frame into. `fence` signals when the buffer may
    /// be written; `Fence::NO_FENCE` while the real acquire fence is not yet known.
    fn set_output_buffer(
        &self,
        display: DisplayId,
        fence: Fence,
        buffer: BufferHandle,
    ) -> Result<(), CompositorError>;

    /// Posts the GPU-composited (or scratch) buffer as an input layer for this frame.
    fn fb_post(
        &self,
        display: DisplayId,
        fence: Fence,
        buffer: BufferHandle,
    ) -> Result<(), CompositorError>;

    /// Fence signalling when the compositor stopped reading the posted fb buffer.
    fn get_and_reset_release_fence(&self, display: DisplayId) -> Fence;

    /// Fence signalling when the last frame finished writing into the output buffer.
    fn get_last_retire_fence(&self, display: DisplayId) -> Fence;
}
