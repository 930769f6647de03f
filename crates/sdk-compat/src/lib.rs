//! Compile-only compatibility crate.
//!
//! This crate exists to ensure the public SDK surface remains usable by third-party
//! consumers. It is not shipped or run; it must only build.

use std::sync::Arc;

use vds_buffers::{BufferQueue, QueueConfig};
use vds_core::{
    BufferHandle, Compositor, CompositorError, DisplayId, Fence, PixelFormat, QueueBufferInput,
    Usage, VdsConfig,
};
use vds_slots::{source_to_producer, ProducerSlotTable, Source};
use vds_surface::{
    CompositionMode, HandoffPolicy, StandardHandoff, SurfaceParts, VirtualDisplaySurface,
};

/// Third-party compositors only need the trait.
#[derive(Debug)]
struct WitnessCompositor;

impl Compositor for WitnessCompositor {
    fn set_output_buffer(
        &self,
        _display: DisplayId,
        _fence: Fence,
        _buffer: BufferHandle,
    ) -> Result<(), CompositorError> {
        Ok(())
    }

    fn fb_post(
        &self,
        _display: DisplayId,
        _fence: Fence,
        _buffer: BufferHandle,
    ) -> Result<(), CompositorError> {
        Ok(())
    }

    fn get_and_reset_release_fence(&self, _display: DisplayId) -> Fence {
        Fence::NO_FENCE
    }

    fn get_last_retire_fence(&self, _display: DisplayId) -> Fence {
        Fence::NO_FENCE
    }
}

#[allow(dead_code)]
pub fn _compile_witness() {
    // Slot vocabulary is usable on its own.
    let _table = ProducerSlotTable::new();
    let _pslot = source_to_producer(Source::Scratch, 0);

    // Policies are swappable behind the trait object.
    let policy: Box<dyn HandoffPolicy> =
        Box::new(StandardHandoff::from_config(&VdsConfig::default()));
    let _ = policy.decide_mode(CompositionMode::Gles);

    // A surface builds from public parts and drives a frame with public calls only.
    let sink = BufferQueue::new(QueueConfig::default());
    let scratch = BufferQueue::new(QueueConfig::default());
    let parts = SurfaceParts {
        display: Some(DisplayId(0)),
        sink: Box::new(sink.producer()),
        scratch: Box::new(scratch.producer()),
        scratch_consumer: Box::new(scratch.consumer()),
        compositor: Arc::new(WitnessCompositor),
    };
    let Ok(mut vds) = VirtualDisplaySurface::with_policy(parts, &VdsConfig::default(), policy)
    else {
        return;
    };
    let _ = vds.begin_frame();
    let _ = vds.prepare_frame(CompositionMode::Gles);
    if let Ok(d) = vds.dequeue_buffer(0, 0, PixelFormat::UNSPECIFIED, Usage::HW_RENDER, true) {
        let _ = vds.request_buffer(d.slot);
        let _ = vds.queue_buffer(d.slot, &QueueBufferInput::with_fence(d.fence));
    }
    let _ = vds.advance_frame();
    let _ = vds.on_frame_committed();
    let _ = vds.dump();
}
