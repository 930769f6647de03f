//! Shared fixtures: a recording compositor and a surface wired to in-memory pools.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use vds_buffers::{BufferQueue, QueueConfig, QueueConsumer, QueueEvent};
use vds_core::{
    BufferConsumer, BufferHandle, Compositor, CompositorError, DequeueRequest, DisplayId, Fence,
    PixelFormat, QueueBufferInput, Usage, VdsConfig,
};
use vds_surface::{
    CompositionMode, DequeuedBuffer, ProducerSlot, SurfaceParts, VirtualDisplaySurface,
};

pub const DISPLAY: DisplayId = DisplayId(7);
pub const SINK_WIDTH: u32 = 320;
pub const SINK_HEIGHT: u32 = 240;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// -------------------------------------------------------------------------------------------------
// Recording compositor
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwcCall {
    SetOutputBuffer { fence: Fence, buffer: u64 },
    FbPost { fence: Fence, buffer: u64 },
    TakeReleaseFence,
    TakeRetireFence,
}

#[derive(Debug, Default)]
struct HwcState {
    calls: Vec<HwcCall>,
    release_fence: Fence,
    retire_fence: Fence,
    fail_next_fb_post: Option<CompositorError>,
}

/// Compositor fake. Records every call; only `DISPLAY` is a known display.
#[derive(Debug, Default)]
pub struct RecordingCompositor {
    state: Mutex<HwcState>,
}

impl RecordingCompositor {
    pub fn calls(&self) -> Vec<HwcCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    pub fn set_release_fence(&self, fence: Fence) {
        self.state.lock().release_fence = fence;
    }

    pub fn set_retire_fence(&self, fence: Fence) {
        self.state.lock().retire_fence = fence;
    }

    pub fn fail_next_fb_post(&self, err: CompositorError) {
        self.state.lock().fail_next_fb_post = Some(err);
    }

    pub fn fb_posts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HwcCall::FbPost { .. }))
            .count()
    }

    pub fn last_output(&self) -> Option<(Fence, u64)> {
        self.calls().iter().rev().find_map(|c| match c {
            HwcCall::SetOutputBuffer { fence, buffer } => Some((*fence, *buffer)),
            _ => None,
        })
    }

    fn check(display: DisplayId) -> Result<(), CompositorError> {
        if display == DISPLAY {
            Ok(())
        } else {
            Err(CompositorError::BadDisplay(display.0))
        }
    }
}

impl Compositor for RecordingCompositor {
    fn set_output_buffer(
        &self,
        display: DisplayId,
        fence: Fence,
        buffer: BufferHandle,
    ) -> Result<(), CompositorError> {
        Self::check(display)?;
        self.state.lock().calls.push(HwcCall::SetOutputBuffer {
            fence,
            buffer: buffer.id,
        });
        Ok(())
    }

    fn fb_post(
        &self,
        display: DisplayId,
        fence: Fence,
        buffer: BufferHandle,
    ) -> Result<(), CompositorError> {
        Self::check(display)?;
        let mut st = self.state.lock();
        if let Some(err) = st.fail_next_fb_post.take() {
            return Err(err);
        }
        st.calls.push(HwcCall::FbPost {
            fence,
            buffer: buffer.id,
        });
        Ok(())
    }

    fn get_and_reset_release_fence(&self, _display: DisplayId) -> Fence {
        let mut st = self.state.lock();
        st.calls.push(HwcCall::TakeReleaseFence);
        std::mem::take(&mut st.release_fence)
    }

    fn get_last_retire_fence(&self, _display: DisplayId) -> Fence {
        let mut st = self.state.lock();
        st.calls.push(HwcCall::TakeRetireFence);
        st.retire_fence
    }
}

// -------------------------------------------------------------------------------------------------
// Harness
// -------------------------------------------------------------------------------------------------

/// An encoder-like sink: hardware consumer, no CPU access.
pub fn encoder_sink() -> QueueConfig {
    QueueConfig {
        name: "sink".to_string(),
        width: SINK_WIDTH,
        height: SINK_HEIGHT,
        format: PixelFormat::RGBA_8888,
        consumer_usage: Usage::HW_VIDEO_ENCODER,
        max_buffer_count: 3,
    }
}

#[derive(Debug)]
pub struct Harness {
    pub vds: VirtualDisplaySurface,
    pub sink: BufferQueue,
    pub scratch: BufferQueue,
    pub hwc: Arc<RecordingCompositor>,
    sink_consumer: QueueConsumer,
}

impl Harness {
    pub fn new(cfg: VdsConfig) -> Self {
        Self::build(encoder_sink(), cfg, Some(DISPLAY))
    }

    pub fn build(sink_cfg: QueueConfig, cfg: VdsConfig, display: Option<DisplayId>) -> Self {
        init_tracing();
        let sink = BufferQueue::new(sink_cfg);
        let scratch = BufferQueue::new(QueueConfig {
            name: "scratch".to_string(),
            ..QueueConfig::default()
        });
        let hwc = Arc::new(RecordingCompositor::default());
        let parts = SurfaceParts {
            display,
            sink: Box::new(sink.producer()),
            scratch: Box::new(scratch.producer()),
            scratch_consumer: Box::new(scratch.consumer()),
            compositor: hwc.clone(),
        };
        let vds = VirtualDisplaySurface::new(parts, &cfg).expect("surface construction");
        let sink_consumer = sink.consumer();
        Self {
            vds,
            sink,
            scratch,
            hwc,
            sink_consumer,
        }
    }

    /// Plays the sink's consumer: takes every queued frame and hands it straight back.
    pub fn drain_sink(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(item) = self.sink_consumer.acquire_buffer() {
            self.sink_consumer
                .release_buffer(item.slot, Fence::NO_FENCE)
                .expect("release drained sink buffer");
            drained += 1;
        }
        drained
    }

    /// GPU-side dequeue with the usage EGL typically asks for.
    pub fn gpu_dequeue(&mut self, format: PixelFormat) -> DequeuedBuffer {
        self.vds
            .dequeue_buffer(0, 0, format, Usage::HW_RENDER, true)
            .expect("gpu dequeue")
    }

    pub fn gpu_queue(&mut self, slot: ProducerSlot, fence: Fence) {
        self.vds
            .queue_buffer(slot, &QueueBufferInput::with_fence(fence))
            .expect("gpu queue");
    }

    /// A complete, in-order frame. Returns the slot the GPU rendered into, if it rendered.
    pub fn run_frame(&mut self, mode: CompositionMode) -> Option<ProducerSlot> {
        self.vds.begin_frame().expect("begin_frame");
        self.vds.prepare_frame(mode).expect("prepare_frame");
        let rendered = if self.vds.mode().uses_gles() {
            let d = self.gpu_dequeue(PixelFormat::UNSPECIFIED);
            self.gpu_queue(d.slot, Fence::from_raw(100 + d.slot.index() as u64));
            Some(d.slot)
        } else {
            None
        };
        self.vds.advance_frame().expect("advance_frame");
        self.vds.on_frame_committed().expect("on_frame_committed");
        rendered
    }
}

pub fn sink_dequeues(history: &[QueueEvent]) -> Vec<DequeueRequest> {
    history
        .iter()
        .filter_map(|e| match e {
            QueueEvent::Dequeue(req) => Some(*req),
            _ => None,
        })
        .collect()
}

pub fn sink_queues(history: &[QueueEvent]) -> Vec<(usize, QueueBufferInput)> {
    history
        .iter()
        .filter_map(|e| match e {
            QueueEvent::Queue { slot, input } => Some((*slot, *input)),
            _ => None,
        })
        .collect()
}
