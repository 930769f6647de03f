use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use vds_core::{
    Attribute, BufferConsumer, BufferSource, Compositor, DequeueFlags, DequeueRequest, DisplayId,
    Fence, PixelFormat, QueueBufferOutput, Usage, VdsConfig, VdsError,
};
use vds_slots::{producer_to_source, source_to_producer, ProducerSlot, ProducerSlotTable, Source};

use crate::frame::{FrameState, OutputConfig};
use crate::handoff::{HandoffPolicy, StandardHandoff};
use crate::mode::CompositionMode;
use crate::protocol::{ProtocolChecker, ProtocolState};

mod lifecycle;
mod producer;

pub use producer::DequeuedBuffer;

/// Collaborators a [`VirtualDisplaySurface`] is built from.
#[derive(Debug)]
pub struct SurfaceParts {
    /// `None` marks a display the compositor does not know about; such a surface only passes
    /// producer calls through to the sink.
    pub display: Option<DisplayId>,
    pub sink: Box<dyn BufferSource>,
    pub scratch: Box<dyn BufferSource>,
    pub scratch_consumer: Box<dyn BufferConsumer>,
    pub compositor: Arc<dyn Compositor>,
}

/// Buffer orchestrator for one virtual display.
///
/// The compositor drives the frame (`begin_frame` .. `on_frame_committed`) while the GPU client
/// uses the producer half (`dequeue_buffer`, `queue_buffer`, ..). Both are expected on the same
/// thread, in protocol order.
#[derive(Debug)]
pub struct VirtualDisplaySurface {
    name: String,
    display: Option<DisplayId>,

    sink: Box<dyn BufferSource>,
    scratch: Box<dyn BufferSource>,
    scratch_consumer: Mutex<Box<dyn BufferConsumer>>,
    compositor: Arc<dyn Compositor>,
    policy: Box<dyn HandoffPolicy>,

    slots: ProducerSlotTable,
    frame: FrameState,
    protocol: ProtocolChecker,

    output_format: PixelFormat,
    output_usage: Usage,
    default_output_format: PixelFormat,
    /// Mode of the previous frame; only used to log transitions.
    last_mode: CompositionMode,
    queue_output: QueueBufferOutput,
}

impl VirtualDisplaySurface {
    pub fn new(parts: SurfaceParts, cfg: &VdsConfig) -> Result<Self, VdsError> {
        let policy = StandardHandoff::from_config(cfg);
        Self::with_policy(parts, cfg, Box::new(policy))
    }

    pub fn with_policy(
        parts: SurfaceParts,
        cfg: &VdsConfig,
        policy: Box<dyn HandoffPolicy>,
    ) -> Result<Self, VdsError> {
        cfg.validate()?;
        let SurfaceParts {
            display,
            mut sink,
            scratch,
            mut scratch_consumer,
            compositor,
        } = parts;
        let name = cfg.display_name.clone();

        let width = sink.query(Attribute::Width)?;
        let height = sink.query(Attribute::Height)?;
        let sink_usage = Usage::from_bits_retain(sink.query(Attribute::ConsumerUsageBits)?);
        let sink_format = PixelFormat(sink.query(Attribute::Format)?);

        // A CPU consumer has to be able to read what we write, so honor its format.
        let default_output_format = if sink_usage.needs_cpu_access() {
            sink_format
        } else {
            PixelFormat::IMPLEMENTATION_DEFINED
        };

        scratch_consumer.set_consumer_name(&format!("VDS: {name}"));
        scratch_consumer.set_consumer_usage_bits(Usage::HW_COMPOSER | Usage::HW_VIDEO_ENCODER)?;
        scratch_consumer.set_default_buffer_size(width, height)?;
        scratch_consumer.set_default_max_buffer_count(cfg.scratch_max_buffer_count)?;

        if let Some(count) = cfg.sink_buffer_count {
            sink.set_buffer_count(count)?;
        }

        debug!(
            display = %name,
            width,
            height,
            format = ?default_output_format,
            "virtual display surface created"
        );

        Ok(Self {
            name,
            display,
            sink,
            scratch,
            scratch_consumer: Mutex::new(scratch_consumer),
            compositor,
            policy,
            slots: ProducerSlotTable::new(),
            frame: FrameState::default(),
            protocol: ProtocolChecker::new(cfg.protocol_checks),
            output_format: default_output_format,
            output_usage: Usage::HW_COMPOSER,
            default_output_format,
            last_mode: CompositionMode::Gles,
            queue_output: QueueBufferOutput {
                width,
                height,
                transform_hint: 0,
                num_pending_buffers: 0,
            },
        })
    }

    // ---------------------------------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display(&self) -> Option<DisplayId> {
        self.display
    }

    pub fn mode(&self) -> CompositionMode {
        self.frame.mode
    }

    pub fn frame(&self) -> FrameState {
        self.frame
    }

    pub fn protocol_state(&self) -> ProtocolState {
        self.protocol.state()
    }

    /// Out-of-order protocol calls seen so far.
    pub fn protocol_violations(&self) -> u64 {
        self.protocol.violations()
    }

    /// The descriptor last reported by the sink.
    pub fn queue_output(&self) -> QueueBufferOutput {
        self.queue_output
    }

    pub fn slot_table(&self) -> &ProducerSlotTable {
        &self.slots
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            format: self.output_format,
            usage: self.output_usage,
        }
    }

    pub fn default_output_config(&self) -> OutputConfig {
        OutputConfig::compositor_default(self.default_output_format)
    }

    /// Human-readable state summary.
    pub fn dump(&self) -> String {
        let queued = self.scratch_consumer.lock().queued_count();
        let mut out = String::new();
        let _ = writeln!(out, "VirtualDisplaySurface \"{}\":", self.name);
        let _ = writeln!(
            out,
            "  display={} state={} mode={} last_mode={}",
            self.display
                .map_or_else(|| "none".to_string(), |d| d.to_string()),
            self.protocol.state(),
            self.frame.mode,
            self.last_mode
        );
        let _ = writeln!(
            out,
            "  sink={}x{} pending={} output_format={:?} output_usage={:?}",
            self.frame.sink_width,
            self.frame.sink_height,
            self.frame.sink_pending_buffers,
            self.output_format,
            self.output_usage
        );
        let slot = |s: Option<ProducerSlot>| s.map_or_else(|| "-".to_string(), |s| s.to_string());
        let _ = writeln!(
            out,
            "  output_slot={} fb_slot={} scratch_queued={} violations={}",
            slot(self.frame.output_slot()),
            slot(self.frame.fb_slot()),
            queued,
            self.protocol.violations()
        );
        for source in Source::ALL {
            let owned: Vec<String> = self
                .slots
                .slots_owned_by(source)
                .map(|s| s.to_string())
                .collect();
            let _ = writeln!(out, "  {source} slots: [{}]", owned.join(", "));
        }
        out
    }

    // ---------------------------------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------------------------------

    fn source_mut(&mut self, source: Source) -> &mut (dyn BufferSource + 'static) {
        match source {
            Source::Sink => self.sink.as_mut(),
            Source::Scratch => self.scratch.as_mut(),
        }
    }

    /// Dequeues from `source` and brings the slot table up to date.
    ///
    /// The returned flags include `NEEDS_REALLOCATION` whenever the handle was re-requested,
    /// even if the source itself kept the buffer.
    fn dequeue_from_source(
        &mut self,
        source: Source,
        format: PixelFormat,
        usage: Usage,
    ) -> Result<(ProducerSlot, Fence, DequeueFlags), VdsError> {
        let request = DequeueRequest {
            async_mode: source == Source::Sink,
            width: self.frame.sink_width,
            height: self.frame.sink_height,
            format,
            usage,
        };
        let dequeued = self.source_mut(source).dequeue_buffer(request)?;
        let pslot = source_to_producer(source, dequeued.slot)
            .ok_or(VdsError::InvalidSlot(dequeued.slot))?;

        // A sink running with more buffers than its share can reach into the scratch range.
        let held_by_other = self
            .slots
            .entry(pslot)?
            .owner()
            .is_some_and(|owner| owner != source);
        if held_by_other && self.frame.holds(pslot) {
            warn!(
                display = %self.name,
                %source,
                native = dequeued.slot,
                slot = %pslot,
                "dequeued slot collides with a live buffer of the other source"
            );
            if let Err(err) = self
                .source_mut(source)
                .cancel_buffer(dequeued.slot, dequeued.fence)
            {
                warn!(display = %self.name, %source, %err, "failed to cancel colliding buffer");
            }
            return Err(VdsError::SlotInUse(pslot.index()));
        }

        let mut flags = dequeued.flags;
        if self.slots.claim(pslot, source)? {
            flags |= DequeueFlags::NEEDS_REALLOCATION;
        }
        if flags.contains(DequeueFlags::RELEASE_ALL_BUFFERS) {
            let dropped = self.slots.release_all(source);
            debug!(display = %self.name, %source, dropped, "released all cached buffers");
        }
        if flags.contains(DequeueFlags::NEEDS_REALLOCATION) || self.slots.handle(pslot).is_none()
        {
            let buffer = self.source_mut(source).request_buffer(dequeued.slot)?;
            self.slots.store(pslot, source, buffer)?;
            flags |= DequeueFlags::NEEDS_REALLOCATION;
        }

        trace!(
            display = %self.name,
            %source,
            native = dequeued.slot,
            slot = %pslot,
            ?flags,
            "dequeued from source"
        );
        Ok((pslot, dequeued.fence, flags))
    }

    /// Swaps the reserved sink buffer for a fresh one at the current output config.
    fn refresh_output_buffer(&mut self) -> Result<DequeueFlags, VdsError> {
        if let Some(old) = self.frame.output {
            if let Some(native) = producer_to_source(Source::Sink, old.slot) {
                if let Err(err) = self.sink.cancel_buffer(native, old.fence) {
                    warn!(
                        display = %self.name,
                        slot = %old.slot,
                        %err,
                        "failed to cancel output buffer"
                    );
                }
            }
            self.frame = self.frame.without_output();
        }

        let (pslot, fence, flags) =
            self.dequeue_from_source(Source::Sink, self.output_format, self.output_usage)?;
        self.frame = self.frame.with_output(
            pslot,
            fence,
            flags.contains(DequeueFlags::NEEDS_REALLOCATION),
        );

        // The real acquire fence is only known once the producer queues.
        if let (Some(display), Some(buffer)) = (self.display, self.slots.handle(pslot)) {
            self.compositor
                .set_output_buffer(display, Fence::NO_FENCE, Arc::clone(buffer))?;
        }
        Ok(flags)
    }

    fn update_queue_output(&mut self, output: QueueBufferOutput) {
        // Buffers are never rotated on the way to the sink.
        self.queue_output = QueueBufferOutput {
            transform_hint: 0,
            ..output
        };
    }

    fn reset_per_frame_state(&mut self) {
        self.frame = self.frame.reset();
    }
}
