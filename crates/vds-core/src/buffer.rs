//! Buffer, fence and descriptor value types shared by sources, consumers and the compositor.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

// -------------------------------------------------------------------------------------------------
// Fences
// -------------------------------------------------------------------------------------------------

/// A synchronization fence handle. `Fence::NO_FENCE` means "already signalled / none".
///
/// Fences are opaque at this layer: they are only carried between pools and the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fence(Option<NonZeroU64>);

impl Fence {
    pub const NO_FENCE: Fence = Fence(None);

    /// Wraps a raw fence id; 0 maps to `NO_FENCE`.
    pub fn from_raw(raw: u64) -> Self {
        Fence(NonZeroU64::new(raw))
    }

    pub fn raw(self) -> u64 {
        self.0.map_or(0, NonZeroU64::get)
    }

    pub fn is_valid(self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "fence#{id}"),
            None => f.write_str("no-fence"),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Format / usage
// -------------------------------------------------------------------------------------------------

/// Pixel format code as negotiated with the allocation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    /// "Let the pool pick": dequeue requests with this format use the pool default.
    pub const UNSPECIFIED: PixelFormat = PixelFormat(0);
    pub const RGBA_8888: PixelFormat = PixelFormat(1);
    pub const RGBX_8888: PixelFormat = PixelFormat(2);
    pub const RGB_888: PixelFormat = PixelFormat(3);
    pub const RGB_565: PixelFormat = PixelFormat(4);
    pub const BGRA_8888: PixelFormat = PixelFormat(5);
    /// The allocator chooses the concrete layout from the usage bits.
    pub const IMPLEMENTATION_DEFINED: PixelFormat = PixelFormat(0x22);
    pub const YCBCR_420_888: PixelFormat = PixelFormat(0x23);

    pub fn is_unspecified(self) -> bool {
        self == PixelFormat::UNSPECIFIED
    }
}

bitflags! {
    /// Buffer usage bits. The software masks are multi-bit fields, not single flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Usage: u32 {
        const SW_READ_RARELY = 0x0000_0002;
        const SW_READ_OFTEN = 0x0000_0003;
        const SW_READ_MASK = 0x0000_000F;
        const SW_WRITE_RARELY = 0x0000_0020;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const SW_WRITE_MASK = 0x0000_00F0;
        const HW_TEXTURE = 0x0000_0100;
        const HW_RENDER = 0x0000_0200;
        const HW_2D = 0x0000_0400;
        const HW_COMPOSER = 0x0000_0800;
        const HW_FB = 0x0000_1000;
        const HW_VIDEO_ENCODER = 0x0001_0000;
    }
}

impl Usage {
    /// True when the consumer reads or writes the buffer from the CPU.
    pub fn needs_cpu_access(self) -> bool {
        self.intersects(Usage::SW_READ_MASK | Usage::SW_WRITE_MASK)
    }
}

bitflags! {
    /// Result flags attached to a successful dequeue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DequeueFlags: u32 {
        /// The handle cached for this slot is stale; call `request_buffer` again.
        const NEEDS_REALLOCATION = 0x1;
        /// Every handle previously obtained from this source is invalid.
        const RELEASE_ALL_BUFFERS = 0x2;
    }
}

// -------------------------------------------------------------------------------------------------
// Buffers
// -------------------------------------------------------------------------------------------------

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// An allocated graphics buffer. Allocation itself is external; this is the negotiated result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicBuffer {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: Usage,
}

/// Shared handle to a graphics buffer; cloned freely between pools and slot tables.
pub type BufferHandle = Arc<GraphicBuffer>;

impl GraphicBuffer {
    /// Creates a handle with a process-unique id.
    pub fn allocate(width: u32, height: u32, format: PixelFormat, usage: Usage) -> BufferHandle {
        Arc::new(GraphicBuffer {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            usage,
        })
    }

    /// Whether this buffer satisfies a request. Zero width/height/format mean "don't care".
    pub fn satisfies(&self, width: u32, height: u32, format: PixelFormat, usage: Usage) -> bool {
        usage.difference(self.usage).is_empty()
            && (format.is_unspecified() || format == self.format)
            && (width == 0 || width == self.width)
            && (height == 0 || height == self.height)
    }
}

// -------------------------------------------------------------------------------------------------
// Queue descriptors
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// A rect anchored at the origin covering `width` x `height`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Rect {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalingMode {
    /// Buffers whose size differs from the window are not scaled.
    #[default]
    Freeze,
    ScaleToWindow,
    ScaleCrop,
}

/// Everything a producer attaches when it queues a filled buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueBufferInput {
    /// Monotonic nanoseconds.
    pub timestamp: i64,
    pub is_auto_timestamp: bool,
    pub crop: Rect,
    pub scaling_mode: ScalingMode,
    pub transform: u32,
    pub async_mode: bool,
    /// Signals when the producer's writes are complete.
    pub fence: Fence,
}

impl QueueBufferInput {
    /// An auto-timestamped input carrying only a fence (what most GPU clients send).
    pub fn with_fence(fence: Fence) -> Self {
        QueueBufferInput {
            timestamp: 0,
            is_auto_timestamp: true,
            crop: Rect::default(),
            scaling_mode: ScalingMode::Freeze,
            transform: 0,
            async_mode: true,
            fence,
        }
    }
}

/// What a pool reports back after connect/queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueBufferOutput {
    pub width: u32,
    pub height: u32,
    pub transform_hint: u32,
    pub num_pending_buffers: u32,
}

// -------------------------------------------------------------------------------------------------
// Query / connect vocabulary
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Width,
    Height,
    Format,
    ConsumerUsageBits,
    MinUndequeuedBuffers,
    DefaultWidth,
    DefaultHeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectApi {
    Egl,
    Cpu,
    Media,
    Camera,
}
