//! Buffer-pool collaborator contracts.
//!
//! A pool exposes a *producer* side (`BufferSource`) keyed by its own native slot index, and
//! optionally a *consumer* side (`BufferConsumer`). The orchestrator is a producer of the sink
//! pool, and both producer and consumer of the scratch pool.

use std::fmt;

use crate::buffer::{
    Attribute, BufferHandle, ConnectApi, DequeueFlags, Fence, PixelFormat, QueueBufferInput,
    QueueBufferOutput, Usage,
};
use crate::error::SourceError;

/// Parameters of a producer-side dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueRequest {
    /// Set toward the sink so a slow consumer cannot stall the producer.
    pub async_mode: bool,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: Usage,
}

/// A slot handed out by a pool, in that pool's native numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedSlot {
    pub slot: usize,
    /// Signals when the previous user of the buffer is done with it.
    pub fence: Fence,
    pub flags: DequeueFlags,
}

/// A buffer taken by the consumer side of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredBuffer {
    pub slot: usize,
    /// The producer's fence from `queue_buffer`.
    pub fence: Fence,
    pub buffer: Option<BufferHandle>,
}

/// Producer side of a buffer pool.
pub trait BufferSource: Send + fmt::Debug {
    fn dequeue_buffer(&mut self, request: DequeueRequest) -> Result<DequeuedSlot, SourceError>;

    fn request_buffer(&mut self, slot: usize) -> Result<BufferHandle, SourceError>;

    fn queue_buffer(
        &mut self,
        slot: usize,
        input: &QueueBufferInput,
    ) -> Result<QueueBufferOutput, SourceError>;

    fn cancel_buffer(&mut self, slot: usize, fence: Fence) -> Result<(), SourceError>;

    fn connect(
        &mut self,
        api: ConnectApi,
        producer_controlled_by_app: bool,
    ) -> Result<QueueBufferOutput, SourceError>;

    fn disconnect(&mut self, api: ConnectApi) -> Result<(), SourceError>;

    fn set_buffer_count(&mut self, count: usize) -> Result<(), SourceError>;

    fn query(&self, attribute: Attribute) -> Result<u32, SourceError>;
}

/// Consumer side of a buffer pool.
pub trait BufferConsumer: Send + fmt::Debug {
    fn acquire_buffer(&mut self) -> Result<AcquiredBuffer, SourceError>;

    /// Hands `slot` back to the pool; `fence` signals when the consumer stopped reading.
    fn release_buffer(&mut self, slot: usize, fence: Fence) -> Result<(), SourceError>;

    fn set_consumer_name(&mut self, name: &str);

    fn set_consumer_usage_bits(&mut self, usage: Usage) -> Result<(), SourceError>;

    fn set_default_buffer_size(&mut self, width: u32, height: u32) -> Result<(), SourceError>;

    fn set_default_max_buffer_count(&mut self, count: usize) -> Result<(), SourceError>;

    /// Number of buffers waiting to be acquired.
    fn queued_count(&self) -> usize;
}
