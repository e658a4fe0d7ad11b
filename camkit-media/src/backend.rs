use std::sync::Arc;

use camkit_core::{
    geometry::{Rectangle, SizeRange},
    Result,
};

use crate::format::{SubdevFormat, VideoFormat};

/// Completion status of a single frame buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BufferStatus {
    #[default]
    Pending,
    Success,
    Error,
    Cancelled,
}

/// Per-buffer completion metadata reported by a video node.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameMetadata {
    pub index: u32,
    pub status: BufferStatus,
    pub sequence: u32,
    /// Monotonic capture timestamp in nanoseconds.
    pub timestamp: u64,
    pub bytesused: u32,
}

pub type BufferReadyFn = Arc<dyn Fn(FrameMetadata) + Send + Sync>;

/// Kernel-side operations of a video device node.
///
/// The concrete kernel ABI stays outside the framework: entities carry an
/// implementation of this trait, installed when the media graph is built. The
/// `virt` module provides the in-process implementation used for development
/// and tests.
pub trait VideoNodeOps: Send + Sync {
    /// Apply `format`, adjusting it to what the device actually selected.
    fn set_format(&self, format: &mut VideoFormat) -> Result<()>;

    fn format(&self) -> Option<VideoFormat>;

    /// Allocate `count` buffers, returning the usable count.
    fn export_buffers(&self, count: u32) -> Result<u32>;

    fn release_buffers(&self) -> Result<()>;

    fn queue_buffer(&self, index: u32) -> Result<()>;

    /// Copy out the payload of an exported buffer.
    fn buffer_bytes(&self, index: u32) -> Result<Vec<u8>>;

    fn stream_on(&self) -> Result<()>;

    fn stream_off(&self) -> Result<()>;

    /// Install the completion callback. Invoked from the node's own context;
    /// the caller is responsible for rethreading.
    fn set_buffer_ready(&self, callback: BufferReadyFn);
}

/// Kernel-side operations of a sub-device.
pub trait SubdevOps: Send + Sync {
    /// Enumerate the media-bus formats and frame sizes producible on `pad`.
    fn formats(&self, pad: u32) -> Vec<(u32, Vec<SizeRange>)>;

    /// Apply `format` on `pad`, adjusting it to the device's selection.
    fn set_format(&self, pad: u32, format: &mut SubdevFormat) -> Result<()>;

    fn format(&self, pad: u32) -> Result<SubdevFormat>;

    fn set_crop(&self, pad: u32, rect: &Rectangle) -> Result<()>;

    fn set_compose(&self, pad: u32, rect: &Rectangle) -> Result<()>;
}
