use std::sync::{Arc, Mutex};

use camkit_media::{BufferStatus, FrameMetadata};

use crate::stream::Stream;

/// A single frame container.
///
/// Buffers index into the pool their owning [`Stream`] exported on the
/// capture device. A buffer is created by the stream, borrowed by a
/// [`Request`] while queued, and handed back to the application through the
/// completion signals; recycling means creating a fresh buffer for the same
/// index once its request has completed.
///
/// [`Request`]: crate::request::Request
pub struct FrameBuffer {
    stream: Arc<Stream>,
    index: u32,
    metadata: Mutex<FrameMetadata>,
}

impl FrameBuffer {
    pub(crate) fn new(stream: Arc<Stream>, index: u32) -> Self {
        Self {
            stream,
            index,
            metadata: Mutex::new(FrameMetadata {
                index,
                ..Default::default()
            }),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    pub fn status(&self) -> BufferStatus {
        self.metadata.lock().unwrap().status
    }

    pub fn metadata(&self) -> FrameMetadata {
        *self.metadata.lock().unwrap()
    }

    pub(crate) fn set_metadata(&self, metadata: FrameMetadata) {
        *self.metadata.lock().unwrap() = metadata;
    }

    pub(crate) fn cancel(&self) {
        self.metadata.lock().unwrap().status = BufferStatus::Cancelled;
    }
}
