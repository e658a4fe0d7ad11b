use std::sync::{Arc, Mutex};

use camkit_core::{invalid_argument_error, Result};
use camkit_media::FourCc;

use crate::buffer::FrameBuffer;

/// Hints about what a stream will be used for, mapped by the pipeline
/// handler onto suitable default configurations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamRole {
    StillCapture,
    VideoRecording,
    Viewfinder,
}

/// Geometry and depth of one stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamConfiguration {
    pub width: u32,
    pub height: u32,
    pub pixel_format: FourCc,
    pub buffer_count: u32,
}

/// A logical frame producer on a camera.
///
/// Carries the currently applied [`StreamConfiguration`] and the pool of
/// index-addressed buffers exported on the capture device; buffers for
/// request submission come from [`create_buffer`].
///
/// [`create_buffer`]: Stream::create_buffer
pub struct Stream {
    index: usize,
    state: Mutex<StreamState>,
}

struct StreamState {
    configuration: StreamConfiguration,
    allocated: u32,
}

impl Stream {
    pub(crate) fn new(index: usize) -> Arc<Self> {
        Arc::new(Self {
            index,
            state: Mutex::new(StreamState {
                configuration: StreamConfiguration {
                    width: 0,
                    height: 0,
                    pixel_format: FourCc::new(b"\0\0\0\0"),
                    buffer_count: 0,
                },
                allocated: 0,
            }),
        })
    }

    /// Position of this stream in its camera's stream set.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn configuration(&self) -> StreamConfiguration {
        self.state.lock().unwrap().configuration
    }

    pub(crate) fn set_configuration(&self, configuration: StreamConfiguration) {
        self.state.lock().unwrap().configuration = configuration;
    }

    /// Number of buffers currently in the pool.
    pub fn allocated_buffers(&self) -> u32 {
        self.state.lock().unwrap().allocated
    }

    pub(crate) fn set_allocated(&self, count: u32) {
        self.state.lock().unwrap().allocated = count;
    }

    /// Create a buffer handle for pool slot `index`.
    pub fn create_buffer(self: &Arc<Self>, index: u32) -> Result<FrameBuffer> {
        let state = self.state.lock().unwrap();
        if index >= state.allocated {
            return Err(invalid_argument_error!("buffer index outside the pool"));
        }

        Ok(FrameBuffer::new(self.clone(), index))
    }
}
