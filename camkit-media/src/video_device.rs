use std::sync::{Arc, Mutex};

use camkit_core::{invalid_state_error, not_found_error, Result, Signal};
use log::debug;

use crate::{
    backend::{FrameMetadata, VideoNodeOps},
    format::VideoFormat,
    graph::MediaDevice,
};

#[derive(Default)]
struct VideoDeviceState {
    opened: bool,
    format: Option<VideoFormat>,
    exported: u32,
    streaming: bool,
}

/// A video device node: the DMA endpoint of a media entity.
///
/// Wraps the entity's kernel node with the ordering invariants of the capture
/// ABI: a format must be applied before buffers are exported, buffer
/// operations are only valid between [`export_buffers`] and
/// [`release_buffers`], and streaming requires both.
///
/// Completions surface on [`buffer_ready`], emitted from the node's delivery
/// context; receivers rethread with a queued connection.
///
/// [`export_buffers`]: VideoDevice::export_buffers
/// [`release_buffers`]: VideoDevice::release_buffers
/// [`buffer_ready`]: VideoDevice::buffer_ready
pub struct VideoDevice {
    entity_name: String,
    ops: Arc<dyn VideoNodeOps>,
    state: Mutex<VideoDeviceState>,
    pub buffer_ready: Arc<Signal<FrameMetadata>>,
}

impl VideoDevice {
    /// Look up the entity called `name` and wrap its video node.
    pub fn from_entity_name(media: &Arc<MediaDevice>, name: &str) -> Result<VideoDevice> {
        let entity = media
            .entity_by_name(name)
            .ok_or_else(|| not_found_error!("video entity"))?;
        let ops = entity
            .video_node()
            .ok_or_else(|| not_found_error!("video node"))?;

        Ok(VideoDevice {
            entity_name: name.to_owned(),
            ops,
            state: Mutex::new(VideoDeviceState::default()),
            buffer_ready: Arc::new(Signal::new()),
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.opened {
            return Err(invalid_state_error!("video device already open"));
        }
        state.opened = true;
        drop(state);

        let signal = self.buffer_ready.clone();
        self.ops
            .set_buffer_ready(Arc::new(move |metadata| signal.emit(metadata)));

        debug!("opened video device '{}'", self.entity_name);
        Ok(())
    }

    pub fn set_format(&self, format: &mut VideoFormat) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.opened {
            return Err(invalid_state_error!("video device not open"));
        }

        self.ops.set_format(format)?;
        state.format = Some(*format);
        debug!("'{}' format set to {}", self.entity_name, format);
        Ok(())
    }

    pub fn format(&self) -> Option<VideoFormat> {
        self.state.lock().unwrap().format
    }

    /// Allocate `count` buffers on the node, returning the usable count.
    pub fn export_buffers(&self, count: u32) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        if !state.opened || state.format.is_none() {
            return Err(invalid_state_error!("video device not configured"));
        }
        if state.exported != 0 {
            return Err(invalid_state_error!("buffers already exported"));
        }

        let exported = self.ops.export_buffers(count)?;
        state.exported = exported;
        Ok(exported)
    }

    pub fn release_buffers(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.streaming {
            return Err(invalid_state_error!("video device streaming"));
        }
        if state.exported == 0 {
            return Err(invalid_state_error!("no buffers exported"));
        }

        self.ops.release_buffers()?;
        state.exported = 0;
        Ok(())
    }

    pub fn queue_buffer(&self, index: u32) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.exported == 0 {
                return Err(invalid_state_error!("no buffers exported"));
            }
        }

        self.ops.queue_buffer(index)
    }

    /// Copy out the payload of a completed buffer.
    pub fn buffer_bytes(&self, index: u32) -> Result<Vec<u8>> {
        self.ops.buffer_bytes(index)
    }

    pub fn stream_on(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.format.is_none() || state.exported == 0 {
            return Err(invalid_state_error!("video device not ready to stream"));
        }
        if state.streaming {
            return Err(invalid_state_error!("video device already streaming"));
        }

        self.ops.stream_on()?;
        state.streaming = true;
        Ok(())
    }

    pub fn stream_off(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.streaming {
            return Err(invalid_state_error!("video device not streaming"));
        }

        self.ops.stream_off()?;
        state.streaming = false;
        Ok(())
    }

    pub fn streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }
}
