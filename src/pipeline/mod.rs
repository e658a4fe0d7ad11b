pub mod ipu3;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use camkit_core::Result;
use camkit_media::DeviceEnumerator;

use crate::{
    camera::Camera,
    request::Request,
    stream::{StreamConfiguration, StreamRole},
};

/// A SoC-specific pipeline orchestrator.
///
/// A handler claims media devices out of the enumerator during
/// [`match_devices`], registers one camera per usable sensor, and afterwards
/// services the per-camera operations the [`Camera`] layer forwards. Cameras
/// address their handler's state by name.
///
/// [`match_devices`]: PipelineHandler::match_devices
pub trait PipelineHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Claim devices and register cameras. Returns true when this handler
    /// now owns a matched pipeline.
    fn match_devices(self: Arc<Self>, enumerator: &DeviceEnumerator) -> bool;

    /// The cameras registered by a successful match.
    fn cameras(&self) -> Vec<Camera>;

    /// Default configuration for the streams covering `roles`.
    fn stream_configuration(
        &self,
        camera: &str,
        roles: &[StreamRole],
    ) -> Result<Vec<StreamConfiguration>>;

    fn configure_streams(&self, camera: &str, config: &[StreamConfiguration]) -> Result<()>;

    fn allocate_buffers(&self, camera: &str, stream: usize) -> Result<()>;

    fn free_buffers(&self, camera: &str, stream: usize) -> Result<()>;

    fn start(&self, camera: &str) -> Result<()>;

    /// Stop capture, cancelling every queued request with completion
    /// signals so the application can recycle the buffers.
    fn stop(&self, camera: &str);

    fn queue_request(&self, camera: &str, request: Arc<Request>) -> Result<()>;
}

/// The per-camera FIFO of in-flight requests.
///
/// The pipeline completes requests strictly in the order they were queued;
/// the head of this queue is the request the next ingress completion
/// belongs to.
#[derive(Default)]
pub(crate) struct RequestQueue {
    queued: Mutex<VecDeque<Arc<Request>>>,
}

impl RequestQueue {
    pub(crate) fn push(&self, request: Arc<Request>) {
        self.queued.lock().unwrap().push_back(request);
    }

    pub(crate) fn head(&self) -> Option<Arc<Request>> {
        self.queued.lock().unwrap().front().cloned()
    }

    pub(crate) fn pop(&self) -> Option<Arc<Request>> {
        self.queued.lock().unwrap().pop_front()
    }

    /// Undo the most recent push, for queueing error paths.
    pub(crate) fn pop_back(&self) -> Option<Arc<Request>> {
        self.queued.lock().unwrap().pop_back()
    }

    pub(crate) fn drain(&self) -> Vec<Arc<Request>> {
        self.queued.lock().unwrap().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.queued.lock().unwrap().len()
    }
}
