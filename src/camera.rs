use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

use camkit_core::{
    error::Error, invalid_state_error, no_device_error, Object, ObjectCore, Result, Signal,
};
use camkit_media::FrameMetadata;
use log::{info, warn};

use crate::{
    pipeline::PipelineHandler,
    request::{Request, RequestStatus},
    stream::{Stream, StreamConfiguration, StreamRole},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CameraState {
    Available,
    Acquired,
    Configured,
    Running,
}

/// The stream set an application wants, one entry per requested role.
///
/// Produced by [`Camera::generate_configuration`] with pipeline defaults;
/// entries may be adjusted before [`Camera::configure`].
#[derive(Clone, Debug, Default)]
pub struct CameraConfiguration {
    configs: Vec<StreamConfiguration>,
}

impl CameraConfiguration {
    pub(crate) fn new(configs: Vec<StreamConfiguration>) -> Self {
        Self {
            configs,
        }
    }

    pub fn at(&self, index: usize) -> Option<&StreamConfiguration> {
        self.configs.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut StreamConfiguration> {
        self.configs.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamConfiguration> {
        self.configs.iter()
    }

    pub(crate) fn configs(&self) -> &[StreamConfiguration] {
        &self.configs
    }
}

/// Payload of the `buffer_completed` signal.
#[derive(Clone)]
pub struct BufferCompleted {
    pub request: Arc<Request>,
    pub stream: usize,
    pub metadata: FrameMetadata,
}

/// The public handle to one logical camera.
///
/// State machine: `Available → Acquired → Configured → Running`, with
/// `release` returning to `Available` from anywhere. Every transition
/// validates its source state and fails with an invalid-state error
/// otherwise, leaving the camera unchanged.
#[derive(Clone)]
pub struct Camera {
    inner: Arc<CameraInner>,
}

pub(crate) struct CameraInner {
    core: ObjectCore,
    name: String,
    pipe: Weak<dyn PipelineHandler>,
    streams: Vec<Arc<Stream>>,
    state: Mutex<CameraState>,
    allocated: AtomicBool,
    next_cookie: AtomicU64,
    buffer_completed: Signal<BufferCompleted>,
    request_completed: Signal<Arc<Request>>,
}

impl Object for CameraInner {
    fn object_core(&self) -> &ObjectCore {
        &self.core
    }
}

impl Camera {
    pub(crate) fn new(
        name: &str,
        streams: Vec<Arc<Stream>>,
        pipe: Weak<dyn PipelineHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(CameraInner {
                core: ObjectCore::new(),
                name: name.to_owned(),
                pipe,
                streams,
                state: Mutex::new(CameraState::Available),
                allocated: AtomicBool::new(false),
                next_cookie: AtomicU64::new(1),
                buffer_completed: Signal::new(),
                request_completed: Signal::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> CameraState {
        *self.inner.state.lock().unwrap()
    }

    pub fn streams(&self) -> &[Arc<Stream>] {
        &self.inner.streams
    }

    /// Emitted as each buffer of a request completes, before the request's
    /// own completion.
    pub fn buffer_completed(&self) -> &Signal<BufferCompleted> {
        &self.inner.buffer_completed
    }

    /// Emitted once per request, in queueing order.
    pub fn request_completed(&self) -> &Signal<Arc<Request>> {
        &self.inner.request_completed
    }

    fn pipe(&self) -> Result<Arc<dyn PipelineHandler>> {
        self.inner
            .pipe
            .upgrade()
            .ok_or_else(|| no_device_error!("pipeline handler is gone"))
    }

    fn expect_state(&self, expected: &[CameraState]) -> Result<CameraState> {
        let state = *self.inner.state.lock().unwrap();
        if expected.contains(&state) {
            Ok(state)
        } else {
            Err(invalid_state_error!("operation not valid in this state"))
        }
    }

    fn set_state(&self, state: CameraState) {
        *self.inner.state.lock().unwrap() = state;
    }

    /// Take exclusive application ownership of the camera.
    pub fn acquire(&self) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        if *state != CameraState::Available {
            return Err(Error::Busy("camera already in use".into()));
        }
        *state = CameraState::Acquired;
        Ok(())
    }

    /// Give the camera back, from any state. A running capture is stopped
    /// and allocated buffers are freed, best effort.
    pub fn release(&self) -> Result<()> {
        if self.state() == CameraState::Running {
            if let Err(e) = self.stop() {
                warn!("stopping '{}' on release failed: {e}", self.inner.name);
            }
        }
        if self.inner.allocated.load(Ordering::Acquire) {
            if let Err(e) = self.free_buffers() {
                warn!("freeing buffers of '{}' on release failed: {e}", self.inner.name);
            }
        }

        self.set_state(CameraState::Available);
        Ok(())
    }

    /// Default stream configurations for the requested roles.
    pub fn generate_configuration(
        &self,
        roles: &[StreamRole],
    ) -> Result<CameraConfiguration> {
        let configs = self.pipe()?.stream_configuration(&self.inner.name, roles)?;
        Ok(CameraConfiguration::new(configs))
    }

    /// Apply `config` to the pipeline.
    ///
    /// Fails without side effects when the configuration violates the
    /// pipeline's constraints.
    pub fn configure(&self, config: &CameraConfiguration) -> Result<()> {
        self.expect_state(&[CameraState::Acquired, CameraState::Configured])?;

        self.pipe()?.configure_streams(&self.inner.name, config.configs())?;

        for (stream, cfg) in self.inner.streams.iter().zip(config.iter()) {
            stream.set_configuration(*cfg);
        }

        info!("camera '{}' configured", self.inner.name);
        self.set_state(CameraState::Configured);
        Ok(())
    }

    pub fn allocate_buffers(&self) -> Result<()> {
        self.expect_state(&[CameraState::Configured])?;
        if self.inner.allocated.load(Ordering::Acquire) {
            return Err(invalid_state_error!("buffers already allocated"));
        }

        let pipe = self.pipe()?;
        for (index, _) in self.inner.streams.iter().enumerate() {
            if let Err(e) = pipe.allocate_buffers(&self.inner.name, index) {
                // Release whatever the earlier streams got.
                for released in 0..index {
                    let _ = pipe.free_buffers(&self.inner.name, released);
                }
                return Err(e);
            }
        }

        self.inner.allocated.store(true, Ordering::Release);
        Ok(())
    }

    pub fn free_buffers(&self) -> Result<()> {
        if self.state() == CameraState::Running {
            return Err(invalid_state_error!("camera is running"));
        }
        if !self.inner.allocated.load(Ordering::Acquire) {
            return Err(invalid_state_error!("no buffers allocated"));
        }

        let pipe = self.pipe()?;
        for (index, _) in self.inner.streams.iter().enumerate() {
            pipe.free_buffers(&self.inner.name, index)?;
        }

        self.inner.allocated.store(false, Ordering::Release);
        Ok(())
    }

    /// Create an empty request bound to this camera.
    pub fn create_request(&self) -> Request {
        let cookie = self.inner.next_cookie.fetch_add(1, Ordering::Relaxed);
        Request::new(&self.inner.name, cookie, self.inner.streams.clone())
    }

    /// Hand `request` to the pipeline. Valid only while running.
    pub fn queue_request(&self, request: Request) -> Result<()> {
        self.expect_state(&[CameraState::Running])?;

        request.start_pending();
        self.pipe()?.queue_request(&self.inner.name, Arc::new(request))
    }

    pub fn start(&self) -> Result<()> {
        self.expect_state(&[CameraState::Configured])?;
        if !self.inner.allocated.load(Ordering::Acquire) {
            return Err(invalid_state_error!("no buffers allocated"));
        }

        self.pipe()?.start(&self.inner.name)?;
        info!("camera '{}' started", self.inner.name);
        self.set_state(CameraState::Running);
        Ok(())
    }

    /// Stop the capture session.
    ///
    /// Outstanding requests are cancelled before this returns: each of their
    /// buffers completes with a cancelled status, then the request itself,
    /// preserving queueing order. No signal from the stopped run is
    /// observable afterwards.
    pub fn stop(&self) -> Result<()> {
        self.expect_state(&[CameraState::Running])?;

        // Leave the running state first so completion slots of the old run
        // and re-entrant calls from cancellation signals see it closed.
        self.set_state(CameraState::Configured);
        self.pipe()?.stop(&self.inner.name);
        info!("camera '{}' stopped", self.inner.name);
        Ok(())
    }

    pub(crate) fn inner(&self) -> &Arc<CameraInner> {
        &self.inner
    }

    /// Report one completed buffer of `request` to the application.
    pub(crate) fn complete_buffer(
        &self,
        request: &Arc<Request>,
        stream: usize,
        metadata: FrameMetadata,
    ) {
        if let Some(buffer) = request.buffer(stream) {
            buffer.set_metadata(metadata);
        } else {
            warn!("completion for a stream the request does not carry");
        }

        self.inner.buffer_completed.emit(BufferCompleted {
            request: request.clone(),
            stream,
            metadata,
        });
    }

    /// Report `request` complete. All of its buffers must have completed.
    pub(crate) fn complete_request(&self, request: Arc<Request>, status: RequestStatus) {
        request.set_status(status);
        self.inner.request_completed.emit(request);
    }
}
