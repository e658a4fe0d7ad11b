use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use camkit_core::{controls::ControlList, invalid_argument_error, Result};

use crate::{buffer::FrameBuffer, stream::Stream};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestStatus {
    Pending,
    Complete,
    Cancelled,
}

/// A unit of capture work: one buffer per participating stream plus the
/// control overrides for that frame.
///
/// A request is built while exclusively owned, queued on exactly one camera,
/// and completes exactly once. After queueing, the pipeline owns it; the
/// application sees it again as a shared handle in the completion signals.
pub struct Request {
    camera: String,
    cookie: u64,
    streams: Vec<Arc<Stream>>,
    buffers: HashMap<usize, FrameBuffer>,
    controls: ControlList,
    status: Mutex<RequestStatus>,
    pending: AtomicUsize,
}

impl Request {
    pub(crate) fn new(camera: &str, cookie: u64, streams: Vec<Arc<Stream>>) -> Self {
        Self {
            camera: camera.to_owned(),
            cookie,
            streams,
            buffers: HashMap::new(),
            controls: ControlList::new(),
            status: Mutex::new(RequestStatus::Pending),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    /// Associate `buffer` with its owning stream.
    ///
    /// Rejects buffers of foreign streams and second buffers for a stream
    /// already covered.
    pub fn add_buffer(&mut self, buffer: FrameBuffer) -> Result<()> {
        let stream = buffer.stream();
        if !self.streams.iter().any(|s| Arc::ptr_eq(s, stream)) {
            return Err(invalid_argument_error!("buffer belongs to a foreign stream"));
        }

        let index = stream.index();
        if self.buffers.contains_key(&index) {
            return Err(invalid_argument_error!("stream already has a buffer"));
        }

        self.buffers.insert(index, buffer);
        Ok(())
    }

    pub fn buffers(&self) -> &HashMap<usize, FrameBuffer> {
        &self.buffers
    }

    pub fn buffer(&self, stream_index: usize) -> Option<&FrameBuffer> {
        self.buffers.get(&stream_index)
    }

    pub fn find_buffer(&self, stream: &Arc<Stream>) -> Option<&FrameBuffer> {
        self.buffers
            .get(&stream.index())
            .filter(|buffer| Arc::ptr_eq(buffer.stream(), stream))
    }

    pub fn controls(&self) -> &ControlList {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlList {
        &mut self.controls
    }

    pub fn status(&self) -> RequestStatus {
        *self.status.lock().unwrap()
    }

    pub(crate) fn set_status(&self, status: RequestStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Arm the completion accounting at queue time.
    pub(crate) fn start_pending(&self) {
        self.pending.store(self.buffers.len(), Ordering::Release);
    }

    /// Record one buffer completion; true once every buffer has completed.
    pub(crate) fn buffer_completed(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }
}
