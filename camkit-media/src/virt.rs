//! In-process implementations of the kernel-node traits.
//!
//! A virtual capture node runs a worker thread that completes queued buffers
//! at a fixed frame interval, filling them through an installable frame
//! source. This is enough to drive the whole framework, pipeline handlers
//! included, on machines without the real hardware.

use std::{
    collections::{HashMap, VecDeque},
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};

use camkit_core::{
    geometry::{Rectangle, SizeRange},
    invalid_argument_error, invalid_state_error, time, Result,
};
use log::{debug, warn};

use crate::{
    backend::{BufferReadyFn, BufferStatus, FrameMetadata, SubdevOps, VideoNodeOps},
    format::{SubdevFormat, VideoFormat},
};

type FrameSourceFn = Box<dyn FnMut(u32, &mut [u8]) + Send>;

enum NodeCmd {
    Shutdown,
}

#[derive(Default)]
struct NodeState {
    format: Option<VideoFormat>,
    buffers: Vec<Vec<u8>>,
    queued: VecDeque<u32>,
    streaming: bool,
    sequence: u32,
    ready: Option<BufferReadyFn>,
    source: Option<FrameSourceFn>,
    error_burst: u32,
}

struct NodeShared {
    name: String,
    frame_interval_ms: u64,
    state: Mutex<NodeState>,
}

/// A virtual DMA capture node.
///
/// Queued buffers complete in queue order, one per frame interval while
/// streaming, with an incrementing sequence counter and monotonic timestamps.
/// [`inject_errors`] flags the next completions with an error status, the way
/// the vivid driver's error injection controls do.
///
/// [`inject_errors`]: VirtualCaptureNode::inject_errors
pub struct VirtualCaptureNode {
    shared: Arc<NodeShared>,
    cmd_tx: mpsc::Sender<NodeCmd>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl VirtualCaptureNode {
    pub fn new(name: &str, frame_interval_ms: u64) -> Arc<Self> {
        let shared = Arc::new(NodeShared {
            name: name.to_owned(),
            frame_interval_ms,
            state: Mutex::new(NodeState::default()),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel();

        let worker_shared = shared.clone();
        let worker = thread::spawn(move || Self::run(worker_shared, cmd_rx));

        Arc::new(Self {
            shared,
            cmd_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Install the generator filling completed buffers. Without one, buffers
    /// complete zeroed.
    pub fn set_frame_source<F>(&self, source: F)
    where
        F: FnMut(u32, &mut [u8]) + Send + 'static,
    {
        self.shared.state.lock().unwrap().source = Some(Box::new(source));
    }

    /// Mark the next `count` completions with an error status.
    pub fn inject_errors(&self, count: u32) {
        self.shared.state.lock().unwrap().error_burst = count;
    }

    fn run(shared: Arc<NodeShared>, cmd_rx: mpsc::Receiver<NodeCmd>) {
        let interval = Duration::from_millis(shared.frame_interval_ms);

        loop {
            match cmd_rx.recv_timeout(interval) {
                Ok(NodeCmd::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            let completion = {
                let mut state = shared.state.lock().unwrap();
                if !state.streaming {
                    continue;
                }

                let Some(index) = state.queued.pop_front() else {
                    continue;
                };

                let NodeState {
                    buffers,
                    source,
                    sequence,
                    error_burst,
                    ready,
                    ..
                } = &mut *state;

                let data = &mut buffers[index as usize];
                if let Some(source) = source {
                    source(*sequence, data);
                }

                let status = if *error_burst > 0 {
                    *error_burst -= 1;
                    BufferStatus::Error
                } else {
                    BufferStatus::Success
                };

                let metadata = FrameMetadata {
                    index,
                    status,
                    sequence: *sequence,
                    timestamp: time::clock_ns(),
                    bytesused: data.len() as u32,
                };
                *sequence += 1;

                ready.clone().map(|ready| (ready, metadata))
            };

            if let Some((ready, metadata)) = completion {
                ready(metadata);
            }
        }

        debug!("virtual capture node '{}' shut down", shared.name);
    }
}

impl VideoNodeOps for VirtualCaptureNode {
    fn set_format(&self, format: &mut VideoFormat) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if state.streaming {
            return Err(invalid_state_error!("node is streaming"));
        }

        if format.sizeimage == 0 {
            // Generous bound covering the packed raw and YUV layouts.
            format.sizeimage = format.size.width * format.size.height * 2;
        }

        state.format = Some(*format);
        Ok(())
    }

    fn format(&self) -> Option<VideoFormat> {
        self.shared.state.lock().unwrap().format
    }

    fn export_buffers(&self, count: u32) -> Result<u32> {
        let mut state = self.shared.state.lock().unwrap();
        let Some(format) = state.format else {
            return Err(invalid_state_error!("no format applied"));
        };
        if count == 0 {
            return Err(invalid_argument_error!("zero buffers requested"));
        }

        state.buffers = (0..count)
            .map(|_| vec![0u8; format.sizeimage as usize])
            .collect();
        Ok(count)
    }

    fn release_buffers(&self) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if state.streaming {
            return Err(invalid_state_error!("node is streaming"));
        }

        state.buffers.clear();
        state.queued.clear();
        Ok(())
    }

    fn queue_buffer(&self, index: u32) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if index as usize >= state.buffers.len() {
            return Err(invalid_argument_error!("buffer index out of range"));
        }
        if state.queued.contains(&index) {
            return Err(invalid_argument_error!("buffer already queued"));
        }

        state.queued.push_back(index);
        Ok(())
    }

    fn buffer_bytes(&self, index: u32) -> Result<Vec<u8>> {
        let state = self.shared.state.lock().unwrap();
        state
            .buffers
            .get(index as usize)
            .cloned()
            .ok_or_else(|| invalid_argument_error!("buffer index out of range"))
    }

    fn stream_on(&self) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if state.format.is_none() || state.buffers.is_empty() {
            return Err(invalid_state_error!("node not ready to stream"));
        }
        if state.streaming {
            return Err(invalid_state_error!("node already streaming"));
        }

        state.streaming = true;
        state.sequence = 0;
        Ok(())
    }

    fn stream_off(&self) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        state.streaming = false;
        state.queued.clear();
        Ok(())
    }

    fn set_buffer_ready(&self, callback: BufferReadyFn) {
        self.shared.state.lock().unwrap().ready = Some(callback);
    }
}

impl Drop for VirtualCaptureNode {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(NodeCmd::Shutdown);
        if let Some(worker) = self.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                warn!("virtual capture node '{}' worker panicked", self.shared.name);
            }
        }
    }
}

#[derive(Default)]
struct SubdevState {
    current: HashMap<u32, SubdevFormat>,
    crop: HashMap<u32, Rectangle>,
    compose: HashMap<u32, Rectangle>,
}

/// A virtual sub-device with a static media-bus format table.
pub struct VirtualSubdev {
    name: String,
    formats: Vec<(u32, Vec<SizeRange>)>,
    state: Mutex<SubdevState>,
}

impl VirtualSubdev {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_formats(name, Vec::new(), None)
    }

    /// A sub-device advertising `formats`, optionally pre-set to `initial`
    /// on pad 0 the way sensor drivers come up with a default format.
    pub fn with_formats(
        name: &str,
        formats: Vec<(u32, Vec<SizeRange>)>,
        initial: Option<SubdevFormat>,
    ) -> Arc<Self> {
        let mut state = SubdevState::default();
        if let Some(initial) = initial {
            state.current.insert(0, initial);
        }

        Arc::new(Self {
            name: name.to_owned(),
            formats,
            state: Mutex::new(state),
        })
    }
}

impl SubdevOps for VirtualSubdev {
    fn formats(&self, _pad: u32) -> Vec<(u32, Vec<SizeRange>)> {
        self.formats.clone()
    }

    fn set_format(&self, pad: u32, format: &mut SubdevFormat) -> Result<()> {
        debug!("'{}' pad {} accepts {}", self.name, pad, format);
        self.state.lock().unwrap().current.insert(pad, *format);
        Ok(())
    }

    fn format(&self, pad: u32) -> Result<SubdevFormat> {
        self.state
            .lock()
            .unwrap()
            .current
            .get(&pad)
            .copied()
            .ok_or_else(|| invalid_state_error!("no format applied"))
    }

    fn set_crop(&self, pad: u32, rect: &Rectangle) -> Result<()> {
        self.state.lock().unwrap().crop.insert(pad, *rect);
        Ok(())
    }

    fn set_compose(&self, pad: u32, rect: &Rectangle) -> Result<()> {
        self.state.lock().unwrap().compose.insert(pad, *rect);
        Ok(())
    }
}
