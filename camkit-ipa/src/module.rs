use camkit_core::{controls::ControlList, Result};

use crate::{
    algorithm::Algorithm,
    context::{FrameContexts, IpaContext, SensorInfo},
    params::{IspParams, IspStats},
};

/// How far statistics delivery may lag request submission.
const FRAME_CONTEXT_DEPTH: usize = 16;

/// The per-camera algorithm harness.
///
/// Holds the process-lived [`IpaContext`], the bounded frame-context ring and
/// an ordered list of algorithms; every per-frame operation runs the
/// algorithms in registration order against the same frame context.
pub struct IpaModule {
    context: IpaContext,
    algorithms: Vec<Box<dyn Algorithm>>,
    frame_contexts: FrameContexts,
}

impl IpaModule {
    pub fn new() -> Self {
        Self {
            context: IpaContext::default(),
            algorithms: Vec::new(),
            frame_contexts: FrameContexts::new(FRAME_CONTEXT_DEPTH),
        }
    }

    pub fn register(&mut self, algorithm: Box<dyn Algorithm>) {
        self.algorithms.push(algorithm);
    }

    /// Run once per stream configuration.
    pub fn configure(&mut self, sensor_info: &SensorInfo) -> Result<()> {
        self.context.configuration.sensor = sensor_info.clone();

        for algorithm in self.algorithms.iter_mut() {
            algorithm.configure(&mut self.context, sensor_info)?;
        }
        Ok(())
    }

    /// Latch the accepted request's controls for `frame`.
    pub fn queue_request(&mut self, frame: u32, controls: &ControlList) {
        let frame_context = self.frame_contexts.init(frame);

        for algorithm in self.algorithms.iter_mut() {
            algorithm.queue_request(&mut self.context, frame, frame_context, controls);
        }
    }

    /// Fill the parameter buffer the hardware ingests ahead of `frame`.
    pub fn prepare(&mut self, frame: u32, params: &mut IspParams) {
        let frame_context = self.frame_contexts.get(frame);

        for algorithm in self.algorithms.iter_mut() {
            algorithm.prepare(&mut self.context, frame, frame_context, params);
        }
    }

    /// Consume the statistics measured over `frame`.
    pub fn process(&mut self, frame: u32, stats: &IspStats) {
        let frame_context = self.frame_contexts.get(frame);

        for algorithm in self.algorithms.iter_mut() {
            algorithm.process(&mut self.context, frame, frame_context, stats);
        }
    }

    pub fn context(&self) -> &IpaContext {
        &self.context
    }
}

impl Default for IpaModule {
    fn default() -> Self {
        Self::new()
    }
}
