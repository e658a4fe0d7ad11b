use camkit_core::{controls::ControlList, Result};

use crate::{
    context::{IpaContext, IpaFrameContext, SensorInfo},
    params::{IspParams, IspStats},
};

/// A per-frame control algorithm.
///
/// The harness invokes the operations in a fixed order for every frame:
/// `queue_request` when the application's request is accepted, `prepare`
/// before the hardware ingests the frame, `process` once its statistics have
/// been delivered. `configure` runs once per stream configuration.
pub trait Algorithm: Send {
    /// Establish calibration, clip ranges and initial state.
    fn configure(&mut self, context: &mut IpaContext, sensor_info: &SensorInfo) -> Result<()> {
        let _ = (context, sensor_info);
        Ok(())
    }

    /// Latch the request's control overrides for `frame` into the frame
    /// context.
    fn queue_request(
        &mut self,
        context: &mut IpaContext,
        frame: u32,
        frame_context: &mut IpaFrameContext,
        controls: &ControlList,
    ) {
        let _ = (context, frame, frame_context, controls);
    }

    /// Write the algorithm's sub-block of the parameter buffer for `frame`.
    fn prepare(
        &mut self,
        context: &mut IpaContext,
        frame: u32,
        frame_context: &mut IpaFrameContext,
        params: &mut IspParams,
    ) {
        let _ = (context, frame, frame_context, params);
    }

    /// Consume the statistics measured over `frame` and update the state
    /// future `prepare` calls will see.
    fn process(
        &mut self,
        context: &mut IpaContext,
        frame: u32,
        frame_context: &mut IpaFrameContext,
        stats: &IspStats,
    ) {
        let _ = (context, frame, frame_context, stats);
    }
}
