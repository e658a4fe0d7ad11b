use camkit_core::geometry::Size;
use log::warn;

use crate::params::StatsWindow;

/// Properties of the sensor feeding the pipeline, established at stream
/// configuration time.
#[derive(Clone, Debug, Default)]
pub struct SensorInfo {
    pub model: String,
    pub output_size: Size,
}

/// Session-lived configuration, written once per stream configuration.
#[derive(Clone, Debug, Default)]
pub struct IpaSessionConfiguration {
    pub sensor: SensorInfo,
    pub awb: AwbSessionConfiguration,
}

#[derive(Clone, Debug, Default)]
pub struct AwbSessionConfiguration {
    pub window: StatsWindow,
}

/// State the algorithms latch across frames.
#[derive(Clone, Debug, Default)]
pub struct ActiveState {
    pub awb: AwbState,
}

#[derive(Clone, Debug)]
pub struct AwbState {
    pub gain_red: f64,
    pub gain_blue: f64,
    pub temperature_k: u32,
}

impl Default for AwbState {
    fn default() -> Self {
        Self {
            gain_red: 1.0,
            gain_blue: 1.0,
            temperature_k: 6500,
        }
    }
}

/// Process-lived algorithm state: tunings, session configuration and the
/// state latched by `process` for future `prepare` calls.
#[derive(Clone, Debug, Default)]
pub struct IpaContext {
    pub configuration: IpaSessionConfiguration,
    pub active: ActiveState,
}

/// Per-frame scratchpad shared by all algorithms for one trip through the
/// pipeline.
#[derive(Clone, Debug, Default)]
pub struct IpaFrameContext {
    pub frame: u32,
    pub awb: AwbFrameContext,
}

#[derive(Clone, Debug, Default)]
pub struct AwbFrameContext {
    pub gain_red: f64,
    pub gain_blue: f64,
    pub enabled: bool,
}

/// Bounded ring of frame contexts, indexed by frame number.
///
/// A slot is initialised when the frame's request is accepted and consumed
/// once its statistics have been processed. The depth bounds how far
/// completion may lag submission.
pub struct FrameContexts {
    ring: Vec<IpaFrameContext>,
}

impl FrameContexts {
    pub fn new(depth: usize) -> Self {
        Self {
            ring: vec![IpaFrameContext::default(); depth],
        }
    }

    /// Initialise the slot for `frame`, recycling whatever it held.
    pub fn init(&mut self, frame: u32) -> &mut IpaFrameContext {
        let depth = self.ring.len();
        let slot = &mut self.ring[frame as usize % depth];
        *slot = IpaFrameContext {
            frame,
            ..Default::default()
        };
        slot
    }

    /// The context for `frame`.
    ///
    /// A stale slot means the frame was never queued, or completion lagged
    /// further than the ring depth; the slot is re-initialised so processing
    /// can continue from defaults.
    pub fn get(&mut self, frame: u32) -> &mut IpaFrameContext {
        let depth = self.ring.len();
        if self.ring[frame as usize % depth].frame != frame {
            warn!("frame context for frame {frame} was recycled, reinitialising");
            return self.init(frame);
        }

        &mut self.ring[frame as usize % depth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_slots_recycle() {
        let mut contexts = FrameContexts::new(4);

        contexts.init(1).awb.gain_red = 2.0;
        assert_eq!(contexts.get(1).awb.gain_red, 2.0);

        // Frame 5 shares the slot with frame 1.
        contexts.init(5);
        assert_eq!(contexts.get(5).frame, 5);
        assert_eq!(contexts.get(5).awb.gain_red, 0.0);
    }

    #[test]
    fn test_stale_slot_reinitialises() {
        let mut contexts = FrameContexts::new(4);
        contexts.init(0);

        let ctx = contexts.get(8);
        assert_eq!(ctx.frame, 8);
    }
}
