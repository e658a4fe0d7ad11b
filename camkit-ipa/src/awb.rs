use camkit_core::{
    controls::{ControlId, ControlList},
    Result,
};
use log::debug;

use crate::{
    algorithm::Algorithm,
    context::{IpaContext, IpaFrameContext, SensorInfo},
    params::{IspParams, IspStats, StatsWindow},
};

const GAIN_MIN: f64 = 0.1;
const GAIN_MAX: f64 = 3.99;

/// Filter speed for gain updates; one pole, applied per processed frame.
const SPEED: f64 = 0.2;

/// Grey-world automatic white balance.
///
/// Gains target equal channel means (`g_R = G/R`, `g_B = G/B`) and converge
/// through a single-pole filter. The correlated colour temperature of the
/// scene illuminant is estimated from the channel means with the McCamy
/// approximation.
#[derive(Default)]
pub struct Awb {}

impl Awb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the correlated colour temperature of the light source from
    /// linear channel means, in kelvin.
    fn estimate_cct(red: f64, green: f64, blue: f64) -> u32 {
        // Convert to the CIE chromaticity coordinates through the sRGB
        // matrix, so equal channel energy lands on the D65 white point.
        let x = 0.4124 * red + 0.3576 * green + 0.1805 * blue;
        let y = 0.2126 * red + 0.7152 * green + 0.0722 * blue;
        let z = 0.0193 * red + 0.1192 * green + 0.9505 * blue;

        let sum = x + y + z;
        let cx = x / sum;
        let cy = y / sum;

        // McCamy's cubic approximation.
        let n = (cx - 0.332) / (0.1858 - cy);
        (449.0 * n.powi(3) + 3525.0 * n.powi(2) + 6823.3 * n + 5520.33) as u32
    }
}

impl Algorithm for Awb {
    fn configure(&mut self, context: &mut IpaContext, sensor_info: &SensorInfo) -> Result<()> {
        context.active.awb = Default::default();
        context.configuration.awb.window = StatsWindow {
            left: 0,
            top: 0,
            width: sensor_info.output_size.width,
            height: sensor_info.output_size.height,
        };
        Ok(())
    }

    fn queue_request(
        &mut self,
        context: &mut IpaContext,
        _frame: u32,
        frame_context: &mut IpaFrameContext,
        controls: &ControlList,
    ) {
        let awb = &mut frame_context.awb;
        awb.enabled = controls.get_bool(ControlId::AwbEnable).unwrap_or(true);

        if let Some((red, blue)) = controls.get_float_pair(ControlId::ColourGains) {
            // Manual gains override the estimator for this frame.
            awb.gain_red = red as f64;
            awb.gain_blue = blue as f64;
            awb.enabled = false;
        } else {
            awb.gain_red = context.active.awb.gain_red;
            awb.gain_blue = context.active.awb.gain_blue;
        }
    }

    fn prepare(
        &mut self,
        context: &mut IpaContext,
        _frame: u32,
        frame_context: &mut IpaFrameContext,
        params: &mut IspParams,
    ) {
        params.awb.gains.red = frame_context.awb.gain_red as f32;
        params.awb.gains.blue = frame_context.awb.gain_blue as f32;
        params.awb.window = context.configuration.awb.window;
        params.awb.enabled = 1;
    }

    fn process(
        &mut self,
        context: &mut IpaContext,
        frame: u32,
        frame_context: &mut IpaFrameContext,
        stats: &IspStats,
    ) {
        let red = stats.awb.mean_r as f64;
        let green = stats.awb.mean_g as f64;
        let blue = stats.awb.mean_b as f64;

        if red <= 0.0 || green <= 0.0 || blue <= 0.0 {
            return;
        }

        if !frame_context.awb.enabled {
            return;
        }

        let target_red = (green / red).clamp(GAIN_MIN, GAIN_MAX);
        let target_blue = (green / blue).clamp(GAIN_MIN, GAIN_MAX);

        let awb = &mut context.active.awb;
        awb.gain_red += SPEED * (target_red - awb.gain_red);
        awb.gain_blue += SPEED * (target_blue - awb.gain_blue);
        awb.temperature_k = Self::estimate_cct(red, green, blue);

        debug!(
            "frame {frame}: gains ({:.3}, {:.3}) temperature {} K",
            awb.gain_red, awb.gain_blue, awb.temperature_k,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cct_equal_energy_near_d65() {
        let cct = Awb::estimate_cct(1.0, 1.0, 1.0);
        assert!((6000..=7000).contains(&cct), "cct = {cct}");
    }

    #[test]
    fn test_cct_monotonic_in_blue_red_ratio() {
        let warm = Awb::estimate_cct(1.4, 1.0, 0.7);
        let neutral = Awb::estimate_cct(1.0, 1.0, 1.0);
        let cold = Awb::estimate_cct(0.7, 1.0, 1.4);

        assert!(warm < neutral);
        assert!(neutral < cold);
    }
}
