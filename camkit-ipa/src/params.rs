//! Hardware parameter and statistics block layouts.
//!
//! Both blocks travel through video nodes as raw bytes; the `Pod` layouts let
//! them reinterpret directly from a buffer payload.

use bytemuck::{Pod, Zeroable};

/// Red/blue digital gains applied by the ISP white balance stage. Green is
/// the reference channel and stays at unity.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AwbGains {
    pub red: f32,
    pub blue: f32,
}

/// Measurement window for the statistics collection stage.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct StatsWindow {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// The white balance sub-block of the parameter buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AwbParams {
    pub gains: AwbGains,
    pub window: StatsWindow,
    pub enabled: u32,
}

/// The parameter buffer the ISP ingests ahead of each frame. Every algorithm
/// writes its own sub-block during `prepare`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct IspParams {
    pub awb: AwbParams,
}

/// Channel means measured over the white balance window.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AwbStats {
    pub mean_r: f32,
    pub mean_g: f32,
    pub mean_b: f32,
}

/// The statistics buffer the ISP produces after each frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct IspStats {
    pub awb: AwbStats,
}
