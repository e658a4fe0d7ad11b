pub mod algorithm;
pub mod awb;
pub mod context;
pub mod module;
pub mod params;

pub use algorithm::Algorithm;
pub use awb::Awb;
pub use context::{FrameContexts, IpaContext, IpaFrameContext, SensorInfo};
pub use module::IpaModule;
pub use params::{IspParams, IspStats};
