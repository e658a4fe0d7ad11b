pub mod buffer;
pub mod camera;
pub mod manager;
pub mod pipeline;
pub mod request;
pub mod stream;

pub use buffer::FrameBuffer;
pub use camera::{BufferCompleted, Camera, CameraConfiguration, CameraState};
pub use manager::CameraManager;
pub use pipeline::PipelineHandler;
pub use request::{Request, RequestStatus};
pub use stream::{Stream, StreamConfiguration, StreamRole};

pub use camkit_core::{
    controls, error::Error, geometry, time, ConnectionType, EventDispatcher, Result, Signal, Timer,
};
pub use camkit_media::{
    BufferStatus, DeviceEnumerator, DeviceMatch, FourCc, FrameMetadata, MediaDevice,
    MediaDeviceBuilder,
};
