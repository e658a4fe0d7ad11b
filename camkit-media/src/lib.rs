pub mod backend;
pub mod enumerator;
pub mod format;
pub mod graph;
pub mod subdevice;
pub mod video_device;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "virt")] {
        pub mod virt;
    }
}

pub use backend::{BufferStatus, FrameMetadata, SubdevOps, VideoNodeOps};
pub use enumerator::{DeviceEnumerator, DeviceMatch};
pub use format::{mbus, FourCc, SubdevFormat, VideoFormat};
pub use graph::{
    EntityFunction, EntityNode, MediaDevice, MediaDeviceBuilder, MediaEntityRef, MediaLinkRef,
    MediaPadRef, PadFlags,
};
pub use subdevice::Subdevice;
pub use video_device::VideoDevice;
