use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use camkit_core::{
    geometry::{Rectangle, SizeRange},
    invalid_state_error, not_found_error, Result,
};
use log::debug;

use crate::{
    backend::SubdevOps,
    format::SubdevFormat,
    graph::{MediaDevice, MediaEntityRef},
};

/// A sub-device: an entity with per-pad format negotiation but no DMA.
///
/// Format operations require the sub-device node open. The owning media
/// device's handle is only needed for link setup and may be closed again
/// once the pipeline's links are in place.
pub struct Subdevice {
    entity_name: String,
    ops: Arc<dyn SubdevOps>,
    opened: AtomicBool,
}

impl Subdevice {
    pub fn from_entity(entity: &MediaEntityRef) -> Result<Subdevice> {
        let ops = entity
            .subdev_node()
            .ok_or_else(|| not_found_error!("subdev node"))?;

        Ok(Subdevice {
            entity_name: entity.name().to_owned(),
            ops,
            opened: AtomicBool::new(false),
        })
    }

    pub fn from_entity_name(media: &Arc<MediaDevice>, name: &str) -> Result<Subdevice> {
        let entity = media
            .entity_by_name(name)
            .ok_or_else(|| not_found_error!("subdev entity"))?;
        Self::from_entity(&entity)
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(invalid_state_error!("subdevice already open"));
        }
        debug!("opened subdevice '{}'", self.entity_name);
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if !self.opened.load(Ordering::Acquire) {
            return Err(invalid_state_error!("subdevice not open"));
        }
        Ok(())
    }

    /// Enumerate the media-bus formats producible on `pad`.
    pub fn formats(&self, pad: u32) -> Vec<(u32, Vec<SizeRange>)> {
        self.ops.formats(pad)
    }

    pub fn set_format(&self, pad: u32, format: &mut SubdevFormat) -> Result<()> {
        self.check_open()?;
        self.ops.set_format(pad, format)?;
        debug!("'{}' pad {} format set to {}", self.entity_name, pad, format);
        Ok(())
    }

    pub fn format(&self, pad: u32) -> Result<SubdevFormat> {
        self.ops.format(pad)
    }

    pub fn set_crop(&self, pad: u32, rect: &Rectangle) -> Result<()> {
        self.check_open()?;
        self.ops.set_crop(pad, rect)
    }

    pub fn set_compose(&self, pad: u32, rect: &Rectangle) -> Result<()> {
        self.check_open()?;
        self.ops.set_compose(pad, rect)
    }
}
