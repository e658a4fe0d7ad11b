use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bitflags::bitflags;
use camkit_core::{invalid_state_error, not_found_error, Result};
use log::debug;
use smallvec::SmallVec;

use crate::backend::{SubdevOps, VideoNodeOps};

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct PadFlags: u32 {
        const SINK = 1 << 0;
        const SOURCE = 1 << 1;
    }
}

/// Functional classification of a media entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityFunction {
    CamSensor,
    CsiReceiver,
    Processor,
    VideoIo,
    Unknown,
}

/// The kernel node backing an entity, if it exposes one.
#[derive(Clone)]
pub enum EntityNode {
    Video(Arc<dyn VideoNodeOps>),
    Subdev(Arc<dyn SubdevOps>),
}

struct EntityData {
    name: String,
    function: EntityFunction,
    pads: Vec<PadData>,
    node: Option<EntityNode>,
}

struct PadData {
    flags: PadFlags,
    links: SmallVec<[usize; 2]>,
}

struct LinkData {
    source: (usize, u32),
    sink: (usize, u32),
}

/// One OS-exposed media pipeline instance: a directed multigraph of entities,
/// pads and links.
///
/// A media device is handed out by the enumerator as a shared handle. A
/// pipeline handler takes exclusive ownership with [`acquire`] before driving
/// it; link and format negotiation additionally require the device [`open`].
///
/// [`acquire`]: MediaDevice::acquire
/// [`open`]: MediaDevice::open
pub struct MediaDevice {
    driver: String,
    model: String,
    entities: Vec<EntityData>,
    links: Vec<LinkData>,
    link_enabled: Vec<AtomicBool>,
    acquired: AtomicBool,
    opened: AtomicBool,
}

impl MediaDevice {
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Take exclusive ownership. Returns false when another owner already
    /// holds the device.
    pub fn acquire(&self) -> bool {
        self.acquired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.acquired.store(false, Ordering::Release);
    }

    pub fn busy(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// Take the kernel-level handle needed for link and format operations.
    pub fn open(&self) -> Result<()> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(invalid_state_error!("media device already open"));
        }
        debug!("opened media device '{}'", self.driver);
        Ok(())
    }

    /// Release the kernel-level handle without releasing acquisition.
    pub fn close(&self) {
        self.opened.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Clear the enabled bit on every link.
    pub fn disable_links(&self) -> Result<()> {
        if !self.is_open() {
            return Err(invalid_state_error!("media device not open"));
        }

        for enabled in &self.link_enabled {
            enabled.store(false, Ordering::Release);
        }
        Ok(())
    }

    pub fn entity_by_name(self: &Arc<Self>, name: &str) -> Option<MediaEntityRef> {
        self.entities
            .iter()
            .position(|e| e.name == name)
            .map(|id| MediaEntityRef {
                device: self.clone(),
                id,
            })
    }

    pub fn entities(self: &Arc<Self>) -> Vec<MediaEntityRef> {
        (0..self.entities.len())
            .map(|id| MediaEntityRef {
                device: self.clone(),
                id,
            })
            .collect()
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.iter().any(|e| e.name == name)
    }
}

/// Handle to one entity of a [`MediaDevice`].
#[derive(Clone)]
pub struct MediaEntityRef {
    device: Arc<MediaDevice>,
    id: usize,
}

impl MediaEntityRef {
    fn data(&self) -> &EntityData {
        &self.device.entities[self.id]
    }

    pub fn name(&self) -> &str {
        &self.data().name
    }

    pub fn function(&self) -> EntityFunction {
        self.data().function
    }

    pub fn device(&self) -> &Arc<MediaDevice> {
        &self.device
    }

    pub fn pads(&self) -> Vec<MediaPadRef> {
        (0..self.data().pads.len())
            .map(|pad| MediaPadRef {
                device: self.device.clone(),
                entity: self.id,
                pad,
            })
            .collect()
    }

    pub fn pad(&self, index: u32) -> Option<MediaPadRef> {
        if (index as usize) < self.data().pads.len() {
            Some(MediaPadRef {
                device: self.device.clone(),
                entity: self.id,
                pad: index as usize,
            })
        } else {
            None
        }
    }

    pub fn video_node(&self) -> Option<Arc<dyn VideoNodeOps>> {
        match &self.data().node {
            Some(EntityNode::Video(ops)) => Some(ops.clone()),
            _ => None,
        }
    }

    pub fn subdev_node(&self) -> Option<Arc<dyn SubdevOps>> {
        match &self.data().node {
            Some(EntityNode::Subdev(ops)) => Some(ops.clone()),
            _ => None,
        }
    }
}

/// Handle to one pad of an entity.
#[derive(Clone)]
pub struct MediaPadRef {
    device: Arc<MediaDevice>,
    entity: usize,
    pad: usize,
}

impl MediaPadRef {
    fn data(&self) -> &PadData {
        &self.device.entities[self.entity].pads[self.pad]
    }

    pub fn index(&self) -> u32 {
        self.pad as u32
    }

    pub fn flags(&self) -> PadFlags {
        self.data().flags
    }

    pub fn entity(&self) -> MediaEntityRef {
        MediaEntityRef {
            device: self.device.clone(),
            id: self.entity,
        }
    }

    pub fn links(&self) -> Vec<MediaLinkRef> {
        self.data()
            .links
            .iter()
            .map(|id| MediaLinkRef {
                device: self.device.clone(),
                id: *id,
            })
            .collect()
    }
}

/// Handle to one source→sink link.
#[derive(Clone)]
pub struct MediaLinkRef {
    device: Arc<MediaDevice>,
    id: usize,
}

impl MediaLinkRef {
    fn data(&self) -> &LinkData {
        &self.device.links[self.id]
    }

    pub fn source(&self) -> MediaPadRef {
        let (entity, pad) = self.data().source;
        MediaPadRef {
            device: self.device.clone(),
            entity,
            pad: pad as usize,
        }
    }

    pub fn sink(&self) -> MediaPadRef {
        let (entity, pad) = self.data().sink;
        MediaPadRef {
            device: self.device.clone(),
            entity,
            pad: pad as usize,
        }
    }

    pub fn enabled(&self) -> bool {
        self.device.link_enabled[self.id].load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        if !self.device.is_open() {
            return Err(invalid_state_error!("media device not open"));
        }

        self.device.link_enabled[self.id].store(enabled, Ordering::Release);
        debug!(
            "link '{}':{} -> '{}':{} {}",
            self.source().entity().name(),
            self.source().index(),
            self.sink().entity().name(),
            self.sink().index(),
            if enabled { "enabled" } else { "disabled" },
        );
        Ok(())
    }
}

/// Assembles a [`MediaDevice`] graph.
pub struct MediaDeviceBuilder {
    driver: String,
    model: String,
    entities: Vec<EntityData>,
    links: Vec<(String, u32, String, u32)>,
}

impl MediaDeviceBuilder {
    pub fn new(driver: &str, model: &str) -> Self {
        Self {
            driver: driver.to_owned(),
            model: model.to_owned(),
            entities: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn entity(
        mut self,
        name: &str,
        function: EntityFunction,
        pads: &[PadFlags],
        node: Option<EntityNode>,
    ) -> Self {
        self.entities.push(EntityData {
            name: name.to_owned(),
            function,
            pads: pads
                .iter()
                .map(|flags| PadData {
                    flags: *flags,
                    links: SmallVec::new(),
                })
                .collect(),
            node,
        });
        self
    }

    pub fn link(mut self, source: &str, source_pad: u32, sink: &str, sink_pad: u32) -> Self {
        self.links.push((
            source.to_owned(),
            source_pad,
            sink.to_owned(),
            sink_pad,
        ));
        self
    }

    pub fn build(self) -> Result<Arc<MediaDevice>> {
        let mut entities = self.entities;
        let mut links = Vec::with_capacity(self.links.len());

        for (source, source_pad, sink, sink_pad) in &self.links {
            let source_id = entities
                .iter()
                .position(|e| &e.name == source)
                .ok_or_else(|| not_found_error!("link source entity"))?;
            let sink_id = entities
                .iter()
                .position(|e| &e.name == sink)
                .ok_or_else(|| not_found_error!("link sink entity"))?;

            let link_id = links.len();
            links.push(LinkData {
                source: (source_id, *source_pad),
                sink: (sink_id, *sink_pad),
            });

            entities[source_id].pads[*source_pad as usize].links.push(link_id);
            entities[sink_id].pads[*sink_pad as usize].links.push(link_id);
        }

        let link_enabled = links.iter().map(|_| AtomicBool::new(false)).collect();

        Ok(Arc::new(MediaDevice {
            driver: self.driver,
            model: self.model,
            entities,
            links,
            link_enabled,
            acquired: AtomicBool::new(false),
            opened: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Arc<MediaDevice> {
        MediaDeviceBuilder::new("drv", "Test Device")
            .entity("sensor", EntityFunction::CamSensor, &[PadFlags::SOURCE], None)
            .entity(
                "receiver",
                EntityFunction::CsiReceiver,
                &[PadFlags::SINK, PadFlags::SOURCE],
                None,
            )
            .link("sensor", 0, "receiver", 0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_entity_lookup() {
        let dev = device();
        assert!(dev.entity_by_name("sensor").is_some());
        assert!(dev.entity_by_name("missing").is_none());
        assert_eq!(dev.entity_by_name("sensor").unwrap().function(), EntityFunction::CamSensor);
    }

    #[test]
    fn test_link_traversal() {
        let dev = device();
        let receiver = dev.entity_by_name("receiver").unwrap();
        let sink = receiver.pad(0).unwrap();
        assert!(sink.flags().contains(PadFlags::SINK));

        let links = sink.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source().entity().name(), "sensor");
        assert_eq!(links[0].sink().entity().name(), "receiver");
    }

    #[test]
    fn test_link_enable_requires_open() {
        let dev = device();
        let link = dev.entity_by_name("sensor").unwrap().pad(0).unwrap().links()[0].clone();

        assert!(link.set_enabled(true).is_err());

        dev.open().unwrap();
        link.set_enabled(true).unwrap();
        assert!(link.enabled());

        dev.disable_links().unwrap();
        assert!(!link.enabled());
    }

    #[test]
    fn test_exclusive_acquisition() {
        let dev = device();
        assert!(dev.acquire());
        assert!(!dev.acquire());
        assert!(dev.busy());
        dev.release();
        assert!(dev.acquire());
    }
}
