use std::sync::Arc;

use log::debug;

use crate::graph::MediaDevice;

/// Predicate describing the media device a pipeline handler needs: a driver
/// name and the entities that must all be present.
#[derive(Clone, Debug)]
pub struct DeviceMatch {
    driver: String,
    entities: Vec<String>,
}

impl DeviceMatch {
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_owned(),
            entities: Vec::new(),
        }
    }

    pub fn add(&mut self, entity: &str) {
        self.entities.push(entity.to_owned());
    }

    fn matches(&self, device: &MediaDevice) -> bool {
        if device.driver() != self.driver {
            return false;
        }

        self.entities.iter().all(|name| device.has_entity(name))
    }
}

/// Aggregates the media devices present on the system.
///
/// Registration is explicit: whatever discovers kernel devices (or builds
/// virtual ones) hands them in with [`add_device`]. Pipeline handlers then
/// claim devices through [`search`].
///
/// [`add_device`]: DeviceEnumerator::add_device
/// [`search`]: DeviceEnumerator::search
#[derive(Default)]
pub struct DeviceEnumerator {
    devices: Vec<Arc<MediaDevice>>,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&mut self, device: Arc<MediaDevice>) {
        debug!("enumerated media device '{}'", device.driver());
        self.devices.push(device);
    }

    /// Find the first media device satisfying `dm` that is not already
    /// acquired by another owner.
    ///
    /// The returned handle is shared; the caller takes ownership with
    /// [`MediaDevice::acquire`].
    pub fn search(&self, dm: &DeviceMatch) -> Option<Arc<MediaDevice>> {
        self.devices
            .iter()
            .find(|device| !device.busy() && dm.matches(device))
            .cloned()
    }

    pub fn devices(&self) -> &[Arc<MediaDevice>] {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityFunction, MediaDeviceBuilder, PadFlags};

    fn device(driver: &str, entities: &[&str]) -> Arc<MediaDevice> {
        let mut builder = MediaDeviceBuilder::new(driver, driver);
        for name in entities {
            builder = builder.entity(name, EntityFunction::Unknown, &[PadFlags::SOURCE], None);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_search_requires_driver_and_entity_superset() {
        let mut enumerator = DeviceEnumerator::new();
        enumerator.add_device(device("drv-a", &["e0", "e1", "e2"]));

        let mut dm = DeviceMatch::new("drv-a");
        dm.add("e0");
        dm.add("e2");
        assert!(enumerator.search(&dm).is_some());

        let mut dm = DeviceMatch::new("drv-a");
        dm.add("e0");
        dm.add("e3");
        assert!(enumerator.search(&dm).is_none());

        let dm = DeviceMatch::new("drv-b");
        assert!(enumerator.search(&dm).is_none());
    }

    #[test]
    fn test_search_skips_acquired_devices() {
        let mut enumerator = DeviceEnumerator::new();
        enumerator.add_device(device("drv", &["e0"]));

        let mut dm = DeviceMatch::new("drv");
        dm.add("e0");

        let first = enumerator.search(&dm).unwrap();
        assert!(first.acquire());

        assert!(enumerator.search(&dm).is_none());

        first.release();
        assert!(enumerator.search(&dm).is_some());
    }
}
