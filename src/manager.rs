use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use camkit_core::{invalid_state_error, EventDispatcher, Result};
use camkit_media::{DeviceEnumerator, MediaDevice};
use log::info;

use crate::{camera::Camera, pipeline::PipelineHandler};

pub type HandlerFactory = Box<dyn Fn() -> Arc<dyn PipelineHandler> + Send + Sync>;

/// Entry point of the framework.
///
/// The manager owns the device enumerator, the pipeline handler registry and
/// the cameras the handlers register. Handler registration is explicit and
/// ordered: [`start`] runs every registered factory's `match` pass in
/// registration order, and the first handler to match a set of media devices
/// owns them.
///
/// [`start`]: CameraManager::start
pub struct CameraManager {
    enumerator: Mutex<DeviceEnumerator>,
    factories: Mutex<Vec<HandlerFactory>>,
    handlers: Mutex<Vec<Arc<dyn PipelineHandler>>>,
    cameras: Mutex<Vec<Camera>>,
    started: AtomicBool,
}

impl CameraManager {
    pub fn new() -> Self {
        Self {
            enumerator: Mutex::new(DeviceEnumerator::new()),
            factories: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            cameras: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register a pipeline handler factory. Must precede [`start`].
    ///
    /// [`start`]: CameraManager::start
    pub fn register_handler(&self, factory: HandlerFactory) {
        self.factories.lock().unwrap().push(factory);
    }

    /// Hand a media device to the enumerator.
    pub fn add_device(&self, device: Arc<MediaDevice>) {
        self.enumerator.lock().unwrap().add_device(device);
    }

    /// Run the match pass and bring the registered cameras up.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(invalid_state_error!("camera manager already started"));
        }

        let enumerator = self.enumerator.lock().unwrap();
        let factories = self.factories.lock().unwrap();

        for factory in factories.iter() {
            let handler = factory();
            if !handler.clone().match_devices(&enumerator) {
                continue;
            }

            info!("pipeline handler '{}' matched", handler.name());
            self.cameras.lock().unwrap().extend(handler.cameras());
            self.handlers.lock().unwrap().push(handler);
        }

        info!("camera manager started with {} cameras", self.cameras.lock().unwrap().len());
        Ok(())
    }

    /// Tear down: handlers release their media devices, cameras become
    /// inoperable.
    pub fn stop(&self) {
        let cameras: Vec<Camera> = self.cameras.lock().unwrap().drain(..).collect();
        for camera in cameras {
            let _ = camera.release();
        }
        self.handlers.lock().unwrap().clear();
        self.started.store(false, Ordering::Release);
    }

    pub fn cameras(&self) -> Vec<Camera> {
        self.cameras.lock().unwrap().clone()
    }

    pub fn get(&self, name: &str) -> Option<Camera> {
        self.cameras
            .lock()
            .unwrap()
            .iter()
            .find(|camera| camera.name() == name)
            .cloned()
    }

    /// The calling thread's event dispatcher.
    pub fn event_dispatcher(&self) -> EventDispatcher {
        EventDispatcher::instance()
    }
}

impl Default for CameraManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop();
    }
}
