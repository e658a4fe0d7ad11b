//! Pipeline handler for the Intel IPU3.
//!
//! The IPU3 exposes two media devices: the CIO2, holding four CSI-2
//! receivers with their DMA output nodes, and the ImgU, holding two imaging
//! unit instances. One camera is registered per CSI-2 receiver with a sensor
//! attached, each assigned a fixed ImgU instance.

use std::{
    collections::HashMap,
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use camkit_core::{
    geometry::{Rectangle, Size},
    invalid_argument_error, no_device_error, not_found_error, ConnectionType, Result,
};
use camkit_ipa::{
    params::{IspParams, IspStats},
    Awb, IpaModule, SensorInfo,
};
use camkit_media::{
    mbus, BufferStatus, DeviceEnumerator, DeviceMatch, EntityFunction, FourCc, FrameMetadata,
    MediaDevice, SubdevFormat, Subdevice, VideoDevice, VideoFormat,
};
use log::{debug, error, info, warn};

use crate::{
    camera::Camera,
    pipeline::{PipelineHandler, RequestQueue},
    request::{Request, RequestStatus},
    stream::{Stream, StreamConfiguration, StreamRole},
};

const CIO2_INSTANCES: u32 = 4;
const IMGU_INSTANCES: u32 = 2;
const MAX_CAMERAS: usize = 2;

/// Depth of the internal statistics buffer ring.
const STAT_BUFFER_COUNT: u32 = 4;

const PAD_INPUT: u32 = 0;
const PAD_OUTPUT: u32 = 2;
const PAD_VF: u32 = 3;
const PAD_STAT: u32 = 4;

/// One ImgU output: the video node and the imaging unit pad feeding it.
struct ImguOutput {
    dev: VideoDevice,
    pad: u32,
    name: &'static str,
}

/// One imaging unit instance of the ImgU media device.
struct ImguDevice {
    name: String,
    imgu: Subdevice,
    input: VideoDevice,
    output: ImguOutput,
    viewfinder: ImguOutput,
    stat: ImguOutput,
}

impl ImguDevice {
    fn init(media: &Arc<MediaDevice>, index: u32) -> Result<ImguDevice> {
        let name = format!("ipu3-imgu {index}");

        let imgu = Subdevice::from_entity_name(media, &name)?;
        imgu.open()?;

        let input = VideoDevice::from_entity_name(media, &format!("{name} input"))?;
        input.open()?;

        let output = ImguOutput {
            dev: VideoDevice::from_entity_name(media, &format!("{name} output"))?,
            pad: PAD_OUTPUT,
            name: "output",
        };
        output.dev.open()?;

        let viewfinder = ImguOutput {
            dev: VideoDevice::from_entity_name(media, &format!("{name} viewfinder"))?,
            pad: PAD_VF,
            name: "viewfinder",
        };
        viewfinder.dev.open()?;

        let stat = ImguOutput {
            dev: VideoDevice::from_entity_name(media, &format!("{name} 3a stat"))?,
            pad: PAD_STAT,
            name: "stat",
        };
        stat.dev.open()?;

        Ok(ImguDevice {
            name,
            imgu,
            input,
            output,
            viewfinder,
            stat,
        })
    }

    fn configure_input(
        &self,
        config: &StreamConfiguration,
        input_format: &VideoFormat,
    ) -> Result<()> {
        let mut format = *input_format;
        self.input.set_format(&mut format)?;
        debug!("'{}' input format = {}", self.name, format);

        let rect = Rectangle {
            x: 0,
            y: 0,
            width: input_format.size.width,
            height: input_format.size.height,
        };
        self.imgu.set_crop(PAD_INPUT, &rect)?;
        self.imgu.set_compose(PAD_INPUT, &rect)?;

        let mut gdc = SubdevFormat {
            mbus_code: mbus::FIXED,
            size: Size::new(config.width, config.height),
        };
        self.imgu.set_format(PAD_INPUT, &mut gdc)?;

        Ok(())
    }

    fn configure_output(&self, output: &ImguOutput, config: &StreamConfiguration) -> Result<()> {
        let mut pad_format = SubdevFormat {
            mbus_code: mbus::FIXED,
            size: Size::new(config.width, config.height),
        };
        self.imgu.set_format(output.pad, &mut pad_format)?;

        if output.pad == PAD_STAT {
            // The stat node produces fixed-size statistics blocks, not
            // images.
            let mut stat_format = VideoFormat {
                size: Size::default(),
                fourcc: FourCc::IPU3_STAT_3A,
                planes: 1,
                sizeimage: mem::size_of::<IspStats>() as u32,
            };
            output.dev.set_format(&mut stat_format)?;
            return Ok(());
        }

        let mut out_format = VideoFormat::new(
            Size::new(config.width, config.height),
            FourCc::NV12,
            2,
        );
        output.dev.set_format(&mut out_format)?;
        debug!("'{}' {} format = {}", self.name, output.name, out_format);

        Ok(())
    }
}

/// One CSI-2 receiver with its sensor and DMA output node.
struct Cio2Device {
    output: VideoDevice,
    csi2: Subdevice,
    sensor: Subdevice,
    /// Largest sensor size consumable by the CIO2, and the media-bus code
    /// producing it.
    mbus_code: u32,
    max_size: Size,
}

impl Cio2Device {
    fn init(media: &Arc<MediaDevice>, index: u32) -> Result<Cio2Device> {
        let csi2_name = format!("ipu3-csi2 {index}");
        let csi2_entity = media
            .entity_by_name(&csi2_name)
            .ok_or_else(|| no_device_error!("missing CSI-2 entity"))?;

        // CSI-2 receivers have their single sink pad at index 0; the sensor
        // hangs off its first link.
        let pads = csi2_entity.pads();
        let sink = pads.first().ok_or_else(|| no_device_error!("receiver has no pads"))?;
        let links = sink.links();
        let link = links
            .first()
            .ok_or_else(|| no_device_error!("no sensor connected"))?;

        let sensor_entity = link.source().entity();
        if sensor_entity.function() != EntityFunction::CamSensor {
            return Err(no_device_error!("connected entity is not a camera sensor"));
        }

        link.set_enabled(true)?;

        let sensor = Subdevice::from_entity(&sensor_entity)?;
        sensor.open()?;

        let mut max_size = Size::default();
        let mut mbus_code = 0;
        for (code, ranges) in sensor.formats(0) {
            if media_bus_to_fourcc(code).is_none() {
                continue;
            }

            for range in ranges {
                if max_size.width < range.max.width && max_size.height < range.max.height {
                    max_size = range.max;
                    mbus_code = code;
                }
            }
        }

        if max_size.width == 0 {
            info!(
                "sensor '{}' detected, but no supported image format found: skipping camera creation",
                sensor.entity_name(),
            );
            return Err(no_device_error!("no supported image format"));
        }

        debug!(
            "sensor '{}' maximum size {} from mbus code 0x{:04x}",
            sensor.entity_name(),
            max_size,
            mbus_code,
        );

        let csi2 = Subdevice::from_entity(&csi2_entity)?;
        csi2.open()?;

        let output = VideoDevice::from_entity_name(media, &format!("ipu3-cio2 {index}"))?;
        output.open()?;

        Ok(Cio2Device {
            output,
            csi2,
            sensor,
            mbus_code,
            max_size,
        })
    }

    /// Select and apply the sensor format covering `config`, propagating it
    /// down to the CIO2 output node. Returns the output node format.
    fn configure(&self, config: &StreamConfiguration) -> Result<VideoFormat> {
        let image_size = config.width as u64 * config.height as u64;
        let mut best = u64::MAX;
        let mut sensor_format = SubdevFormat::default();

        for (code, ranges) in self.sensor.formats(0) {
            if media_bus_to_fourcc(code).is_none() {
                continue;
            }

            for range in ranges {
                // The CIO2 cannot up-scale; only sizes covering the request
                // qualify, preferring the least excess pixel area.
                if range.max.width < config.width || range.max.height < config.height {
                    continue;
                }

                let diff = range.max.area() - image_size;
                if diff >= best {
                    continue;
                }

                best = diff;
                sensor_format = SubdevFormat {
                    mbus_code: code,
                    size: range.max,
                };
            }
        }

        if best == u64::MAX {
            return Err(invalid_argument_error!("no sensor format covers the request"));
        }

        self.sensor.set_format(0, &mut sensor_format)?;
        self.csi2.set_format(0, &mut sensor_format)?;

        let fourcc = media_bus_to_fourcc(sensor_format.mbus_code)
            .ok_or_else(|| invalid_argument_error!("unsupported media-bus code"))?;
        let mut output_format = VideoFormat {
            size: sensor_format.size,
            fourcc,
            planes: 1,
            sizeimage: 0,
        };
        self.output.set_format(&mut output_format)?;
        debug!("CIO2 output format {}", output_format);

        Ok(output_format)
    }
}

/// Raw Bayer media-bus codes the CIO2 consumes, mapped to the packed
/// formats it produces. Unlisted codes are rejected.
fn media_bus_to_fourcc(code: u32) -> Option<FourCc> {
    match code {
        mbus::SBGGR10_1X10 => Some(FourCc::IPU3_SBGGR10),
        mbus::SGBRG10_1X10 => Some(FourCc::IPU3_SGBRG10),
        mbus::SGRBG10_1X10 => Some(FourCc::IPU3_SGRBG10),
        mbus::SRGGB10_1X10 => Some(FourCc::IPU3_SRGGB10),
        _ => None,
    }
}

struct Ipu3CameraData {
    cio2: Cio2Device,
    imgu: Arc<ImguDevice>,
    stream: Arc<Stream>,
    queued: RequestQueue,
    running: AtomicBool,
    frame: AtomicU32,
    ipa: Mutex<IpaModule>,
    camera: Mutex<Option<Camera>>,
}

impl Ipu3CameraData {
    fn camera(&self) -> Option<Camera> {
        self.camera.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct MatchedMedia {
    cio2: Option<Arc<MediaDevice>>,
    imgu: Option<Arc<MediaDevice>>,
}

pub struct PipelineHandlerIpu3 {
    media: Mutex<MatchedMedia>,
    imgu: Mutex<Vec<Arc<ImguDevice>>>,
    cameras: Mutex<Vec<Camera>>,
    data: Mutex<HashMap<String, Arc<Ipu3CameraData>>>,
}

impl PipelineHandlerIpu3 {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            media: Mutex::new(MatchedMedia::default()),
            imgu: Mutex::new(Vec::new()),
            cameras: Mutex::new(Vec::new()),
            data: Mutex::new(HashMap::new()),
        })
    }

    fn camera_data(&self, camera: &str) -> Result<Arc<Ipu3CameraData>> {
        self.data
            .lock()
            .unwrap()
            .get(camera)
            .cloned()
            .ok_or_else(|| not_found_error!("unknown camera"))
    }

    /// Snapshot of the per-camera 3A state, for tuning and introspection.
    pub fn ipa_context(&self, camera: &str) -> Result<camkit_ipa::IpaContext> {
        let data = self.camera_data(camera)?;
        let context = data.ipa.lock().unwrap().context().clone();
        Ok(context)
    }

    fn register_cameras(
        self: &Arc<Self>,
        cio2_media: &Arc<MediaDevice>,
        imgu_media: &Arc<MediaDevice>,
    ) -> Result<usize> {
        let mut imgu_devices = Vec::new();
        for index in 0..IMGU_INSTANCES {
            imgu_devices.push(Arc::new(ImguDevice::init(imgu_media, index)?));
        }
        *self.imgu.lock().unwrap() = imgu_devices.clone();

        // One camera per CSI-2 receiver with a usable sensor; the first
        // camera drives imgu 0, the second imgu 1.
        let mut num_cameras = 0;
        for id in 0..CIO2_INSTANCES {
            if num_cameras >= MAX_CAMERAS {
                break;
            }

            let cio2 = match Cio2Device::init(cio2_media, id) {
                Ok(cio2) => cio2,
                Err(e) => {
                    debug!("no camera on CSI-2 receiver {id}: {e}");
                    continue;
                }
            };

            let stream = Stream::new(0);
            let camera_name = format!("{} {}", cio2.sensor.entity_name(), id);

            let mut ipa = IpaModule::new();
            ipa.register(Box::new(Awb::new()));

            let data = Arc::new(Ipu3CameraData {
                cio2,
                imgu: imgu_devices[num_cameras].clone(),
                stream: stream.clone(),
                queued: RequestQueue::default(),
                running: AtomicBool::new(false),
                frame: AtomicU32::new(0),
                ipa: Mutex::new(ipa),
                camera: Mutex::new(None),
            });

            let pipe: Arc<dyn PipelineHandler> = self.clone();
            let camera = Camera::new(&camera_name, vec![stream], Arc::downgrade(&pipe));
            *data.camera.lock().unwrap() = Some(camera.clone());

            // Completions arrive on node worker threads; both slots rethread
            // onto the camera's dispatcher.
            let weak = Arc::downgrade(self);
            let slot_camera = camera_name.clone();
            data.cio2.output.buffer_ready.connect_object(
                camera.inner(),
                ConnectionType::Auto,
                move |_, metadata| {
                    if let Some(pipe) = weak.upgrade() {
                        pipe.cio2_buffer_ready(&slot_camera, *metadata);
                    }
                },
            );

            let weak = Arc::downgrade(self);
            let slot_camera = camera_name.clone();
            data.imgu.stat.dev.buffer_ready.connect_object(
                camera.inner(),
                ConnectionType::Auto,
                move |_, metadata| {
                    if let Some(pipe) = weak.upgrade() {
                        pipe.stat_buffer_ready(&slot_camera, *metadata);
                    }
                },
            );

            self.data.lock().unwrap().insert(camera_name.clone(), data);
            self.cameras.lock().unwrap().push(camera);

            info!("registered camera '{camera_name}' connected to CSI-2 receiver {id}");
            num_cameras += 1;
        }

        Ok(num_cameras)
    }

    /// Ingress completion slot, running on the camera's thread.
    ///
    /// The pipeline completes strictly in FIFO order: the completed buffer
    /// belongs to the request at the head of the queue.
    fn cio2_buffer_ready(&self, camera: &str, metadata: FrameMetadata) {
        let Ok(data) = self.camera_data(camera) else {
            return;
        };
        if !data.running.load(Ordering::Acquire) {
            return;
        }

        let Some(request) = data.queued.head() else {
            warn!("'{camera}': completion without a queued request");
            return;
        };
        let Some(camera_handle) = data.camera() else {
            return;
        };

        camera_handle.complete_buffer(&request, data.stream.index(), metadata);

        if request.buffer_completed() {
            data.queued.pop();
            camera_handle.complete_request(request, RequestStatus::Complete);
        }

        // Collect statistics for this frame.
        let stat_index = metadata.sequence % STAT_BUFFER_COUNT;
        if let Err(e) = data.imgu.stat.dev.queue_buffer(stat_index) {
            debug!("'{camera}': stat buffer queue failed: {e}");
        }
    }

    /// Statistics completion slot, running on the camera's thread.
    fn stat_buffer_ready(&self, camera: &str, metadata: FrameMetadata) {
        let Ok(data) = self.camera_data(camera) else {
            return;
        };
        if !data.running.load(Ordering::Acquire) {
            return;
        }
        if metadata.status != BufferStatus::Success {
            return;
        }

        let Ok(bytes) = data.imgu.stat.dev.buffer_bytes(metadata.index) else {
            return;
        };
        let size = mem::size_of::<IspStats>();
        if bytes.len() < size {
            warn!("'{camera}': short statistics buffer");
            return;
        }

        let stats: IspStats = bytemuck::pod_read_unaligned(&bytes[..size]);
        data.ipa.lock().unwrap().process(metadata.sequence, &stats);
    }
}

impl PipelineHandler for PipelineHandlerIpu3 {
    fn name(&self) -> &str {
        "ipu3"
    }

    fn match_devices(self: Arc<Self>, enumerator: &DeviceEnumerator) -> bool {
        let mut cio2_dm = DeviceMatch::new("ipu3-cio2");
        for i in 0..CIO2_INSTANCES {
            cio2_dm.add(&format!("ipu3-csi2 {i}"));
            cio2_dm.add(&format!("ipu3-cio2 {i}"));
        }

        let mut imgu_dm = DeviceMatch::new("ipu3-imgu");
        for i in 0..IMGU_INSTANCES {
            imgu_dm.add(&format!("ipu3-imgu {i}"));
            imgu_dm.add(&format!("ipu3-imgu {i} input"));
            imgu_dm.add(&format!("ipu3-imgu {i} parameters"));
            imgu_dm.add(&format!("ipu3-imgu {i} output"));
            imgu_dm.add(&format!("ipu3-imgu {i} viewfinder"));
            imgu_dm.add(&format!("ipu3-imgu {i} 3a stat"));
        }

        // search() skips busy devices, so acquiring both is safe.
        let Some(cio2_media) = enumerator.search(&cio2_dm) else {
            return false;
        };
        if !cio2_media.acquire() {
            return false;
        }

        let Some(imgu_media) = enumerator.search(&imgu_dm) else {
            cio2_media.release();
            return false;
        };
        if !imgu_media.acquire() {
            cio2_media.release();
            return false;
        }

        {
            let mut media = self.media.lock().unwrap();
            media.cio2 = Some(cio2_media.clone());
            media.imgu = Some(imgu_media.clone());
        }

        // Disable the default links on both devices; camera creation enables
        // exactly the links it needs.
        if cio2_media.open().is_err() {
            return false;
        }
        if cio2_media.disable_links().is_err() {
            cio2_media.close();
            return false;
        }
        if imgu_media.open().is_err() {
            cio2_media.close();
            return false;
        }

        let registered = if imgu_media.disable_links().is_err() {
            0
        } else {
            match self.register_cameras(&cio2_media, &imgu_media) {
                Ok(count) => count,
                Err(e) => {
                    error!("camera registration failed: {e}");
                    0
                }
            }
        };

        cio2_media.close();
        imgu_media.close();

        registered > 0
    }

    fn cameras(&self) -> Vec<Camera> {
        self.cameras.lock().unwrap().clone()
    }

    fn stream_configuration(
        &self,
        camera: &str,
        _roles: &[StreamRole],
    ) -> Result<Vec<StreamConfiguration>> {
        let data = self.camera_data(camera)?;

        // Seed from whatever the sensor currently produces.
        let format = data.cio2.sensor.format(0)?;
        Ok(vec![StreamConfiguration {
            width: format.size.width,
            height: format.size.height,
            pixel_format: FourCc::IPU3_SGRBG10,
            buffer_count: 4,
        }])
    }

    fn configure_streams(&self, camera: &str, config: &[StreamConfiguration]) -> Result<()> {
        let data = self.camera_data(camera)?;
        let cfg = config
            .first()
            .ok_or_else(|| invalid_argument_error!("no stream configuration"))?;

        info!(
            "requested image format {}x{}-{} on camera '{}'",
            cfg.width, cfg.height, cfg.pixel_format, camera,
        );

        // The imaging unit requires the image width aligned to 8 pixels and
        // the height to 4 lines, within the sensor's resolution.
        if cfg.width % 8 != 0 || cfg.height % 4 != 0 {
            error!("invalid stream size: bad alignment");
            return Err(invalid_argument_error!("bad alignment"));
        }

        if cfg.width > data.cio2.max_size.width || cfg.height > data.cio2.max_size.height {
            error!("invalid stream size: larger than sensor resolution");
            return Err(invalid_argument_error!("larger than sensor resolution"));
        }

        let cio2_format = data.cio2.configure(cfg)?;

        data.imgu.configure_input(cfg, &cio2_format)?;
        data.imgu.configure_output(&data.imgu.output, cfg)?;
        data.imgu.configure_output(&data.imgu.viewfinder, cfg)?;
        data.imgu.configure_output(&data.imgu.stat, cfg)?;

        let sensor_format = data.cio2.sensor.format(0)?;
        data.ipa.lock().unwrap().configure(&SensorInfo {
            model: data.cio2.sensor.entity_name().to_owned(),
            output_size: sensor_format.size,
        })?;

        Ok(())
    }

    fn allocate_buffers(&self, camera: &str, _stream: usize) -> Result<()> {
        let data = self.camera_data(camera)?;

        let count = data.stream.configuration().buffer_count;
        if count == 0 {
            return Err(invalid_argument_error!("zero buffer count"));
        }

        let exported = data.cio2.output.export_buffers(count)?;
        data.stream.set_allocated(exported);
        Ok(())
    }

    fn free_buffers(&self, camera: &str, _stream: usize) -> Result<()> {
        let data = self.camera_data(camera)?;

        data.cio2.output.release_buffers()?;
        data.stream.set_allocated(0);
        Ok(())
    }

    fn start(&self, camera: &str) -> Result<()> {
        let data = self.camera_data(camera)?;

        data.cio2.output.stream_on()?;

        // The statistics path runs on an internal ring, queued one buffer
        // per captured frame.
        let stat = &data.imgu.stat.dev;
        let stat_started = stat
            .export_buffers(STAT_BUFFER_COUNT)
            .and_then(|_| stat.stream_on());
        if let Err(e) = stat_started {
            let _ = stat.release_buffers();
            let _ = data.cio2.output.stream_off();
            return Err(e);
        }

        data.frame.store(0, Ordering::Release);
        data.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self, camera: &str) {
        let Ok(data) = self.camera_data(camera) else {
            return;
        };

        // No signal of this run may be observed once stop returns; the flag
        // drops completions already in flight.
        data.running.store(false, Ordering::Release);

        let _ = data.cio2.output.stream_off();
        let stat = &data.imgu.stat.dev;
        let _ = stat.stream_off();
        let _ = stat.release_buffers();

        let Some(camera_handle) = data.camera() else {
            return;
        };

        debug!("'{camera}': cancelling {} outstanding requests", data.queued.len());
        for request in data.queued.drain() {
            for (stream_index, buffer) in request.buffers() {
                buffer.cancel();
                camera_handle.complete_buffer(&request, *stream_index, buffer.metadata());
            }
            camera_handle.complete_request(request, RequestStatus::Cancelled);
        }
    }

    fn queue_request(&self, camera: &str, request: Arc<Request>) -> Result<()> {
        let data = self.camera_data(camera)?;

        let buffer = request
            .find_buffer(&data.stream)
            .ok_or_else(|| not_found_error!("request carries no buffer for the ingress stream"))?;
        let index = buffer.index();

        let frame = data.frame.fetch_add(1, Ordering::AcqRel);
        {
            let mut ipa = data.ipa.lock().unwrap();
            ipa.queue_request(frame, request.controls());

            let mut params = IspParams::default();
            ipa.prepare(frame, &mut params);
            // TODO: queue `params` to the ImgU parameters node once it is
            // wired up for 3A tuning.
        }

        // Queue first so a fast completion always finds its request at the
        // head.
        data.queued.push(request);
        if let Err(e) = data.cio2.output.queue_buffer(index) {
            data.queued.pop_back();
            return Err(e);
        }

        debug!("'{camera}': queued frame {frame} on buffer {index}");
        Ok(())
    }
}

impl Drop for PipelineHandlerIpu3 {
    fn drop(&mut self) {
        let media = self.media.lock().unwrap();
        for device in [&media.cio2, &media.imgu].into_iter().flatten() {
            if device.is_open() {
                device.close();
            }
            device.release();
        }
    }
}

/// Factory for explicit registration with the camera manager.
pub fn factory() -> crate::manager::HandlerFactory {
    Box::new(|| {
        let handler: Arc<dyn PipelineHandler> = PipelineHandlerIpu3::new();
        handler
    })
}
