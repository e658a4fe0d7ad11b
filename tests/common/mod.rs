#![allow(dead_code)]

use std::sync::Arc;

use camkit::{CameraManager, MediaDevice, MediaDeviceBuilder};
use camkit_core::geometry::{Size, SizeRange};
use camkit_media::{
    format::{mbus, SubdevFormat},
    graph::{EntityFunction, EntityNode, PadFlags},
    virt::{VirtualCaptureNode, VirtualSubdev},
};

pub const FRAME_INTERVAL_MS: u64 = 10;

/// The virtual IPU3: the CIO2 and ImgU media devices with capture nodes the
/// tests can reach into.
pub struct VirtualIpu3 {
    pub cio2: Arc<MediaDevice>,
    pub imgu: Arc<MediaDevice>,
    pub sensors: Vec<Arc<VirtualSubdev>>,
    pub cio2_nodes: Vec<Arc<VirtualCaptureNode>>,
    pub stat_nodes: Vec<Arc<VirtualCaptureNode>>,
}

/// Build the IPU3-shaped media graph with `num_sensors` sensors attached,
/// completing frames every `interval_ms`.
pub fn build_ipu3(num_sensors: usize, interval_ms: u64) -> VirtualIpu3 {
    let mut sensors = Vec::new();
    let mut cio2_nodes = Vec::new();
    let mut builder = MediaDeviceBuilder::new("ipu3-cio2", "Intel IPU3 CIO2");

    for i in 0..4 {
        let sensor_name = format!("imx258 {i}");
        if i < num_sensors {
            let sensor = VirtualSubdev::with_formats(
                &sensor_name,
                vec![
                    (
                        mbus::SGRBG10_1X10,
                        vec![
                            SizeRange::fixed(Size::new(640, 480)),
                            SizeRange::fixed(Size::new(1280, 960)),
                            SizeRange::fixed(Size::new(2592, 1944)),
                        ],
                    ),
                    // A YUV mode the CIO2 cannot consume.
                    (0x2006, vec![SizeRange::fixed(Size::new(3840, 2160))]),
                ],
                Some(SubdevFormat {
                    mbus_code: mbus::SGRBG10_1X10,
                    size: Size::new(2592, 1944),
                }),
            );
            sensors.push(sensor.clone());
            builder = builder.entity(
                &sensor_name,
                EntityFunction::CamSensor,
                &[PadFlags::SOURCE],
                Some(EntityNode::Subdev(sensor)),
            );
        }

        let csi2_name = format!("ipu3-csi2 {i}");
        builder = builder.entity(
            &csi2_name,
            EntityFunction::CsiReceiver,
            &[PadFlags::SINK, PadFlags::SOURCE],
            Some(EntityNode::Subdev(VirtualSubdev::new(&csi2_name))),
        );

        let cio2_name = format!("ipu3-cio2 {i}");
        let node = VirtualCaptureNode::new(&cio2_name, interval_ms);
        cio2_nodes.push(node.clone());
        builder = builder.entity(
            &cio2_name,
            EntityFunction::VideoIo,
            &[PadFlags::SINK],
            Some(EntityNode::Video(node)),
        );

        if i < num_sensors {
            builder = builder.link(&sensor_name, 0, &csi2_name, 0);
        }
        builder = builder.link(&csi2_name, 1, &cio2_name, 0);
    }

    let cio2 = builder.build().unwrap();

    let mut stat_nodes = Vec::new();
    let mut builder = MediaDeviceBuilder::new("ipu3-imgu", "Intel IPU3 ImgU");

    for i in 0..2 {
        let name = format!("ipu3-imgu {i}");
        builder = builder.entity(
            &name,
            EntityFunction::Processor,
            &[
                PadFlags::SINK,
                PadFlags::SINK,
                PadFlags::SOURCE,
                PadFlags::SOURCE,
                PadFlags::SOURCE,
            ],
            Some(EntityNode::Subdev(VirtualSubdev::new(&name))),
        );

        let input_name = format!("{name} input");
        let input = VirtualCaptureNode::new(&input_name, interval_ms);
        builder = builder
            .entity(
                &input_name,
                EntityFunction::VideoIo,
                &[PadFlags::SOURCE],
                Some(EntityNode::Video(input)),
            )
            .link(&input_name, 0, &name, 0);

        let params_name = format!("{name} parameters");
        builder = builder
            .entity(&params_name, EntityFunction::VideoIo, &[PadFlags::SOURCE], None)
            .link(&params_name, 0, &name, 1);

        let output_name = format!("{name} output");
        let output = VirtualCaptureNode::new(&output_name, interval_ms);
        builder = builder
            .entity(
                &output_name,
                EntityFunction::VideoIo,
                &[PadFlags::SINK],
                Some(EntityNode::Video(output)),
            )
            .link(&name, 2, &output_name, 0);

        let vf_name = format!("{name} viewfinder");
        let viewfinder = VirtualCaptureNode::new(&vf_name, interval_ms);
        builder = builder
            .entity(
                &vf_name,
                EntityFunction::VideoIo,
                &[PadFlags::SINK],
                Some(EntityNode::Video(viewfinder)),
            )
            .link(&name, 3, &vf_name, 0);

        let stat_name = format!("{name} 3a stat");
        let stat = VirtualCaptureNode::new(&stat_name, interval_ms);
        stat_nodes.push(stat.clone());
        builder = builder
            .entity(
                &stat_name,
                EntityFunction::VideoIo,
                &[PadFlags::SINK],
                Some(EntityNode::Video(stat)),
            )
            .link(&name, 4, &stat_name, 0);
    }

    let imgu = builder.build().unwrap();

    VirtualIpu3 {
        cio2,
        imgu,
        sensors,
        cio2_nodes,
        stat_nodes,
    }
}

/// A started camera manager driving the virtual IPU3.
pub fn manager_with_ipu3(num_sensors: usize, interval_ms: u64) -> (CameraManager, VirtualIpu3) {
    let fixture = build_ipu3(num_sensors, interval_ms);

    let manager = CameraManager::new();
    manager.add_device(fixture.cio2.clone());
    manager.add_device(fixture.imgu.clone());
    manager.register_handler(camkit::pipeline::ipu3::factory());
    manager.start().unwrap();

    (manager, fixture)
}
