mod common;

use camkit::{
    pipeline::ipu3::PipelineHandlerIpu3, DeviceEnumerator, FourCc, PipelineHandler, RequestStatus,
    StreamRole, Timer,
};
use camkit_ipa::params::{AwbStats, IspStats};
use common::{build_ipu3, FRAME_INTERVAL_MS};

/// Statistics travel from the virtual stat node through the harness: a
/// red-heavy scene pulls the red gain down and the temperature estimate
/// toward the warm range.
#[test]
fn test_awb_converges_over_captured_statistics() {
    let fixture = build_ipu3(1, FRAME_INTERVAL_MS);

    fixture.stat_nodes[0].set_frame_source(|_, data| {
        let stats = IspStats {
            awb: AwbStats {
                mean_r: 200.0,
                mean_g: 100.0,
                mean_b: 100.0,
            },
        };
        data.copy_from_slice(bytemuck::bytes_of(&stats));
    });

    let mut enumerator = DeviceEnumerator::new();
    enumerator.add_device(fixture.cio2.clone());
    enumerator.add_device(fixture.imgu.clone());

    let handler = PipelineHandlerIpu3::new();
    assert!(handler.clone().match_devices(&enumerator));

    let camera = handler.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    {
        let cfg = config.at_mut(0).unwrap();
        cfg.width = 640;
        cfg.height = 480;
        cfg.pixel_format = FourCc::NV12;
        cfg.buffer_count = 4;
    }
    camera.configure(&config).unwrap();
    camera.allocate_buffers().unwrap();

    // Gains start at unity after configure.
    let context = handler.ipa_context(camera.name()).unwrap();
    assert_eq!(context.active.awb.gain_red, 1.0);

    let stream = camera.streams()[0].clone();
    let slot_camera = camera.clone();
    let slot_stream = stream.clone();
    camera.request_completed().connect(move |request| {
        if request.status() != RequestStatus::Complete {
            return;
        }
        let index = request.buffer(0).unwrap().index();
        if let Ok(buffer) = slot_stream.create_buffer(index) {
            let mut next = slot_camera.create_request();
            next.add_buffer(buffer).unwrap();
            let _ = slot_camera.queue_request(next);
        }
    });

    camera.start().unwrap();
    for i in 0..4 {
        let mut request = camera.create_request();
        request.add_buffer(stream.create_buffer(i).unwrap()).unwrap();
        camera.queue_request(request).unwrap();
    }

    let dispatcher = camkit::EventDispatcher::instance();
    let timer = Timer::new();
    timer.start(500);
    while timer.is_running() {
        dispatcher.process_events();
    }

    camera.stop().unwrap();

    let awb = handler.ipa_context(camera.name()).unwrap().active.awb;
    assert!(awb.gain_red < 0.7, "red gain did not converge: {}", awb.gain_red);
    assert!(awb.gain_blue > 0.9 && awb.gain_blue < 1.1);
    assert!(awb.temperature_k < 6000, "temperature: {}", awb.temperature_k);

    camera.free_buffers().unwrap();
    camera.release().unwrap();
}
