mod common;

use camkit::{CameraState, Error, FourCc, StreamRole};
use camkit_media::backend::SubdevOps;
use common::{manager_with_ipu3, FRAME_INTERVAL_MS};

#[test]
fn test_generate_configuration_seeds_from_sensor() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();

    let config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    assert_eq!(config.len(), 1);

    let cfg = config.at(0).unwrap();
    assert_eq!((cfg.width, cfg.height), (2592, 1944));
    assert_eq!(cfg.pixel_format, FourCc::IPU3_SGRBG10);
    assert_eq!(cfg.buffer_count, 4);
}

#[test]
fn test_misaligned_sizes_rejected_without_side_effects() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();

    // Width must align to 8 pixels.
    let cfg = config.at_mut(0).unwrap();
    cfg.width = 641;
    cfg.height = 480;
    assert!(matches!(
        camera.configure(&config),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(camera.state(), CameraState::Acquired);

    // Height must align to 4 lines.
    let cfg = config.at_mut(0).unwrap();
    cfg.width = 640;
    cfg.height = 481;
    assert!(matches!(
        camera.configure(&config),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(camera.state(), CameraState::Acquired);

    let cfg = config.at_mut(0).unwrap();
    cfg.width = 640;
    cfg.height = 480;
    camera.configure(&config).unwrap();
    assert_eq!(camera.state(), CameraState::Configured);
}

#[test]
fn test_oversize_rejected() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    let cfg = config.at_mut(0).unwrap();
    cfg.width = 4096;
    cfg.height = 2160;

    assert!(matches!(
        camera.configure(&config),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(camera.state(), CameraState::Acquired);
}

#[test]
fn test_sensor_picks_smallest_covering_mode() {
    let (manager, fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    let cfg = config.at_mut(0).unwrap();
    cfg.width = 1000;
    cfg.height = 700;
    camera.configure(&config).unwrap();

    // 640x480 is too small, 1280x960 covers the request with the least
    // excess pixel area.
    let sensor_format = fixture.sensors[0].format(0).unwrap();
    assert_eq!((sensor_format.size.width, sensor_format.size.height), (1280, 960));

    let cfg = config.at_mut(0).unwrap();
    cfg.width = 640;
    cfg.height = 480;
    camera.configure(&config).unwrap();

    let sensor_format = fixture.sensors[0].format(0).unwrap();
    assert_eq!((sensor_format.size.width, sensor_format.size.height), (640, 480));
}

#[test]
fn test_zero_buffer_count_rejected_at_allocation() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    let cfg = config.at_mut(0).unwrap();
    cfg.width = 640;
    cfg.height = 480;
    cfg.buffer_count = 0;
    camera.configure(&config).unwrap();

    assert!(matches!(
        camera.allocate_buffers(),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_configure_requires_acquisition() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let camera = manager.cameras().into_iter().next().unwrap();

    let config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    assert!(matches!(
        camera.configure(&config),
        Err(Error::InvalidState(_))
    ));

    camera.acquire().unwrap();
    assert!(matches!(camera.acquire(), Err(Error::Busy(_))));

    camera.release().unwrap();
    camera.acquire().unwrap();
}
