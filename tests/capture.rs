mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use camkit::{BufferStatus, Error, FourCc, RequestStatus, StreamRole, Timer};
use common::{manager_with_ipu3, FRAME_INTERVAL_MS};

fn configured_camera(
    manager: &camkit::CameraManager,
    buffer_count: u32,
) -> (camkit::Camera, Arc<camkit::Stream>) {
    let camera = manager.cameras().into_iter().next().unwrap();
    camera.acquire().unwrap();

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    {
        let cfg = config.at_mut(0).unwrap();
        cfg.width = 640;
        cfg.height = 480;
        cfg.pixel_format = FourCc::NV12;
        cfg.buffer_count = buffer_count;
    }
    camera.configure(&config).unwrap();
    camera.allocate_buffers().unwrap();

    let stream = camera.streams()[0].clone();
    (camera, stream)
}

#[test]
fn test_sustained_capture() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, stream) = configured_camera(&manager, 4);

    let complete_buffers = Arc::new(AtomicUsize::new(0));
    let complete_requests = Arc::new(AtomicUsize::new(0));

    let counter = complete_buffers.clone();
    camera.buffer_completed().connect(move |event| {
        if event.metadata.status == BufferStatus::Success {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let counter = complete_requests.clone();
    let slot_camera = camera.clone();
    let slot_stream = stream.clone();
    camera.request_completed().connect(move |request| {
        if request.status() != RequestStatus::Complete {
            return;
        }
        counter.fetch_add(1, Ordering::SeqCst);

        // Recycle the buffer into a fresh request.
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

    let dispatcher = manager.event_dispatcher();
    let timer = Timer::new();
    timer.start(1000);
    while timer.is_running() {
        dispatcher.process_events();
    }

    let requests = complete_requests.load(Ordering::SeqCst);
    let buffers = complete_buffers.load(Ordering::SeqCst);
    assert!(requests >= 9, "only {requests} requests completed");
    assert_eq!(requests, buffers);

    camera.stop().unwrap();
    camera.free_buffers().unwrap();
    camera.release().unwrap();
}

#[test]
fn test_requests_complete_in_queueing_order() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, stream) = configured_camera(&manager, 4);

    let completed: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let slot_completed = completed.clone();
    camera.request_completed().connect(move |request| {
        slot_completed.lock().unwrap().push(request.cookie());
    });

    camera.start().unwrap();

    let mut queued = Vec::new();
    for i in 0..4 {
        let mut request = camera.create_request();
        request.add_buffer(stream.create_buffer(i).unwrap()).unwrap();
        queued.push(request.cookie());
        camera.queue_request(request).unwrap();
    }

    let dispatcher = manager.event_dispatcher();
    let guard = Timer::new();
    guard.start(2000);
    while completed.lock().unwrap().len() < 4 && guard.is_running() {
        dispatcher.process_events();
    }

    assert_eq!(*completed.lock().unwrap(), queued);

    camera.stop().unwrap();
}

#[test]
fn test_stop_cancels_outstanding_requests() {
    // Long frame interval: nothing completes before the stop.
    let (manager, _fixture) = manager_with_ipu3(1, 500);
    let (camera, stream) = configured_camera(&manager, 4);

    #[derive(Debug, PartialEq)]
    enum Event {
        Buffer(u64, BufferStatus),
        Request(u64, RequestStatus),
    }

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));

    let slot_events = events.clone();
    camera.buffer_completed().connect(move |event| {
        slot_events
            .lock()
            .unwrap()
            .push(Event::Buffer(event.request.cookie(), event.metadata.status));
    });
    let slot_events = events.clone();
    camera.request_completed().connect(move |request| {
        slot_events
            .lock()
            .unwrap()
            .push(Event::Request(request.cookie(), request.status()));
    });

    camera.start().unwrap();

    let mut queued = Vec::new();
    for i in 0..4 {
        let mut request = camera.create_request();
        request.add_buffer(stream.create_buffer(i).unwrap()).unwrap();
        queued.push(request.cookie());
        camera.queue_request(request).unwrap();
    }

    camera.stop().unwrap();

    // Every request cancelled in queueing order, each preceded by its
    // buffer's cancellation.
    let events = events.lock().unwrap();
    let expected: Vec<Event> = queued
        .iter()
        .flat_map(|cookie| {
            [
                Event::Buffer(*cookie, BufferStatus::Cancelled),
                Event::Request(*cookie, RequestStatus::Cancelled),
            ]
        })
        .collect();
    assert_eq!(*events, expected);

    // The stopped camera accepts no further work.
    let mut request = camera.create_request();
    request.add_buffer(stream.create_buffer(0).unwrap()).unwrap();
    assert!(matches!(
        camera.queue_request(request),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_queue_request_gated_on_running_state() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, stream) = configured_camera(&manager, 4);

    let mut request = camera.create_request();
    request.add_buffer(stream.create_buffer(0).unwrap()).unwrap();
    assert!(matches!(
        camera.queue_request(request),
        Err(Error::InvalidState(_))
    ));

    camera.start().unwrap();
    camera.stop().unwrap();
}

#[test]
fn test_double_start_is_rejected() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, _stream) = configured_camera(&manager, 4);

    camera.start().unwrap();
    assert!(matches!(camera.start(), Err(Error::InvalidState(_))));

    // Still running exactly once.
    assert_eq!(camera.state(), camkit::CameraState::Running);
    camera.stop().unwrap();
    assert!(matches!(camera.stop(), Err(Error::InvalidState(_))));
}

#[test]
fn test_free_buffers_rejected_while_running() {
    let (manager, _fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, _stream) = configured_camera(&manager, 4);

    camera.start().unwrap();
    assert!(matches!(camera.free_buffers(), Err(Error::InvalidState(_))));

    camera.stop().unwrap();
    camera.free_buffers().unwrap();
}

#[test]
fn test_kernel_error_propagates_and_capture_continues() {
    let (manager, fixture) = manager_with_ipu3(1, FRAME_INTERVAL_MS);
    let (camera, stream) = configured_camera(&manager, 4);

    fixture.cio2_nodes[0].inject_errors(1);

    let statuses: Arc<Mutex<Vec<BufferStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let slot_statuses = statuses.clone();
    camera.buffer_completed().connect(move |event| {
        slot_statuses.lock().unwrap().push(event.metadata.status);
    });

    camera.start().unwrap();
    for i in 0..2 {
        let mut request = camera.create_request();
        request.add_buffer(stream.create_buffer(i).unwrap()).unwrap();
        camera.queue_request(request).unwrap();
    }

    let dispatcher = manager.event_dispatcher();
    let guard = Timer::new();
    guard.start(2000);
    while statuses.lock().unwrap().len() < 2 && guard.is_running() {
        dispatcher.process_events();
    }

    let statuses = statuses.lock().unwrap();
    assert_eq!(*statuses, vec![BufferStatus::Error, BufferStatus::Success]);

    camera.stop().unwrap();
}

#[test]
fn test_foreign_and_duplicate_buffers_rejected() {
    let (manager, _fixture) = manager_with_ipu3(2, FRAME_INTERVAL_MS);
    let cameras = manager.cameras();
    assert_eq!(cameras.len(), 2);

    let (camera, stream) = configured_camera(&manager, 4);
    let other = &cameras[1];
    other.acquire().unwrap();
    let other_config = other
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    other.configure(&other_config).unwrap();
    other.allocate_buffers().unwrap();
    let other_stream = other.streams()[0].clone();

    let mut request = camera.create_request();
    assert!(request.add_buffer(other_stream.create_buffer(0).unwrap()).is_err());

    request.add_buffer(stream.create_buffer(0).unwrap()).unwrap();
    assert!(request.add_buffer(stream.create_buffer(1).unwrap()).is_err());
}
