use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use camkit_core::{time, EventDispatcher, Timer};

#[test]
fn test_start_sets_monotonic_deadline() {
    let timer = Timer::new();

    let before = time::clock_ns();
    timer.start(100);

    assert!(timer.is_running());
    assert_eq!(timer.interval(), 100);
    assert!(timer.deadline() >= before + 100 * time::NSEC_PER_MSEC);
}

#[test]
fn test_timeout_fires_once() {
    let dispatcher = EventDispatcher::instance();
    let timer = Timer::new();

    let fired = Arc::new(AtomicU64::new(0));
    let slot_fired = fired.clone();
    timer.timeout().connect(move |_| {
        slot_fired.fetch_add(1, Ordering::SeqCst);
    });

    timer.start(20);
    while timer.is_running() {
        dispatcher.process_events();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!timer.is_running());
    assert_eq!(timer.deadline(), 0);

    // One extra round must not re-fire the expired arming.
    dispatcher.post(|| {});
    dispatcher.process_events();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_suppresses_timeout() {
    let dispatcher = EventDispatcher::instance();
    let timer = Timer::new();

    let fired = Arc::new(AtomicBool::new(false));
    let slot_fired = fired.clone();
    timer.timeout().connect(move |_| {
        slot_fired.store(true, Ordering::SeqCst);
    });

    timer.start(500);
    assert!(timer.is_running());
    timer.stop();
    assert!(!timer.is_running());

    // Drive a few rounds past nothing: the cancelled arming must stay silent.
    for _ in 0..3 {
        dispatcher.post(|| {});
        dispatcher.process_events();
    }
    assert!(!fired.load(Ordering::SeqCst));
}

#[test]
fn test_restart_replaces_deadline() {
    let timer = Timer::new();

    timer.start(1000);
    let first = timer.deadline();
    timer.start(2000);
    let second = timer.deadline();

    assert!(timer.is_running());
    assert!(second > first);
    assert_eq!(timer.interval(), 2000);
}

#[test]
fn test_rearming_slot_builds_periodic_timer() {
    let dispatcher = EventDispatcher::instance();
    let timer = Arc::new(Timer::new());

    let fired = Arc::new(AtomicU64::new(0));
    let slot_fired = fired.clone();
    let slot_timer = timer.clone();
    timer.timeout().connect(move |_| {
        if slot_fired.fetch_add(1, Ordering::SeqCst) + 1 < 5 {
            slot_timer.start(5);
        }
    });

    timer.start(5);
    while timer.is_running() {
        dispatcher.process_events();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 5);
}
