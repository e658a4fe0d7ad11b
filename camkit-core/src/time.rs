use std::{sync::OnceLock, time::Instant};

pub const NSEC_PER_USEC: u64 = 1_000;
pub const NSEC_PER_MSEC: u64 = 1_000_000;
pub const NSEC_PER_SEC: u64 = 1_000_000_000;
pub const USEC_PER_MSEC: u64 = 1_000;
pub const USEC_PER_SEC: u64 = 1_000_000;
pub const MSEC_PER_SEC: u64 = 1_000;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Nanoseconds elapsed on the monotonic clock since the process epoch.
///
/// All deadlines and frame timestamps in the framework are expressed on this
/// clock, never on wall time.
pub fn clock_ns() -> u64 {
    epoch().elapsed().as_nanos() as u64
}

pub fn clock_us() -> u64 {
    clock_ns() / NSEC_PER_USEC
}

pub fn clock_ms() -> u64 {
    clock_ns() / NSEC_PER_MSEC
}
