//! Monotonic timestamps for operation ordering.

/// Current monotonic clock reading in nanoseconds.
///
/// Readings are comparable across processes on the same host, which is all
/// the LWW resolution needs. Not meaningful across hosts or reboots.
pub fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail with a valid timespec pointer.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    (ts.tv_sec as u64) * 1_000_000_000 + ts.tv_nsec as u64
}
