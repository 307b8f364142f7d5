//! System-wide monotonic clock.
//!
//! Writer and readers live in different processes, so sample timestamps and
//! query times must come from a clock every process shares. `Instant` is
//! opaque; this returns plain seconds.

#![allow(unsafe_code)]

/// Seconds on the system monotonic clock.
#[cfg(unix)]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn monotonic_seconds() -> f64 {
    use nix::time::{clock_gettime, ClockId};

    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as f64 + ts.tv_nsec() as f64 * 1e-9,
        Err(errno) => {
            tracing::warn!(%errno, "CLOCK_MONOTONIC unavailable, using process clock");
            fallback::seconds()
        }
    }
}

/// Seconds on the system monotonic clock.
#[cfg(windows)]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn monotonic_seconds() -> f64 {
    use windows_sys::Win32::System::Performance::{
        QueryPerformanceCounter, QueryPerformanceFrequency,
    };

    let mut counter = 0i64;
    let mut frequency = 0i64;
    // SAFETY: both calls only write through the provided pointers.
    let ok = unsafe {
        QueryPerformanceFrequency(&mut frequency) != 0
            && QueryPerformanceCounter(&mut counter) != 0
    };
    if !ok || frequency == 0 {
        return fallback::seconds();
    }
    counter as f64 / frequency as f64
}

/// Seconds since the first call in this process.
#[cfg(not(any(unix, windows)))]
#[must_use]
pub fn monotonic_seconds() -> f64 {
    fallback::seconds()
}

mod fallback {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    #[allow(dead_code)]
    pub(super) fn seconds() -> f64 {
        EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let a = monotonic_seconds();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = monotonic_seconds();
        assert!(b > a);
        assert!(b - a >= 0.004);
    }
}
