//! Component J: injectable epoch and monotonic clocks (spec.md §4.J).
//!
//! Represented as trait objects rather than process-wide statics so the
//! conductor can be driven deterministically in tests (spec.md §9's "Clock
//! injection" design note).

use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the Unix epoch.
pub trait EpochClock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// A monotonic nanosecond clock, unrelated to wall-clock time.
pub trait NanoClock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// Wraps [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn now_ms(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Wraps `libc::clock_gettime(CLOCK_MONOTONIC)`, matching the teacher's own
/// `lithos-perf-recorder`/`obsidian-util::timestamp::now_ns` implementation
/// rather than `std::time::Instant` (which cannot be converted to a plain
/// nanosecond integer without an arbitrary reference point).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNanoClock;

impl NanoClock for SystemNanoClock {
    fn now_ns(&self) -> i64 {
        now_ns_via_libc()
    }
}

#[cfg(target_os = "macos")]
#[allow(deprecated)]
fn now_ns_via_libc() -> i64 {
    use std::sync::OnceLock;
    static TIMEBASE: OnceLock<(u64, u64)> = OnceLock::new();
    let (numer, denom) = *TIMEBASE.get_or_init(|| {
        let mut info = libc::mach_timebase_info_data_t { numer: 0, denom: 0 };
        let rc = unsafe { libc::mach_timebase_info(&mut info) };
        if rc != 0 || info.denom == 0 {
            (1, 1)
        } else {
            (info.numer as u64, info.denom as u64)
        }
    });
    let t = unsafe { libc::mach_absolute_time() } as u128;
    (((t * numer as u128) / denom as u128) as u64) as i64
}

#[cfg(not(target_os = "macos"))]
fn now_ns_via_libc() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as i64) * 1_000_000_000 + ts.tv_nsec as i64
}

/// A clock whose reading is set by the test rather than the OS, used to
/// deterministically exercise timeouts and keepalive cadence (P6, scenario
/// 3). Never compiled into a release build of a downstream binary unless it
/// opts into `test-support`.
#[cfg(any(test, feature = "test-support"))]
pub struct ManualEpochClock {
    ms: AtomicI64,
}

#[cfg(any(test, feature = "test-support"))]
impl ManualEpochClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set_ms(&self, ms: i64) {
        self.ms.store(ms, Ordering::Relaxed);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EpochClock for ManualEpochClock {
    fn now_ms(&self) -> i64 {
        self.ms.load(Ordering::Relaxed)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct ManualNanoClock {
    ns: AtomicI64,
}

#[cfg(any(test, feature = "test-support"))]
impl ManualNanoClock {
    pub fn new(start_ns: i64) -> Self {
        Self {
            ns: AtomicI64::new(start_ns),
        }
    }

    pub fn set_ns(&self, ns: i64) {
        self.ns.store(ns, Ordering::Relaxed);
    }

    pub fn advance_ns(&self, delta_ns: i64) {
        self.ns.fetch_add(delta_ns, Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl NanoClock for ManualNanoClock {
    fn now_ns(&self) -> i64 {
        self.ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clocks_advance() {
        let epoch = SystemEpochClock;
        let nano = SystemNanoClock;
        let a = epoch.now_ms();
        let b = nano.now_ns();
        assert!(a > 0);
        assert!(b > 0);
    }

    #[test]
    fn manual_clocks_are_settable_and_advance_on_request() {
        let epoch = ManualEpochClock::new(1_000);
        assert_eq!(epoch.now_ms(), 1_000);
        epoch.advance_ms(500);
        assert_eq!(epoch.now_ms(), 1_500);

        let nano = ManualNanoClock::new(0);
        nano.advance_ns(10_000_000_000);
        assert_eq!(nano.now_ns(), 10_000_000_000);
    }
}
