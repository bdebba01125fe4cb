//! Snapshot timing counters, switched on with `PLACE_PERF=1`.
//!
//! Full snapshots are the only heavy path in the client (786 KiB unpacked
//! into a million cells), so that is all this measures. A summary is logged
//! after the first snapshot and then every [`REPORT_EVERY`] snapshots.

use once_cell::sync::Lazy;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

pub mod logging;

pub const PERF_ENV: &str = "PLACE_PERF";

/// One summary per hour of resyncs at the default five minute period.
pub const REPORT_EVERY: u64 = 12;

static ENABLED: Lazy<bool> = Lazy::new(|| env_flag(PERF_ENV));
static SNAPSHOTS: Lazy<Mutex<SnapshotStats>> = Lazy::new(Mutex::default);

/// Set and neither empty nor `"0"`.
pub(crate) fn env_flag(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| !v.is_empty() && v != "0")
}

pub fn enabled() -> bool {
    *ENABLED
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    pub decoded: u64,
    pub bytes: u64,
    pub total_decode: Duration,
    pub slowest_decode: Duration,
}

impl SnapshotStats {
    /// Adds one decode; returns whether a summary is due.
    pub fn record(&mut self, bytes: usize, elapsed: Duration) -> bool {
        self.decoded += 1;
        self.bytes += bytes as u64;
        self.total_decode += elapsed;
        self.slowest_decode = self.slowest_decode.max(elapsed);
        self.decoded == 1 || self.decoded % REPORT_EVERY == 0
    }

    pub fn mean_decode(&self) -> Duration {
        match u32::try_from(self.decoded) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_decode / n,
            Err(_) => self.total_decode / u32::MAX,
        }
    }

    fn log(&self) {
        info!(
            target: "place::perf",
            snapshots = self.decoded,
            mib = self.bytes as f64 / (1024.0 * 1024.0),
            mean_ms = self.mean_decode().as_secs_f64() * 1e3,
            slowest_ms = self.slowest_decode.as_secs_f64() * 1e3,
            "snapshot decode"
        );
    }
}

/// Counters so far; all zero unless `PLACE_PERF` is set.
pub fn snapshot_stats() -> SnapshotStats {
    *SNAPSHOTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Logs the running totals, if anything was measured.
pub fn report() {
    let stats = snapshot_stats();
    if stats.decoded > 0 {
        stats.log();
    }
}

/// Times one snapshot decode from creation to drop.
pub struct SnapshotTimer {
    bytes: usize,
    started: Instant,
}

impl SnapshotTimer {
    /// `None` when counters are off, so the disabled path costs nothing.
    pub fn start(bytes: usize) -> Option<Self> {
        enabled().then(|| Self {
            bytes,
            started: Instant::now(),
        })
    }
}

impl Drop for SnapshotTimer {
    fn drop(&mut self) {
        let mut stats = SNAPSHOTS.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.record(self.bytes, self.started.elapsed()) {
            stats.log();
        }
    }
}
