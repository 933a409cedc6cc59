//! Failure injection for the in-memory broker.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Switches that make the in-memory broker misbehave on purpose.
///
/// Counters are consumed one failure at a time, so `fail_writes(2)` makes the
/// next two writes fail and the third succeed.
#[derive(Debug, Default)]
pub struct Faults {
    write_latency_ms: AtomicU64,
    failing_writes: AtomicU32,
    failing_reads: AtomicU32,
    failing_commits: AtomicU32,
    failing_pings: AtomicU32,
}

impl Faults {
    /// Every write waits `latency` before it is appended.
    pub fn delay_writes(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.write_latency_ms.store(millis, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub fn fail_pings(&self, count: u32) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.write_latency_ms.store(0, Ordering::SeqCst);
        self.failing_writes.store(0, Ordering::SeqCst);
        self.failing_reads.store(0, Ordering::SeqCst);
        self.failing_commits.store(0, Ordering::SeqCst);
        self.failing_pings.store(0, Ordering::SeqCst);
    }

    pub(crate) fn write_latency(&self) -> Option<Duration> {
        match self.write_latency_ms.load(Ordering::SeqCst) {
            0 => None,
            millis => Some(Duration::from_millis(millis)),
        }
    }

    pub(crate) fn take_write_failure(&self) -> bool {
        take(&self.failing_writes)
    }

    pub(crate) fn take_read_failure(&self) -> bool {
        take(&self.failing_reads)
    }

    pub(crate) fn take_commit_failure(&self) -> bool {
        take(&self.failing_commits)
    }

    pub(crate) fn take_ping_failure(&self) -> bool {
        take(&self.failing_pings)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
