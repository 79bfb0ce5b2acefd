//! Statement Statistics
//!
//! Lock-free counters kept per connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Running counters updated by every statement a connection executes
#[derive(Debug)]
pub struct StatementStats {
    queries: AtomicU64,
    writes: AtomicU64,
    failures: AtomicU64,
    slow: AtomicU64,
    total_micros: AtomicU64,
    created_at: Instant,
}

impl Default for StatementStats {
    fn default() -> Self {
        Self {
            queries: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            slow: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }
}

impl StatementStats {
    pub(crate) fn record(&self, write: bool, elapsed: Duration, failed: bool, slow: bool) {
        if write {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queries.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        if slow {
            self.slow.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            slow: self.slow.load(Ordering::Relaxed),
            total_time: Duration::from_micros(self.total_micros.load(Ordering::Relaxed)),
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Point-in-time copy of [`StatementStats`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub queries: u64,
    pub writes: u64,
    pub failures: u64,
    pub slow: u64,
    pub total_time: Duration,
    pub uptime: Duration,
}

impl StatsSnapshot {
    pub fn statements(&self) -> u64 {
        self.queries + self.writes
    }

    /// Failure rate as a percentage
    pub fn failure_rate(&self) -> f64 {
        if self.statements() > 0 {
            (self.failures as f64 / self.statements() as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.statements()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_time / n,
            Err(_) => Duration::ZERO,
        }
    }
}
