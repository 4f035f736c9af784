//! Process-wide atomic counters.
//!
//! Counters carry no run data; they are incremented at the call site and
//! emitted together by [`Metrics::flush`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    runs_started: AtomicU64,
    runs_delivered: AtomicU64,
    runs_failed: AtomicU64,
    tool_calls: AtomicU64,
    guard_rejections: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_delivered: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            guard_rejections: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_delivered(&self) {
        self.runs_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_calls", "counter incremented");
    }

    pub fn inc_guard_rejections(&self) {
        self.guard_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call at natural boundaries (end of a CLI invocation or batch).
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_delivered = self.runs_delivered(),
            runs_failed = self.runs_failed(),
            tool_calls = self.tool_calls(),
            guard_rejections = self.guard_rejections(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_delivered(&self) -> u64 {
        self.runs_delivered.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    pub fn guard_rejections(&self) -> u64 {
        self.guard_rejections.load(Ordering::Relaxed)
    }
}
