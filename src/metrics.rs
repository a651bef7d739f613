// Conversion metrics module
//
// Lightweight counters for ingest and conversion outcomes

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters collected over the life of the process.
///
/// Uses atomic operations so any holder of the service can record without
/// taking the service lock. Summarised in the log at shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Files accepted into the queue
    pub files_ingested: AtomicUsize,

    /// Files rejected by open or copy failures
    pub ingest_failures: AtomicUsize,

    /// Conversion runs started
    pub conversions_started: AtomicUsize,

    /// Conversion runs that produced an output file
    pub conversions_completed: AtomicUsize,

    /// Conversion runs that failed to start or continue
    pub conversions_failed: AtomicUsize,

    /// Conversion runs cancelled by the user
    pub conversions_cancelled: AtomicUsize,

    /// Queue entries removed along with their files
    pub entries_reclaimed: AtomicUsize,

    /// Wall-clock time spent in completed runs, in milliseconds
    pub total_conversion_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_ingested: AtomicUsize::new(0),
            ingest_failures: AtomicUsize::new(0),
            conversions_started: AtomicUsize::new(0),
            conversions_completed: AtomicUsize::new(0),
            conversions_failed: AtomicUsize::new(0),
            conversions_cancelled: AtomicUsize::new(0),
            entries_reclaimed: AtomicUsize::new(0),
            total_conversion_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_ingest(&self, ok: bool) {
        if ok {
            self.files_ingested.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ingest_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_started(&self) {
        self.conversions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed run and how long it took
    pub fn record_completed(&self, duration: Duration) {
        self.conversions_completed.fetch_add(1, Ordering::Relaxed);
        self.total_conversion_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.conversions_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reclaimed(&self, count: usize) {
        self.entries_reclaimed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average duration of a completed run in milliseconds
    pub fn avg_conversion_time_ms(&self) -> f64 {
        let total = self.total_conversion_time_ms.load(Ordering::Relaxed);
        let count = self.conversions_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Conversion Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Files: {} queued, {} rejected, {} entries reclaimed",
            self.files_ingested.load(Ordering::Relaxed),
            self.ingest_failures.load(Ordering::Relaxed),
            self.entries_reclaimed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Conversions: {} started, {} completed, {} failed, {} cancelled",
            self.conversions_started.load(Ordering::Relaxed),
            self.conversions_completed.load(Ordering::Relaxed),
            self.conversions_failed.load(Ordering::Relaxed),
            self.conversions_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total conversion time: {:.2}s (avg: {:.2}ms per run)",
            self.total_conversion_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_conversion_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
