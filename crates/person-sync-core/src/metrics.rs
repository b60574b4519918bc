//! Metrics for Person Sync
//!
//! Recorded through the `metrics` facade; the binary decides the exporter.

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Metric names as constants for consistency
pub mod names {
    pub const OPERATIONS_TOTAL: &str = "person_sync_operations_total";
    pub const OPERATION_LATENCY: &str = "person_sync_operation_latency_seconds";
    pub const MIRROR_WRITES_TOTAL: &str = "person_sync_mirror_writes_total";
    pub const MIRROR_FAILURES_TOTAL: &str = "person_sync_mirror_failures_total";
    pub const INDEX_DRIFT: &str = "person_sync_index_drift";
}

/// Labels for metrics
pub mod labels {
    pub const COMPONENT: &str = "component";
    pub const OPERATION: &str = "operation";
    pub const OUTCOME: &str = "outcome";
}

/// Gateway metrics
#[derive(Clone)]
pub struct SyncMetrics {
    component: String,
}

impl SyncMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Record a finished gateway operation; `outcome` is "ok" or an error kind
    pub fn record_operation(&self, operation: &'static str, outcome: &'static str) {
        counter!(
            names::OPERATIONS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::OPERATION => operation,
            labels::OUTCOME => outcome,
        )
        .increment(1);
    }

    /// Record operation latency
    pub fn record_latency(&self, operation: &'static str, duration: Duration) {
        histogram!(
            names::OPERATION_LATENCY,
            labels::COMPONENT => self.component.clone(),
            labels::OPERATION => operation,
        )
        .record(duration.as_secs_f64());
    }

    /// Record a successful mirror write
    pub fn record_mirror_write(&self, operation: &'static str) {
        counter!(
            names::MIRROR_WRITES_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::OPERATION => operation,
        )
        .increment(1);
    }

    /// Record an absorbed mirror failure
    pub fn record_mirror_failure(&self, operation: &'static str) {
        counter!(
            names::MIRROR_FAILURES_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::OPERATION => operation,
        )
        .increment(1);
    }

    /// Primary count minus index count, as last observed
    pub fn set_drift(&self, primary: u64, index: u64) {
        gauge!(
            names::INDEX_DRIFT,
            labels::COMPONENT => self.component.clone(),
        )
        .set(primary as f64 - index as f64);
    }
}

/// Timer guard for automatic latency recording
pub struct LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    /// Start a new timer
    pub fn start(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Stop timer and record
    pub fn stop(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(f) = self.on_drop.take() {
            f(elapsed);
        }
        elapsed
    }
}

impl<F> Drop for LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let mut recorded = None;
        {
            let timer = LatencyTimer::start(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(10));
            timer.stop();
        }
        assert!(recorded.is_some());
        assert!(recorded.unwrap() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let mut recorded = false;
        {
            let _timer = LatencyTimer::start(|_| recorded = true);
        }
        assert!(recorded);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = SyncMetrics::new("test");
        metrics.record_operation("create", "ok");
        metrics.record_mirror_failure("create");
        metrics.set_drift(5, 3);
    }
}
