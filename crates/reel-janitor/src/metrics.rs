//! Metrics collection for Reaper operations

use serde::Serialize;
use std::time::Duration;

/// Counters collected across sweeps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReaperMetrics {
    /// Total sweep iterations completed
    pub sweep_count: usize,

    /// Artifacts evicted across all sweeps
    pub evicted_total: usize,

    /// Artifacts evicted by the most recent sweep
    pub last_sweep_evicted: usize,

    /// Expired artifacts seen while in dry-run mode
    pub dry_run_candidates: usize,

    /// Cumulative time spent sweeping (milliseconds)
    pub total_runtime_ms: u64,
}

impl ReaperMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed sweep
    pub fn record_sweep(&mut self, evicted: usize, elapsed: Duration) {
        self.sweep_count += 1;
        self.evicted_total += evicted;
        self.last_sweep_evicted = evicted;
        self.total_runtime_ms += elapsed.as_millis() as u64;
    }

    /// Record expired artifacts left in place by a dry run
    pub fn record_dry_run(&mut self, candidates: usize) {
        self.dry_run_candidates += candidates;
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Reaper Metrics Summary".to_string(),
            "======================".to_string(),
            format!("Sweep cycles: {}", self.sweep_count),
            format!("Total runtime: {}ms", self.total_runtime_ms),
            format!("Evicted: {}", self.evicted_total),
            format!("Evicted last sweep: {}", self.last_sweep_evicted),
        ];

        if self.dry_run_candidates > 0 {
            lines.push(format!("Dry-run candidates: {}", self.dry_run_candidates));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ReaperMetrics::new();
        assert_eq!(metrics.sweep_count, 0);
        assert_eq!(metrics.evicted_total, 0);
    }

    #[test]
    fn test_record_sweep() {
        let mut metrics = ReaperMetrics::new();
        metrics.record_sweep(3, Duration::from_millis(12));
        metrics.record_sweep(0, Duration::from_millis(5));

        assert_eq!(metrics.sweep_count, 2);
        assert_eq!(metrics.evicted_total, 3);
        assert_eq!(metrics.last_sweep_evicted, 0);
        assert_eq!(metrics.total_runtime_ms, 17);
    }

    #[test]
    fn test_reset() {
        let mut metrics = ReaperMetrics::new();
        metrics.record_sweep(4, Duration::from_millis(1));
        metrics.record_dry_run(2);
        metrics.reset();
        assert_eq!(metrics, ReaperMetrics::default());
    }

    #[test]
    fn test_summary() {
        let mut metrics = ReaperMetrics::new();
        metrics.record_sweep(5, Duration::from_millis(120));
        metrics.record_dry_run(1);

        let summary = metrics.summary();
        assert!(summary.contains("Sweep cycles: 1"));
        assert!(summary.contains("Total runtime: 120ms"));
        assert!(summary.contains("Evicted: 5"));
        assert!(summary.contains("Dry-run candidates: 1"));
    }
}
