//! Per-strategy performance tracking.
//!
//! One outcome is recorded per resolved request: a success when a parsed
//! response came back within the retry budget, an error when the request
//! exhausted its retries and degraded to fallback. Per-attempt failures
//! inside the retry loop are not recorded.

use std::collections::VecDeque;

use parley_types::llm::{ModelPerformanceRecord, Strategy};

/// Outcome tallies and a rolling success rate for one strategy.
#[derive(Debug)]
pub struct StrategyPerformance {
    strategy: Strategy,
    success_count: u64,
    error_count: u64,
    /// Most recent outcomes, `true` = success. Bounded window.
    window: VecDeque<bool>,
    window_cap: usize,
}

impl StrategyPerformance {
    pub fn new(strategy: Strategy, window_cap: usize) -> Self {
        Self {
            strategy,
            success_count: 0,
            error_count: 0,
            window: VecDeque::with_capacity(window_cap),
            window_cap: window_cap.max(1),
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.push_outcome(true);
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.push_outcome(false);
    }

    fn push_outcome(&mut self, success: bool) {
        if self.window.len() == self.window_cap {
            self.window.pop_front();
        }
        self.window.push_back(success);
    }

    /// Rolling success rate over the window. An empty window reads as
    /// fully healthy so a fresh strategy is not immediately bypassed.
    pub fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 1.0;
        }
        let successes = self.window.iter().filter(|s| **s).count();
        successes as f64 / self.window.len() as f64
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Snapshot for observers.
    pub fn record(&self) -> ModelPerformanceRecord {
        ModelPerformanceRecord {
            strategy: self.strategy,
            success_count: self.success_count,
            error_count: self.error_count,
            success_rate: self.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_reads_fully_healthy() {
        let perf = StrategyPerformance::new(Strategy::Local, 20);
        assert!((perf.success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_over_mixed_outcomes() {
        let mut perf = StrategyPerformance::new(Strategy::Local, 20);
        perf.record_success();
        perf.record_success();
        perf.record_error();
        perf.record_success();
        assert!((perf.success_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(perf.success_count(), 3);
        assert_eq!(perf.error_count(), 1);
    }

    #[test]
    fn test_window_is_bounded_and_recovers() {
        let mut perf = StrategyPerformance::new(Strategy::Local, 4);
        for _ in 0..4 {
            perf.record_error();
        }
        assert!(perf.success_rate().abs() < f64::EPSILON);

        // Four successes push every error out of the window.
        for _ in 0..4 {
            perf.record_success();
        }
        assert!((perf.success_rate() - 1.0).abs() < f64::EPSILON);
        // Lifetime tallies are unaffected by the window.
        assert_eq!(perf.error_count(), 4);
        assert_eq!(perf.success_count(), 4);
    }

    #[test]
    fn test_record_snapshot() {
        let mut perf = StrategyPerformance::new(Strategy::Cloud, 20);
        perf.record_success();
        let record = perf.record();
        assert_eq!(record.strategy, Strategy::Cloud);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.error_count, 0);
    }
}
