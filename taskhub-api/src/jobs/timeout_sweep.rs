//! Timeout Sweep Background Task
//!
//! Runs [`Market::sweep_timeouts`] on a fixed interval so that overdue
//! executions are refunded and unverified deliveries are auto-approved even
//! when no external scheduler calls `POST /cron/timeout`. Both paths share
//! the same entry point; running them together is safe because every task
//! is re-checked inside its own transaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskhub_market::Market;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::{DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_INTERVAL_SECS};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct TimeoutSweepConfig {
    pub enabled: bool,
    /// Time between sweeps (default: 60 seconds).
    pub check_interval: Duration,
    /// Max candidates per pass (default: 100).
    pub batch_size: i64,
}

impl Default for TimeoutSweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

impl TimeoutSweepConfig {
    /// # Environment Variables
    /// - `TASKHUB_SWEEP_ENABLED` (default true)
    /// - `TASKHUB_SWEEP_INTERVAL_SECS` (default 60)
    /// - `TASKHUB_SWEEP_BATCH_SIZE` (default 100)
    pub fn from_env() -> Self {
        let enabled = std::env::var("TASKHUB_SWEEP_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let check_interval = Duration::from_secs(
            std::env::var("TASKHUB_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let batch_size = std::env::var("TASKHUB_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &i64| *n > 0)
            .unwrap_or(DEFAULT_SWEEP_BATCH_SIZE);

        Self {
            enabled,
            check_interval,
            batch_size,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct TimeoutSweepMetrics {
    pub runs: AtomicU64,
    pub refunded: AtomicU64,
    pub auto_passed: AtomicU64,
    pub skipped: AtomicU64,
    /// Per-task failures plus whole-run failures.
    pub errors: AtomicU64,
}

impl TimeoutSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TimeoutSweepSnapshot {
        TimeoutSweepSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            refunded: self.refunded.load(Ordering::Relaxed),
            auto_passed: self.auto_passed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSweepSnapshot {
    pub runs: u64,
    pub refunded: u64,
    pub auto_passed: u64,
    pub skipped: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep on every tick until `shutdown_rx` flips to `true`.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(timeout_sweep_task(market, config, shutdown_rx));
/// // ...
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn timeout_sweep_task(
    market: Market,
    config: TimeoutSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<TimeoutSweepMetrics> {
    let metrics = Arc::new(TimeoutSweepMetrics::new());

    let mut sweep_interval = interval(config.check_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        batch_size = config.batch_size,
        "Timeout sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Timeout sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                run_once(&market, config.batch_size, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        runs = snapshot.runs,
        refunded = snapshot.refunded,
        auto_passed = snapshot.auto_passed,
        skipped = snapshot.skipped,
        errors = snapshot.errors,
        "Timeout sweep task completed"
    );

    metrics
}

/// One sweep, folded into `metrics`.
pub async fn run_once(market: &Market, batch_size: i64, metrics: &TimeoutSweepMetrics) {
    metrics.runs.fetch_add(1, Ordering::Relaxed);

    let report = match market.sweep_timeouts(batch_size).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Timeout sweep failed");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics
        .refunded
        .fetch_add(report.refunded as u64, Ordering::Relaxed);
    metrics
        .auto_passed
        .fetch_add(report.auto_passed as u64, Ordering::Relaxed);
    metrics
        .skipped
        .fetch_add(report.skipped as u64, Ordering::Relaxed);
    metrics
        .errors
        .fetch_add(report.errors.len() as u64, Ordering::Relaxed);

    if report.refunded > 0 || report.auto_passed > 0 || !report.errors.is_empty() {
        tracing::info!(
            refunded = report.refunded,
            auto_passed = report.auto_passed,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Timeout sweep cycle completed"
        );
    } else {
        tracing::trace!("Timeout sweep cycle completed with nothing due");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TimeoutSweepConfig::default();
        assert!(config.enabled);
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = TimeoutSweepMetrics::new();
        metrics.runs.fetch_add(2, Ordering::Relaxed);
        metrics.refunded.fetch_add(3, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs, 2);
        assert_eq!(snapshot.refunded, 3);
        assert_eq!(snapshot.errors, 0);
    }
}
