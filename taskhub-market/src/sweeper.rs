//! Timeout sweeper.
//!
//! Two passes per run:
//!
//! - executor timeout: CLAIMED/EXECUTING tasks past their deadline are
//!   refunded to the creator;
//! - verifier timeout: COMPLETED tasks left unverified for
//!   [`VERIFIER_GRACE_HOURS`] are settled as if approved.
//!
//! Candidates are listed outside any transaction, then each task gets its
//! own transaction that re-checks the condition before acting. A failing
//! task is recorded in the report and the sweep moves on to the next
//! unseen candidate.

use std::collections::HashSet;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use taskhub_core::constants::VERIFIER_GRACE_HOURS;
use taskhub_core::{EntityType, MarketError, MarketResult, TaskId, Timestamp};
use taskhub_storage::MarketTx;

use crate::{finish, tasks, Market};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    ExecutorTimeout,
    VerifierTimeout,
}

/// A task the sweeper could not transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub task_id: TaskId,
    pub phase: SweepPhase,
    pub error: String,
}

/// Outcome of one sweep.
///
/// `executor_timeout`/`verifier_timeout` count candidates attempted;
/// `refunded`/`auto_passed` count the ones actually transitioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub executor_timeout: usize,
    pub refunded: usize,
    pub verifier_timeout: usize,
    pub auto_passed: usize,
    /// Candidates another writer moved before the sweeper got to them.
    pub skipped: usize,
    pub errors: Vec<SweepFailure>,
}

enum Outcome {
    Applied,
    Skipped,
}

impl Market {
    /// Run both timeout passes, handling at most `batch_size` candidates each.
    ///
    /// Failed candidates do not count against the batch: the pass keeps
    /// listing past them until `batch_size` tasks were handled or no unseen
    /// candidate is left, so a task that always fails cannot starve the rest.
    pub async fn sweep_timeouts(&self, batch_size: i64) -> MarketResult<SweepReport> {
        let now = self.now();
        let grace = Duration::hours(VERIFIER_GRACE_HOURS);
        let mut report = SweepReport::default();

        self.sweep_phase(SweepPhase::ExecutorTimeout, now, grace, batch_size, &mut report)
            .await?;
        self.sweep_phase(SweepPhase::VerifierTimeout, now, grace, batch_size, &mut report)
            .await?;

        if report.executor_timeout + report.verifier_timeout > 0 {
            tracing::info!(
                executor_timeout = report.executor_timeout,
                refunded = report.refunded,
                verifier_timeout = report.verifier_timeout,
                auto_passed = report.auto_passed,
                errors = report.errors.len(),
                "Timeout sweep finished"
            );
        }
        Ok(report)
    }

    async fn sweep_phase(
        &self,
        phase: SweepPhase,
        now: Timestamp,
        grace: Duration,
        batch_size: i64,
        report: &mut SweepReport,
    ) -> MarketResult<()> {
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut handled: i64 = 0;

        while handled < batch_size {
            let remaining = batch_size - handled;
            // Seen ids may still be listed (failed ones always are), so
            // over-fetch by that many to reach the unseen tail.
            let limit = remaining.saturating_add(seen.len() as i64);
            let fresh: Vec<TaskId> = self
                .candidates(phase, now, grace, limit)
                .await?
                .into_iter()
                .filter(|id| !seen.contains(id))
                .take(remaining as usize)
                .collect();
            if fresh.is_empty() {
                break;
            }

            for task_id in fresh {
                seen.insert(task_id);
                match phase {
                    SweepPhase::ExecutorTimeout => report.executor_timeout += 1,
                    SweepPhase::VerifierTimeout => report.verifier_timeout += 1,
                }
                match self.sweep_one(phase, task_id, now, grace).await {
                    Ok(Outcome::Applied) => {
                        handled += 1;
                        match phase {
                            SweepPhase::ExecutorTimeout => report.refunded += 1,
                            SweepPhase::VerifierTimeout => report.auto_passed += 1,
                        }
                    }
                    Ok(Outcome::Skipped) => {
                        handled += 1;
                        report.skipped += 1;
                    }
                    Err(err) => {
                        tracing::warn!(task_id = %task_id, ?phase, error = %err, "Timeout sweep failed");
                        report.errors.push(SweepFailure {
                            task_id,
                            phase,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    async fn candidates(
        &self,
        phase: SweepPhase,
        now: Timestamp,
        grace: Duration,
        limit: i64,
    ) -> MarketResult<Vec<TaskId>> {
        match phase {
            SweepPhase::ExecutorTimeout => self.store.overdue_task_ids(now, limit).await,
            SweepPhase::VerifierTimeout => self.store.unverified_task_ids(now - grace, limit).await,
        }
    }

    async fn sweep_one(
        &self,
        phase: SweepPhase,
        task_id: TaskId,
        now: Timestamp,
        grace: Duration,
    ) -> MarketResult<Outcome> {
        match phase {
            SweepPhase::ExecutorTimeout => self.expire_one(task_id, now).await,
            SweepPhase::VerifierTimeout => self.auto_pass_one(task_id, now, grace).await,
        }
    }

    async fn expire_one(&self, task_id: TaskId, now: Timestamp) -> MarketResult<Outcome> {
        let mut tx = self.store.begin().await?;
        let outcome = expire_in(tx.as_mut(), task_id, now).await;
        let outcome = finish(tx, outcome).await?;
        if matches!(outcome, Outcome::Applied) {
            tracing::info!(task_id = %task_id, "Executor timeout, task refunded");
        }
        Ok(outcome)
    }

    async fn auto_pass_one(
        &self,
        task_id: TaskId,
        now: Timestamp,
        grace: Duration,
    ) -> MarketResult<Outcome> {
        let mut tx = self.store.begin().await?;
        let outcome = auto_pass_in(tx.as_mut(), task_id, now, grace).await;
        let outcome = finish(tx, outcome).await?;
        if matches!(outcome, Outcome::Applied) {
            tracing::info!(task_id = %task_id, "Verifier timeout, task auto-passed");
        }
        Ok(outcome)
    }
}

async fn expire_in(tx: &mut dyn MarketTx, task_id: TaskId, now: Timestamp) -> MarketResult<Outcome> {
    let mut task = tx
        .task_for_update(task_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Task, task_id))?;
    if !task.is_overdue(now) {
        return Ok(Outcome::Skipped);
    }
    tasks::expire_in(tx, &mut task, now).await?;
    Ok(Outcome::Applied)
}

async fn auto_pass_in(
    tx: &mut dyn MarketTx,
    task_id: TaskId,
    now: Timestamp,
    grace: Duration,
) -> MarketResult<Outcome> {
    let mut task = tx
        .task_for_update(task_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Task, task_id))?;
    if !task.is_verification_overdue(now, grace) {
        return Ok(Outcome::Skipped);
    }
    tasks::auto_pass_in(tx, &mut task, now).await?;
    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_camel_case() {
        let report = SweepReport {
            executor_timeout: 2,
            refunded: 1,
            errors: vec![SweepFailure {
                task_id: uuid::Uuid::nil(),
                phase: SweepPhase::ExecutorTimeout,
                error: "boom".into(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["executorTimeout"], 2);
        assert_eq!(json["autoPassed"], 0);
        assert_eq!(json["errors"][0]["phase"], "executor_timeout");
        assert_eq!(json["errors"][0]["taskId"], uuid::Uuid::nil().to_string());
    }
}
