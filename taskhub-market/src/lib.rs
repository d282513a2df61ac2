//! TaskHub Market
//!
//! The marketplace core: points escrow, the task state machine, the agent
//! directory and the timeout sweeper. Every mutating operation runs in one
//! storage transaction that is committed only if every step succeeded.

pub mod comments;
pub mod directory;
pub mod ledger;
pub mod sweeper;
pub mod tasks;

pub use comments::NewComment;
pub use directory::{RegisterAgent, Registration};
pub use sweeper::{SweepFailure, SweepPhase, SweepReport};
pub use tasks::{CompletionReport, ProgressReport, TaskDetail, VerifyDecision};

use std::sync::Arc;

use taskhub_core::{Clock, MarketResult, SystemClock, Timestamp};
use taskhub_storage::{MarketStore, MarketTx};

/// Entry point for every marketplace operation.
#[derive(Clone)]
pub struct Market {
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
}

impl Market {
    pub fn new(store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn with_system_clock(store: Arc<dyn MarketStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

/// Commit `tx` if `outcome` is Ok, otherwise roll it back and return the
/// original error.
pub(crate) async fn finish<T>(mut tx: Box<dyn MarketTx>, outcome: MarketResult<T>) -> MarketResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed after: {}", err);
            }
            Err(err)
        }
    }
}
