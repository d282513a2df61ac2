//! Ledger operations.
//!
//! Each function re-reads the agent row through the caller's transaction
//! (locking it), applies the balance change and appends the matching
//! [`PointLog`]. Nothing here commits: a failure anywhere in the caller's
//! transaction discards the ledger writes with it.

use taskhub_core::{
    replay_point_logs, Agent, AgentId, BalanceView, EntityType, LedgerAudit, MarketError,
    MarketResult, PointLog, PointLogType, TaskId, Timestamp,
};
use taskhub_storage::MarketTx;

use crate::Market;

async fn locked_agent(tx: &mut dyn MarketTx, agent_id: AgentId) -> MarketResult<Agent> {
    tx.agent_for_update(agent_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Agent, agent_id))
}

/// Escrow `amount` of the agent's available balance against `task_id`.
pub async fn freeze(
    tx: &mut dyn MarketTx,
    agent_id: AgentId,
    amount: i64,
    task_id: TaskId,
    now: Timestamp,
) -> MarketResult<Agent> {
    let mut agent = locked_agent(tx, agent_id).await?;
    agent.balance = agent
        .balance
        .freeze(amount)
        .map_err(|e| MarketError::from_ledger(agent_id, e))?;
    agent.updated_at = now;
    tx.agent_update(&agent).await?;
    tx.point_log_append(&PointLog::new(
        agent_id,
        -amount,
        PointLogType::TaskSpend,
        Some(task_id),
        agent.balance,
        now,
    ))
    .await?;
    Ok(agent)
}

/// Return escrowed `amount` to the agent's available balance without
/// crediting `points`. Rejection only.
pub async fn release(
    tx: &mut dyn MarketTx,
    agent_id: AgentId,
    amount: i64,
    task_id: TaskId,
    now: Timestamp,
) -> MarketResult<Agent> {
    let mut agent = locked_agent(tx, agent_id).await?;
    agent.balance = agent
        .balance
        .release(amount)
        .map_err(|e| MarketError::from_ledger(agent_id, e))?;
    agent.updated_at = now;
    tx.agent_update(&agent).await?;
    tx.point_log_append(&PointLog::new(
        agent_id,
        amount,
        PointLogType::TaskRefund,
        Some(task_id),
        agent.balance,
        now,
    ))
    .await?;
    Ok(agent)
}

/// Full refund for cancellation and executor timeout: the escrow is
/// released and `amount` is credited back to `points`.
///
/// The `TASK_REFUND` entry records the change in available balance, which is
/// twice the task reward.
pub async fn refund(
    tx: &mut dyn MarketTx,
    agent_id: AgentId,
    amount: i64,
    task_id: TaskId,
    now: Timestamp,
) -> MarketResult<Agent> {
    let mut agent = locked_agent(tx, agent_id).await?;
    let before = agent.balance.available();
    agent.balance = agent
        .balance
        .refund(amount)
        .map_err(|e| MarketError::from_ledger(agent_id, e))?;
    agent.updated_at = now;
    tx.agent_update(&agent).await?;
    tx.point_log_append(&PointLog::new(
        agent_id,
        agent.balance.available() - before,
        PointLogType::TaskRefund,
        Some(task_id),
        agent.balance,
        now,
    ))
    .await?;
    Ok(agent)
}

/// Pay `amount` from the payer's escrow to the payee.
///
/// The payer's spend was logged at freeze time, so only the payee's
/// `TASK_REWARD` entry is appended. Rows are locked in id order.
pub async fn settle(
    tx: &mut dyn MarketTx,
    payer_id: AgentId,
    payee_id: AgentId,
    amount: i64,
    task_id: TaskId,
    now: Timestamp,
) -> MarketResult<(Agent, Agent)> {
    if payer_id == payee_id {
        return Err(MarketError::Internal {
            reason: format!("settlement payer and payee are both {}", payer_id),
        });
    }
    let (mut payer, mut payee) = if payer_id < payee_id {
        let payer = locked_agent(tx, payer_id).await?;
        (payer, locked_agent(tx, payee_id).await?)
    } else {
        let payee = locked_agent(tx, payee_id).await?;
        (locked_agent(tx, payer_id).await?, payee)
    };

    payer.balance = payer
        .balance
        .settle_debit(amount)
        .map_err(|e| MarketError::from_ledger(payer_id, e))?;
    payee.balance = payee
        .balance
        .credit(amount)
        .map_err(|e| MarketError::from_ledger(payee_id, e))?;
    payer.updated_at = now;
    payee.updated_at = now;

    tx.agent_update(&payer).await?;
    tx.agent_update(&payee).await?;
    tx.point_log_append(&PointLog::new(
        payee_id,
        amount,
        PointLogType::TaskReward,
        Some(task_id),
        payee.balance,
        now,
    ))
    .await?;
    Ok((payer, payee))
}

/// Credit the one-time registration bonus.
pub async fn record_init(
    tx: &mut dyn MarketTx,
    agent_id: AgentId,
    amount: i64,
    now: Timestamp,
) -> MarketResult<Agent> {
    let mut agent = locked_agent(tx, agent_id).await?;
    agent.balance = agent
        .balance
        .credit(amount)
        .map_err(|e| MarketError::from_ledger(agent_id, e))?;
    agent.updated_at = now;
    tx.agent_update(&agent).await?;
    tx.point_log_append(&PointLog::new(
        agent_id,
        amount,
        PointLogType::Init,
        None,
        agent.balance,
        now,
    ))
    .await?;
    Ok(agent)
}

// ============================================================================
// READ VIEWS
// ============================================================================

impl Market {
    pub async fn balance(&self, agent_id: AgentId) -> MarketResult<BalanceView> {
        let agent = self
            .store
            .agent_get(agent_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Agent, agent_id))?;
        Ok(agent.balance.into())
    }

    /// Ledger entries, newest first.
    pub async fn point_history(
        &self,
        agent_id: AgentId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> MarketResult<Vec<PointLog>> {
        let limit = taskhub_core::clamp_limit(limit);
        let offset = offset.unwrap_or(0).max(0);
        self.store.point_log_page(agent_id, limit, offset).await
    }

    /// Replay the agent's ledger and compare it with their available balance.
    pub async fn audit_ledger(&self, agent_id: AgentId) -> MarketResult<LedgerAudit> {
        let agent = self
            .store
            .agent_get(agent_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Agent, agent_id))?;
        let logs = self.store.point_log_replay(agent_id).await?;
        let available_points = agent.available_points();
        let (replayed_balance, consistent) = match replay_point_logs(&logs) {
            Ok(replayed) => (replayed, replayed == available_points),
            Err(err) => {
                tracing::warn!(agent_id = %agent_id, error = %err, "Point log replay mismatch");
                (err.replayed, false)
            }
        };
        Ok(LedgerAudit {
            agent_id,
            entries: logs.len(),
            replayed_balance,
            available_points,
            consistent,
        })
    }
}
