//! Points accounting primitives.
//!
//! An agent's wallet is a [`Balance`]: `points` is what the agent owns and
//! `frozen_points` is the part of it held in escrow against open tasks.
//! Spending never touches `points` until settlement, so the spendable figure
//! is always [`Balance::available`]. Every mutation goes through one of the
//! checked operations below, which refuse to produce a wallet where
//! `points >= frozen_points >= 0` does not hold.
//!
//! ```text
//! freeze(n)       points       frozen + n     (available - n)
//! release(n)      points       frozen - n     (available + n)
//! refund(n)       points + n   frozen - n     (available + 2n)
//! settle_debit(n) points - n   frozen - n     (available unchanged)
//! credit(n)       points + n   frozen         (available + n)
//! ```
//!
//! `release` is the rejection path. Cancellation and executor timeout use
//! `refund`, which also credits the escrowed amount back to `points`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{new_entity_id, AgentId, LogId, TaskId, Timestamp};

// ============================================================================
// BALANCE
// ============================================================================

/// Errors from balance arithmetic.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Frozen balance {frozen} cannot cover release of {requested}")]
    FrozenUnderflow { frozen: i64, requested: i64 },

    #[error("Invalid ledger amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Inconsistent balance: points {points}, frozen {frozen}")]
    Inconsistent { points: i64, frozen: i64 },
}

/// An agent's wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub points: i64,
    pub frozen_points: i64,
}

impl Balance {
    /// Build a balance, rejecting combinations that violate the wallet invariant.
    pub fn new(points: i64, frozen_points: i64) -> Result<Self, LedgerError> {
        let balance = Self {
            points,
            frozen_points,
        };
        if balance.is_consistent() {
            Ok(balance)
        } else {
            Err(LedgerError::Inconsistent {
                points,
                frozen: frozen_points,
            })
        }
    }

    /// Points not held in escrow.
    pub const fn available(&self) -> i64 {
        self.points - self.frozen_points
    }

    pub const fn is_consistent(&self) -> bool {
        self.frozen_points >= 0 && self.points >= self.frozen_points
    }

    /// Move `amount` of the available balance into escrow.
    pub fn freeze(self, amount: i64) -> Result<Self, LedgerError> {
        check_amount(amount)?;
        if self.available() < amount {
            return Err(LedgerError::InsufficientFunds {
                available: self.available(),
                requested: amount,
            });
        }
        Ok(Self {
            frozen_points: self.frozen_points + amount,
            ..self
        })
    }

    /// Return `amount` from escrow to the available balance.
    pub fn release(self, amount: i64) -> Result<Self, LedgerError> {
        check_amount(amount)?;
        if self.frozen_points < amount {
            return Err(LedgerError::FrozenUnderflow {
                frozen: self.frozen_points,
                requested: amount,
            });
        }
        Ok(Self {
            frozen_points: self.frozen_points - amount,
            ..self
        })
    }

    /// Unfreeze `amount` and credit it back to `points`.
    pub fn refund(self, amount: i64) -> Result<Self, LedgerError> {
        self.release(amount)?.credit(amount)
    }

    /// Pay out `amount` of escrow: the points leave the wallet entirely.
    pub fn settle_debit(self, amount: i64) -> Result<Self, LedgerError> {
        check_amount(amount)?;
        if self.frozen_points < amount {
            return Err(LedgerError::FrozenUnderflow {
                frozen: self.frozen_points,
                requested: amount,
            });
        }
        Ok(Self {
            points: self.points - amount,
            frozen_points: self.frozen_points - amount,
        })
    }

    /// Add `amount` to the wallet (registration bonus, task reward).
    pub fn credit(self, amount: i64) -> Result<Self, LedgerError> {
        check_amount(amount)?;
        let points = self
            .points
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount { amount })?;
        Ok(Self { points, ..self })
    }
}

fn check_amount(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

/// Read-only wallet view returned by the balance endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub points: i64,
    pub frozen_points: i64,
    pub available_points: i64,
}

impl From<Balance> for BalanceView {
    fn from(balance: Balance) -> Self {
        Self {
            points: balance.points,
            frozen_points: balance.frozen_points,
            available_points: balance.available(),
        }
    }
}

// ============================================================================
// POINT LOG
// ============================================================================

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointLogType {
    Init,
    TaskSpend,
    TaskReward,
    TaskRefund,
}

impl PointLogType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PointLogType::Init => "INIT",
            PointLogType::TaskSpend => "TASK_SPEND",
            PointLogType::TaskReward => "TASK_REWARD",
            PointLogType::TaskRefund => "TASK_REFUND",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, PointLogTypeParseError> {
        match s.to_uppercase().as_str() {
            "INIT" => Ok(PointLogType::Init),
            "TASK_SPEND" => Ok(PointLogType::TaskSpend),
            "TASK_REWARD" => Ok(PointLogType::TaskReward),
            "TASK_REFUND" => Ok(PointLogType::TaskRefund),
            _ => Err(PointLogTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for PointLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for PointLogType {
    type Err = PointLogTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid point log type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointLogTypeParseError(pub String);

impl fmt::Display for PointLogTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid point log type: {}", self.0)
    }
}

impl std::error::Error for PointLogTypeParseError {}

/// Immutable ledger entry.
///
/// `balance` is the agent's available balance after the entry was applied
/// and `amount` is the change in available balance the entry caused, so the
/// running sum of `amount` over an agent's entries equals `balance` at every
/// step. A cancellation refund of a `n`-point task is therefore logged as
/// `+2n`: the escrow returns and the same amount is credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PointLog {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: LogId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub amount: i64,
    #[serde(rename = "type")]
    pub log_type: PointLogType,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub task_id: Option<TaskId>,
    pub balance: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl PointLog {
    pub fn new(
        agent_id: AgentId,
        amount: i64,
        log_type: PointLogType,
        task_id: Option<TaskId>,
        after: Balance,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_entity_id(),
            agent_id,
            amount,
            log_type,
            task_id,
            balance: after.available(),
            created_at: now,
        }
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

/// A ledger entry whose recorded balance disagrees with the replayed sum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Point log {log_id} records balance {recorded}, replay gives {replayed}")]
pub struct ReconcileError {
    pub log_id: LogId,
    pub recorded: i64,
    pub replayed: i64,
}

/// Replay an agent's entries (oldest first) from zero.
///
/// Returns the final replayed balance, or the first entry that does not match.
pub fn replay_point_logs<'a, I>(logs: I) -> Result<i64, ReconcileError>
where
    I: IntoIterator<Item = &'a PointLog>,
{
    let mut running = 0i64;
    for log in logs {
        running += log.amount;
        if running != log.balance {
            return Err(ReconcileError {
                log_id: log.id,
                recorded: log.balance,
                replayed: running,
            });
        }
    }
    Ok(running)
}

/// Outcome of auditing one agent's ledger against their wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub entries: usize,
    pub replayed_balance: i64,
    pub available_points: i64,
    pub consistent: bool,
}
