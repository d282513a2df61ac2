//! Error types for TaskHub operations

use thiserror::Error;
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::task::{TaskAction, TaskStatus};
use crate::EntityType;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type}: {reason}")]
    InsertFailed {
        entity_type: EntityType,
        reason: String,
    },

    #[error("Update failed for {entity_type} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Operation not allowed in the task's current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateConflict {
    #[error("Task {task_id} is already claimed")]
    AlreadyClaimed { task_id: Uuid },

    #[error("Agent cannot claim their own task {task_id}")]
    SelfClaim { task_id: Uuid },

    #[error("Agent {agent_id} already holds active task {active_task_id}")]
    ExecutorBusy { agent_id: Uuid, active_task_id: Uuid },

    #[error("Cannot {action} task {task_id} in status {from}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        action: TaskAction,
    },
}

/// Master error type for marketplace operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("State conflict: {0}")]
    Conflict(#[from] StateConflict),

    #[error("Insufficient funds for agent {agent_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        agent_id: Uuid,
        available: i64,
        requested: i64,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl MarketError {
    pub fn not_found(entity_type: EntityType, id: Uuid) -> Self {
        MarketError::NotFound { entity_type, id }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        MarketError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        MarketError::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Attribute a balance arithmetic failure to `agent_id`.
    pub fn from_ledger(agent_id: Uuid, err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                requested,
            } => MarketError::InsufficientFunds {
                agent_id,
                available,
                requested,
            },
            other => MarketError::Internal {
                reason: format!("ledger invariant for agent {}: {}", agent_id, other),
            },
        }
    }

    /// Taxonomy name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "ValidationError",
            MarketError::Unauthenticated { .. } => "AuthError",
            MarketError::Forbidden { .. } => "AuthorizationError",
            MarketError::Conflict(_) => "StateConflict",
            MarketError::InsufficientFunds { .. } => "InsufficientFunds",
            MarketError::NotFound { .. } => "NotFoundError",
            MarketError::Storage(StorageError::NotFound { .. }) => "NotFoundError",
            MarketError::Storage(_) | MarketError::Internal { .. } => "InternalError",
        }
    }
}

/// Result type alias for marketplace operations.
pub type MarketResult<T> = Result<T, MarketError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_claimed_message() {
        let err = MarketError::from(StateConflict::AlreadyClaimed {
            task_id: Uuid::nil(),
        });
        assert!(err.to_string().contains("already claimed"));
        assert_eq!(err.kind(), "StateConflict");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = StateConflict::InvalidTransition {
            task_id: Uuid::nil(),
            from: TaskStatus::Done,
            action: TaskAction::Cancel,
        };
        let msg = err.to_string();
        assert!(msg.contains("cancel"));
        assert!(msg.contains("DONE"));
    }

    #[test]
    fn test_from_ledger_maps_insufficient_funds() {
        let err = MarketError::from_ledger(
            Uuid::nil(),
            LedgerError::InsufficientFunds {
                available: 3,
                requested: 10,
            },
        );
        assert_eq!(err.kind(), "InsufficientFunds");
        let err = MarketError::from_ledger(
            Uuid::nil(),
            LedgerError::FrozenUnderflow {
                frozen: 0,
                requested: 10,
            },
        );
        assert_eq!(err.kind(), "InternalError");
    }

    #[test]
    fn test_not_found_display() {
        let err = MarketError::not_found(EntityType::Task, Uuid::nil());
        assert_eq!(
            err.to_string(),
            "Task not found: 00000000-0000-0000-0000-000000000000"
        );
    }
}
