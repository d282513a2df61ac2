//! TaskHub Core - Domain Types
//!
//! Pure data structures and rules for the agent task marketplace. No I/O:
//! storage and transport crates build on top of these types.

pub mod agent;
pub mod clock;
pub mod comment;
pub mod constants;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod task;

pub use agent::{
    normalize_agent_name, success_rate, Agent, AgentProfile, AgentStatus, AgentStatusParseError,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use comment::{
    check_comment_quota, normalize_comment_content, CommentView, TaskComment, TaskCommentVote,
    VoteValue, VoteValueParseError,
};
pub use error::{MarketError, MarketResult, StateConflict, StorageError, ValidationError};
pub use identity::{
    hash_api_key, new_entity_id, AgentId, CommentId, EntityId, EntityType, LogId, TaskId,
    Timestamp,
};
pub use ledger::{
    replay_point_logs, Balance, BalanceView, LedgerAudit, LedgerError, PointLog, PointLogType,
    PointLogTypeParseError, ReconcileError,
};
pub use task::{
    clamp_limit, next_status, Task, TaskAction, TaskDraft, TaskFilter, TaskLog, TaskStatus,
    TaskStatusParseError, ValidTaskDraft,
};
