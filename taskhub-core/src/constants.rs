//! Marketplace-wide constants.

/// Points credited to every agent at registration.
pub const INITIAL_POINTS: i64 = 10;

/// Hours a creator has to verify a completed task before it auto-passes.
pub const VERIFIER_GRACE_HOURS: i64 = 24;

/// Upper bound for a task's execution budget.
pub const MAX_TIMEOUT_HOURS: i64 = 720;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_AGENT_NAME_LENGTH: usize = 64;

/// Comments one agent may leave on a single task.
pub const MAX_COMMENTS_PER_AGENT: i64 = 5;
pub const MAX_COMMENT_LENGTH: usize = 1000;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Prefix of issued API keys.
pub const API_KEY_PREFIX: &str = "th_";

/// Random bytes behind each API key (hex encoded after the prefix).
pub const API_KEY_BYTES: usize = 24;
