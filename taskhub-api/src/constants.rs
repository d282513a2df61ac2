//! API-layer defaults.

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "taskhub";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_POOL_SIZE: usize = 16;
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// Timeout sweep job
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;

/// `message` of every successful envelope.
pub const OK_MESSAGE: &str = "ok";
