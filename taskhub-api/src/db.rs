//! Postgres Store
//!
//! Connection pooling via deadpool-postgres and the [`MarketStore`]
//! implementation backed by the schema in `migrations/001_init.sql`.
//!
//! A [`PgTx`] owns one pooled connection for its whole lifetime and runs
//! `BEGIN`/`COMMIT`/`ROLLBACK` on it. `*_for_update` reads take row locks
//! with `SELECT ... FOR UPDATE`, so the market's lock ordering (task row
//! first, then agent rows in ascending id order) is enforced by Postgres.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use taskhub_core::{
    Agent, AgentId, AgentStatus, Balance, CommentId, EntityType, MarketError, MarketResult,
    PointLog, PointLogType, StorageError, Task, TaskComment, TaskCommentVote, TaskFilter, TaskId,
    TaskLog, TaskStatus, Timestamp, ValidationError, VoteValue,
};
use taskhub_storage::{MarketStore, MarketTx};

use crate::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_POOL_SIZE, DEFAULT_DB_PORT,
    DEFAULT_DB_TIMEOUT_SECS, DEFAULT_DB_USER,
};
use crate::error::{ApiError, ApiResult};

const SCHEMA_SQL: &str = include_str!("../migrations/001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    /// Wait limit for a pooled connection.
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
        }
    }
}

impl DbConfig {
    /// Read `TASKHUB_DB_*` variables, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TASKHUB_DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string()),
            port: std::env::var("TASKHUB_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_PORT),
            dbname: std::env::var("TASKHUB_DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string()),
            user: std::env::var("TASKHUB_DB_USER").unwrap_or_else(|_| DEFAULT_DB_USER.to_string()),
            password: std::env::var("TASKHUB_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TASKHUB_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(
                std::env::var("TASKHUB_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),
            ),
        }
    }

    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

/// Apply the schema. Every statement is idempotent.
pub async fn run_migrations(pool: &Pool) -> ApiResult<()> {
    let conn = pool.get().await?;
    conn.batch_execute(SCHEMA_SQL).await?;
    tracing::info!("Database schema applied");
    Ok(())
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn db_err(err: tokio_postgres::Error) -> MarketError {
    if let Some(db) = err.as_db_error() {
        if db.code() == &SqlState::UNIQUE_VIOLATION {
            let constraint = match db.constraint() {
                Some("agents_name_lower_idx") => "agent_name_unique",
                Some("tasks_one_active_per_executor_idx") => "one_active_task_per_executor",
                Some(other) => other,
                None => "unique",
            };
            return ValidationError::ConstraintViolation {
                constraint: constraint.to_string(),
                reason: db.message().to_string(),
            }
            .into();
        }
    }
    tracing::error!("Database error: {:?}", err);
    StorageError::Backend {
        reason: err.to_string(),
    }
    .into()
}

fn pool_err(err: PoolError) -> MarketError {
    tracing::error!("Connection pool error: {:?}", err);
    StorageError::Backend {
        reason: format!("connection pool: {}", err),
    }
    .into()
}

fn corrupt(table: &str, reason: impl std::fmt::Display) -> MarketError {
    StorageError::Corrupt {
        table: table.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const AGENT_COLUMNS: &str = "id, name, description, api_key_hash, points, frozen_points, \
     total_tasks, success_tasks, success_rate, status, created_at, updated_at";

const TASK_COLUMNS: &str = "id, title, description, points, timeout_hours, deadline, status, \
     creator_id, executor_id, progress, result, result_url, delivery_summary, created_at, \
     claimed_at, completed_at, verified_at, updated_at";

const POINT_LOG_COLUMNS: &str = "id, agent_id, amount, type, task_id, balance, created_at";

const TASK_LOG_COLUMNS: &str = "id, task_id, status, progress, message, result, created_at";

const COMMENT_COLUMNS: &str = "id, task_id, author_id, content, created_at";

fn agent_from_row(row: &Row) -> MarketResult<Agent> {
    let points: i64 = row.try_get("points").map_err(db_err)?;
    let frozen: i64 = row.try_get("frozen_points").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Agent {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        api_key_hash: row.try_get("api_key_hash").map_err(db_err)?,
        balance: Balance::new(points, frozen).map_err(|e| corrupt("agents", e))?,
        total_tasks: row.try_get("total_tasks").map_err(db_err)?,
        success_tasks: row.try_get("success_tasks").map_err(db_err)?,
        success_rate: row.try_get("success_rate").map_err(db_err)?,
        status: AgentStatus::from_db_str(&status).map_err(|e| corrupt("agents", e))?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn task_from_row(row: &Row) -> MarketResult<Task> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Task {
        id: row.try_get("id").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        points: row.try_get("points").map_err(db_err)?,
        timeout_hours: row.try_get("timeout_hours").map_err(db_err)?,
        deadline: row.try_get("deadline").map_err(db_err)?,
        status: TaskStatus::from_db_str(&status).map_err(|e| corrupt("tasks", e))?,
        creator_id: row.try_get("creator_id").map_err(db_err)?,
        executor_id: row.try_get("executor_id").map_err(db_err)?,
        progress: row.try_get("progress").map_err(db_err)?,
        result: row.try_get("result").map_err(db_err)?,
        result_url: row.try_get("result_url").map_err(db_err)?,
        delivery_summary: row.try_get("delivery_summary").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        claimed_at: row.try_get("claimed_at").map_err(db_err)?,
        completed_at: row.try_get("completed_at").map_err(db_err)?,
        verified_at: row.try_get("verified_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn point_log_from_row(row: &Row) -> MarketResult<PointLog> {
    let log_type: String = row.try_get("type").map_err(db_err)?;
    Ok(PointLog {
        id: row.try_get("id").map_err(db_err)?,
        agent_id: row.try_get("agent_id").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        log_type: PointLogType::from_db_str(&log_type).map_err(|e| corrupt("point_logs", e))?,
        task_id: row.try_get("task_id").map_err(db_err)?,
        balance: row.try_get("balance").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn task_log_from_row(row: &Row) -> MarketResult<TaskLog> {
    let status: Option<String> = row.try_get("status").map_err(db_err)?;
    let status = status
        .map(|s| TaskStatus::from_db_str(&s))
        .transpose()
        .map_err(|e| corrupt("task_logs", e))?;
    Ok(TaskLog {
        id: row.try_get("id").map_err(db_err)?,
        task_id: row.try_get("task_id").map_err(db_err)?,
        status,
        progress: row.try_get("progress").map_err(db_err)?,
        message: row.try_get("message").map_err(db_err)?,
        result: row.try_get("result").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn comment_from_row(row: &Row) -> MarketResult<TaskComment> {
    Ok(TaskComment {
        id: row.try_get("id").map_err(db_err)?,
        task_id: row.try_get("task_id").map_err(db_err)?,
        author_id: row.try_get("author_id").map_err(db_err)?,
        content: row.try_get("content").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn vote_from_row(row: &Row) -> MarketResult<TaskCommentVote> {
    let value: String = row.try_get("value").map_err(db_err)?;
    Ok(TaskCommentVote {
        comment_id: row.try_get("comment_id").map_err(db_err)?,
        voter_id: row.try_get("voter_id").map_err(db_err)?,
        value: VoteValue::from_db_str(&value).map_err(|e| corrupt("task_comment_votes", e))?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn collect<T>(rows: &[Row], map: fn(&Row) -> MarketResult<T>) -> MarketResult<Vec<T>> {
    rows.iter().map(map).collect()
}

fn ids(rows: &[Row]) -> MarketResult<Vec<TaskId>> {
    rows.iter()
        .map(|row| row.try_get::<_, TaskId>(0).map_err(db_err))
        .collect()
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> MarketResult<Object> {
        self.pool.get().await.map_err(pool_err)
    }
}

#[async_trait]
impl MarketStore for PgStore {
    async fn begin(&self) -> MarketResult<Box<dyn MarketTx>> {
        let conn = self.conn().await?;
        conn.batch_execute("BEGIN").await.map_err(db_err)?;
        Ok(Box::new(PgTx { conn: Some(conn) }))
    }

    async fn ping(&self) -> MarketResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(db_err)?;
        Ok(())
    }

    async fn agent_get(&self, id: AgentId) -> MarketResult<Option<Agent>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM agents WHERE id = $1", AGENT_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await.map_err(db_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn agent_by_key_hash(&self, api_key_hash: &str) -> MarketResult<Option<Agent>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM agents WHERE api_key_hash = $1", AGENT_COLUMNS);
        let row = conn.query_opt(&sql, &[&api_key_hash]).await.map_err(db_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn task_get(&self, id: TaskId) -> MarketResult<Option<Task>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await.map_err(db_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn task_list(&self, filter: &TaskFilter) -> MarketResult<Vec<Task>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM tasks \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR creator_id = $2) \
               AND ($3::uuid IS NULL OR executor_id = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5",
            TASK_COLUMNS
        );
        let status = filter.status.map(|s| s.as_db_str());
        let rows = conn
            .query(
                &sql,
                &[
                    &status,
                    &filter.creator_id,
                    &filter.executor_id,
                    &filter.effective_limit(),
                    &filter.effective_offset(),
                ],
            )
            .await
            .map_err(db_err)?;
        collect(&rows, task_from_row)
    }

    async fn task_logs(&self, task_id: TaskId) -> MarketResult<Vec<TaskLog>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM task_logs WHERE task_id = $1 ORDER BY created_at, id",
            TASK_LOG_COLUMNS
        );
        let rows = conn.query(&sql, &[&task_id]).await.map_err(db_err)?;
        collect(&rows, task_log_from_row)
    }

    async fn point_log_page(
        &self,
        agent_id: AgentId,
        limit: i64,
        offset: i64,
    ) -> MarketResult<Vec<PointLog>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM point_logs WHERE agent_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            POINT_LOG_COLUMNS
        );
        let rows = conn
            .query(&sql, &[&agent_id, &limit.max(0), &offset.max(0)])
            .await
            .map_err(db_err)?;
        collect(&rows, point_log_from_row)
    }

    async fn point_log_replay(&self, agent_id: AgentId) -> MarketResult<Vec<PointLog>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM point_logs WHERE agent_id = $1 ORDER BY created_at, id",
            POINT_LOG_COLUMNS
        );
        let rows = conn.query(&sql, &[&agent_id]).await.map_err(db_err)?;
        collect(&rows, point_log_from_row)
    }

    async fn comment_get(&self, id: CommentId) -> MarketResult<Option<TaskComment>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM task_comments WHERE id = $1", COMMENT_COLUMNS);
        let row = conn.query_opt(&sql, &[&id]).await.map_err(db_err)?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn comments_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskComment>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM task_comments WHERE task_id = $1 ORDER BY created_at, id",
            COMMENT_COLUMNS
        );
        let rows = conn.query(&sql, &[&task_id]).await.map_err(db_err)?;
        collect(&rows, comment_from_row)
    }

    async fn votes_for_task(&self, task_id: TaskId) -> MarketResult<Vec<TaskCommentVote>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT v.comment_id, v.voter_id, v.value, v.updated_at \
                 FROM task_comment_votes v \
                 JOIN task_comments c ON c.id = v.comment_id \
                 WHERE c.task_id = $1",
                &[&task_id],
            )
            .await
            .map_err(db_err)?;
        collect(&rows, vote_from_row)
    }

    async fn overdue_task_ids(&self, now: Timestamp, limit: i64) -> MarketResult<Vec<TaskId>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id FROM tasks \
                 WHERE status IN ('CLAIMED', 'EXECUTING') AND deadline < $1 \
                 ORDER BY deadline LIMIT $2",
                &[&now, &limit.max(0)],
            )
            .await
            .map_err(db_err)?;
        ids(&rows)
    }

    async fn unverified_task_ids(
        &self,
        completed_before: Timestamp,
        limit: i64,
    ) -> MarketResult<Vec<TaskId>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id FROM tasks \
                 WHERE status = 'COMPLETED' AND completed_at < $1 \
                 ORDER BY completed_at LIMIT $2",
                &[&completed_before, &limit.max(0)],
            )
            .await
            .map_err(db_err)?;
        ids(&rows)
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// An open Postgres transaction on a dedicated pooled connection.
pub struct PgTx {
    conn: Option<Object>,
}

impl PgTx {
    fn conn(&self) -> MarketResult<&Object> {
        self.conn.as_ref().ok_or_else(|| {
            StorageError::TransactionFailed {
                reason: "transaction already finished".to_string(),
            }
            .into()
        })
    }

    async fn execute_one(
        &self,
        entity_type: EntityType,
        id: uuid::Uuid,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> MarketResult<()> {
        let affected = self.conn()?.execute(sql, params).await.map_err(db_err)?;
        if affected != 1 {
            return Err(StorageError::UpdateFailed {
                entity_type,
                id,
                reason: format!("{} rows affected", affected),
            }
            .into());
        }
        Ok(())
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        // A connection with an open transaction must not go back to the pool.
        if let Some(conn) = self.conn.take() {
            tracing::debug!("Discarding connection of unfinished transaction");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl MarketTx for PgTx {
    async fn agent_for_update(&mut self, id: AgentId) -> MarketResult<Option<Agent>> {
        let sql = format!("SELECT {} FROM agents WHERE id = $1 FOR UPDATE", AGENT_COLUMNS);
        let row = self.conn()?.query_opt(&sql, &[&id]).await.map_err(db_err)?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn agent_name_taken(&mut self, name: &str) -> MarketResult<bool> {
        let row = self
            .conn()?
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM agents WHERE LOWER(name) = LOWER($1))",
                &[&name],
            )
            .await
            .map_err(db_err)?;
        row.try_get(0).map_err(db_err)
    }

    async fn agent_insert(&mut self, agent: &Agent) -> MarketResult<()> {
        let sql = format!(
            "INSERT INTO agents ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            AGENT_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                &[
                    &agent.id,
                    &agent.name,
                    &agent.description,
                    &agent.api_key_hash,
                    &agent.balance.points,
                    &agent.balance.frozen_points,
                    &agent.total_tasks,
                    &agent.success_tasks,
                    &agent.success_rate,
                    &agent.status.as_db_str(),
                    &agent.created_at,
                    &agent.updated_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn agent_update(&mut self, agent: &Agent) -> MarketResult<()> {
        self.execute_one(
            EntityType::Agent,
            agent.id,
            "UPDATE agents SET points = $2, frozen_points = $3, total_tasks = $4, \
             success_tasks = $5, success_rate = $6, status = $7, updated_at = $8 \
             WHERE id = $1",
            &[
                &agent.id,
                &agent.balance.points,
                &agent.balance.frozen_points,
                &agent.total_tasks,
                &agent.success_tasks,
                &agent.success_rate,
                &agent.status.as_db_str(),
                &agent.updated_at,
            ],
        )
        .await
    }

    async fn task_for_update(&mut self, id: TaskId) -> MarketResult<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = $1 FOR UPDATE", TASK_COLUMNS);
        let row = self.conn()?.query_opt(&sql, &[&id]).await.map_err(db_err)?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn task_insert(&mut self, task: &Task) -> MarketResult<()> {
        let sql = format!(
            "INSERT INTO tasks ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
             $11, $12, $13, $14, $15, $16, $17, $18)",
            TASK_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                &[
                    &task.id,
                    &task.title,
                    &task.description,
                    &task.points,
                    &task.timeout_hours,
                    &task.deadline,
                    &task.status.as_db_str(),
                    &task.creator_id,
                    &task.executor_id,
                    &task.progress,
                    &task.result,
                    &task.result_url,
                    &task.delivery_summary,
                    &task.created_at,
                    &task.claimed_at,
                    &task.completed_at,
                    &task.verified_at,
                    &task.updated_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn task_update(&mut self, task: &Task) -> MarketResult<()> {
        self.execute_one(
            EntityType::Task,
            task.id,
            "UPDATE tasks SET deadline = $2, status = $3, executor_id = $4, progress = $5, \
             result = $6, result_url = $7, delivery_summary = $8, claimed_at = $9, \
             completed_at = $10, verified_at = $11, updated_at = $12 \
             WHERE id = $1",
            &[
                &task.id,
                &task.deadline,
                &task.status.as_db_str(),
                &task.executor_id,
                &task.progress,
                &task.result,
                &task.result_url,
                &task.delivery_summary,
                &task.claimed_at,
                &task.completed_at,
                &task.verified_at,
                &task.updated_at,
            ],
        )
        .await
    }

    async fn active_task_for(&mut self, executor_id: AgentId) -> MarketResult<Option<TaskId>> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id FROM tasks \
                 WHERE executor_id = $1 AND status IN ('CLAIMED', 'EXECUTING') LIMIT 1",
                &[&executor_id],
            )
            .await
            .map_err(db_err)?;
        row.map(|r| r.try_get(0).map_err(db_err)).transpose()
    }

    async fn point_log_append(&mut self, log: &PointLog) -> MarketResult<()> {
        let sql = format!(
            "INSERT INTO point_logs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            POINT_LOG_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                &[
                    &log.id,
                    &log.agent_id,
                    &log.amount,
                    &log.log_type.as_db_str(),
                    &log.task_id,
                    &log.balance,
                    &log.created_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn task_log_append(&mut self, log: &TaskLog) -> MarketResult<()> {
        let sql = format!(
            "INSERT INTO task_logs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            TASK_LOG_COLUMNS
        );
        let status = log.status.map(|s| s.as_db_str());
        self.conn()?
            .execute(
                &sql,
                &[
                    &log.id,
                    &log.task_id,
                    &status,
                    &log.progress,
                    &log.message,
                    &log.result,
                    &log.created_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn comment_count(&mut self, task_id: TaskId, author_id: AgentId) -> MarketResult<i64> {
        let row = self
            .conn()?
            .query_one(
                "SELECT COUNT(*) FROM task_comments WHERE task_id = $1 AND author_id = $2",
                &[&task_id, &author_id],
            )
            .await
            .map_err(db_err)?;
        row.try_get(0).map_err(db_err)
    }

    async fn comment_insert(&mut self, comment: &TaskComment) -> MarketResult<()> {
        let sql = format!(
            "INSERT INTO task_comments ({}) VALUES ($1, $2, $3, $4, $5)",
            COMMENT_COLUMNS
        );
        self.conn()?
            .execute(
                &sql,
                &[
                    &comment.id,
                    &comment.task_id,
                    &comment.author_id,
                    &comment.content,
                    &comment.created_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn vote_upsert(&mut self, vote: &TaskCommentVote) -> MarketResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO task_comment_votes (comment_id, voter_id, value, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (comment_id, voter_id) \
                 DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
                &[
                    &vote.comment_id,
                    &vote.voter_id,
                    &vote.value.as_db_str(),
                    &vote.updated_at,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> MarketResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "transaction already finished".to_string(),
        })?;
        conn.batch_execute("COMMIT").await.map_err(|e| {
            MarketError::from(StorageError::TransactionFailed {
                reason: format!("commit failed: {}", e),
            })
        })
    }

    async fn rollback(&mut self) -> MarketResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "transaction already finished".to_string(),
        })?;
        conn.batch_execute("ROLLBACK").await.map_err(|e| {
            MarketError::from(StorageError::TransactionFailed {
                reason: format!("rollback failed: {}", e),
            })
        })
    }
}
