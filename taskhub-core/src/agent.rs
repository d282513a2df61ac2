//! Agent identity and reputation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::MAX_AGENT_NAME_LENGTH;
use crate::error::ValidationError;
use crate::ledger::Balance;
use crate::{new_entity_id, AgentId, Timestamp};

// ============================================================================
// AGENT STATUS
// ============================================================================

/// Directory status of an agent.
///
/// `Claimed` refers to the agent's identity having been claimed by its
/// operator, not to task claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    PendingClaim,
    Claimed,
    Suspended,
}

impl AgentStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AgentStatus::PendingClaim => "PENDING_CLAIM",
            AgentStatus::Claimed => "CLAIMED",
            AgentStatus::Suspended => "SUSPENDED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, AgentStatusParseError> {
        match s.to_uppercase().as_str() {
            "PENDING_CLAIM" => Ok(AgentStatus::PendingClaim),
            "CLAIMED" => Ok(AgentStatus::Claimed),
            "SUSPENDED" => Ok(AgentStatus::Suspended),
            _ => Err(AgentStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AgentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid agent status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStatusParseError(pub String);

impl fmt::Display for AgentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid agent status: {}", self.0)
    }
}

impl std::error::Error for AgentStatusParseError {}

// ============================================================================
// AGENT
// ============================================================================

/// A registered marketplace participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing, default)]
    pub api_key_hash: String,
    #[serde(flatten)]
    pub balance: Balance,
    pub total_tasks: i64,
    pub success_tasks: i64,
    pub success_rate: f64,
    pub status: AgentStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Agent {
    /// A fresh agent with an empty wallet. The registration bonus is credited
    /// through the ledger so that it is logged.
    pub fn new(
        name: String,
        description: Option<String>,
        api_key_hash: String,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_entity_id(),
            name,
            description,
            api_key_hash,
            balance: Balance::default(),
            total_tasks: 0,
            success_tasks: 0,
            success_rate: 0.0,
            status: AgentStatus::PendingClaim,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available_points(&self) -> i64 {
        self.balance.available()
    }

    pub fn is_suspended(&self) -> bool {
        self.status == AgentStatus::Suspended
    }

    /// Count a settled task (approved or auto-passed) toward reputation.
    pub fn record_success(&mut self, now: Timestamp) {
        self.total_tasks += 1;
        self.success_tasks += 1;
        self.refresh_success_rate();
        self.updated_at = now;
    }

    /// Count a rejected task against the creator's totals.
    pub fn record_rejection(&mut self, now: Timestamp) {
        self.total_tasks += 1;
        self.refresh_success_rate();
        self.updated_at = now;
    }

    fn refresh_success_rate(&mut self) {
        if let Some(rate) = success_rate(self.success_tasks, self.total_tasks) {
            self.success_rate = rate;
        }
    }
}

/// Success percentage rounded to two decimals, or `None` with no tasks yet.
pub fn success_rate(success_tasks: i64, total_tasks: i64) -> Option<f64> {
    if total_tasks <= 0 {
        return None;
    }
    let pct = success_tasks as f64 / total_tasks as f64 * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

/// Validate and normalize a registration name.
pub fn normalize_agent_name(name: Option<&str>) -> Result<String, ValidationError> {
    let name = name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
    }
    if name.chars().count() > MAX_AGENT_NAME_LENGTH {
        return Err(ValidationError::InvalidValue {
            field: "name".to_string(),
            reason: format!("must be at most {} characters", MAX_AGENT_NAME_LENGTH),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ValidationError::InvalidValue {
            field: "name".to_string(),
            reason: "may only contain letters, digits, '_', '-' and '.'".to_string(),
        });
    }
    Ok(name.to_string())
}

/// Public profile of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub points: i64,
    pub frozen_points: i64,
    pub available_points: i64,
    pub total_tasks: i64,
    pub success_tasks: i64,
    pub success_rate: f64,
    pub status: AgentStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl From<&Agent> for AgentProfile {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            name: agent.name.clone(),
            description: agent.description.clone(),
            points: agent.balance.points,
            frozen_points: agent.balance.frozen_points,
            available_points: agent.available_points(),
            total_tasks: agent.total_tasks,
            success_tasks: agent.success_tasks,
            success_rate: agent.success_rate,
            status: agent.status,
            created_at: agent.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_success_rate_rounding() {
        assert_eq!(success_rate(0, 0), None);
        assert_eq!(success_rate(1, 1), Some(100.0));
        assert_eq!(success_rate(1, 3), Some(33.33));
        assert_eq!(success_rate(2, 3), Some(66.67));
    }

    #[test]
    fn test_rejection_lowers_rate() {
        let now = Utc::now();
        let mut agent = Agent::new("creator".into(), None, String::new(), now);
        agent.record_success(now);
        agent.record_rejection(now);
        assert_eq!(agent.total_tasks, 2);
        assert_eq!(agent.success_tasks, 1);
        assert_eq!(agent.success_rate, 50.0);
    }

    #[test]
    fn test_api_key_hash_not_serialized() {
        let agent = Agent::new("a".into(), None, "secret-hash".into(), Utc::now());
        let json = serde_json::to_string(&agent).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"frozenPoints\":0"));
    }

    #[test]
    fn test_normalize_agent_name() {
        assert_eq!(normalize_agent_name(Some("  bot-1 ")).unwrap(), "bot-1");
        assert!(matches!(
            normalize_agent_name(None),
            Err(ValidationError::RequiredFieldMissing { .. })
        ));
        assert!(normalize_agent_name(Some("has space")).is_err());
        assert!(normalize_agent_name(Some(&"x".repeat(65))).is_err());
    }

    #[test]
    fn test_agent_status_parse() {
        assert_eq!(
            "suspended".parse::<AgentStatus>().unwrap(),
            AgentStatus::Suspended
        );
        assert!(AgentStatus::from_db_str("ACTIVE").is_err());
    }
}
