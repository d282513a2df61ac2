//! Task discussion: comments and votes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MAX_COMMENTS_PER_AGENT, MAX_COMMENT_LENGTH};
use crate::error::ValidationError;
use crate::{new_entity_id, AgentId, CommentId, TaskId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskComment {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: CommentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub task_id: TaskId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub author_id: AgentId,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl TaskComment {
    pub fn new(task_id: TaskId, author_id: AgentId, content: String, now: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            task_id,
            author_id,
            content,
            created_at: now,
        }
    }
}

/// Trim and length-check comment content.
pub fn normalize_comment_content(content: Option<&str>) -> Result<String, ValidationError> {
    let content = content.map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "content".to_string(),
        });
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ValidationError::InvalidValue {
            field: "content".to_string(),
            reason: format!("must be at most {} characters", MAX_COMMENT_LENGTH),
        });
    }
    Ok(content.to_string())
}

/// Fail once an agent has used up their comments on a task.
pub fn check_comment_quota(existing: i64) -> Result<(), ValidationError> {
    if existing >= MAX_COMMENTS_PER_AGENT {
        return Err(ValidationError::ConstraintViolation {
            constraint: "comments_per_agent".to_string(),
            reason: format!(
                "at most {} comments per agent per task",
                MAX_COMMENTS_PER_AGENT
            ),
        });
    }
    Ok(())
}

// ============================================================================
// VOTES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteValue {
    Up,
    Down,
    /// Clears a previous vote.
    None,
}

impl VoteValue {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            VoteValue::Up => "UP",
            VoteValue::Down => "DOWN",
            VoteValue::None => "NONE",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, VoteValueParseError> {
        match s.to_uppercase().as_str() {
            "UP" => Ok(VoteValue::Up),
            "DOWN" => Ok(VoteValue::Down),
            "NONE" => Ok(VoteValue::None),
            _ => Err(VoteValueParseError(s.to_string())),
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for VoteValue {
    type Err = VoteValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid vote string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteValueParseError(pub String);

impl fmt::Display for VoteValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid vote value: {}", self.0)
    }
}

impl std::error::Error for VoteValueParseError {}

impl From<VoteValueParseError> for ValidationError {
    fn from(err: VoteValueParseError) -> Self {
        ValidationError::InvalidValue {
            field: "value".to_string(),
            reason: format!("'{}' is not one of UP, DOWN, NONE", err.0),
        }
    }
}

/// One agent's vote on one comment. Rewritten on every vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskCommentVote {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub comment_id: CommentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub voter_id: AgentId,
    pub value: VoteValue,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// Comment with its vote tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: TaskComment,
    pub up_votes: i64,
    pub down_votes: i64,
}

impl CommentView {
    /// Tally `votes` that belong to `comment`.
    pub fn tally(comment: TaskComment, votes: &[TaskCommentVote]) -> Self {
        let mut up_votes = 0;
        let mut down_votes = 0;
        for vote in votes.iter().filter(|v| v.comment_id == comment.id) {
            match vote.value {
                VoteValue::Up => up_votes += 1,
                VoteValue::Down => down_votes += 1,
                VoteValue::None => {}
            }
        }
        Self {
            comment,
            up_votes,
            down_votes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_comment_content_limits() {
        assert_eq!(normalize_comment_content(Some(" hi ")).unwrap(), "hi");
        assert!(normalize_comment_content(Some("   ")).is_err());
        assert!(normalize_comment_content(Some(&"a".repeat(1000))).is_ok());
        assert!(normalize_comment_content(Some(&"a".repeat(1001))).is_err());
    }

    #[test]
    fn test_comment_quota() {
        assert!(check_comment_quota(4).is_ok());
        let err = check_comment_quota(5).unwrap_err();
        assert!(matches!(err, ValidationError::ConstraintViolation { .. }));
    }

    #[test]
    fn test_vote_value_parse() {
        assert_eq!("up".parse::<VoteValue>().unwrap(), VoteValue::Up);
        let err: ValidationError = "SIDEWAYS".parse::<VoteValue>().unwrap_err().into();
        assert!(err.to_string().contains("SIDEWAYS"));
    }

    #[test]
    fn test_tally_ignores_none_and_other_comments() {
        let now = Utc::now();
        let comment = TaskComment::new(Uuid::now_v7(), Uuid::now_v7(), "ok".into(), now);
        let vote = |comment_id, value| TaskCommentVote {
            comment_id,
            voter_id: Uuid::now_v7(),
            value,
            updated_at: now,
        };
        let votes = vec![
            vote(comment.id, VoteValue::Up),
            vote(comment.id, VoteValue::Up),
            vote(comment.id, VoteValue::Down),
            vote(comment.id, VoteValue::None),
            vote(Uuid::now_v7(), VoteValue::Up),
        ];
        let view = CommentView::tally(comment, &votes);
        assert_eq!(view.up_votes, 2);
        assert_eq!(view.down_votes, 1);
    }
}
