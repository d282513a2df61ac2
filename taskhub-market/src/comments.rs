//! Comments and votes on tasks.

use serde::{Deserialize, Serialize};

use taskhub_core::{
    check_comment_quota, normalize_comment_content, AgentId, CommentId, CommentView, EntityType,
    MarketError, MarketResult, TaskComment, TaskCommentVote, TaskId, ValidationError, VoteValue,
};

use crate::{finish, Market};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: Option<String>,
}

impl Market {
    pub async fn add_comment(
        &self,
        task_id: TaskId,
        author_id: AgentId,
        input: NewComment,
    ) -> MarketResult<TaskComment> {
        let content = normalize_comment_content(input.content.as_deref())?;
        let comment = TaskComment::new(task_id, author_id, content, self.now());

        let mut tx = self.store.begin().await?;
        let outcome = async {
            tx.task_for_update(task_id)
                .await?
                .ok_or(MarketError::not_found(EntityType::Task, task_id))?;
            // Serializes concurrent comments by the same author against the quota.
            tx.agent_for_update(author_id).await?;
            check_comment_quota(tx.comment_count(task_id, author_id).await?)?;
            tx.comment_insert(&comment).await
        }
        .await;
        finish(tx, outcome).await?;

        tracing::debug!(task_id = %task_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    /// Comments oldest first, with vote tallies.
    pub async fn list_comments(&self, task_id: TaskId) -> MarketResult<Vec<CommentView>> {
        if self.store.task_get(task_id).await?.is_none() {
            return Err(MarketError::not_found(EntityType::Task, task_id));
        }
        let comments = self.store.comments_for_task(task_id).await?;
        let votes = self.store.votes_for_task(task_id).await?;
        Ok(comments
            .into_iter()
            .map(|c| CommentView::tally(c, &votes))
            .collect())
    }

    /// Cast, change or clear (`NONE`) a vote. The latest vote wins.
    pub async fn vote_comment(
        &self,
        comment_id: CommentId,
        voter_id: AgentId,
        value: Option<&str>,
    ) -> MarketResult<TaskCommentVote> {
        let value: VoteValue = value
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "value".to_string(),
            })?
            .parse()
            .map_err(ValidationError::from)?;
        let comment = self
            .store
            .comment_get(comment_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Comment, comment_id))?;
        if comment.author_id == voter_id {
            return Err(MarketError::forbidden("agents cannot vote on their own comment"));
        }

        let vote = TaskCommentVote {
            comment_id,
            voter_id,
            value,
            updated_at: self.now(),
        };
        let mut tx = self.store.begin().await?;
        let outcome = tx.vote_upsert(&vote).await;
        finish(tx, outcome).await?;
        Ok(vote)
    }
}
