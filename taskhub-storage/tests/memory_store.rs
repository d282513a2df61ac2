//! Transaction semantics of the in-memory store.

use chrono::Utc;
use taskhub_core::{
    Agent, MarketError, StorageError, Task, TaskComment, TaskCommentVote, TaskDraft, VoteValue,
};
use taskhub_storage::{MarketStore, MemoryStore};

fn agent(name: &str) -> Agent {
    Agent::new(name.to_string(), None, format!("hash-{name}"), Utc::now())
}

fn task(creator: &Agent) -> Task {
    let draft = TaskDraft {
        title: Some("Label images".into()),
        points: Some(5),
        timeout_hours: Some(1),
        ..Default::default()
    }
    .validate()
    .unwrap();
    Task::new(draft, creator.id, Utc::now())
}

#[tokio::test]
async fn test_commit_makes_writes_visible() {
    let store = MemoryStore::new();
    let a = agent("alice");

    let mut tx = store.begin().await.unwrap();
    tx.agent_insert(&a).await.unwrap();
    tx.commit().await.unwrap();
    drop(tx);

    assert_eq!(store.agent_get(a.id).await.unwrap(), Some(a.clone()));
    assert_eq!(
        store.agent_by_key_hash("hash-alice").await.unwrap().map(|x| x.id),
        Some(a.id)
    );
}

#[tokio::test]
async fn test_drop_without_commit_discards_writes() {
    let store = MemoryStore::new();
    let a = agent("bob");

    {
        let mut tx = store.begin().await.unwrap();
        tx.agent_insert(&a).await.unwrap();
    }

    assert!(store.agent_get(a.id).await.unwrap().is_none());
    assert_eq!(store.agent_count().await, 0);
}

#[tokio::test]
async fn test_rollback_then_use_fails() {
    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    tx.agent_insert(&agent("carol")).await.unwrap();
    tx.rollback().await.unwrap();

    let err = tx.agent_insert(&agent("dave")).await.unwrap_err();
    assert!(matches!(
        err,
        MarketError::Storage(StorageError::TransactionFailed { .. })
    ));
    drop(tx);
    assert_eq!(store.agent_count().await, 0);
}

#[tokio::test]
async fn test_injected_task_write_failure() {
    let store = MemoryStore::new();
    let creator = store.seed_agent(agent("erin"), 50).await.unwrap();
    let t = task(&creator);
    store.fail_task_writes(t.id).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx.task_insert(&t).await.unwrap_err();
    assert_eq!(err.kind(), "InternalError");
    drop(tx);

    store.clear_failures().await;
    let mut tx = store.begin().await.unwrap();
    tx.task_insert(&t).await.unwrap();
    tx.commit().await.unwrap();
    drop(tx);
    assert_eq!(store.task_count().await, 1);
}

#[tokio::test]
async fn test_seed_agent_writes_init_entry() {
    let store = MemoryStore::new();
    let a = store.seed_agent(agent("frank"), 100).await.unwrap();
    assert_eq!(a.balance.points, 100);

    let logs = store.point_log_replay(a.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].amount, 100);
    assert_eq!(logs[0].balance, 100);
}

#[tokio::test]
async fn test_vote_upsert_last_write_wins() {
    let store = MemoryStore::new();
    let author = agent("gina");
    let voter = agent("hal");
    let t = task(&author);
    let comment = TaskComment::new(t.id, author.id, "nice".into(), Utc::now());

    let mut tx = store.begin().await.unwrap();
    tx.task_insert(&t).await.unwrap();
    tx.comment_insert(&comment).await.unwrap();
    for value in [VoteValue::Up, VoteValue::Down] {
        tx.vote_upsert(&TaskCommentVote {
            comment_id: comment.id,
            voter_id: voter.id,
            value,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    }
    assert_eq!(tx.comment_count(t.id, author.id).await.unwrap(), 1);
    tx.commit().await.unwrap();
    drop(tx);

    let votes = store.votes_for_task(t.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].value, VoteValue::Down);
}

#[tokio::test]
async fn test_transactions_are_serialized() {
    let store = MemoryStore::new();
    let a = store.seed_agent(agent("ivy"), 10).await.unwrap();

    let tx = store.begin().await.unwrap();
    let contender = {
        let store = store.clone();
        tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            tx.agent_for_update(a.id).await.unwrap()
        })
    };
    tokio::task::yield_now().await;
    assert!(!contender.is_finished());
    drop(tx);
    assert!(contender.await.unwrap().is_some());
}
