use super::Store;
use crate::audit::{DeliveryEntry, DeliveryLog, DeliveryStatus};
use chrono::{Duration, TimeZone, Utc};
use parley_core::config::MemoryConfig;
use parley_core::message::InboundMessageRecord;
use parley_core::traits::{ConversationState, MessageStore, UserStore};

/// Create an in-memory store for testing.
async fn test_store() -> Store {
    Store::new(&MemoryConfig {
        db_path: ":memory:".to_string(),
    })
    .await
    .unwrap()
}

fn record(id: &str, conversation: &str, secs: i64) -> InboundMessageRecord {
    InboundMessageRecord {
        id: id.to_string(),
        conversation_id: conversation.to_string(),
        sender_id: conversation.to_string(),
        body: format!("body of {id}"),
        timestamp: Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap() + Duration::seconds(secs),
        is_from_self: false,
    }
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let store = test_store().await;
    Store::run_migrations(store.pool()).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_messages_since_is_exclusive_and_ordered() {
    let store = test_store().await;
    // Inserted out of order on purpose.
    store.insert_inbound(&record("m3", "a@c.us", 30)).await.unwrap();
    store.insert_inbound(&record("m1", "a@c.us", 10)).await.unwrap();
    store.insert_inbound(&record("m2", "b@c.us", 20)).await.unwrap();

    let since = record("x", "a@c.us", 10).timestamp;
    let rows = store.get_messages_since(since).await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3"], "boundary row excluded, ascending order");
    assert_eq!(rows[0].timestamp, record("m2", "b@c.us", 20).timestamp);
}

#[tokio::test]
async fn test_insert_inbound_ignores_duplicates() {
    let store = test_store().await;
    let rec = record("m1", "a@c.us", 1);
    store.insert_inbound(&rec).await.unwrap();
    store.insert_inbound(&rec).await.unwrap();
    let rows = store
        .get_messages_since(rec.timestamp - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_self_flag_round_trips() {
    let store = test_store().await;
    let mut rec = record("m1", "a@c.us", 1);
    rec.is_from_self = true;
    store.insert_inbound(&rec).await.unwrap();
    let rows = store
        .get_messages_since(rec.timestamp - Duration::seconds(1))
        .await
        .unwrap();
    assert!(rows[0].is_from_self);
}

#[tokio::test]
async fn test_is_ready_until_closed() {
    let store = test_store().await;
    assert!(store.is_ready().await);
    store.close().await.unwrap();
    assert!(!store.is_ready().await);
}

#[tokio::test]
async fn test_user_upsert_and_lookup() {
    let store = test_store().await;
    assert!(store
        .get_user_by_address("1@c.us")
        .await
        .unwrap()
        .is_none());

    store
        .upsert_user("1@c.us", Some("Ana"), "user")
        .await
        .unwrap();
    store.upsert_user("1@c.us", None, "admin").await.unwrap();

    let user = store.get_user_by_address("1@c.us").await.unwrap().unwrap();
    assert_eq!(user.role, "admin");
    assert_eq!(user.display_name.as_deref(), Some("Ana"));
}

#[tokio::test]
async fn test_conversation_state_marks_survive_new_handle() {
    let store = test_store().await;
    store.initialize().await.unwrap();
    let rec = record("m1", "a@c.us", 1);

    assert!(store.should_process_message(&rec).await.unwrap());
    store.mark_message_processed(&rec).await.unwrap();
    store.mark_message_processed(&rec).await.unwrap();

    // A second handle on the same database sees the mark.
    let reopened = store.clone();
    assert!(!reopened.should_process_message(&rec).await.unwrap());
    assert_eq!(reopened.processed_count("a@c.us").await.unwrap(), 1);
}

#[tokio::test]
async fn test_conversation_state_excludes_self_and_status() {
    let store = test_store().await;
    let mut own = record("m1", "a@c.us", 1);
    own.is_from_self = true;
    assert!(!store.should_process_message(&own).await.unwrap());

    let status = record("m2", "status@broadcast", 1);
    assert!(!store.should_process_message(&status).await.unwrap());
}

#[tokio::test]
async fn test_conversation_state_errors_after_close() {
    let store = test_store().await;
    store.close().await.unwrap();
    let rec = record("m1", "a@c.us", 1);
    assert!(store.should_process_message(&rec).await.is_err());
    assert!(store.initialize().await.is_err());
}

#[tokio::test]
async fn test_delivery_log_counts_by_status() {
    let store = test_store().await;
    let log = DeliveryLog::new(store.pool().clone());
    for status in [
        DeliveryStatus::Sent,
        DeliveryStatus::Sent,
        DeliveryStatus::Throttled,
    ] {
        log.log(&DeliveryEntry {
            recipient: "1@c.us".into(),
            text: "hi".into(),
            class: "chat".into(),
            status,
            reason: None,
        })
        .await
        .unwrap();
    }
    assert_eq!(log.count("1@c.us", DeliveryStatus::Sent).await.unwrap(), 2);
    assert_eq!(
        log.count("1@c.us", DeliveryStatus::Throttled).await.unwrap(),
        1
    );
    assert_eq!(log.count("1@c.us", DeliveryStatus::Failed).await.unwrap(), 0);
}
