//! Behavioural tests of the record manager over an in-memory gateway
//!
//! Run with: cargo test --test record_manager_tests

use recordkeeper::{
    ChatManager, ChatPayload, JobId, ManualClock, MemoryGateway, PresetManager, PresetPayload,
    RecordPayload, StoreConfig,
};
use std::sync::Arc;

fn config() -> StoreConfig {
    StoreConfig::default().retry_backoff(std::time::Duration::from_millis(1))
}

async fn chats_at(start: i64) -> (ChatManager, MemoryGateway<ChatPayload>, Arc<ManualClock>) {
    let gateway = MemoryGateway::new();
    let clock = Arc::new(ManualClock::new(start));
    let manager = ChatManager::open_with(Arc::new(gateway.clone()), clock.clone(), &config())
        .await
        .unwrap();
    (manager, gateway, clock)
}

async fn presets_at(start: i64) -> (PresetManager, MemoryGateway<PresetPayload>, Arc<ManualClock>) {
    let gateway = MemoryGateway::new();
    let clock = Arc::new(ManualClock::new(start));
    let manager = PresetManager::open_with(Arc::new(gateway.clone()), clock.clone(), &config())
        .await
        .unwrap();
    (manager, gateway, clock)
}

#[tokio::test]
async fn test_tie_rename_conflict_and_delete_scenario() {
    let (chats, gateway, clock) = chats_at(50).await;
    clock.set(100);
    assert_eq!(chats.create("Chat A").await, "Chat A");
    assert_eq!(chats.create("Chat B").await, "Chat B");
    assert!(chats.delete("New Chat").await);

    assert_eq!(chats.names(), vec!["Chat A", "Chat B"]);
    assert_eq!(chats.current_name().as_deref(), Some("Chat B"));
    assert!(chats.set_current_job_id(JobId(7)));
    assert_eq!(chats.job_id_at(1), Some(JobId(7)));

    clock.set(150);
    assert!(!chats.rename("Chat A", "Chat B").await);
    assert_eq!(chats.names(), vec!["Chat A", "Chat B"]);
    assert_eq!(chats.get("Chat A").unwrap().last_modified, 100);
    chats.verify_invariants().unwrap();

    assert!(chats.delete("Chat A").await);
    assert_eq!(chats.names(), vec!["Chat B"]);
    assert_eq!(chats.job_id_at(0), Some(JobId(7)));
    assert_eq!(chats.name_by_job_id(JobId(7)).as_deref(), Some("Chat B"));
    chats.verify_invariants().unwrap();

    chats.flush().await.unwrap();
    let stored: Vec<String> = gateway.records().into_iter().map(|r| r.name).collect();
    assert_eq!(stored, vec!["Chat B"]);
}

#[tokio::test]
async fn test_create_same_hint_twice() {
    let (chats, _gateway, _clock) = chats_at(1).await;
    let first = chats.create("X").await;
    let second = chats.create("X").await;

    assert_eq!(first, "X");
    assert_eq!(second, "X (1)");
    assert!(chats.contains("X") && chats.contains("X (1)"));
    assert_eq!(chats.len(), 3);
}

#[tokio::test]
async fn test_rename_to_same_name_only_refreshes_timestamp() {
    let (chats, _gateway, clock) = chats_at(1).await;
    chats.create("same").await;
    let before = chats.len();

    clock.set(40);
    assert!(chats.rename("same", "same").await);
    assert_eq!(chats.len(), before);
    assert_eq!(chats.get("same").unwrap().last_modified, 40);
    assert_eq!(chats.sorted_position("same"), Some(0));
    chats.verify_invariants().unwrap();
}

#[tokio::test]
async fn test_rename_rejects_invalid_names() {
    let (chats, _gateway, _clock) = chats_at(1).await;

    assert!(!chats.rename("New Chat", "a/b").await);
    assert!(!chats.rename("New Chat", "").await);
    assert!(!chats.rename("New Chat", "   ").await);
    assert!(!chats.rename("New Chat", &"x".repeat(257)).await);
    assert!(!chats.rename("missing", "fine").await);
    assert!(chats.contains("New Chat"));

    assert!(chats.rename("New Chat", &"x".repeat(256)).await);
    chats.verify_invariants().unwrap();
}

#[tokio::test]
async fn test_deleting_selected_record_selects_most_recent() {
    let (chats, _gateway, clock) = chats_at(1).await;
    clock.set(10);
    chats.create("old").await;
    clock.set(50);
    chats.create("b").await;
    chats.create("a").await;
    clock.set(5);
    chats.create("gone").await;
    assert_eq!(chats.current_name().as_deref(), Some("gone"));

    assert!(chats.delete("gone").await);
    assert_eq!(chats.current_name().as_deref(), Some("a"));
    assert!(!chats.delete("gone").await);
}

#[tokio::test]
async fn test_deleting_last_preset_seeds_default() {
    let (presets, gateway, clock) = presets_at(1).await;
    assert_eq!(presets.names(), vec!["default"]);

    clock.set(2);
    assert!(presets.delete("default").await);
    assert_eq!(presets.len(), 1);
    let seeded = presets.current().unwrap();
    assert_eq!(seeded.name, "default");
    assert_eq!(seeded.last_modified, 2);
    assert_eq!(seeded.payload, PresetPayload::seed());

    presets.flush().await.unwrap();
    assert!(gateway.contains("default"));
}

#[tokio::test]
async fn test_unsaved_changes_track_last_save() {
    let (presets, gateway, _clock) = presets_at(1).await;
    presets.flush().await.unwrap();
    assert!(!presets.has_unsaved_changes());

    let mut hotter = presets.current().unwrap().payload;
    hotter.temperature = 1.2;
    assert!(presets.update_payload("default", hotter.clone()));
    assert!(presets.has_unsaved_changes());

    presets.save_current().await.unwrap();
    assert!(!presets.has_unsaved_changes());
    assert_eq!(gateway.get("default").unwrap().payload, hotter);

    assert!(presets.update_payload("default", PresetPayload::seed()));
    assert!(presets.has_unsaved_changes());
    assert!(presets.reset_current());
    assert_eq!(presets.current().unwrap().payload, hotter);
    assert!(!presets.has_unsaved_changes());
}

#[tokio::test]
async fn test_timestamp_lookup_and_sorted_position() {
    let (chats, _gateway, clock) = chats_at(1).await;
    clock.set(300);
    chats.create("late").await;
    clock.set(200);
    chats.create("early").await;

    assert_eq!(chats.get_by_timestamp(200).unwrap().name, "early");
    assert!(chats.get_by_timestamp(250).is_none());
    assert_eq!(chats.sorted_position("late"), Some(0));
    assert_eq!(chats.sorted_position("early"), Some(1));
    assert_eq!(chats.sorted_position("New Chat"), Some(2));
    assert_eq!(chats.sorted_position("missing"), None);
    assert_eq!(chats.most_recent().as_deref(), Some("late"));
}

#[tokio::test]
async fn test_touch_reorders_and_saves() {
    let (chats, gateway, clock) = chats_at(1).await;
    clock.set(10);
    chats.create("first").await;
    clock.set(20);
    chats.create("second").await;

    clock.set(30);
    assert!(chats.touch("first").await);
    assert!(!chats.touch("missing").await);
    assert_eq!(chats.names()[0], "first");

    chats.flush().await.unwrap();
    assert_eq!(gateway.get("first").unwrap().last_modified, 30);
}

#[tokio::test]
async fn test_select_most_recent_moves_cursor() {
    let (chats, _gateway, clock) = chats_at(1).await;
    clock.set(10);
    chats.create("newest").await;
    assert!(chats.switch_to("New Chat"));

    assert_eq!(chats.select_most_recent().as_deref(), Some("newest"));
    assert_eq!(chats.current_name().as_deref(), Some("newest"));
}

#[tokio::test]
async fn test_superseded_saves_are_counted_not_failed() {
    let (chats, gateway, _clock) = chats_at(1).await;
    gateway.set_delay(Some(std::time::Duration::from_millis(2)));
    let name = chats.create("busy").await;
    for _ in 0..5 {
        let _ = chats.persist(&name).await.unwrap();
    }
    chats.flush().await.unwrap();

    let stats = chats.persist_stats();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pending(), 0);
    assert_eq!(stats.completed + stats.superseded, stats.submitted);
    assert_eq!(<ChatPayload as RecordPayload>::KIND, "chat");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_copy_rolls_back_the_copy_not_its_name() {
    let (presets, gateway, _clock) = presets_at(1).await;
    presets.flush().await.unwrap();
    gateway.set_delay(Some(std::time::Duration::from_millis(100)));
    gateway.fail_writes(true);

    let presets = Arc::new(presets);
    let copying = {
        let presets = Arc::clone(&presets);
        tokio::spawn(async move { presets.duplicate_current("Copy").await })
    };
    while !presets.contains("Copy") {
        tokio::task::yield_now().await;
    }

    // The copy moves away and its old name is reused before the save fails.
    assert!(presets.rename("Copy", "Copy2").await);
    assert_eq!(presets.create("Copy").await, "Copy");

    assert!(copying.await.unwrap().is_err());
    assert_eq!(presets.names(), vec!["Copy", "default"]);
    presets.verify_invariants().unwrap();
}
