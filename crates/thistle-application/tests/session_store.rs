//! Session-store lifecycle scenarios: auth binding, member switches, and
//! the UI projections mirrored off the feed.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;

use common::{Harness, settle};
use thistle_application::store::SessionStore;
use thistle_core::{AppSettings, Member};

fn store_with_auth(harness: &Harness) -> (Arc<SessionStore>, watch::Sender<Option<Member>>) {
    let store = SessionStore::new(harness.services(), AppSettings::default());
    let (auth_tx, auth_rx) = watch::channel(None);
    store.start(auth_rx);
    (store, auth_tx)
}

/// Polls until `predicate` holds against the store's current snapshots.
async fn wait_until<F>(predicate: F, what: &str)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_login_binds_feed_and_mirrors_entries() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-1", 5));
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-2", 30));

    let (store, auth_tx) = store_with_auth(&harness);
    let mut auth_loaded = store.subscribe_auth_loaded();

    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 2, "mirrored entries").await;

    assert!(*auth_loaded.borrow_and_update());
    assert!(*store.subscribe_journal_loaded().borrow());
    assert!(!*store.subscribe_show_onboarding().borrow());
    let ids: Vec<String> = store
        .journal_entries()
        .into_iter()
        .map(|entry| entry.prompt_id)
        .collect();
    assert_eq!(ids, vec!["p-1", "p-2"]);
    assert!(store.feed().await.is_some());
}

#[tokio::test]
async fn test_logout_tears_down_feed_and_clears_projections() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-1", 5));

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 1, "mirrored entry").await;

    auth_tx.send_replace(None);
    wait_until(|| store.journal_entries().is_empty(), "cleared entries").await;

    assert!(store.feed().await.is_none());
    assert!(store.member().await.is_none());
    assert!(!*store.subscribe_journal_loaded().borrow());
    assert!(store.subscribe_today_entry().borrow().is_none());
    assert!(store.subscribe_onboarding_entry().borrow().is_none());
}

#[tokio::test]
async fn test_member_switch_starts_fresh_for_new_account() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-1", 5));
    let other = Member::new("m-2", "other@thistle.app");
    harness
        .prompts
        .add_prompt(thistle_core::SentPrompt::new(
            "q-1",
            other.id.clone(),
            Utc::now() - ChronoDuration::minutes(2),
        ));

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 1, "first member's entry").await;
    let first_feed = store.feed().await.expect("feed");

    auth_tx.send_replace(Some(other.clone()));
    wait_until(
        || {
            store
                .journal_entries()
                .first()
                .map(|entry| entry.prompt_id == "q-1")
                .unwrap_or(false)
        },
        "second member's entry",
    )
    .await;

    let second_feed = store.feed().await.expect("feed");
    assert!(!Arc::ptr_eq(&first_feed, &second_feed));
    assert_eq!(first_feed.count().await, 0);
    assert_eq!(store.journal_entries().len(), 1);
    assert_eq!(store.member().await.map(|m| m.id), Some("m-2".to_string()));
}

#[tokio::test]
async fn test_same_account_refresh_keeps_feed() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-1", 5));

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 1, "mirrored entry").await;
    let before = store.feed().await.expect("feed");

    // Same account id, refreshed profile.
    auth_tx.send_replace(Some(Member::new("m-1", "renamed@thistle.app")));
    settle().await;

    let after = store.feed().await.expect("feed");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(store.journal_entries().len(), 1);
    assert_eq!(
        store.member().await.map(|m| m.email),
        Some("renamed@thistle.app".to_string())
    );
}

#[tokio::test]
async fn test_pending_actions_run_fifo_once_member_resolves() {
    let harness = Harness::new();
    let (store, auth_tx) = store_with_auth(&harness);

    let ran: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for label in ["first", "second"] {
        let ran = Arc::clone(&ran);
        store
            .add_auth_action(Box::new(move |member| {
                ran.lock().unwrap().push(format!("{label}:{}", member.id));
            }))
            .await;
    }
    settle().await;
    assert!(ran.lock().unwrap().is_empty());

    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| ran.lock().unwrap().len() == 2, "queued actions").await;
    assert_eq!(
        *ran.lock().unwrap(),
        vec!["first:m-1".to_string(), "second:m-1".to_string()]
    );

    // With a member resolved, new actions run immediately and only once.
    {
        let ran = Arc::clone(&ran);
        store
            .add_auth_action(Box::new(move |member| {
                ran.lock().unwrap().push(format!("third:{}", member.id));
            }))
            .await;
    }
    settle().await;
    assert_eq!(ran.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_mirror_replays_removals_and_backfill() {
    let harness = Harness::new();
    for (id, minutes) in [("p-1", 5), ("p-2", 10), ("p-3", 15), ("p-4", 20)] {
        harness.prompts.add_prompt(harness.prompt_minutes_ago(id, minutes));
    }

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 3, "first page mirrored").await;

    let ids = |store: &SessionStore| -> Vec<String> {
        store
            .journal_entries()
            .into_iter()
            .map(|entry| entry.prompt_id)
            .collect()
    };
    assert_eq!(ids(&store), vec!["p-1", "p-2", "p-3"]);

    // Deleting inside a truncated window backfills p-4 in the same
    // snapshot; the mirror must apply the removal before the insertion.
    harness.prompts.remove_prompt("p-2");
    wait_until(
        || {
            store
                .journal_entries()
                .iter()
                .any(|entry| entry.prompt_id == "p-4")
        },
        "backfilled entry in the mirror",
    )
    .await;
    assert_eq!(ids(&store), vec!["p-1", "p-3", "p-4"]);

    // With nothing left behind the window, a deletion is a plain removal.
    harness.prompts.remove_prompt("p-4");
    wait_until(|| store.journal_entries().len() == 2, "shrunk mirror").await;
    assert_eq!(ids(&store), vec!["p-1", "p-3"]);
}

#[tokio::test]
async fn test_today_and_onboarding_projections() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-today", 1));
    harness
        .prompts
        .add_prompt(harness.prompt_at("p-first", Utc::now() - ChronoDuration::days(3)));

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 2, "mirrored entries").await;

    let today = store.subscribe_today_entry().borrow().clone();
    assert_eq!(today.map(|entry| entry.prompt_id), Some("p-today".to_string()));
    let onboarding = store.subscribe_onboarding_entry().borrow().clone();
    assert_eq!(
        onboarding.map(|entry| entry.prompt_id),
        Some("p-first".to_string())
    );
}

#[tokio::test]
async fn test_empty_journal_offers_onboarding() {
    let harness = Harness::new();
    let (store, auth_tx) = store_with_auth(&harness);
    let mut show_onboarding = store.subscribe_show_onboarding();

    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| *store.subscribe_journal_loaded().borrow(), "journal loaded").await;

    assert!(*show_onboarding.borrow_and_update());
    assert!(store.journal_entries().is_empty());
}

#[tokio::test]
async fn test_stop_detaches_from_auth_stream() {
    let harness = Harness::new();
    harness.prompts.add_prompt(harness.prompt_minutes_ago("p-1", 5));

    let (store, auth_tx) = store_with_auth(&harness);
    auth_tx.send_replace(Some(harness.member.clone()));
    wait_until(|| store.journal_entries().len() == 1, "mirrored entry").await;

    store.stop().await;
    assert!(store.feed().await.is_none());

    // Further auth changes are ignored once stopped.
    auth_tx.send_replace(None);
    settle().await;
    assert_eq!(store.member().await.map(|m| m.id), Some("m-1".to_string()));
}
