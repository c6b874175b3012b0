mod common;

use common::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doc_store::DocumentStore;
use lounge_messaging::config::Config;
use lounge_messaging::feed::{Scope, Viewer};
use lounge_messaging::models::message::Side;
use lounge_messaging::services::message_service::MessageService;
use lounge_messaging::services::notification_service::AlertSink;
use lounge_messaging::state::AppState;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(2);

struct CountingSink(Arc<AtomicUsize>);

impl AlertSink for CountingSink {
    fn alert(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn refresh_loads_the_scope() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let mia = customer("Mia");
    let admin = branch_admin("Sanne");

    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "Hello"))
        .await
        .unwrap();

    let state = AppState::new(store, config);
    let feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );

    assert!(feed.snapshot().messages.is_empty());
    feed.refresh().await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn actions_reload_the_list_when_not_live() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let mia = customer("Mia");

    let state = AppState::new(store, config);
    let feed = state.feed(
        Scope::Customer {
            customer_id: mia.id,
            branch_id: Some(branch.id),
        },
        Viewer {
            user_id: mia.id,
            side: Side::Customer,
        },
    );

    feed.send_message(draft(&mia, branch.id, "Hello")).await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.error.is_none());

    let message_id = snapshot.messages[0].id;
    feed.edit_message(message_id, "Hello there").await;
    assert_eq!(feed.snapshot().messages[0].content, "Hello there");

    feed.delete_message_for_me(message_id).await;
    assert!(feed.snapshot().messages.is_empty());
}

#[tokio::test]
async fn customer_scope_only_sees_that_customer() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let mia = customer("Mia");
    let noor = customer("Noor");

    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "from mia"))
        .await
        .unwrap();
    MessageService::send(store.as_ref(), &config, draft(&noor, branch.id, "from noor"))
        .await
        .unwrap();

    let state = AppState::new(store, config);
    let feed = state.feed(
        Scope::Customer {
            customer_id: mia.id,
            branch_id: Some(branch.id),
        },
        Viewer {
            user_id: mia.id,
            side: Side::Customer,
        },
    );
    feed.refresh().await;
    let snapshot = feed.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content, "from mia");
}

#[tokio::test]
async fn live_pushes_replace_the_list_without_loading() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let mia = customer("Mia");
    let admin = branch_admin("Sanne");

    let state = AppState::new(Arc::clone(&store), config.clone());
    let mut feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );
    let mut rx = feed.watch();

    feed.subscribe_live().await.unwrap();
    timeout(WAIT, rx.wait_for(|s| s.live)).await.unwrap().unwrap();

    // A write lands through the repository, not through the feed; the
    // subscription alone carries it into the snapshot.
    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "Hello"))
        .await
        .unwrap();
    timeout(WAIT, rx.wait_for(|s| s.messages.len() == 1))
        .await
        .unwrap()
        .unwrap();

    let snapshot = feed.snapshot();
    assert!(snapshot.live);
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn unsubscribe_detaches_the_watcher() {
    let (memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let admin = branch_admin("Sanne");

    let state = AppState::new(Arc::clone(&store), config);
    let mut feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );
    let mut rx = feed.watch();
    feed.subscribe_live().await.unwrap();
    timeout(WAIT, rx.wait_for(|s| s.live)).await.unwrap().unwrap();

    feed.unsubscribe();
    assert!(!feed.snapshot().live);

    // The store-side watcher goes away once the aborted pump drops its
    // subscription.
    timeout(WAIT, async {
        while memory.watcher_count().await != 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn scope_switch_clears_the_cached_list() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let other = seed_branch(store.as_ref(), "Zuid").await;
    let mia = customer("Mia");
    let admin = branch_admin("Sanne");

    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "Hello"))
        .await
        .unwrap();

    let state = AppState::new(store, config);
    let mut feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );
    feed.refresh().await;
    assert_eq!(feed.snapshot().messages.len(), 1);

    feed.set_scope(Scope::Branch {
        branch_id: other.id,
    });
    let snapshot = feed.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
    assert!(!snapshot.live);
}

#[tokio::test]
async fn failures_surface_on_the_error_field_and_are_overwritten() {
    let memory = doc_store::MemoryStore::new();
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let store: Arc<dyn DocumentStore> = flaky.clone();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let admin = branch_admin("Sanne");

    let state = AppState::new(store, config);
    let feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );

    flaky.set_failing(true);
    feed.refresh().await;
    let first_error = feed.snapshot().error.unwrap();
    assert!(first_error.contains("unavailable"));

    // A different failure replaces the previous one; errors do not queue.
    flaky.set_failing(false);
    feed.edit_message(Uuid::new_v4(), "does not exist").await;
    let second_error = feed.snapshot().error.unwrap();
    assert!(second_error.contains("not found"));
    assert_ne!(first_error, second_error);

    // The next success clears it.
    feed.refresh().await;
    assert!(feed.snapshot().error.is_none());
}

#[tokio::test]
async fn unread_increases_ring_the_alert_and_decreases_stay_silent() {
    let (_memory, store) = memory_store();
    let config = test_config();
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let mia = customer("Mia");
    let admin = branch_admin("Sanne");

    let state = AppState::new(Arc::clone(&store), config.clone());
    let mut feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );
    let mut rx = feed.watch();
    feed.subscribe_live().await.unwrap();
    timeout(WAIT, rx.wait_for(|s| s.live)).await.unwrap().unwrap();

    let rings = Arc::new(AtomicUsize::new(0));
    let alerts = state
        .spawn_alerts(&feed, Arc::new(CountingSink(Arc::clone(&rings))))
        .expect("alerts enabled by default");

    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "one"))
        .await
        .unwrap();
    timeout(WAIT, async {
        while rings.load(Ordering::SeqCst) < 1 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    MessageService::send(store.as_ref(), &config, draft(&mia, branch.id, "two"))
        .await
        .unwrap();
    timeout(WAIT, async {
        while rings.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Draining the unread count lowers the total; lower never rings.
    feed.mark_all_messages_as_read().await;
    timeout(WAIT, rx.wait_for(|s| s.messages.iter().all(|m| m.read)))
        .await
        .unwrap()
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(rings.load(Ordering::SeqCst), 2);

    alerts.abort();
}

#[tokio::test]
async fn alerts_can_be_configured_off() {
    let (_memory, store) = memory_store();
    let config = Config {
        alert_enabled: false,
        ..Config::default()
    };
    let branch = seed_branch(store.as_ref(), "Centrum").await;
    let admin = branch_admin("Sanne");

    let state = AppState::new(store, config);
    let feed = state.feed(
        Scope::Branch {
            branch_id: branch.id,
        },
        Viewer {
            user_id: admin.id,
            side: Side::Branch,
        },
    );
    let sink = Arc::new(CountingSink(Arc::new(AtomicUsize::new(0))));
    assert!(state.spawn_alerts(&feed, sink).is_none());
}
