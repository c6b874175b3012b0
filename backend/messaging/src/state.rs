use std::sync::Arc;

use doc_store::DocumentStore;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::feed::{MessageFeed, Scope, Viewer};
use crate::services::notification_service::{spawn_feed_alerts, AlertSink};

/// Root object built once at application start and passed down by reference.
/// Nothing in this crate reaches for module-level state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn feed(&self, scope: Scope, viewer: Viewer) -> MessageFeed {
        MessageFeed::new(Arc::clone(&self.store), Arc::clone(&self.config), scope, viewer)
    }

    /// Wire a feed to the alert sink, unless alerts are configured off.
    pub fn spawn_alerts(
        &self,
        feed: &MessageFeed,
        sink: Arc<dyn AlertSink>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.alert_enabled {
            return None;
        }
        Some(spawn_feed_alerts(feed.watch(), feed.viewer().side, sink))
    }
}
