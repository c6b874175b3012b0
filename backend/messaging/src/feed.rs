//! Per-scope state container between the repository and a rendering layer.
//!
//! A feed owns the cached message list for exactly one scope. Actions are
//! independent fire-and-forget operations; nothing is serialized, and when
//! two writes race on one message the last one to land at the store wins.

use std::sync::Arc;

use doc_store::{DocumentStore, Query, StoreEvent};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::message::{Message, MessageDraft, Side};
use crate::services::{map_store, message_service::MessageService, MESSAGES};

/// What a feed instance is bound to. Switching scope drops the cached list;
/// there is no cross-scope caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One customer's thread(s), optionally narrowed to one branch.
    Customer {
        customer_id: Uuid,
        branch_id: Option<Uuid>,
    },
    /// Everything addressed to one branch.
    Branch { branch_id: Uuid },
    /// One conversation.
    Conversation { conversation_id: Uuid },
}

impl Scope {
    fn query(&self, limit: Option<usize>) -> Query {
        let mut query = Query::new(MESSAGES);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        match self {
            Scope::Customer {
                customer_id,
                branch_id,
            } => {
                query = query.filter("customer_id", json!(customer_id));
                if let Some(branch_id) = branch_id {
                    query = query.filter("branch_id", json!(branch_id));
                }
                query
            }
            Scope::Branch { branch_id } => query.filter("branch_id", json!(branch_id)),
            Scope::Conversation { conversation_id } => {
                query.filter("conversation_id", json!(conversation_id))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub user_id: Uuid,
    pub side: Side,
}

/// State published to the rendering layer. `loading` covers imperative
/// actions only; live pushes replace `messages` without touching it.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<String>,
    pub live: bool,
}

pub struct MessageFeed {
    store: Arc<dyn DocumentStore>,
    config: Arc<Config>,
    viewer: Viewer,
    scope: Scope,
    state: Arc<watch::Sender<FeedSnapshot>>,
    live: Option<JoinHandle<()>>,
}

impl MessageFeed {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: Arc<Config>,
        scope: Scope,
        viewer: Viewer,
    ) -> Self {
        let (state, _rx) = watch::channel(FeedSnapshot::default());
        Self {
            store,
            config,
            viewer,
            scope,
            state: Arc::new(state),
            live: None,
        }
    }

    pub fn watch(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    /// Rebind the feed. The cached list is cleared back to idle and any live
    /// subscription is dropped; reopening a scope always re-fetches.
    pub fn set_scope(&mut self, scope: Scope) {
        self.unsubscribe();
        self.scope = scope;
        self.state.send_replace(FeedSnapshot::default());
    }

    pub async fn refresh(&self) {
        self.begin();
        match self.fetch().await {
            Ok(messages) => self.state.send_modify(|s| {
                s.messages = messages;
                s.loading = false;
                s.error = None;
            }),
            Err(e) => self.fail(e),
        }
    }

    pub async fn send_message(&self, draft: MessageDraft) {
        self.begin();
        match MessageService::send(self.store.as_ref(), &self.config, draft).await {
            Ok(_) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    pub async fn mark_message_as_read(&self, message_id: Uuid) {
        self.begin();
        match MessageService::mark_read(self.store.as_ref(), message_id, self.viewer.user_id).await
        {
            Ok(()) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    /// One batch per call. Concurrent calls are not deduplicated; each
    /// submits its own batch.
    pub async fn mark_all_messages_as_read(&self) {
        self.begin();
        let scope = self.scope.query(None);
        match MessageService::mark_all_read_in(self.store.as_ref(), scope, self.viewer.user_id)
            .await
        {
            Ok(_) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete_message_for_me(&self, message_id: Uuid) {
        self.begin();
        match MessageService::delete_for_me(self.store.as_ref(), message_id, self.viewer.user_id)
            .await
        {
            Ok(()) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete_message_for_everyone(&self, message_id: Uuid) {
        self.begin();
        match MessageService::delete_for_everyone(self.store.as_ref(), message_id).await {
            Ok(()) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    pub async fn edit_message(&self, message_id: Uuid, new_content: &str) {
        self.begin();
        match MessageService::edit(self.store.as_ref(), &self.config, message_id, new_content)
            .await
        {
            Ok(()) => self.settle().await,
            Err(e) => self.fail(e),
        }
    }

    /// Attach a live subscription on the current scope. Every push replaces
    /// the whole cached list; no incremental patching. A stream error is
    /// surfaced once and ends the subscription, it is not restarted here.
    pub async fn subscribe_live(&mut self) -> AppResult<()> {
        self.unsubscribe();
        let query = self.scope.query(Some(self.config.fetch_limit));
        let mut subscription = self
            .store
            .subscribe(&query)
            .await
            .map_err(map_store)?;

        let state = Arc::clone(&self.state);
        let viewer_id = self.viewer.user_id;
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                match event {
                    StoreEvent::Snapshot(docs) => {
                        let messages = MessageService::decode_visible(&docs, viewer_id);
                        state.send_modify(|s| {
                            s.messages = messages;
                            s.live = true;
                        });
                    }
                    StoreEvent::Error(e) => {
                        tracing::error!(error = %e, "message subscription failed");
                        state.send_modify(|s| {
                            s.error = Some(AppError::Store(e).to_string());
                            s.live = false;
                        });
                        return;
                    }
                }
            }
            state.send_modify(|s| s.live = false);
        });
        self.live = Some(task);
        Ok(())
    }

    /// Detach the live subscription. The only cancellation primitive; any
    /// in-flight single write keeps going, its effect is simply not watched.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.live.take() {
            task.abort();
            self.state.send_modify(|s| s.live = false);
        }
    }

    async fn fetch(&self) -> AppResult<Vec<Message>> {
        let store = self.store.as_ref();
        match &self.scope {
            Scope::Customer {
                customer_id,
                branch_id,
            } => {
                MessageService::fetch_for_customer(
                    store,
                    &self.config,
                    *customer_id,
                    *branch_id,
                    self.viewer.user_id,
                )
                .await
            }
            Scope::Branch { branch_id } => {
                MessageService::fetch_for_branch(
                    store,
                    &self.config,
                    *branch_id,
                    self.viewer.user_id,
                )
                .await
            }
            Scope::Conversation { conversation_id } => {
                MessageService::fetch_for_conversation(
                    store,
                    &self.config,
                    *conversation_id,
                    self.viewer.user_id,
                )
                .await
            }
        }
    }

    fn begin(&self) {
        self.state.send_modify(|s| s.loading = true);
    }

    /// After a successful mutation: live pushes own the list, otherwise
    /// reload it in place.
    async fn settle(&self) {
        let live = self.state.borrow().live;
        if live {
            self.state.send_modify(|s| {
                s.loading = false;
                s.error = None;
            });
            return;
        }
        match self.fetch().await {
            Ok(messages) => self.state.send_modify(|s| {
                s.messages = messages;
                s.loading = false;
                s.error = None;
            }),
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, error: AppError) {
        tracing::error!(error = %error, "feed action failed");
        // Not a queue: a newer failure overwrites an older one.
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(error.to_string());
        });
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        if let Some(task) = self.live.take() {
            task.abort();
        }
    }
}
