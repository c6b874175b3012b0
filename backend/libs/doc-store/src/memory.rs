//! In-memory reference adapter.
//!
//! Backs the test suites and any single-process deployment. Change delivery
//! works like the real thing: every watcher gets the full result set of its
//! query after each relevant mutation, and a dropped subscription is pruned
//! on the next broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Document, DocumentStore, Fields, Query, SortOrder, StoreError, StoreEvent, StoreResult,
    Subscription,
};

struct Watcher {
    query: Query,
    tx: UnboundedSender<StoreEvent>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<Document>>,
    watchers: Vec<Watcher>,
    next_seq: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Monotonic, non-decreasing stamp. Equal stamps are legal; `seq` breaks
    /// the tie.
    fn stamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp {
            if now < last {
                now = last;
            }
        }
        self.last_stamp = Some(now);
        now
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        let mut out: Vec<Document> = self
            .collections
            .get(&query.collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|d| (d.created_at, d.seq));
        if query.order == SortOrder::Descending {
            out.reverse();
        }
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        out
    }

    fn find_mut(&mut self, collection: &str, id: Uuid) -> Option<&mut Document> {
        self.collections
            .get_mut(collection)?
            .iter_mut()
            .find(|d| d.id == id)
    }

    fn notify(&mut self, collection: &str) {
        let mut watchers = std::mem::take(&mut self.watchers);
        watchers.retain(|w| {
            if w.query.collection != collection {
                return !w.tx.is_closed();
            }
            let snapshot = self.run_query(&w.query);
            w.tx.send(StoreEvent::Snapshot(snapshot)).is_ok()
        });
        self.watchers = watchers;
    }
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live watcher count, after pruning. Test observability.
    pub async fn watcher_count(&self) -> usize {
        let mut guard = self.inner.write().await;
        guard.watchers.retain(|w| !w.tx.is_closed());
        guard.watchers.len()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        Ok(self.inner.read().await.run_query(query))
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Document> {
        self.inner
            .read()
            .await
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })
    }

    async fn add(&self, collection: &str, fields: Fields) -> StoreResult<Document> {
        let mut inner = self.inner.write().await;
        let created_at = inner.stamp();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let doc = Document {
            id: Uuid::new_v4(),
            seq,
            created_at,
            fields,
        };
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        inner.notify(collection);
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Fields) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .find_mut(collection, id)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        for (key, value) in patch {
            doc.fields.insert(key, value);
        }
        inner.notify(collection);
        Ok(())
    }

    async fn update_many(
        &self,
        collection: &str,
        patches: Vec<(Uuid, Fields)>,
    ) -> StoreResult<()> {
        if patches.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        // All-or-nothing: reject the whole batch before touching anything.
        for (id, _) in &patches {
            if inner.find_mut(collection, *id).is_none() {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    id: *id,
                });
            }
        }
        for (id, patch) in patches {
            if let Some(doc) = inner.find_mut(collection, id) {
                for (key, value) in patch {
                    doc.fields.insert(key, value);
                }
            }
        }
        inner.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let docs = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id,
            })?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id,
            });
        }
        inner.notify(collection);
        Ok(())
    }

    async fn subscribe(&self, query: &Query) -> StoreResult<Subscription> {
        let (tx, rx) = unbounded_channel();
        let mut inner = self.inner.write().await;
        let initial = inner.run_query(query);
        // The receiver is still held right here, so this send cannot fail.
        let _ = tx.send(StoreEvent::Snapshot(initial));
        inner.watchers.push(Watcher {
            query: query.clone(),
            tx,
        });
        tracing::debug!(
            collection = %query.collection,
            watchers = inner.watchers.len(),
            "watcher attached"
        );
        Ok(Subscription::new(rx))
    }
}
