//! Collection/document store contract for the lounge backend.
//!
//! Persistence and change delivery are hidden behind [`DocumentStore`] so the
//! domain crates never depend on a concrete vendor SDK. The store owns
//! document identity and creation order: `id`, `seq` and `created_at` are
//! assigned exactly once at insert and cannot be touched by a patch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub mod memory;

pub use memory::MemoryStore;

/// JSON payload of a document. Field names are flat, values arbitrary JSON.
pub type Fields = serde_json::Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: Uuid },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("malformed document: {0}")]
    Serialization(String),
}

/// A stored document. `seq` and `created_at` are store metadata: `seq` is the
/// insert order used to break ties between equal timestamps, `created_at` is
/// monotonic per store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub fields: Fields,
}

impl Document {
    /// Look up a field by path. Dots descend into nested objects, so
    /// `"customer.id"` reads `fields["customer"]["id"]`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value. An absent field never matches.
    Eq(String, Value),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => doc.field(field) == Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A filtered, ordered, optionally bounded read over one collection.
/// Ordering is always by `(created_at, seq)`; `limit` is applied after
/// ordering, so a bounded query returns a prefix of the ordered set.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order: SortOrder::Ascending,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// One delivery on a live subscription.
#[derive(Debug)]
pub enum StoreEvent {
    /// The full result set of the watched query after a relevant change.
    Snapshot(Vec<Document>),
    /// Terminal stream failure. No further events follow; the subscription
    /// is not restarted by the store.
    Error(StoreError),
}

/// Registration handle for a live query. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches the watcher; that is the only
/// cancellation primitive the store offers.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<StoreEvent>,
}

impl Subscription {
    pub fn new(rx: UnboundedReceiver<StoreEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Document>;

    /// Insert a new document. The store assigns `id`, `seq` and `created_at`.
    async fn add(&self, collection: &str, fields: Fields) -> StoreResult<Document>;

    /// Shallow-merge `patch` into the document's fields. Store metadata is
    /// not patchable.
    async fn update(&self, collection: &str, id: Uuid, patch: Fields) -> StoreResult<()>;

    /// Apply every patch as one atomic write: either all land or none do,
    /// and watchers observe a single change.
    async fn update_many(
        &self,
        collection: &str,
        patches: Vec<(Uuid, Fields)>,
    ) -> StoreResult<()>;

    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<()>;

    /// Watch a query. The current result set is delivered immediately, then
    /// again after every change to the collection.
    async fn subscribe(&self, query: &Query) -> StoreResult<Subscription>;

    /// Store-side clock, used to stamp mutable timestamps in patches.
    async fn server_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convenience for building a patch out of a JSON object literal.
pub fn fields_of(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
