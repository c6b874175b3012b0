#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use doc_store::{
    Document, DocumentStore, Fields, MemoryStore, Query, StoreError, StoreResult, Subscription,
};
use uuid::Uuid;

use lounge_messaging::config::Config;
use lounge_messaging::models::branch::Branch;
use lounge_messaging::models::message::{ImageAttachment, MessageDraft, Sender, SenderRole};
use lounge_messaging::services::branch_service::BranchService;

pub fn test_config() -> Config {
    Config::default()
}

pub async fn seed_branch(store: &dyn DocumentStore, name: &str) -> Branch {
    BranchService::register(store, name, "12 Orchid Way", "+31 20 555 0100", "hello@lounge.test")
        .await
        .expect("branch seed")
}

pub fn customer(name: &str) -> Sender {
    Sender {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@customers.test", name.to_lowercase()),
        role: SenderRole::Customer,
        phone: Some("+31 6 5555 0199".to_string()),
    }
}

pub fn branch_admin(name: &str) -> Sender {
    Sender {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@staff.test", name.to_lowercase()),
        role: SenderRole::BranchAdmin,
        phone: None,
    }
}

pub fn draft(sender: &Sender, branch_id: Uuid, content: &str) -> MessageDraft {
    MessageDraft {
        sender: sender.clone(),
        branch_id,
        conversation_id: None,
        content: content.to_string(),
        image: None,
        file_url: None,
        reply_to: None,
    }
}

pub fn reply_draft(
    sender: &Sender,
    branch_id: Uuid,
    conversation_id: Uuid,
    content: &str,
    reply_to: Uuid,
) -> MessageDraft {
    MessageDraft {
        conversation_id: Some(conversation_id),
        reply_to: Some(reply_to),
        ..draft(sender, branch_id, content)
    }
}

pub fn png_attachment(label: &str) -> ImageAttachment {
    ImageAttachment {
        // "hello" in base64; any valid payload will do.
        data: "aGVsbG8=".to_string(),
        label: label.to_string(),
    }
}

/// Store wrapper that fails every operation while the switch is on. Stands
/// in for network outages and permission rejections.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.check()?;
        self.inner.query(query).await
    }

    async fn get(&self, collection: &str, id: Uuid) -> StoreResult<Document> {
        self.check()?;
        self.inner.get(collection, id).await
    }

    async fn add(&self, collection: &str, fields: Fields) -> StoreResult<Document> {
        self.check()?;
        self.inner.add(collection, fields).await
    }

    async fn update(&self, collection: &str, id: Uuid, patch: Fields) -> StoreResult<()> {
        self.check()?;
        self.inner.update(collection, id, patch).await
    }

    async fn update_many(
        &self,
        collection: &str,
        patches: Vec<(Uuid, Fields)>,
    ) -> StoreResult<()> {
        self.check()?;
        self.inner.update_many(collection, patches).await
    }

    async fn delete(&self, collection: &str, id: Uuid) -> StoreResult<()> {
        self.check()?;
        self.inner.delete(collection, id).await
    }

    async fn subscribe(&self, query: &Query) -> StoreResult<Subscription> {
        self.check()?;
        self.inner.subscribe(query).await
    }
}

/// Shorthand for the usual test wiring: a fresh in-memory store plus a
/// handle typed as the trait object the crate consumes.
pub fn memory_store() -> (MemoryStore, Arc<dyn DocumentStore>) {
    let memory = MemoryStore::new();
    let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
    (memory, store)
}
