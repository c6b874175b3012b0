use chrono::{DateTime, Utc};
use doc_store::{Document, Fields, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::message::{Message, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
    Resolved,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl CustomerInfo {
    pub fn from_sender(sender: &Sender) -> Self {
        Self {
            id: sender.id,
            name: sender.name.clone(),
            email: sender.email.clone(),
            phone: sender.phone.clone(),
        }
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// One customer's thread with one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip, default = "epoch")]
    pub created_at: DateTime<Utc>,

    pub customer: CustomerInfo,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub status: ConversationStatus,
    /// Bumped whenever a message lands in the conversation.
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            customer: CustomerInfo::default(),
            branch_id: Uuid::nil(),
            branch_name: String::new(),
            status: ConversationStatus::Active,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl Conversation {
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let mut conversation: Conversation =
            serde_json::from_value(Value::Object(doc.fields.clone()))
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conversation.id = doc.id;
        conversation.created_at = doc.created_at;
        Ok(conversation)
    }

    pub fn to_fields(&self) -> AppResult<Fields> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Serialization("conversation is not an object".into()).into()),
            Err(e) => Err(StoreError::Serialization(e.to_string()).into()),
        }
    }
}

/// Read-side projection of a conversation. Recomputed from the message set
/// on every fetch and every push; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}
