use chrono::{DateTime, Utc};
use doc_store::{Document, Fields, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    #[default]
    Customer,
    Admin,
    BranchAdmin,
    SuperAdmin,
}

impl SenderRole {
    /// Which party of a conversation the role speaks for. Every staff role
    /// sits on the branch side.
    pub fn side(&self) -> Side {
        match self {
            SenderRole::Customer => Side::Customer,
            SenderRole::Admin | SenderRole::BranchAdmin | SenderRole::SuperAdmin => Side::Branch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Customer,
    Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Seen,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Sender {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: SenderRole,
    pub phone: Option<String>,
}

/// Inline-encoded image carried alongside the text body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAttachment {
    /// Base64 payload.
    pub data: String,
    pub label: String,
}

/// Snapshot of the message being replied to, taken at send time. Rendering a
/// reply preview never goes back to the original, which may have been edited
/// or hidden since.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyPreview {
    pub message_id: Uuid,
    pub sender_name: String,
    pub content: String,
    pub image_label: Option<String>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    // Store metadata. Assigned once at insert, never serialized back.
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip)]
    pub seq: u64,
    #[serde(skip, default = "epoch")]
    pub created_at: DateTime<Utc>,

    pub conversation_id: Uuid,
    pub customer_id: Uuid,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub sender: Sender,

    pub content: String,
    pub image: Option<ImageAttachment>,
    pub file_url: Option<String>,
    pub reply_to: Option<ReplyPreview>,

    pub read: bool,
    pub read_by: Vec<Uuid>,
    pub read_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,

    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,

    pub deleted_for: Vec<Uuid>,
    pub deleted_for_everyone: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            seq: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            conversation_id: Uuid::nil(),
            customer_id: Uuid::nil(),
            branch_id: Uuid::nil(),
            branch_name: String::new(),
            sender: Sender::default(),
            content: String::new(),
            image: None,
            file_url: None,
            reply_to: None,
            read: false,
            read_by: Vec::new(),
            read_at: None,
            status: DeliveryStatus::Sent,
            edited: false,
            edited_at: None,
            deleted_for: Vec::new(),
            deleted_for_everyone: false,
        }
    }
}

impl Message {
    /// Deserialize a stored document. Absent fields default here, once;
    /// downstream code never re-checks optionality.
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let mut message: Message = serde_json::from_value(Value::Object(doc.fields.clone()))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        message.id = doc.id;
        message.seq = doc.seq;
        message.created_at = doc.created_at;
        Ok(message)
    }

    pub fn to_fields(&self) -> AppResult<Fields> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Serialization("message is not an object".into()).into()),
            Err(e) => Err(StoreError::Serialization(e.to_string()).into()),
        }
    }

    /// A hard-hidden message is invisible to everyone; a soft-hidden one only
    /// to the users in its `deleted_for` list.
    pub fn visible_to(&self, user_id: Uuid) -> bool {
        !self.deleted_for_everyone && !self.deleted_for.contains(&user_id)
    }
}

/// Input to a send. Identity, timestamps, read and deletion state are all
/// assigned by the repository and the store, never by the caller.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub sender: Sender,
    pub branch_id: Uuid,
    /// Required for staff senders; a customer's first message creates the
    /// conversation implicitly.
    pub conversation_id: Option<Uuid>,
    pub content: String,
    pub image: Option<ImageAttachment>,
    pub file_url: Option<String>,
    /// Id of the message being replied to.
    pub reply_to: Option<Uuid>,
}
