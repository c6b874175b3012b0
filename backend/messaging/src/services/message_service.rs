use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use doc_store::{fields_of, Document, DocumentStore, Query};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::conversation::{Conversation, CustomerInfo};
use crate::models::message::{
    DeliveryStatus, Message, MessageDraft, ReplyPreview, Side,
};
use crate::services::{
    branch_service::BranchService, conversation_service::ConversationService, map_store, MESSAGES,
};

pub struct MessageService;

impl MessageService {
    /// Write a new message. The caller supplies the draft; identity,
    /// creation time, read state and deletion state are assigned here and by
    /// the store. The parent conversation's `updated_at` is bumped in a
    /// separate follow-up write.
    pub async fn send(
        store: &dyn DocumentStore,
        config: &Config,
        draft: MessageDraft,
    ) -> AppResult<Message> {
        if draft.content.trim().is_empty() && draft.image.is_none() && draft.file_url.is_none() {
            return Err(AppError::BadRequest(
                "message needs text, an image, or a file".into(),
            ));
        }
        if draft.content.len() > config.max_content_len {
            return Err(AppError::BadRequest(format!(
                "message content too long (max {} bytes)",
                config.max_content_len
            )));
        }
        if let Some(image) = &draft.image {
            if STANDARD.decode(image.data.as_bytes()).is_err() {
                return Err(AppError::BadRequest(
                    "image payload is not valid base64".into(),
                ));
            }
        }

        let conversation = Self::resolve_conversation(store, &draft).await?;

        let reply_to = match draft.reply_to {
            Some(original_id) => Some(Self::reply_preview(store, original_id).await?),
            None => None,
        };

        let message = Message {
            conversation_id: conversation.id,
            customer_id: conversation.customer.id,
            branch_id: conversation.branch_id,
            branch_name: conversation.branch_name.clone(),
            sender: draft.sender,
            content: draft.content,
            image: draft.image,
            file_url: draft.file_url,
            reply_to,
            read: false,
            status: DeliveryStatus::Sent,
            ..Message::default()
        };

        let doc = store
            .add(MESSAGES, message.to_fields()?)
            .await
            .map_err(map_store)?;

        // Not atomic with the insert: a crash here leaves the conversation
        // timestamp stale while the message exists.
        ConversationService::touch(store, conversation.id).await?;

        tracing::debug!(
            message_id = %doc.id,
            conversation_id = %conversation.id,
            "message stored"
        );
        Message::from_document(&doc)
    }

    async fn resolve_conversation(
        store: &dyn DocumentStore,
        draft: &MessageDraft,
    ) -> AppResult<Conversation> {
        if let Some(conversation_id) = draft.conversation_id {
            let conversation = ConversationService::get(store, conversation_id).await?;
            if conversation.branch_id != draft.branch_id {
                return Err(AppError::BadRequest(
                    "conversation does not belong to this branch".into(),
                ));
            }
            return Ok(conversation);
        }
        if draft.sender.role.side() != Side::Customer {
            return Err(AppError::BadRequest(
                "staff messages must target an existing conversation".into(),
            ));
        }
        // First contact: the target branch must exist before a thread is
        // opened against it.
        let branch = BranchService::get(store, draft.branch_id).await?;
        let customer = CustomerInfo::from_sender(&draft.sender);
        ConversationService::ensure(store, &customer, branch.id, &branch.name).await
    }

    async fn reply_preview(
        store: &dyn DocumentStore,
        original_id: Uuid,
    ) -> AppResult<ReplyPreview> {
        let doc = store.get(MESSAGES, original_id).await.map_err(map_store)?;
        let original = Message::from_document(&doc)?;
        Ok(ReplyPreview {
            message_id: original.id,
            sender_name: original.sender.name,
            content: original.content,
            image_label: original.image.map(|i| i.label),
        })
    }

    pub async fn fetch_for_customer(
        store: &dyn DocumentStore,
        config: &Config,
        customer_id: Uuid,
        branch_id: Option<Uuid>,
        viewer_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        let mut query = Query::new(MESSAGES)
            .filter("customer_id", json!(customer_id))
            .limit(config.fetch_limit);
        if let Some(branch_id) = branch_id {
            query = query.filter("branch_id", json!(branch_id));
        }
        let docs = store.query(&query).await.map_err(map_store)?;
        Ok(Self::decode_visible(&docs, viewer_id))
    }

    pub async fn fetch_for_branch(
        store: &dyn DocumentStore,
        config: &Config,
        branch_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        let query = Query::new(MESSAGES)
            .filter("branch_id", json!(branch_id))
            .limit(config.fetch_limit);
        let docs = store.query(&query).await.map_err(map_store)?;
        Ok(Self::decode_visible(&docs, viewer_id))
    }

    pub async fn fetch_for_conversation(
        store: &dyn DocumentStore,
        config: &Config,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        let query = Query::new(MESSAGES)
            .filter("conversation_id", json!(conversation_id))
            .limit(config.fetch_limit);
        let docs = store.query(&query).await.map_err(map_store)?;
        Ok(Self::decode_visible(&docs, viewer_id))
    }

    /// Deserialize and viewer-filter a query result. A document that fails
    /// to decode is logged and dropped rather than poisoning the whole list.
    pub(crate) fn decode_visible(docs: &[Document], viewer_id: Uuid) -> Vec<Message> {
        docs.iter()
            .filter_map(|doc| match Message::from_document(doc) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(document_id = %doc.id, error = %e, "skipping malformed message");
                    None
                }
            })
            .filter(|m| m.visible_to(viewer_id))
            .collect()
    }

    /// Idempotent: a message that is already read is left untouched.
    pub async fn mark_read(
        store: &dyn DocumentStore,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let doc = store.get(MESSAGES, message_id).await.map_err(map_store)?;
        let message = Message::from_document(&doc)?;
        if message.read {
            return Ok(());
        }
        let now = store.server_time().await;
        let mut read_by = message.read_by;
        if !read_by.contains(&user_id) {
            read_by.push(user_id);
        }
        store
            .update(
                MESSAGES,
                message_id,
                fields_of(json!({
                    "read": true,
                    "read_by": read_by,
                    "read_at": now,
                    "status": DeliveryStatus::Seen,
                })),
            )
            .await
            .map_err(map_store)
    }

    /// Mark every unread message in scope as read, in one atomic batch. The
    /// caller's own messages are left alone. An empty unread set is a no-op.
    pub async fn mark_all_read_in(
        store: &dyn DocumentStore,
        scope: Query,
        user_id: Uuid,
    ) -> AppResult<usize> {
        let query = scope.filter("read", json!(false));
        let docs = store.query(&query).await.map_err(map_store)?;
        let now = store.server_time().await;

        let mut patches = Vec::new();
        for doc in &docs {
            let message = Message::from_document(doc)?;
            if message.sender.id == user_id || !message.visible_to(user_id) {
                continue;
            }
            let mut read_by = message.read_by;
            if !read_by.contains(&user_id) {
                read_by.push(user_id);
            }
            patches.push((
                doc.id,
                fields_of(json!({
                    "read": true,
                    "read_by": read_by,
                    "read_at": now,
                    "status": DeliveryStatus::Seen,
                })),
            ));
        }
        if patches.is_empty() {
            return Ok(0);
        }
        let updated = patches.len();
        store
            .update_many(MESSAGES, patches)
            .await
            .map_err(map_store)?;
        Ok(updated)
    }

    pub async fn mark_all_read_for_branch(
        store: &dyn DocumentStore,
        branch_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<usize> {
        let scope = Query::new(MESSAGES).filter("branch_id", json!(branch_id));
        Self::mark_all_read_in(store, scope, user_id).await
    }

    pub async fn mark_all_read_for_conversation(
        store: &dyn DocumentStore,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<usize> {
        let scope = Query::new(MESSAGES).filter("conversation_id", json!(conversation_id));
        Self::mark_all_read_in(store, scope, user_id).await
    }

    /// Hide a message from one user. Idempotent; the entry is added at most
    /// once.
    pub async fn delete_for_me(
        store: &dyn DocumentStore,
        message_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let doc = store.get(MESSAGES, message_id).await.map_err(map_store)?;
        let message = Message::from_document(&doc)?;
        if message.deleted_for.contains(&user_id) {
            return Ok(());
        }
        let mut deleted_for = message.deleted_for;
        deleted_for.push(user_id);
        store
            .update(
                MESSAGES,
                message_id,
                fields_of(json!({ "deleted_for": deleted_for })),
            )
            .await
            .map_err(map_store)
    }

    /// Hide a message from everyone. The document is retained for audit; it
    /// just never renders again.
    pub async fn delete_for_everyone(
        store: &dyn DocumentStore,
        message_id: Uuid,
    ) -> AppResult<()> {
        // Existence check first so a bad id surfaces as not-found.
        store.get(MESSAGES, message_id).await.map_err(map_store)?;
        store
            .update(
                MESSAGES,
                message_id,
                fields_of(json!({ "deleted_for_everyone": true })),
            )
            .await
            .map_err(map_store)
    }

    /// Replace the body of a message. Creation time and read state are not
    /// touched; only the content and the edit markers change.
    pub async fn edit(
        store: &dyn DocumentStore,
        config: &Config,
        message_id: Uuid,
        new_content: &str,
    ) -> AppResult<()> {
        if new_content.trim().is_empty() {
            return Err(AppError::BadRequest(
                "message content cannot be empty".into(),
            ));
        }
        if new_content.len() > config.max_content_len {
            return Err(AppError::BadRequest(format!(
                "message content too long (max {} bytes)",
                config.max_content_len
            )));
        }
        store.get(MESSAGES, message_id).await.map_err(map_store)?;
        let now = store.server_time().await;
        store
            .update(
                MESSAGES,
                message_id,
                fields_of(json!({
                    "content": new_content,
                    "edited": true,
                    "edited_at": now,
                })),
            )
            .await
            .map_err(map_store)
    }
}
