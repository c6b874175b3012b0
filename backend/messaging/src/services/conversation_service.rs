use doc_store::{fields_of, DocumentStore, Query};
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppResult;
use crate::models::conversation::{
    Conversation, ConversationStatus, ConversationSummary, CustomerInfo,
};
use crate::models::message::{Message, Side};
use crate::services::{map_store, message_service::MessageService, CONVERSATIONS};

pub struct ConversationService;

impl ConversationService {
    /// Find the (customer, branch) conversation, creating it on first
    /// contact. A customer has at most one conversation per branch.
    pub async fn ensure(
        store: &dyn DocumentStore,
        customer: &CustomerInfo,
        branch_id: Uuid,
        branch_name: &str,
    ) -> AppResult<Conversation> {
        let existing = store
            .query(
                &Query::new(CONVERSATIONS)
                    .filter("customer.id", json!(customer.id))
                    .filter("branch_id", json!(branch_id))
                    .limit(1),
            )
            .await
            .map_err(map_store)?;
        if let Some(doc) = existing.first() {
            return Conversation::from_document(doc);
        }

        let conversation = Conversation {
            customer: customer.clone(),
            branch_id,
            branch_name: branch_name.to_string(),
            status: ConversationStatus::Active,
            updated_at: store.server_time().await,
            ..Conversation::default()
        };
        let doc = store
            .add(CONVERSATIONS, conversation.to_fields()?)
            .await
            .map_err(map_store)?;
        Conversation::from_document(&doc)
    }

    pub async fn get(store: &dyn DocumentStore, conversation_id: Uuid) -> AppResult<Conversation> {
        let doc = store
            .get(CONVERSATIONS, conversation_id)
            .await
            .map_err(map_store)?;
        Conversation::from_document(&doc)
    }

    /// Bump `updated_at`. Missing conversations are an explicit failure, not
    /// a silent skip.
    pub async fn touch(store: &dyn DocumentStore, conversation_id: Uuid) -> AppResult<()> {
        let now = store.server_time().await;
        store
            .update(
                CONVERSATIONS,
                conversation_id,
                fields_of(json!({ "updated_at": now })),
            )
            .await
            .map_err(map_store)
    }

    pub async fn set_status(
        store: &dyn DocumentStore,
        conversation_id: Uuid,
        status: ConversationStatus,
    ) -> AppResult<()> {
        store
            .update(
                CONVERSATIONS,
                conversation_id,
                fields_of(json!({ "status": status })),
            )
            .await
            .map_err(map_store)
    }

    /// Unread count for a viewer side over a message set: messages from the
    /// other side, still unread, and not hard-hidden.
    pub fn unread_in(messages: &[Message], viewer_side: Side) -> usize {
        messages
            .iter()
            .filter(|m| !m.deleted_for_everyone && !m.read && m.sender.role.side() != viewer_side)
            .count()
    }

    /// Derive the conversation-level state from its message set. Always a
    /// full recomputation, so the aggregate cannot drift from the messages.
    pub fn aggregate(messages: &[Message], viewer_side: Side) -> (Option<Message>, usize) {
        let last_message = messages
            .iter()
            .filter(|m| !m.deleted_for_everyone)
            .max_by_key(|m| (m.created_at, m.seq))
            .cloned();
        (last_message, Self::unread_in(messages, viewer_side))
    }

    /// The branch inbox: every conversation of the branch with its derived
    /// last message and unread count, most recently updated first.
    pub async fn summaries_for_branch(
        store: &dyn DocumentStore,
        config: &Config,
        branch_id: Uuid,
        viewer_id: Uuid,
        viewer_side: Side,
    ) -> AppResult<Vec<ConversationSummary>> {
        let docs = store
            .query(&Query::new(CONVERSATIONS).filter("branch_id", json!(branch_id)))
            .await
            .map_err(map_store)?;

        let mut summaries = Vec::with_capacity(docs.len());
        for doc in &docs {
            let conversation = Conversation::from_document(doc)?;
            let messages =
                MessageService::fetch_for_conversation(store, config, conversation.id, viewer_id)
                    .await?;
            let (last_message, unread_count) = Self::aggregate(&messages, viewer_side);
            summaries.push(ConversationSummary {
                conversation,
                last_message,
                unread_count,
            });
        }
        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        Ok(summaries)
    }

    /// Branch-wide unread total, the number the notification trigger edges
    /// on.
    pub async fn unread_total(
        store: &dyn DocumentStore,
        config: &Config,
        branch_id: Uuid,
        viewer_id: Uuid,
        viewer_side: Side,
    ) -> AppResult<usize> {
        let summaries =
            Self::summaries_for_branch(store, config, branch_id, viewer_id, viewer_side).await?;
        Ok(summaries.iter().map(|s| s.unread_count).sum())
    }
}
