use doc_store::StoreError;

use crate::error::AppError;

pub mod branch_service;
pub mod conversation_service;
pub mod message_service;
pub mod notification_service;

// Collection names, fixed the way table names are.
pub(crate) const MESSAGES: &str = "messages";
pub(crate) const CONVERSATIONS: &str = "conversations";
pub(crate) const BRANCHES: &str = "branches";

/// Store failures cross into the domain here. Missing documents become the
/// domain's own not-found; everything else stays a store error.
pub(crate) fn map_store(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound { .. } => AppError::NotFound,
        other => AppError::Store(other),
    }
}
