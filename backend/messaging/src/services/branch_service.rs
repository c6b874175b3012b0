use doc_store::{DocumentStore, Query};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::branch::Branch;
use crate::services::{map_store, BRANCHES};

pub struct BranchService;

impl BranchService {
    /// Register a lounge location. Name is mandatory; contact fields may be
    /// filled in later.
    pub async fn register(
        store: &dyn DocumentStore,
        name: &str,
        address: &str,
        phone: &str,
        email: &str,
    ) -> AppResult<Branch> {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("branch name cannot be empty".into()));
        }
        let branch = Branch {
            id: Uuid::nil(),
            name: name.trim().to_string(),
            address: address.to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
        };
        let doc = store
            .add(BRANCHES, branch.to_fields()?)
            .await
            .map_err(map_store)?;
        Branch::from_document(&doc)
    }

    pub async fn get(store: &dyn DocumentStore, branch_id: Uuid) -> AppResult<Branch> {
        let doc = store.get(BRANCHES, branch_id).await.map_err(map_store)?;
        Branch::from_document(&doc)
    }

    /// All registered branches, oldest first.
    pub async fn list(store: &dyn DocumentStore) -> AppResult<Vec<Branch>> {
        let docs = store.query(&Query::new(BRANCHES)).await.map_err(map_store)?;
        docs.iter().map(Branch::from_document).collect()
    }
}
