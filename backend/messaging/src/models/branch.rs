use doc_store::{Document, Fields, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;

/// A physical lounge location customers message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    #[serde(skip)]
    pub id: Uuid,

    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

impl Branch {
    pub fn from_document(doc: &Document) -> AppResult<Self> {
        let mut branch: Branch = serde_json::from_value(Value::Object(doc.fields.clone()))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        branch.id = doc.id;
        Ok(branch)
    }

    pub fn to_fields(&self) -> AppResult<Fields> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Serialization("branch is not an object".into()).into()),
            Err(e) => Err(StoreError::Serialization(e.to_string()).into()),
        }
    }
}
