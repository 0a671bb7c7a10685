//! Inconsistency markers.
//!
//! When registration or deletion stops halfway, the directory writes a
//! marker into the repairs collection describing what is left to do. A later
//! call to `ProfileDirectory::repair` finishes the step and removes the
//! marker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Document;
use crate::error::{Error, Result};
use crate::person::{AccountId, Person};

/// The step that still has to happen for the account to be consistent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepairAction {
    /// The credential exists but its record was never written
    WriteRecord {
        /// Record to write
        person: Person,
    },
    /// The record is gone but the credential survived a deletion
    DeleteCredential,
}

/// A detected half-finished account operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InconsistencyMarker {
    /// Marker key in the repairs collection
    pub id: String,
    /// Affected account
    pub account_id: AccountId,
    /// What remains to be done
    pub action: RepairAction,
    /// Last error seen before giving up
    pub detail: String,
    /// When the marker was written
    pub created_at: i64,
}

impl InconsistencyMarker {
    /// Build a marker with a fresh id
    pub fn new(account_id: AccountId, action: RepairAction, detail: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            action,
            detail: detail.into(),
            created_at: crate::time::now_timestamp(),
        }
    }

    /// Encode for the repairs collection
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Serialization(format!(
                "marker encoded as {} instead of an object",
                other
            ))),
        }
    }

    /// Decode from the repairs collection
    pub fn from_document(doc: &Document) -> Result<Self> {
        serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| Error::MalformedRecord(e.to_string()))
    }
}
