//! # Backend Seams
//!
//! The two external collaborators the core talks to, expressed as async
//! traits so a hosted service, SQLite or an in-memory map can sit behind
//! them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          COLLABORATORS                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   ProfileDirectory ─────┬──────────────► AuthProvider                  │
//! │                         │                 • create_credential          │
//! │                         │                 • sign_in / sign_out         │
//! │                         │                 • send_reset                 │
//! │                         │                 • delete_credential          │
//! │                         │                                               │
//! │   SocialGraphService ───┴──────────────► DocumentStore                 │
//! │                                           • get / set / delete         │
//! │                                           • query_eq                   │
//! │                                           • query_contains             │
//! │                                           • array_union                │
//! │                                                                         │
//! │   Shipped implementations:                                             │
//! │     memory::{MemoryAuth, MemoryStore}   process-local, fault hooks     │
//! │     storage::Database                   SQLite file or in-memory       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations report infrastructure failures as
//! [`Error::Transport`](crate::Error::Transport) and auth refusals as
//! [`Error::Auth`](crate::Error::Auth). Neither retries on its own.

pub mod credentials;
pub mod memory;
mod sqlite;

pub use memory::{AuthOp, MemoryAuth, MemoryStore, StoreOp};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::person::AccountId;

/// A flat document as held by the store
pub type Document = serde_json::Map<String, Value>;

/// A document together with the key it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Document key within its collection
    pub key: String,
    /// Document body
    pub data: Document,
}

/// Credential issuance and sign-in
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create a credential and return the new account's id
    async fn create_credential(&self, email: &str, password: &str) -> Result<AccountId>;

    /// Check an email/password pair and return its account id
    async fn sign_in(&self, email: &str, password: &str) -> Result<AccountId>;

    /// End the provider-side session for an account
    async fn sign_out(&self, account: &AccountId) -> Result<()>;

    /// Queue a password-reset message for an email
    async fn send_reset(&self, email: &str) -> Result<()>;

    /// Remove an account's credential
    async fn delete_credential(&self, account: &AccountId) -> Result<()>;
}

/// Keyed document collections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Create or fully overwrite one document
    async fn set(&self, collection: &str, key: &str, doc: Document) -> Result<()>;

    /// Remove one document. Removing a missing key succeeds.
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Every document in a collection
    async fn list(&self, collection: &str) -> Result<Vec<Snapshot>>;

    /// Documents whose string `field` equals `value`
    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Snapshot>>;

    /// Documents whose array `field` contains the string `value`
    async fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Snapshot>>;

    /// Add `value` to the array `field` of an existing document unless it is
    /// already there. Atomic with respect to other writers.
    async fn array_union(&self, collection: &str, key: &str, field: &str, value: &str)
        -> Result<()>;
}

/// Apply a set-union of `value` into `doc[field]`.
///
/// A field that is absent or not an array is replaced by a one-element
/// array. Returns true if the document changed.
pub(crate) fn apply_array_union(doc: &mut Document, field: &str, value: &str) -> bool {
    let element = Value::String(value.to_string());

    match doc.get_mut(field) {
        Some(Value::Array(items)) => {
            if items.contains(&element) {
                false
            } else {
                items.push(element);
                true
            }
        }
        _ => {
            doc.insert(field.to_string(), Value::Array(vec![element]));
            true
        }
    }
}

/// True if `doc[field]` is a string equal to `value`
pub(crate) fn field_equals(doc: &Document, field: &str, value: &str) -> bool {
    matches!(doc.get(field), Some(Value::String(s)) if s == value)
}

/// True if `doc[field]` is an array holding the string `value`
pub(crate) fn array_contains(doc: &Document, field: &str, value: &str) -> bool {
    match doc.get(field) {
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(value)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_array_union_adds_once() {
        let mut d = doc(json!({ "friends": ["a"] }));

        assert!(apply_array_union(&mut d, "friends", "b"));
        assert!(!apply_array_union(&mut d, "friends", "b"));
        assert_eq!(d["friends"], json!(["a", "b"]));
    }

    #[test]
    fn test_array_union_replaces_non_array() {
        let mut d = doc(json!({ "friends": "oops" }));
        assert!(apply_array_union(&mut d, "friends", "a"));
        assert_eq!(d["friends"], json!(["a"]));

        let mut empty = Document::new();
        assert!(apply_array_union(&mut empty, "friends", "a"));
        assert_eq!(empty["friends"], json!(["a"]));
    }

    #[test]
    fn test_field_matchers() {
        let d = doc(json!({ "username": "alice", "friends": ["b", 3] }));

        assert!(field_equals(&d, "username", "alice"));
        assert!(!field_equals(&d, "username", "Alice"));
        assert!(array_contains(&d, "friends", "b"));
        assert!(!array_contains(&d, "friends", "3"));
        assert!(!array_contains(&d, "username", "alice"));
    }
}
