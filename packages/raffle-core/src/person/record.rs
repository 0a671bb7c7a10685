//! Mapping between [`Person`] and the flat document stored per account.

use serde_json::Value;

use super::Person;
use crate::backend::Document;
use crate::error::{Error, Result};

/// Document field names that queries and updates refer to
pub mod field {
    /// Owning account
    pub const ACCOUNT_ID: &str = "accountId";
    /// Searchable handle
    pub const USERNAME: &str = "username";
    /// Outgoing friend links
    pub const FRIENDS: &str = "friends";
}

impl Person {
    /// Encode as a flat document
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Serialization(format!(
                "Person encoded as {} instead of an object",
                other
            ))),
        }
    }

    /// Decode a document. Any missing or mistyped required field rejects
    /// the whole record.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let person: Person = serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| Error::MalformedRecord(e.to_string()))?;

        if person.account_id.is_empty() {
            return Err(Error::MalformedRecord("accountId is empty".into()));
        }

        Ok(person)
    }

    /// Decode a document read under `key`, which must match its accountId
    pub fn from_keyed_document(key: &str, doc: &Document) -> Result<Self> {
        let person = Self::from_document(doc)?;

        if person.account_id.as_str() != key {
            return Err(Error::MalformedRecord(format!(
                "accountId {} does not match document key {}",
                person.account_id, key
            )));
        }

        Ok(person)
    }
}
