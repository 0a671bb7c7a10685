//! # Person
//!
//! The single entity this crate manages: one profile and friend list per
//! registered account.
//!
//! ## Record Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      users/{accountId}                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  accountId     "7f3c..."          required, equals the document key     │
//! │  name          "Alice Liddell"    required                              │
//! │  username      "alice"            required, searchable, not unique      │
//! │  email         "alice@x.io"       required                              │
//! │  points        1                  required integer                      │
//! │  address       null               optional                              │
//! │  friends       ["b21e...", ...]   required array, treated as a set      │
//! │  referralCode  ""                 required                              │
//! │                                                                         │
//! │  Any missing required field rejects the whole document.                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Friend Links
//!
//! `friends` holds directed edges. Alice listing Bob says nothing about Bob
//! listing Alice; the graph service writes both sides when a mutual link is
//! wanted.

mod record;

pub use record::field;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Points granted to a freshly registered account
pub const INITIAL_POINTS: i64 = 1;

/// Opaque account identifier assigned by the auth subsystem
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an identifier issued by an auth backend
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Identifier as issued
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identifier
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A registered account's profile and outgoing friend links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Primary key, fixed at registration
    account_id: AccountId,

    /// Display name
    pub name: String,

    /// Search handle
    pub username: String,

    /// Sign-in email
    pub email: String,

    /// Reward points, changed outside this crate
    pub points: i64,

    /// Postal address
    #[serde(default)]
    pub address: Option<String>,

    /// Accounts this person has added
    pub friends: BTreeSet<AccountId>,

    /// Referral code handed out to this person
    pub referral_code: String,
}

impl Person {
    /// Build the record for a freshly registered account
    pub fn new_account(
        account_id: AccountId,
        name: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            name: name.into(),
            username: username.into(),
            email: email.into(),
            points: INITIAL_POINTS,
            address: None,
            friends: BTreeSet::new(),
            referral_code: String::new(),
        }
    }

    /// Account this record belongs to
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Check for an outgoing link to `id`
    pub fn has_friend(&self, id: &AccountId) -> bool {
        self.friends.contains(id)
    }

    /// Add an outgoing link. Returns false if it was already present.
    pub fn add_friend(&mut self, id: AccountId) -> bool {
        self.friends.insert(id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
