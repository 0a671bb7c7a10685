//! # Session
//!
//! The signed-in account and its cached friend list, shared by the
//! directory and the graph service of one client.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SESSION LIFECYCLE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Empty ──register / load_current──► Active { current, friends }       │
//! │     ▲                                   │                               │
//! │     └──── logout / failed login ────────┤                               │
//! │     └──── delete_account (own) ─────────┘                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation that mutates the session holds its lock until the backing
//! write has completed, so at most one cache mutation is in flight.

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::person::{AccountId, Person};

/// Session contents
#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<Person>,
    friends: Vec<Person>,
}

impl SessionState {
    /// The signed-in Person, or [`Error::NoSession`]
    pub fn current(&self) -> Result<&Person> {
        self.current.as_ref().ok_or(Error::NoSession)
    }

    /// The signed-in Person, which must be `account`
    pub fn require_owner(&self, account: &AccountId) -> Result<&Person> {
        let current = self.current()?;
        if current.account_id() != account {
            return Err(Error::SessionMismatch {
                session: current.account_id().to_string(),
                requested: account.to_string(),
            });
        }
        Ok(current)
    }

    /// Install `person` as the signed-in account. The friend cache survives
    /// only when the account stays the same.
    pub(crate) fn begin(&mut self, person: Person) {
        let same_account = self
            .current
            .as_ref()
            .is_some_and(|c| c.account_id() == person.account_id());
        if !same_account {
            self.friends.clear();
        }
        self.current = Some(person);
    }

    pub(crate) fn replace_friends(&mut self, friends: Vec<Person>) {
        self.friends = friends;
    }

    pub(crate) fn clear(&mut self) {
        self.current = None;
        self.friends.clear();
    }
}

/// Shared, serialised session handle
#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    /// Create an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the session lock. Holders should keep it across the backend
    /// write that justifies the cache change.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Copy of the signed-in Person
    pub async fn current(&self) -> Option<Person> {
        self.state.lock().await.current.clone()
    }

    /// Id of the signed-in account
    pub async fn account_id(&self) -> Option<AccountId> {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map(|p| p.account_id().clone())
    }

    /// Copy of the cached friend list
    pub async fn friends(&self) -> Vec<Person> {
        self.state.lock().await.friends.clone()
    }

    /// Whether an account is signed in
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.current.is_some()
    }

    /// Drop the signed-in account and its caches
    pub async fn clear(&self) {
        self.state.lock().await.clear();
    }
}
