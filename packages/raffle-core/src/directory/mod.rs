//! # Profile Directory
//!
//! Account lifecycle and the one authoritative Person record per account.
//!
//! ## Registration
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         REGISTRATION FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. auth.create_credential(email, password) ──► accountId              │
//! │        │  (refusal surfaced verbatim, nothing else happens)             │
//! │        ▼                                                                │
//! │  2. store.set(users/accountId, Person{points: 1, friends: ∅})          │
//! │        │  retried up to persist_attempts times.                        │
//! │        │  The credential is never re-created.                          │
//! │        ▼                                                                │
//! │  3. session.begin(person)                                              │
//! │                                                                         │
//! │  If every write fails: marker WriteRecord{person} + Transport error    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deletion
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           DELETION FLOW                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Prepare   snapshot = store.get(users/accountId)                       │
//! │  Commit    store.delete(users/accountId)                               │
//! │            auth.delete_credential(accountId)                           │
//! │                                                                         │
//! │  credential delete fails ──► store.set(snapshot)   (compensate)        │
//! │                                  │                                      │
//! │                                  ├─ ok   ──► original error             │
//! │                                  └─ fail ──► marker DeleteCredential   │
//! │                                              + PartialDeletion          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use crate::backend::{AuthProvider, DocumentStore};
use crate::error::{AuthErrorKind, Error, Result};
use crate::person::{AccountId, Person};
use crate::repair::{InconsistencyMarker, RepairAction};
use crate::session::Session;
use crate::CoreConfig;

/// Account lifecycle over an auth provider and a document store
pub struct ProfileDirectory {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    session: Arc<Session>,
    config: CoreConfig,
}

impl ProfileDirectory {
    /// Create a directory bound to `session`
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        session: Arc<Session>,
        config: CoreConfig,
    ) -> Self {
        Self {
            auth,
            store,
            session,
            config,
        }
    }

    /// The session this directory writes to
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Copy of the signed-in Person
    pub async fn current(&self) -> Option<Person> {
        self.session.current().await
    }

    /// Create an account and its record, and start a session for it
    pub async fn register(
        &self,
        name: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AccountId> {
        let mut state = self.session.lock().await;

        let account = self.auth.create_credential(email, password).await.map_err(|e| {
            tracing::warn!(error = %e, "Credential creation failed");
            e
        })?;

        let person = Person::new_account(account.clone(), name, username, email);
        let doc = person.to_document()?;
        let attempts = self.config.persist_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self
                .store
                .set(&self.config.users_collection, account.as_str(), doc.clone())
                .await
            {
                Ok(()) => {
                    tracing::info!(account = %account, attempt, "Account registered");
                    state.begin(person);
                    return Ok(account);
                }
                Err(e) => {
                    tracing::warn!(account = %account, attempt, error = %e, "Failed to write new record");
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| Error::Internal("no write attempted".into()));
        self.mark_inconsistent(InconsistencyMarker::new(
            account,
            RepairAction::WriteRecord { person },
            error.to_string(),
        ))
        .await;

        Err(error)
    }

    /// Authenticate and return the account id. Does not load the record.
    pub async fn login(&self, email: &str, password: &str) -> Result<AccountId> {
        let mut state = self.session.lock().await;

        match self.auth.sign_in(email, password).await {
            Ok(account) => {
                if state.current().map(|p| p.account_id() != &account).unwrap_or(false) {
                    state.clear();
                }
                tracing::info!(account = %account, "Signed in");
                Ok(account)
            }
            Err(e) => {
                state.clear();
                tracing::warn!(error = %e, "Sign-in failed, session cleared");
                Err(e)
            }
        }
    }

    /// Fetch an account's record and make it the session's current account
    pub async fn load_current(&self, account: &AccountId) -> Result<Person> {
        let mut state = self.session.lock().await;

        let person = self.fetch(account).await?;
        state.begin(person.clone());

        tracing::debug!(account = %account, "Loaded current account");
        Ok(person)
    }

    /// Sign out and clear the session
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.session.lock().await;

        let result = match state.current() {
            Ok(current) => self.auth.sign_out(current.account_id()).await,
            Err(_) => Ok(()),
        };
        state.clear();

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Sign-out reported an error, session cleared anyway");
        }
        result
    }

    /// Ask the auth provider to send a password reset
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.auth.send_reset(email).await
    }

    /// Overwrite the current account's full record
    pub async fn save_current(&self, person: Person) -> Result<()> {
        let mut state = self.session.lock().await;
        state.require_owner(person.account_id())?;

        self.store
            .set(
                &self.config.users_collection,
                person.account_id().as_str(),
                person.to_document()?,
            )
            .await?;

        state.begin(person);
        Ok(())
    }

    /// Delete the current account's record and credential
    pub async fn delete_account(&self, account: &AccountId) -> Result<()> {
        let mut state = self.session.lock().await;
        state.require_owner(account)?;

        let users = &self.config.users_collection;
        let snapshot = self.store.get(users, account.as_str()).await?;

        if snapshot.is_some() {
            self.store.delete(users, account.as_str()).await?;
        }

        let credential_error = match self.auth.delete_credential(account).await {
            Ok(()) => {
                state.clear();
                tracing::info!(account = %account, "Account deleted");
                return Ok(());
            }
            Err(e) => e,
        };

        tracing::warn!(account = %account, error = %credential_error, "Credential delete failed, restoring record");

        let Some(doc) = snapshot else {
            return Err(credential_error);
        };

        match self.store.set(users, account.as_str(), doc).await {
            Ok(()) => Err(credential_error),
            Err(restore_error) => {
                let detail = format!(
                    "credential delete failed ({}); record restore failed ({})",
                    credential_error, restore_error
                );
                self.mark_inconsistent(InconsistencyMarker::new(
                    account.clone(),
                    RepairAction::DeleteCredential,
                    detail.clone(),
                ))
                .await;
                state.clear();

                Err(Error::PartialDeletion {
                    account: account.to_string(),
                    detail,
                })
            }
        }
    }

    // ========================================================================
    // REPAIR
    // ========================================================================

    /// Markers left by half-finished registrations and deletions
    pub async fn pending_repairs(&self) -> Result<Vec<InconsistencyMarker>> {
        self.store
            .list(&self.config.repairs_collection)
            .await?
            .iter()
            .map(|s| InconsistencyMarker::from_document(&s.data))
            .collect()
    }

    /// Outstanding markers for one account
    pub async fn pending_repairs_for(
        &self,
        account: &AccountId,
    ) -> Result<Vec<InconsistencyMarker>> {
        let mut markers = self.pending_repairs().await?;
        markers.retain(|m| &m.account_id == account);
        Ok(markers)
    }

    /// Finish the step a marker describes, then drop the marker
    pub async fn repair(&self, marker: &InconsistencyMarker) -> Result<()> {
        match &marker.action {
            RepairAction::WriteRecord { person } => {
                self.store
                    .set(
                        &self.config.users_collection,
                        marker.account_id.as_str(),
                        person.to_document()?,
                    )
                    .await?;
            }
            RepairAction::DeleteCredential => {
                match self.auth.delete_credential(&marker.account_id).await {
                    Ok(()) => {}
                    Err(Error::Auth {
                        kind: AuthErrorKind::UnknownAccount,
                        ..
                    }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        self.store
            .delete(&self.config.repairs_collection, &marker.id)
            .await?;

        tracing::info!(account = %marker.account_id, marker = %marker.id, "Inconsistency repaired");
        Ok(())
    }

    // Helper methods

    async fn fetch(&self, account: &AccountId) -> Result<Person> {
        let doc = self
            .store
            .get(&self.config.users_collection, account.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("no record for account {}", account)))?;

        Person::from_keyed_document(account.as_str(), &doc)
    }

    async fn mark_inconsistent(&self, marker: InconsistencyMarker) {
        tracing::error!(
            account = %marker.account_id,
            marker = %marker.id,
            detail = %marker.detail,
            "Account left inconsistent"
        );

        let written = match marker.to_document() {
            Ok(doc) => {
                self.store
                    .set(&self.config.repairs_collection, &marker.id, doc)
                    .await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::error!(marker = %marker.id, error = %e, "Failed to record inconsistency marker");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthOp, MemoryAuth, MemoryStore, StoreOp};

    struct Harness {
        auth: Arc<MemoryAuth>,
        store: Arc<MemoryStore>,
        directory: ProfileDirectory,
    }

    fn harness() -> Harness {
        let auth = Arc::new(MemoryAuth::new());
        let store = Arc::new(MemoryStore::new());
        let directory = ProfileDirectory::new(
            auth.clone(),
            store.clone(),
            Arc::new(Session::new()),
            CoreConfig::default(),
        );
        Harness {
            auth,
            store,
            directory,
        }
    }

    async fn register_alice(h: &Harness) -> AccountId {
        h.directory
            .register("Alice", "alice", "alice@example.com", "rabbit-hole")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_load() {
        let h = harness();
        let id = register_alice(&h).await;

        let person = h.directory.load_current(&id).await.unwrap();

        assert_eq!(person.account_id(), &id);
        assert_eq!(person.name, "Alice");
        assert_eq!(person.username, "alice");
        assert_eq!(person.email, "alice@example.com");
        assert_eq!(person.points, 1);
        assert!(person.friends.is_empty());
        assert!(person.referral_code.is_empty());
        assert!(person.address.is_none());
    }

    #[tokio::test]
    async fn test_register_starts_session() {
        let h = harness();
        let id = register_alice(&h).await;

        let current = h.directory.current().await.unwrap();
        assert_eq!(current.account_id(), &id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness();
        register_alice(&h).await;

        let err = h
            .directory
            .register("Other", "other", "alice@example.com", "rabbit-hole")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Auth {
                kind: AuthErrorKind::AccountExists,
                ..
            }
        ));
        assert_eq!(h.store.len("users"), 1);
    }

    #[tokio::test]
    async fn test_register_retries_write_without_new_credential() {
        let h = harness();
        h.store.fail_next(StoreOp::Set, 2);

        let id = register_alice(&h).await;

        assert!(h.auth.has_credential(&id));
        assert_eq!(h.store.len("users"), 1);
        assert!(h.directory.pending_repairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_leaves_marker_when_every_write_fails() {
        let h = harness();
        // three record writes plus the marker write itself succeeds
        h.store.fail_next(StoreOp::Set, 3);

        let err = h
            .directory
            .register("Alice", "alice", "alice@example.com", "rabbit-hole")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(h.directory.current().await.is_none());

        let markers = h.directory.pending_repairs().await.unwrap();
        assert_eq!(markers.len(), 1);
        assert!(matches!(markers[0].action, RepairAction::WriteRecord { .. }));

        h.directory.repair(&markers[0]).await.unwrap();
        let person = h.directory.load_current(&markers[0].account_id).await.unwrap();
        assert_eq!(person.username, "alice");
        assert!(h.directory.pending_repairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_repairs_for_one_account() {
        let h = harness();
        let person = Person::new_account("a1".into(), "Alice", "alice", "alice@example.com");
        for (account, action) in [
            ("a1", RepairAction::WriteRecord { person }),
            ("b1", RepairAction::DeleteCredential),
        ] {
            let marker = InconsistencyMarker::new(account.into(), action, "store offline");
            h.store
                .set("repairs", &marker.id, marker.to_document().unwrap())
                .await
                .unwrap();
        }

        assert_eq!(h.directory.pending_repairs().await.unwrap().len(), 2);
        let mine = h.directory.pending_repairs_for(&"a1".into()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].account_id.as_str(), "a1");
        assert!(h
            .directory
            .pending_repairs_for(&"nobody".into())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_login_does_not_load_record() {
        let h = harness();
        let id = register_alice(&h).await;
        h.directory.logout().await.unwrap();

        let logged_in = h
            .directory
            .login("alice@example.com", "rabbit-hole")
            .await
            .unwrap();

        assert_eq!(logged_in, id);
        assert!(h.directory.current().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_login_clears_session() {
        let h = harness();
        register_alice(&h).await;
        assert!(h.directory.current().await.is_some());

        let err = h
            .directory
            .login("alice@example.com", "wrong-password")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Auth {
                kind: AuthErrorKind::InvalidCredentials,
                ..
            }
        ));
        assert!(h.directory.current().await.is_none());
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let h = harness();
        let err = h
            .directory
            .load_current(&AccountId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_transport_error_is_distinct() {
        let h = harness();
        let id = register_alice(&h).await;
        h.store.fail_next(StoreOp::Get, 1);

        let err = h.directory.load_current(&id).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_load_malformed_record() {
        let h = harness();
        let id = register_alice(&h).await;

        let mut doc = h.store.get("users", id.as_str()).await.unwrap().unwrap();
        doc.remove("username");
        h.store.set("users", id.as_str(), doc).await.unwrap();

        let err = h.directory.load_current(&id).await.unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_signs_out() {
        let h = harness();
        let id = register_alice(&h).await;

        h.directory.logout().await.unwrap();

        assert!(h.directory.current().await.is_none());
        assert!(!h.auth.is_signed_in(&id));
    }

    #[tokio::test]
    async fn test_password_reset() {
        let h = harness();
        register_alice(&h).await;

        h.directory
            .request_password_reset("alice@example.com")
            .await
            .unwrap();
        assert_eq!(h.auth.reset_requests().len(), 1);

        assert!(h
            .directory
            .request_password_reset("nobody@example.com")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_save_current_overwrites_record() {
        let h = harness();
        let id = register_alice(&h).await;

        let mut person = h.directory.current().await.unwrap();
        person.address = Some("1 Rabbit Hole".into());
        person.points = 40;
        h.directory.save_current(person).await.unwrap();

        h.directory.session().clear().await;
        let reloaded = h.directory.load_current(&id).await.unwrap();
        assert_eq!(reloaded.address.as_deref(), Some("1 Rabbit Hole"));
        assert_eq!(reloaded.points, 40);
    }

    #[tokio::test]
    async fn test_save_requires_session_owner() {
        let h = harness();
        let stranger = Person::new_account("zz".into(), "Zed", "zed", "zed@example.com");

        let err = h.directory.save_current(stranger.clone()).await.unwrap_err();
        assert!(matches!(err, Error::NoSession));

        register_alice(&h).await;
        let err = h.directory.save_current(stranger).await.unwrap_err();
        assert!(matches!(err, Error::SessionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_then_load_is_not_found() {
        let h = harness();
        let id = register_alice(&h).await;

        h.directory.delete_account(&id).await.unwrap();

        assert!(!h.auth.has_credential(&id));
        assert!(h.directory.current().await.is_none());
        let err = h.directory.load_current(&id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_compensates_when_credential_delete_fails() {
        let h = harness();
        let id = register_alice(&h).await;
        h.auth.fail_next(AuthOp::Delete, 1);

        let err = h.directory.delete_account(&id).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        // Nothing is half-deleted: credential and record both remain
        assert!(h.auth.has_credential(&id));
        assert!(h.store.get("users", id.as_str()).await.unwrap().is_some());
        assert!(h.directory.pending_repairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_partial_failure_and_marks_it() {
        let h = harness();
        let id = register_alice(&h).await;
        h.auth.fail_next(AuthOp::Delete, 1);
        // the restore write fails, the marker write after it succeeds
        h.store.fail_next(StoreOp::Set, 1);

        let err = h.directory.delete_account(&id).await.unwrap_err();
        assert!(matches!(err, Error::PartialDeletion { .. }));

        let markers = h.directory.pending_repairs().await.unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].account_id, id);
        assert_eq!(markers[0].action, RepairAction::DeleteCredential);

        h.directory.repair(&markers[0]).await.unwrap();
        assert!(!h.auth.has_credential(&id));
        assert!(h.directory.pending_repairs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_record_failure_leaves_everything() {
        let h = harness();
        let id = register_alice(&h).await;
        h.store.fail_next(StoreOp::Delete, 1);

        assert!(h.directory.delete_account(&id).await.is_err());
        assert!(h.auth.has_credential(&id));
        assert!(h.directory.current().await.is_some());
    }

    #[tokio::test]
    async fn test_delete_requires_own_session() {
        let h = harness();
        register_alice(&h).await;

        let err = h
            .directory
            .delete_account(&AccountId::new("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionMismatch { .. }));
    }
}
