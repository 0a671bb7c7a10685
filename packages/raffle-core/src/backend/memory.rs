//! In-memory auth and document store.
//!
//! Both keep everything in process memory behind `parking_lot` locks. Each
//! can be told to fail the next N calls of a given operation, which is how
//! the directory's retry and compensation paths are exercised.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::credentials::{
    invalid_credentials, normalize_email, validate_email, validate_password, HashedPassword,
};
use super::{
    apply_array_union, array_contains, field_equals, AuthProvider, Document, DocumentStore,
    Snapshot,
};
use crate::error::{AuthErrorKind, Error, Result};
use crate::person::AccountId;

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Document store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `set`
    Set,
    /// `delete`
    Delete,
    /// `list`, `query_eq` and `query_contains`
    Query,
    /// `array_union`
    ArrayUnion,
}

/// Auth operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOp {
    /// `create_credential`
    Create,
    /// `sign_in`
    SignIn,
    /// `sign_out`
    SignOut,
    /// `send_reset`
    SendReset,
    /// `delete_credential`
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for AuthOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Countdown of injected failures per operation
struct Faults<Op> {
    remaining: Mutex<HashMap<Op, u32>>,
}

impl<Op: Copy + Eq + std::hash::Hash + fmt::Display> Faults<Op> {
    fn new() -> Self {
        Self {
            remaining: Mutex::new(HashMap::new()),
        }
    }

    fn arm(&self, op: Op, times: u32) {
        self.remaining.lock().insert(op, times);
    }

    fn check(&self, op: Op) -> Result<()> {
        let mut remaining = self.remaining.lock();
        match remaining.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(Error::Transport(format!("injected {} failure", op)))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// AUTH
// ============================================================================

struct Credential {
    account: AccountId,
    password: HashedPassword,
}

#[derive(Default)]
struct AuthState {
    /// Normalized email → credential
    by_email: HashMap<String, Credential>,
    signed_in: HashSet<AccountId>,
    /// Emails a reset was requested for, oldest first
    resets: Vec<String>,
}

/// Process-local [`AuthProvider`]
pub struct MemoryAuth {
    state: RwLock<AuthState>,
    faults: Faults<AuthOp>,
}

impl MemoryAuth {
    /// Create an empty provider
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AuthState::default()),
            faults: Faults::new(),
        }
    }

    /// Make the next `times` calls of `op` fail with a transport error
    pub fn fail_next(&self, op: AuthOp, times: u32) {
        self.faults.arm(op, times);
    }

    /// Whether the provider considers the account signed in
    pub fn is_signed_in(&self, account: &AccountId) -> bool {
        self.state.read().signed_in.contains(account)
    }

    /// Whether any credential exists for the account
    pub fn has_credential(&self, account: &AccountId) -> bool {
        self.state
            .read()
            .by_email
            .values()
            .any(|c| &c.account == account)
    }

    /// Emails a password reset was requested for
    pub fn reset_requests(&self) -> Vec<String> {
        self.state.read().resets.clone()
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn create_credential(&self, email: &str, password: &str) -> Result<AccountId> {
        self.faults.check(AuthOp::Create)?;
        validate_email(email)?;
        validate_password(password)?;

        let key = normalize_email(email);
        let mut state = self.state.write();

        if state.by_email.contains_key(&key) {
            return Err(Error::auth(
                AuthErrorKind::AccountExists,
                "The email address is already in use by another account.",
            ));
        }

        let account = AccountId::generate();
        state.by_email.insert(
            key,
            Credential {
                account: account.clone(),
                password: HashedPassword::new(password),
            },
        );
        state.signed_in.insert(account.clone());

        Ok(account)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AccountId> {
        self.faults.check(AuthOp::SignIn)?;

        let mut state = self.state.write();
        let account = match state.by_email.get(&normalize_email(email)) {
            Some(credential) if credential.password.verify(password) => credential.account.clone(),
            _ => return Err(invalid_credentials()),
        };
        state.signed_in.insert(account.clone());

        Ok(account)
    }

    async fn sign_out(&self, account: &AccountId) -> Result<()> {
        self.faults.check(AuthOp::SignOut)?;
        self.state.write().signed_in.remove(account);
        Ok(())
    }

    async fn send_reset(&self, email: &str) -> Result<()> {
        self.faults.check(AuthOp::SendReset)?;

        let key = normalize_email(email);
        let mut state = self.state.write();

        if !state.by_email.contains_key(&key) {
            return Err(Error::auth(
                AuthErrorKind::UnknownAccount,
                "There is no user record corresponding to this identifier.",
            ));
        }
        state.resets.push(key);

        Ok(())
    }

    async fn delete_credential(&self, account: &AccountId) -> Result<()> {
        self.faults.check(AuthOp::Delete)?;

        let mut state = self.state.write();
        let before = state.by_email.len();
        state.by_email.retain(|_, c| &c.account != account);

        if state.by_email.len() == before {
            return Err(Error::auth(
                AuthErrorKind::UnknownAccount,
                format!("No credential for account {}", account),
            ));
        }
        state.signed_in.remove(account);

        Ok(())
    }
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

/// Process-local [`DocumentStore`]
pub struct MemoryStore {
    /// Collection → key → document
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    faults: Faults<StoreOp>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            faults: Faults::new(),
        }
    }

    /// Make the next `times` calls of `op` fail with a transport error
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        self.faults.arm(op, times);
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.len())
    }

    fn select(&self, collection: &str, predicate: impl Fn(&Document) -> bool) -> Vec<Snapshot> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| predicate(doc))
                    .map(|(key, doc)| Snapshot {
                        key: key.clone(),
                        data: doc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.faults.check(StoreOp::Get)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, doc: Document) -> Result<()> {
        self.faults.check(StoreOp::Set)?;
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), doc);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.faults.check(StoreOp::Delete)?;
        if let Some(docs) = self.collections.write().get_mut(collection) {
            docs.remove(key);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Snapshot>> {
        self.faults.check(StoreOp::Query)?;
        Ok(self.select(collection, |_| true))
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Snapshot>> {
        self.faults.check(StoreOp::Query)?;
        Ok(self.select(collection, |doc| field_equals(doc, field, value)))
    }

    async fn query_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Snapshot>> {
        self.faults.check(StoreOp::Query)?;
        Ok(self.select(collection, |doc| array_contains(doc, field, value)))
    }

    async fn array_union(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        self.faults.check(StoreOp::ArrayUnion)?;

        let mut collections = self.collections.write();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
            .ok_or_else(|| Error::NotFound(format!("{}/{}", collection, key)))?;

        apply_array_union(doc, field, value);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio_test::{assert_err, assert_ok};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_create_then_sign_in() {
        let auth = MemoryAuth::new();

        let id = auth
            .create_credential("alice@example.com", "rabbit-hole")
            .await
            .unwrap();
        assert!(auth.is_signed_in(&id));

        auth.sign_out(&id).await.unwrap();
        assert!(!auth.is_signed_in(&id));

        let again = auth
            .sign_in("ALICE@example.com", "rabbit-hole")
            .await
            .unwrap();
        assert_eq!(again, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_refused() {
        let auth = MemoryAuth::new();
        assert_ok!(auth.create_credential("a@b.co", "secret1").await);

        let err = auth.create_credential("a@b.co", "secret2").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Auth {
                kind: AuthErrorKind::AccountExists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_is_refused() {
        let auth = MemoryAuth::new();
        assert_ok!(auth.create_credential("a@b.co", "secret1").await);

        assert_err!(auth.sign_in("a@b.co", "secret2").await);
        assert_err!(auth.sign_in("nobody@b.co", "secret1").await);
    }

    #[tokio::test]
    async fn test_reset_requires_known_email() {
        let auth = MemoryAuth::new();
        assert_ok!(auth.create_credential("a@b.co", "secret1").await);

        assert_ok!(auth.send_reset("A@B.co").await);
        assert_err!(auth.send_reset("x@b.co").await);
        assert_eq!(auth.reset_requests(), vec!["a@b.co".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_credential() {
        let auth = MemoryAuth::new();
        let id = auth.create_credential("a@b.co", "secret1").await.unwrap();

        assert_ok!(auth.delete_credential(&id).await);
        assert!(!auth.has_credential(&id));
        assert_err!(auth.delete_credential(&id).await);
        assert_err!(auth.sign_in("a@b.co", "secret1").await);
    }

    #[tokio::test]
    async fn test_injected_auth_failure_counts_down() {
        let auth = MemoryAuth::new();
        auth.fail_next(AuthOp::Create, 1);

        let err = auth.create_credential("a@b.co", "secret1").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_ok!(auth.create_credential("a@b.co", "secret1").await);
    }

    #[tokio::test]
    async fn test_store_crud() {
        let store = MemoryStore::new();
        store
            .set("users", "a", doc(json!({ "username": "alice" })))
            .await
            .unwrap();

        let fetched = store.get("users", "a").await.unwrap().unwrap();
        assert_eq!(fetched["username"], json!("alice"));
        assert!(store.get("users", "b").await.unwrap().is_none());
        assert!(store.get("other", "a").await.unwrap().is_none());

        store.delete("users", "a").await.unwrap();
        assert!(store.get("users", "a").await.unwrap().is_none());
        assert_ok!(store.delete("users", "a").await);
    }

    #[tokio::test]
    async fn test_store_queries() {
        let store = MemoryStore::new();
        store
            .set("users", "a", doc(json!({ "username": "alice", "friends": ["c"] })))
            .await
            .unwrap();
        store
            .set("users", "b", doc(json!({ "username": "bob", "friends": ["a", "c"] })))
            .await
            .unwrap();

        let alices = store.query_eq("users", "username", "alice").await.unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(alices[0].key, "a");

        let fans_of_c = store.query_contains("users", "friends", "c").await.unwrap();
        assert_eq!(fans_of_c.len(), 2);

        assert!(store
            .query_eq("users", "username", "nobody")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list("users").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_array_union_on_missing_document() {
        let store = MemoryStore::new();
        let err = store
            .array_union("users", "ghost", "friends", "a")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_store_failure() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Set, 2);

        assert_err!(store.set("users", "a", Document::new()).await);
        assert_err!(store.set("users", "a", Document::new()).await);
        assert_ok!(store.set("users", "a", Document::new()).await);
        assert_eq!(store.len("users"), 1);
    }
}
