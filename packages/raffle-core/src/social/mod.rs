//! # Social Graph
//!
//! Friend links between accounts. A link is a directed edge stored in the
//! owner's `friends` array; nothing is written on the target's side unless
//! the caller asks for it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          LINK OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  add_friend_link(owner, target)                                        │
//! │     session owner only. Re-reads the owner's stored record, appends    │
//! │     target, overwrites the full record and refreshes the session.      │
//! │                                                                         │
//! │  link_self_into(target, me)                                            │
//! │     store.array_union(users/target, "friends", me)                     │
//! │     Never reads the target record, so concurrent calls cannot          │
//! │     clobber each other.                                                │
//! │                                                                         │
//! │  link_mutual(target) = add_friend_link(me, target)                     │
//! │                      + link_self_into(target, me)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_stream::stream;
use futures::Stream;

use crate::backend::DocumentStore;
use crate::error::{Error, Result};
use crate::person::{field, AccountId, Person};
use crate::session::Session;
use crate::CoreConfig;

/// Friend queries and mutations over the users collection
pub struct SocialGraphService {
    store: Arc<dyn DocumentStore>,
    session: Arc<Session>,
    config: CoreConfig,
}

impl SocialGraphService {
    /// Create a graph service sharing `session` with a directory
    pub fn new(store: Arc<dyn DocumentStore>, session: Arc<Session>, config: CoreConfig) -> Self {
        Self {
            store,
            session,
            config,
        }
    }

    /// Add `target` to `owner`'s friends and persist the owner's record.
    ///
    /// `owner` must be the signed-in account. Fails with
    /// [`Error::AlreadyLinked`] if the link exists.
    pub async fn add_friend_link(&self, owner: &AccountId, target: &AccountId) -> Result<()> {
        if owner == target {
            return Err(Error::CannotLinkSelf);
        }

        let mut state = self.session.lock().await;
        state.require_owner(owner)?;

        // The stored record may carry links added by other accounts
        let doc = self
            .store
            .get(&self.config.users_collection, owner.as_str())
            .await?
            .ok_or_else(|| Error::NotFound(format!("no record for account {}", owner)))?;
        let mut updated = Person::from_keyed_document(owner.as_str(), &doc)?;

        if updated.has_friend(target) {
            state.begin(updated);
            return Err(Error::AlreadyLinked {
                owner: owner.to_string(),
                target: target.to_string(),
            });
        }

        updated.add_friend(target.clone());

        self.store
            .set(
                &self.config.users_collection,
                owner.as_str(),
                updated.to_document()?,
            )
            .await?;
        state.begin(updated);

        tracing::info!(owner = %owner, friend = %target, "Friend link added");
        Ok(())
    }

    /// Add `me` to `target`'s friends with a set-union
    pub async fn link_self_into(&self, target: &AccountId, me: &AccountId) -> Result<()> {
        if target == me {
            return Err(Error::CannotLinkSelf);
        }

        self.store
            .array_union(
                &self.config.users_collection,
                target.as_str(),
                field::FRIENDS,
                me.as_str(),
            )
            .await?;

        tracing::debug!(owner = %target, friend = %me, "Linked into friend list");
        Ok(())
    }

    /// Link the signed-in account and `target` in both directions.
    ///
    /// An existing outgoing link is not an error.
    pub async fn link_mutual(&self, target: &AccountId) -> Result<()> {
        let me = self.session.account_id().await.ok_or(Error::NoSession)?;

        match self.add_friend_link(&me, target).await {
            Ok(()) | Err(Error::AlreadyLinked { .. }) => {}
            Err(e) => return Err(e),
        }

        self.link_self_into(target, &me).await
    }

    /// Every account whose username is exactly `username`.
    ///
    /// Matches are yielded one at a time. A match that fails to decode is
    /// yielded as an error and the stream carries on.
    pub fn search_by_username(
        &self,
        username: impl Into<String>,
    ) -> impl Stream<Item = Result<Person>> + Send + 'static {
        let store = self.store.clone();
        let collection = self.config.users_collection.clone();
        let username = username.into();

        stream! {
            match store.query_eq(&collection, field::USERNAME, &username).await {
                Ok(matches) => {
                    tracing::debug!(username = %username, count = matches.len(), "Username search");
                    for snapshot in matches {
                        yield Person::from_keyed_document(&snapshot.key, &snapshot.data);
                    }
                }
                Err(e) => yield Err(e),
            }
        }
    }

    /// Every account that lists `target` as a friend, sorted by username.
    ///
    /// Replaces the session's friend cache. On any failure the cache is left
    /// untouched.
    pub async fn fetch_reverse_friends(&self, target: &AccountId) -> Result<Vec<Person>> {
        let mut state = self.session.lock().await;
        state.current()?;

        let mut people = self
            .store
            .query_contains(&self.config.users_collection, field::FRIENDS, target.as_str())
            .await?
            .iter()
            .map(|s| Person::from_keyed_document(&s.key, &s.data))
            .collect::<Result<Vec<_>>>()?;

        people.sort_by(|a, b| a.username.cmp(&b.username));
        state.replace_friends(people.clone());

        Ok(people)
    }

    /// Friend list from the last successful [`Self::fetch_reverse_friends`]
    pub async fn cached_friends(&self) -> Vec<Person> {
        self.session.friends().await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, StoreOp};
    use futures::StreamExt;
    use serde_json::Value;

    struct Harness {
        store: Arc<MemoryStore>,
        session: Arc<Session>,
        social: SocialGraphService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(Session::new());
        let social = SocialGraphService::new(store.clone(), session.clone(), CoreConfig::default());
        Harness {
            store,
            session,
            social,
        }
    }

    async fn seed(h: &Harness, id: &str, username: &str, friends: &[&str]) -> Person {
        let mut person = Person::new_account(
            id.into(),
            username,
            username,
            format!("{}@example.com", username),
        );
        for f in friends {
            person.add_friend((*f).into());
        }
        h.store
            .set("users", id, person.to_document().unwrap())
            .await
            .unwrap();
        person
    }

    async fn sign_in_as(h: &Harness, person: Person) {
        h.session.lock().await.begin(person);
    }

    async fn stored(h: &Harness, id: &str) -> Person {
        let doc = h.store.get("users", id).await.unwrap().unwrap();
        Person::from_keyed_document(id, &doc).unwrap()
    }

    #[tokio::test]
    async fn test_add_friend_link_twice() {
        let h = harness();
        let alice = seed(&h, "a", "alice", &[]).await;
        seed(&h, "b", "bob", &[]).await;
        sign_in_as(&h, alice).await;

        h.social
            .add_friend_link(&"a".into(), &"b".into())
            .await
            .unwrap();
        let err = h
            .social
            .add_friend_link(&"a".into(), &"b".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyLinked { .. }));

        let saved = stored(&h, "a").await;
        assert_eq!(saved.friends.len(), 1);
        assert!(saved.has_friend(&"b".into()));

        let current = h.session.current().await.unwrap();
        assert!(current.has_friend(&"b".into()));
    }

    #[tokio::test]
    async fn test_add_friend_link_keeps_links_added_by_others() {
        let h = harness();
        let bob = seed(&h, "b", "bob", &[]).await;
        seed(&h, "a", "alice", &[]).await;
        seed(&h, "c", "carol", &[]).await;
        sign_in_as(&h, bob).await;

        // alice links herself into bob's list after bob's session loaded
        h.social
            .link_self_into(&"b".into(), &"a".into())
            .await
            .unwrap();
        h.social
            .add_friend_link(&"b".into(), &"c".into())
            .await
            .unwrap();

        let saved = stored(&h, "b").await;
        assert!(saved.has_friend(&"a".into()));
        assert!(saved.has_friend(&"c".into()));
        assert_eq!(h.session.current().await.unwrap().friends, saved.friends);
    }

    #[tokio::test]
    async fn test_already_linked_checks_stored_record() {
        let h = harness();
        let bob = seed(&h, "b", "bob", &[]).await;
        seed(&h, "a", "alice", &[]).await;
        sign_in_as(&h, bob).await;

        h.social
            .link_self_into(&"b".into(), &"a".into())
            .await
            .unwrap();
        let err = h
            .social
            .add_friend_link(&"b".into(), &"a".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyLinked { .. }));
        assert!(h.session.current().await.unwrap().has_friend(&"a".into()));
    }

    #[tokio::test]
    async fn test_add_friend_link_requires_owner_session() {
        let h = harness();
        let alice = seed(&h, "a", "alice", &[]).await;

        let err = h
            .social
            .add_friend_link(&"a".into(), &"b".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSession));

        sign_in_as(&h, alice).await;
        let err = h
            .social
            .add_friend_link(&"c".into(), &"b".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_session_untouched() {
        let h = harness();
        let alice = seed(&h, "a", "alice", &[]).await;
        sign_in_as(&h, alice).await;
        h.store.fail_next(StoreOp::Set, 1);

        let err = h
            .social
            .add_friend_link(&"a".into(), &"b".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));

        let current = h.session.current().await.unwrap();
        assert!(current.friends.is_empty());
    }

    #[tokio::test]
    async fn test_self_links_are_rejected() {
        let h = harness();
        let alice = seed(&h, "a", "alice", &[]).await;
        sign_in_as(&h, alice).await;

        assert!(matches!(
            h.social.add_friend_link(&"a".into(), &"a".into()).await,
            Err(Error::CannotLinkSelf)
        ));
        assert!(matches!(
            h.social.link_self_into(&"a".into(), &"a".into()).await,
            Err(Error::CannotLinkSelf)
        ));
    }

    #[tokio::test]
    async fn test_link_self_into_concurrently_adds_once() {
        let h = harness();
        seed(&h, "t", "target", &["x"]).await;

        let me: AccountId = "me".into();
        let target: AccountId = "t".into();
        let calls = (0..16).map(|_| h.social.link_self_into(&target, &me));
        for result in futures::future::join_all(calls).await {
            result.unwrap();
        }

        let doc = h.store.get("users", "t").await.unwrap().unwrap();
        let friends = doc["friends"].as_array().unwrap();
        assert_eq!(friends.iter().filter(|v| *v == &Value::from("me")).count(), 1);
        assert!(friends.contains(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_link_self_into_missing_target() {
        let h = harness();
        let err = h
            .social
            .link_self_into(&"ghost".into(), &"me".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_link_mutual_writes_both_sides() {
        let h = harness();
        let alice = seed(&h, "a", "alice", &[]).await;
        seed(&h, "b", "bob", &[]).await;
        sign_in_as(&h, alice).await;

        h.social.link_mutual(&"b".into()).await.unwrap();
        // repeating is harmless
        h.social.link_mutual(&"b".into()).await.unwrap();

        assert!(stored(&h, "a").await.has_friend(&"b".into()));
        let bob = stored(&h, "b").await;
        assert!(bob.has_friend(&"a".into()));
        assert_eq!(bob.friends.len(), 1);
    }

    #[tokio::test]
    async fn test_search_by_username() {
        let h = harness();
        seed(&h, "a", "alice", &[]).await;
        seed(&h, "a2", "alice", &[]).await;
        seed(&h, "b", "bob", &[]).await;

        let found: Vec<_> = h.social.search_by_username("alice").collect().await;
        assert_eq!(found.len(), 2);
        assert!(found
            .iter()
            .all(|r| r.as_ref().map(|p| p.username == "alice").unwrap_or(false)));

        let none: Vec<_> = h.social.search_by_username("nobody").collect().await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_yields_malformed_match_and_continues() {
        let h = harness();
        seed(&h, "a", "alice", &[]).await;
        let mut broken = seed(&h, "b", "alice", &[]).await.to_document().unwrap();
        broken.remove("email");
        h.store.set("users", "b", broken).await.unwrap();
        seed(&h, "c", "alice", &[]).await;

        let found: Vec<_> = h.social.search_by_username("alice").collect().await;
        assert_eq!(found.len(), 3);
        assert_eq!(found.iter().filter(|r| r.is_ok()).count(), 2);
        assert!(found
            .iter()
            .any(|r| matches!(r, Err(Error::MalformedRecord(_)))));
    }

    #[tokio::test]
    async fn test_search_transport_failure_is_an_item() {
        let h = harness();
        h.store.fail_next(StoreOp::Query, 1);

        let found: Vec<_> = h.social.search_by_username("alice").collect().await;
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0], Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_reverse_friends_sorted() {
        let h = harness();
        let me = seed(&h, "me", "me", &[]).await;
        seed(&h, "z", "zoe", &["me"]).await;
        seed(&h, "b", "bob", &["me", "zz"]).await;
        seed(&h, "m", "mallory", &["zz"]).await;
        seed(&h, "c", "carol", &["me"]).await;
        sign_in_as(&h, me).await;

        let friends = h.social.fetch_reverse_friends(&"me".into()).await.unwrap();
        let names: Vec<_> = friends.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol", "zoe"]);

        assert_eq!(h.social.cached_friends().await, friends);
    }

    #[tokio::test]
    async fn test_fetch_reverse_friends_empty_and_no_session() {
        let h = harness();
        let me = seed(&h, "me", "me", &[]).await;

        let err = h
            .social
            .fetch_reverse_friends(&"me".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoSession));

        sign_in_as(&h, me).await;
        let friends = h.social.fetch_reverse_friends(&"me".into()).await.unwrap();
        assert!(friends.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reverse_friend_keeps_cache() {
        let h = harness();
        let me = seed(&h, "me", "me", &[]).await;
        seed(&h, "b", "bob", &["me"]).await;
        sign_in_as(&h, me).await;

        h.social.fetch_reverse_friends(&"me".into()).await.unwrap();
        assert_eq!(h.social.cached_friends().await.len(), 1);

        let mut broken = seed(&h, "c", "carol", &["me"]).await.to_document().unwrap();
        broken.remove("name");
        h.store.set("users", "c", broken).await.unwrap();

        let err = h
            .social
            .fetch_reverse_friends(&"me".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert_eq!(h.social.cached_friends().await.len(), 1);
    }
}
