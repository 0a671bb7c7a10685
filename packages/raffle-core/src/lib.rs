//! # Raffle Core
//!
//! Account lifecycle, profile records and the friend graph for the raffle
//! app, written against two pluggable collaborators: an auth provider and a
//! document store.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         RAFFLE CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────┐            ┌──────────────────────┐          │
//! │  │   ProfileDirectory   │            │  SocialGraphService  │          │
//! │  │                      │            │                      │          │
//! │  │ - register / login   │            │ - add_friend_link    │          │
//! │  │ - load / save        │            │ - link_self_into     │          │
//! │  │ - delete + repair    │            │ - search / reverse   │          │
//! │  └──────────┬───────────┘            └───────────┬──────────┘          │
//! │             │                                    │                      │
//! │             └──────────────┬─────────────────────┘                      │
//! │                            ▼                                            │
//! │                 ┌─────────────────────┐                                 │
//! │                 │       Session       │  current Person + friend cache │
//! │                 └─────────────────────┘                                 │
//! │                                                                         │
//! │  ┌──────────────────────┐            ┌──────────────────────┐          │
//! │  │     AuthProvider     │            │    DocumentStore     │          │
//! │  │  MemoryAuth          │            │  MemoryStore         │          │
//! │  │  storage::Database   │            │  storage::Database   │          │
//! │  └──────────────────────┘            └──────────────────────┘          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`person`] - The Person record and its document encoding
//! - [`backend`] - Collaborator traits and in-memory implementations
//! - [`storage`] - SQLite implementation of both collaborators
//! - [`session`] - Signed-in account and friend cache
//! - [`directory`] - Account lifecycle
//! - [`social`] - Friend links and friend queries
//! - [`repair`] - Markers for half-finished account operations

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod backend;
pub mod directory;
pub mod error;
pub mod person;
pub mod repair;
pub mod session;
pub mod social;
pub mod storage;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use backend::{AuthProvider, Document, DocumentStore, MemoryAuth, MemoryStore, Snapshot};
pub use directory::ProfileDirectory;
pub use error::{AuthErrorKind, Error, Result};
pub use person::{AccountId, Person};
pub use repair::{InconsistencyMarker, RepairAction};
pub use session::Session;
pub use social::SocialGraphService;
pub use storage::Database;

// ============================================================================
// CLIENT
// ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration shared by the directory and the graph service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Collection holding Person records
    pub users_collection: String,
    /// Collection holding inconsistency markers
    pub repairs_collection: String,
    /// How many times register tries to write a new record
    pub persist_attempts: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            users_collection: "users".to_string(),
            repairs_collection: "repairs".to_string(),
            persist_attempts: 3,
        }
    }
}

/// One signed-in client: a directory and a graph service sharing a session
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        CLIENT LIFECYCLE                                 │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Construct over shared collaborators                                │
/// │     RaffleClient::new(auth, store, config)                             │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. register()  or  login() + load_current()                           │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Active: save_current, friend links, search, reverse friends        │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. logout() or delete_account()  ──► session empty                    │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct RaffleClient {
    session: Arc<Session>,
    directory: ProfileDirectory,
    social: SocialGraphService,
}

impl RaffleClient {
    /// Build a client over the given collaborators
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        config: CoreConfig,
    ) -> Self {
        let session = Arc::new(Session::new());
        let directory =
            ProfileDirectory::new(auth, store.clone(), session.clone(), config.clone());
        let social = SocialGraphService::new(store, session.clone(), config);

        Self {
            session,
            directory,
            social,
        }
    }

    /// Build a client whose auth and documents both live in `db`
    pub fn with_database(db: Arc<Database>, config: CoreConfig) -> Self {
        Self::new(db.clone(), db, config)
    }

    /// Build a client over fresh in-memory collaborators
    pub fn in_memory(config: CoreConfig) -> Self {
        Self::new(
            Arc::new(MemoryAuth::new()),
            Arc::new(MemoryStore::new()),
            config,
        )
    }

    /// The account lifecycle half
    pub fn directory(&self) -> &ProfileDirectory {
        &self.directory
    }

    /// The friend graph half
    pub fn social(&self) -> &SocialGraphService {
        &self.social
    }

    /// The session both halves share
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Raffle Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
