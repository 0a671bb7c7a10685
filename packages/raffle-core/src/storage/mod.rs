//! # Storage Module
//!
//! SQLite-backed implementation of both collaborator seams.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite Database (one file, or in-memory for tests)            │   │
//! │  │  ──────────────────────────────────────────────                 │   │
//! │  │                                                                 │   │
//! │  │  Tables:                                                       │   │
//! │  │  • documents - JSON documents keyed by (collection, key)      │   │
//! │  │  • credentials - email + salted password digest               │   │
//! │  │  • password_resets - reset requests awaiting delivery         │   │
//! │  │                                                                 │   │
//! │  │  Provider-side sign-in state is kept in memory only.          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod schema;

pub use database::{CredentialRecord, Database, DatabaseConfig};

use crate::error::Result;

/// Initialize the storage system
pub async fn init(config: DatabaseConfig) -> Result<Database> {
    Database::open(config.path.as_deref()).await
}
