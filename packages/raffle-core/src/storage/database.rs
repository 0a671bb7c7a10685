//! # Database
//!
//! SQLite database wrapper.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────┐                                              │
//! │  │ AuthProvider /       │  Async trait impls (backend::sqlite)         │
//! │  │ DocumentStore        │                                              │
//! │  └──────────┬───────────┘                                              │
//! │             │                                                           │
//! │             ▼                                                           │
//! │  ┌──────────────────────┐                                              │
//! │  │    Database          │  High-level API (this file)                  │
//! │  │                      │  - Document CRUD and field queries           │
//! │  │                      │  - Atomic array union                        │
//! │  │                      │  - Credentials and reset requests            │
//! │  └──────────┬───────────┘                                              │
//! │             │                                                           │
//! │             ▼                                                           │
//! │  ┌──────────────────────┐                                              │
//! │  │   SQLite DB          │  - In-memory for tests                       │
//! │  │   (file or memory)   │  - File for production                       │
//! │  └──────────────────────┘                                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::schema;
use crate::backend::credentials::HashedPassword;
use crate::backend::{apply_array_union, Document, Snapshot};
use crate::error::{AuthErrorKind, Error, Result};
use crate::person::AccountId;

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the database file (None for in-memory)
    pub path: Option<String>,
}

/// A stored credential row
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Account the credential signs in as
    pub account_id: AccountId,
    /// Normalized email
    pub email: String,
    /// Salted digest
    pub password: HashedPassword,
    /// When the credential was created
    pub created_at: i64,
}

/// The main database handle
///
/// Wraps one SQLite connection. Every method takes the connection lock for
/// its whole duration, so each call is atomic with respect to the others.
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
    /// Accounts currently signed in through this handle
    pub(crate) signed_in: Mutex<HashSet<AccountId>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::Transport(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::Transport(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            signed_in: Mutex::new(HashSet::new()),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        // The version table does not exist yet on a fresh file
        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::Transport(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::Transport(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::Transport(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // DOCUMENT OPERATIONS
    // ========================================================================

    /// Get one document
    pub fn get_document(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND key = ?",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Transport(format!("Failed to get document: {}", e)))?;

        body.map(|b| parse_body(collection, key, &b)).transpose()
    }

    /// Create or overwrite one document
    pub fn put_document(&self, collection: &str, key: &str, doc: &Document) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO documents (collection, key, body, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(collection, key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![collection, key, body, crate::time::now_timestamp()],
        )
        .map_err(|e| Error::Transport(format!("Failed to write document: {}", e)))?;

        Ok(())
    }

    /// Delete one document, returning whether it existed
    pub fn delete_document(&self, collection: &str, key: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let rows = conn
            .execute(
                "DELETE FROM documents WHERE collection = ? AND key = ?",
                params![collection, key],
            )
            .map_err(|e| Error::Transport(format!("Failed to delete document: {}", e)))?;

        Ok(rows > 0)
    }

    /// All documents in a collection, ordered by key
    pub fn list_documents(&self, collection: &str) -> Result<Vec<Snapshot>> {
        self.select(
            "SELECT key, body FROM documents WHERE collection = ?1 ORDER BY key",
            collection,
            None,
        )
    }

    /// Documents whose string field equals `value`
    pub fn find_documents_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Snapshot>> {
        let path = json_path(field);
        self.select(
            "SELECT key, body FROM documents
             WHERE collection = ?1
               AND CASE WHEN json_valid(body) THEN json_extract(body, ?2) END = ?3
             ORDER BY key",
            collection,
            Some((path.as_str(), value)),
        )
    }

    /// Documents whose array field contains the string `value`
    pub fn find_documents_containing(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Snapshot>> {
        let path = json_path(field);
        self.select(
            "SELECT d.key, d.body FROM documents d
             WHERE d.collection = ?1
               AND CASE WHEN json_valid(d.body) THEN json_type(d.body, ?2) END = 'array'
               AND EXISTS (SELECT 1 FROM json_each(
                               CASE WHEN json_valid(d.body) THEN d.body ELSE '{}' END, ?2) e
                           WHERE e.type = 'text' AND e.value = ?3)
             ORDER BY d.key",
            collection,
            Some((path.as_str(), value)),
        )
    }

    /// Add `value` to an array field inside one transaction
    pub fn union_into_array(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Transport(format!("Failed to begin transaction: {}", e)))?;

        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ? AND key = ?",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;

        let body = body.ok_or_else(|| Error::NotFound(format!("{}/{}", collection, key)))?;
        let mut doc = parse_body(collection, key, &body)?;

        if apply_array_union(&mut doc, field, value) {
            tx.execute(
                "UPDATE documents SET body = ?, updated_at = ? WHERE collection = ? AND key = ?",
                params![
                    serde_json::to_string(&doc)?,
                    crate::time::now_timestamp(),
                    collection,
                    key
                ],
            )
            .map_err(|e| Error::Transport(format!("Failed to update document: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Transport(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    fn select(
        &self,
        sql: &str,
        collection: &str,
        filter: Option<(&str, &str)>,
    ) -> Result<Vec<Snapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Transport(format!("Failed to prepare query: {}", e)))?;

        let rows = match filter {
            Some((path, value)) => stmt.query_map(params![collection, path, value], key_and_body),
            None => stmt.query_map(params![collection], key_and_body),
        }
        .map_err(|e| Error::Transport(format!("Failed to query documents: {}", e)))?;

        // A body that is not a JSON object comes back empty so the caller's
        // decoder rejects that row alone
        let mut snapshots = Vec::new();
        for row in rows {
            let (key, body) =
                row.map_err(|e| Error::Transport(format!("Failed to read row: {}", e)))?;
            let data = parse_body(collection, &key, &body).unwrap_or_else(|e| {
                tracing::warn!(collection, key = %key, error = %e, "Unreadable document body");
                Document::new()
            });
            snapshots.push(Snapshot { key, data });
        }

        Ok(snapshots)
    }

    // ========================================================================
    // CREDENTIAL OPERATIONS
    // ========================================================================

    /// Store a new credential. `email` must already be normalized.
    pub fn insert_credential(
        &self,
        account_id: &AccountId,
        email: &str,
        password: &HashedPassword,
    ) -> Result<()> {
        let conn = self.conn.lock();

        let taken: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM credentials WHERE email = ?)",
                params![email],
                |row| row.get(0),
            )
            .map_err(|e| Error::Transport(format!("Failed to check email: {}", e)))?;

        if taken {
            return Err(Error::auth(
                AuthErrorKind::AccountExists,
                "The email address is already in use by another account.",
            ));
        }

        conn.execute(
            "INSERT INTO credentials (account_id, email, password_salt, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                account_id.as_str(),
                email,
                password.salt,
                password.digest,
                crate::time::now_timestamp(),
            ],
        )
        .map_err(|e| Error::Transport(format!("Failed to store credential: {}", e)))?;

        Ok(())
    }

    /// Look up a credential by normalized email
    pub fn get_credential_by_email(&self, email: &str) -> Result<Option<CredentialRecord>> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT account_id, email, password_salt, password_hash, created_at
             FROM credentials WHERE email = ?",
            params![email],
            |row| {
                Ok(CredentialRecord {
                    account_id: AccountId::new(row.get::<_, String>(0)?),
                    email: row.get(1)?,
                    password: HashedPassword::from_parts(row.get(2)?, row.get(3)?),
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::Transport(format!("Failed to get credential: {}", e)))
    }

    /// Remove a credential, returning whether it existed
    pub fn delete_credential_row(&self, account_id: &AccountId) -> Result<bool> {
        let conn = self.conn.lock();

        let rows = conn
            .execute(
                "DELETE FROM credentials WHERE account_id = ?",
                params![account_id.as_str()],
            )
            .map_err(|e| Error::Transport(format!("Failed to delete credential: {}", e)))?;

        Ok(rows > 0)
    }

    /// Record a password reset request
    pub fn record_password_reset(&self, email: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO password_resets (email, requested_at) VALUES (?, ?)",
            params![email, crate::time::now_timestamp()],
        )
        .map_err(|e| Error::Transport(format!("Failed to record reset: {}", e)))?;

        Ok(())
    }

    /// Number of reset requests recorded for an email
    pub fn password_reset_count(&self, email: &str) -> Result<i64> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT COUNT(*) FROM password_resets WHERE email = ?",
            params![email],
            |row| row.get(0),
        )
        .map_err(|e| Error::Transport(format!("Failed to count resets: {}", e)))
    }
}

fn key_and_body(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

/// JSON path selecting a top-level field, quoted so any field name is safe
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn parse_body(collection: &str, key: &str, body: &str) -> Result<Document> {
    serde_json::from_str(body).map_err(|e| {
        Error::MalformedRecord(format!("{}/{} is not a JSON object: {}", collection, key, e))
    })
}

// ============================================================================
// TESTS
// ============================================================================
