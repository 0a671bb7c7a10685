//! Server state management.
//!
//! Holds the shared SQLite database and one [`RaffleClient`] per bearer
//! token. Sessions live in a DashMap so handlers never contend on a global
//! lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use raffle_core::{AccountId, CoreConfig, Database, RaffleClient};
use uuid::Uuid;

/// Default idle session TTL in seconds (24 hours).
const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 3600;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite file; in-memory when absent
    pub database_path: Option<String>,
    pub session_ttl_secs: i64,
    /// Passed through to every client
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            core: CoreConfig::default(),
        }
    }
}

/// A signed-in client bound to a bearer token.
#[derive(Clone)]
pub struct ClientSession {
    pub client: Arc<RaffleClient>,
    /// Account the token was issued for
    pub account: AccountId,
    pub last_seen: DateTime<Utc>,
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    /// Auth and documents for every client.
    pub db: Arc<Database>,

    /// Bearer token → client session.
    pub sessions: Arc<DashMap<String, ClientSession>>,

    /// Server configuration.
    pub config: ServerConfig,
}

impl ServerState {
    pub fn new(config: ServerConfig, db: Arc<Database>) -> Self {
        Self {
            db,
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    /// A client with an empty session over the shared database.
    pub fn new_client(&self) -> Arc<RaffleClient> {
        Arc::new(RaffleClient::with_database(
            self.db.clone(),
            self.config.core.clone(),
        ))
    }

    // ── Session Management ────────────────────────────────────────────────

    /// Bind a signed-in client to a fresh token.
    pub fn open_session(&self, client: Arc<RaffleClient>, account: AccountId) -> String {
        let token = Uuid::new_v4().to_string();
        tracing::debug!(account = %account, "Session opened");
        self.sessions.insert(
            token.clone(),
            ClientSession {
                client,
                account,
                last_seen: Utc::now(),
            },
        );
        token
    }

    /// Look up a token, refreshing its idle timer.
    pub fn session(&self, token: &str) -> Option<ClientSession> {
        let mut entry = self.sessions.get_mut(token)?;
        entry.last_seen = Utc::now();
        Some(entry.clone())
    }

    pub fn close_session(&self, token: &str) {
        if self.sessions.remove(token).is_some() {
            tracing::debug!(sessions = self.sessions.len(), "Session closed");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle for longer than the TTL.
    /// Called periodically by the cleanup task.
    pub fn cleanup_expired(&self) {
        let now = Utc::now().timestamp();
        let before = self.sessions.len();

        self.sessions
            .retain(|_, s| now - s.last_seen.timestamp() <= self.config.session_ttl_secs);

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(count = removed, "Cleaned up idle sessions");
        }
    }
}
