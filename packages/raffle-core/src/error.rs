//! # Error Handling
//!
//! Error types for Raffle Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Session Errors                                                    │
//! │  │   ├── NoSession             - No account signed in                  │
//! │  │   └── SessionMismatch       - Operation targets another account     │
//! │  │                                                                      │
//! │  ├── Auth Errors                                                       │
//! │  │   └── Auth { kind, message } - Surfaced verbatim from auth backend  │
//! │  │                                                                      │
//! │  ├── Record Errors                                                     │
//! │  │   ├── NotFound              - No document for that key              │
//! │  │   ├── MalformedRecord       - Document failed required-field check  │
//! │  │   └── PartialDeletion       - Credential / record left out of step  │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   └── Transport             - Backend unreachable or request failed │
//! │  │                                                                      │
//! │  ├── Friend Errors                                                     │
//! │  │   ├── AlreadyLinked         - Target already in owner's friends     │
//! │  │   └── CannotLinkSelf        - Link from an account to itself        │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── Serialization         - Encoding a record failed              │
//! │      └── Internal              - Should not happen                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in the core swallows an error. Boundary logging goes through
//! `tracing`, and the typed error is still returned to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Raffle Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why the auth subsystem refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// Wrong email/password pair
    InvalidCredentials,
    /// An account with this email already exists
    AccountExists,
    /// Password does not meet the provider's rules
    WeakPassword,
    /// Email address is not well formed
    InvalidEmail,
    /// No credential exists for the email or id
    UnknownAccount,
    /// Any other refusal from the provider
    Rejected,
}

impl AuthErrorKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "invalid_credentials",
            AuthErrorKind::AccountExists => "account_exists",
            AuthErrorKind::WeakPassword => "weak_password",
            AuthErrorKind::InvalidEmail => "invalid_email",
            AuthErrorKind::UnknownAccount => "unknown_account",
            AuthErrorKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Raffle Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Session Errors (100-199)
    // ========================================================================

    /// No account is signed in on this session
    #[error("No active session. Register or load an account first.")]
    NoSession,

    /// The operation names an account other than the session's
    #[error("Session belongs to {session}, not {requested}.")]
    SessionMismatch {
        /// Account the session holds
        session: String,
        /// Account the caller named
        requested: String,
    },

    // ========================================================================
    // Auth Errors (200-299)
    // ========================================================================

    /// The auth subsystem refused the request
    #[error("Authentication failed ({kind}): {message}")]
    Auth {
        /// Category of the refusal
        kind: AuthErrorKind,
        /// Backend message
        message: String,
    },

    // ========================================================================
    // Record Errors (300-399)
    // ========================================================================

    /// No document exists for the key
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A fetched document failed required-field validation
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Only one half of an account deletion took effect
    #[error("Account {account} was only partially deleted: {detail}")]
    PartialDeletion {
        /// Account left half-deleted
        account: String,
        /// What survived and why
        detail: String,
    },

    // ========================================================================
    // Transport Errors (400-499)
    // ========================================================================

    /// Backend unreachable or request failed for infrastructure reasons
    #[error("Transport error: {0}")]
    Transport(String),

    // ========================================================================
    // Friend Errors (500-599)
    // ========================================================================

    /// Target is already in the owner's friend set
    #[error("{target} is already in the friend list of {owner}.")]
    AlreadyLinked {
        /// Account whose list already holds the link
        owner: String,
        /// Linked account
        target: String,
    },

    /// An account cannot be linked to itself
    #[error("Cannot add yourself as a friend.")]
    CannotLinkSelf,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an auth refusal
    pub fn auth(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Error::Auth {
            kind,
            message: message.into(),
        }
    }

    /// Get the numeric error code
    ///
    /// - 100-199: Session
    /// - 200-299: Auth
    /// - 300-399: Records
    /// - 400-499: Transport
    /// - 500-599: Friends
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::NoSession => 100,
            Error::SessionMismatch { .. } => 101,

            Error::Auth { kind, .. } => match kind {
                AuthErrorKind::InvalidCredentials => 200,
                AuthErrorKind::AccountExists => 201,
                AuthErrorKind::WeakPassword => 202,
                AuthErrorKind::InvalidEmail => 203,
                AuthErrorKind::UnknownAccount => 204,
                AuthErrorKind::Rejected => 205,
            },

            Error::NotFound(_) => 300,
            Error::MalformedRecord(_) => 301,
            Error::PartialDeletion { .. } => 302,

            Error::Transport(_) => 400,

            Error::AlreadyLinked { .. } => 500,
            Error::CannotLinkSelf => 501,

            Error::Serialization(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Check if retrying the same request might succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::PartialDeletion { .. })
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(self, Error::NoSession | Error::Auth { .. })
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
