//! # Database Schema
//!
//! SQL schema definitions for the Raffle database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │   documents     │    │  credentials    │      │ password_resets │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ collection  PK  │    │ account_id  PK  │      │ id              │    │
//! │  │ key         PK  │    │ email   UNIQUE  │      │ email           │    │
//! │  │ body (JSON)     │    │ password_salt   │      │ requested_at    │    │
//! │  │ updated_at      │    │ password_hash   │      └─────────────────┘    │
//! │  └─────────────────┘    │ created_at      │                             │
//! │                         └─────────────────┘                             │
//! │                                                                         │
//! │  documents.body is a JSON object. Field queries go through             │
//! │  json_extract / json_each.                                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Keyed JSON documents, one row per (collection, key)
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    -- JSON object text
    body TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, key)
);

-- Email/password credentials
CREATE TABLE IF NOT EXISTS credentials (
    account_id TEXT PRIMARY KEY,
    -- Normalized (trimmed, lowercase) email
    email TEXT NOT NULL UNIQUE,
    -- Hex encoded random salt
    password_salt TEXT NOT NULL,
    -- Hex encoded SHA-256(salt || password)
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Password reset requests awaiting delivery
CREATE TABLE IF NOT EXISTS password_resets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    requested_at INTEGER NOT NULL
);
"#;
