//! # vault-store
//!
//! Persistent client and file records for the vault server, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every record the
//! protocol touches. Single statements auto-commit; check-then-write
//! sequences run inside a transaction that rolls back when dropped.

pub mod clients;
pub mod database;
pub mod files;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
