//! Records persisted in the server database.
//!
//! These are plain snapshots: handlers receive copies and every mutation goes
//! through a `Database` method, never through field assignment on a shared
//! instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_shared::{AesKey, ClientId};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRecord {
    /// Server-issued identity, stored as hex.
    pub id: ClientId,
    /// Unique registration name.
    pub name: String,
    /// DER public key received during key exchange.
    pub public_key: Option<Vec<u8>>,
    /// Session key issued during key exchange.
    pub aes_key: Option<AesKey>,
    /// Updated on every authenticated request.
    pub last_seen: DateTime<Utc>,
}

impl ClientRecord {
    /// A freshly registered client with no keys yet.
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            public_key: None,
            aes_key: None,
            last_seen: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Latest upload of one file by one client. `pathname` is both the storage
/// location and the primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub client_id: ClientId,
    /// Lower-cased file name as sent by the client.
    pub filename: String,
    pub pathname: String,
    /// Whether the client confirmed our checksum.
    pub verified: bool,
}
