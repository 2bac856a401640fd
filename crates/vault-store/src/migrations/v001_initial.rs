//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `clients` and `files`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Clients
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS clients (
    id         TEXT PRIMARY KEY NOT NULL,     -- hex-encoded 16-byte client id
    name       TEXT NOT NULL UNIQUE,          -- registration name
    public_key BLOB,                          -- DER RSA public key, after key exchange
    aes_key    BLOB,                          -- 16-byte AES key, after key exchange
    last_seen  TEXT NOT NULL                  -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Files (latest upload per client + filename)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    pathname  TEXT PRIMARY KEY NOT NULL,      -- storage location, unique identity
    client_id TEXT NOT NULL,                  -- FK -> clients(id)
    filename  TEXT NOT NULL,                  -- lower-cased
    verified  INTEGER NOT NULL DEFAULT 0,     -- boolean 0/1

    FOREIGN KEY (client_id) REFERENCES clients(id),
    UNIQUE (client_id, filename)
);

CREATE INDEX IF NOT EXISTS idx_files_client_id ON files(client_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
