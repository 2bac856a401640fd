//! CRUD operations for [`ClientRecord`] rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use vault_shared::{AesKey, ClientId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ClientRecord;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new client. A name collision maps to
    /// [`StoreError::DuplicateName`].
    pub fn insert_client(&self, client: &ClientRecord) -> Result<()> {
        insert_client_on(self.conn(), client)
    }

    /// Check-and-insert in one immediate transaction, so two concurrent
    /// registrations of the same name cannot both succeed.
    pub fn register_client(&mut self, client: &ClientRecord) -> Result<()> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE name = ?1)",
            params![client.name],
            |row| row.get(0),
        )?;
        if taken {
            // dropping `tx` rolls back
            return Err(StoreError::DuplicateName(client.name.clone()));
        }

        insert_client_on(&tx, client)?;
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn client_exists_by_name(&self, name: &str) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn client_exists_by_id(&self, id: &ClientId) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = ?1)",
            params![id.to_hex()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn get_client_name(&self, id: &ClientId) -> Result<Option<String>> {
        let name = self
            .conn()
            .query_row(
                "SELECT name FROM clients WHERE id = ?1",
                params![id.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    pub fn get_client(&self, id: &ClientId) -> Result<ClientRecord> {
        self.conn()
            .query_row(
                "SELECT id, name, public_key, aes_key, last_seen
                 FROM clients
                 WHERE id = ?1",
                params![id.to_hex()],
                row_to_client,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all clients, ordered by name.
    pub fn list_clients(&self) -> Result<Vec<ClientRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, public_key, aes_key, last_seen
             FROM clients
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map([], row_to_client)?;

        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    /// `None` when the client is unknown or has not exchanged keys yet.
    pub fn get_aes_key(&self, id: &ClientId) -> Result<Option<AesKey>> {
        let key: Option<Option<Vec<u8>>> = self
            .conn()
            .query_row(
                "SELECT aes_key FROM clients WHERE id = ?1",
                params![id.to_hex()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(key.flatten().and_then(|bytes| bytes.as_slice().try_into().ok()))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Store the key-exchange result. Returns `false` if no such client.
    pub fn update_client_keys(
        &self,
        id: &ClientId,
        public_key: &[u8],
        aes_key: &AesKey,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE clients SET public_key = ?1, aes_key = ?2, last_seen = ?3 WHERE id = ?4",
            params![
                public_key,
                aes_key.as_slice(),
                Utc::now().to_rfc3339(),
                id.to_hex()
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn touch_last_seen(&self, id: &ClientId) -> Result<bool> {
        touch_last_seen_on(self.conn(), id)
    }
}

fn insert_client_on(conn: &Connection, client: &ClientRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO clients (id, name, public_key, aes_key, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            client.id.to_hex(),
            client.name,
            client.public_key,
            client.aes_key.as_ref().map(|k| k.to_vec()),
            client.last_seen.to_rfc3339(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateName(client.name.clone())
        }
        other => StoreError::Sqlite(other),
    })?;
    Ok(())
}

pub(crate) fn touch_last_seen_on(conn: &Connection, id: &ClientId) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE clients SET last_seen = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), id.to_hex()],
    )?;
    Ok(affected > 0)
}

fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientRecord> {
    let id_hex: String = row.get(0)?;
    let name: String = row.get(1)?;
    let public_key: Option<Vec<u8>> = row.get(2)?;
    let aes_key: Option<Vec<u8>> = row.get(3)?;
    let last_seen_str: String = row.get(4)?;

    let id = ClientId::from_hex(&id_hex).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let aes_key = match aes_key {
        Some(bytes) => Some(AesKey::try_from(bytes.as_slice()).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Blob, Box::new(e))
        })?),
        None => None,
    };

    let last_seen: DateTime<Utc> = DateTime::parse_from_rfc3339(&last_seen_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ClientRecord {
        id,
        name,
        public_key,
        aes_key,
        last_seen,
    })
}
