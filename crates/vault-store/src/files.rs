//! CRUD operations for [`FileRecord`] rows.
//!
//! Every mutation also refreshes the owner's `last_seen`, in the same
//! transaction.

use rusqlite::{params, Connection};
use vault_shared::ClientId;

use crate::clients::touch_last_seen_on;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::FileRecord;

impl Database {
    pub fn file_exists(&self, client_id: &ClientId, filename: &str) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE client_id = ?1 AND filename = ?2)",
            params![client_id.to_hex(), filename],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn get_file(&self, pathname: &str) -> Result<FileRecord> {
        self.conn()
            .query_row(
                "SELECT client_id, filename, pathname, verified
                 FROM files
                 WHERE pathname = ?1",
                params![pathname],
                row_to_file,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT client_id, filename, pathname, verified
             FROM files
             ORDER BY pathname ASC",
        )?;

        let rows = stmt.query_map([], row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    pub fn insert_file_record(&mut self, file: &FileRecord) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        insert_file_on(&tx, file)?;
        touch_last_seen_on(&tx, &file.client_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Record a fresh upload: insert the row if this pathname is new,
    /// otherwise reset `verified` to false. Returns `true` if a row was
    /// created.
    pub fn upsert_file_record(&mut self, file: &FileRecord) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE pathname = ?1)",
            params![file.pathname],
            |row| row.get(0),
        )?;

        if exists {
            tx.execute(
                "UPDATE files SET verified = 0 WHERE pathname = ?1",
                params![file.pathname],
            )?;
        } else {
            insert_file_on(
                &tx,
                &FileRecord {
                    verified: false,
                    ..file.clone()
                },
            )?;
        }
        touch_last_seen_on(&tx, &file.client_id)?;

        tx.commit()?;
        Ok(!exists)
    }

    /// Returns `false` if no row matched.
    pub fn update_verification(
        &mut self,
        client_id: &ClientId,
        filename: &str,
        verified: bool,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let affected = tx.execute(
            "UPDATE files SET verified = ?1 WHERE client_id = ?2 AND filename = ?3",
            params![verified, client_id.to_hex(), filename],
        )?;
        touch_last_seen_on(&tx, client_id)?;
        tx.commit()?;
        Ok(affected > 0)
    }

    // only removes the db record, not the file on disk
    pub fn delete_file_record(&mut self, client_id: &ClientId, filename: &str) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;
        let affected = tx.execute(
            "DELETE FROM files WHERE client_id = ?1 AND filename = ?2",
            params![client_id.to_hex(), filename],
        )?;
        touch_last_seen_on(&tx, client_id)?;
        tx.commit()?;
        Ok(affected > 0)
    }
}

fn insert_file_on(conn: &Connection, file: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO files (pathname, client_id, filename, verified)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            file.pathname,
            file.client_id.to_hex(),
            file.filename,
            file.verified,
        ],
    )?;
    Ok(())
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let client_hex: String = row.get(0)?;
    let filename: String = row.get(1)?;
    let pathname: String = row.get(2)?;
    let verified: bool = row.get(3)?;

    let client_id = ClientId::from_hex(&client_hex).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FileRecord {
        client_id,
        filename,
        pathname,
        verified,
    })
}
