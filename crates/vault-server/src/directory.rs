//! In-memory mirror of the persisted clients and files.
//!
//! The cache maps and the [`Database`] live behind one mutex, so every store
//! write and its matching cache write happen as a unit and no two sessions
//! can interleave a check-then-insert. Callers only ever see cloned
//! snapshots.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vault_shared::{AesKey, ClientId};
use vault_store::{ClientRecord, Database, FileRecord, StoreError};

use crate::error::{Result, ServerError};

/// A client together with its own `pathname -> FileRecord` view.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub record: ClientRecord,
    pub files: HashMap<String, FileRecord>,
}

struct Inner {
    db: Database,
    clients: HashMap<ClientId, ClientEntry>,
    names: HashMap<String, ClientId>,
    files: HashMap<String, FileRecord>,
}

impl Inner {
    fn cache_file(&mut self, file: FileRecord) {
        if let Some(entry) = self.clients.get_mut(&file.client_id) {
            entry.files.insert(file.pathname.clone(), file.clone());
        }
        self.files.insert(file.pathname.clone(), file);
    }

    fn touch_cached(&mut self, id: &ClientId) {
        if let Some(entry) = self.clients.get_mut(id) {
            entry.record.last_seen = Utc::now();
        }
    }
}

pub struct Directory {
    inner: Mutex<Inner>,
}

impl Directory {
    /// Build the cache from everything persisted in `db`.
    pub fn load(db: Database) -> Result<Self> {
        let mut inner = Inner {
            clients: HashMap::new(),
            names: HashMap::new(),
            files: HashMap::new(),
            db,
        };

        for record in inner.db.list_clients()? {
            inner.names.insert(record.name.clone(), record.id);
            inner.clients.insert(
                record.id,
                ClientEntry {
                    record,
                    files: HashMap::new(),
                },
            );
        }

        for file in inner.db.list_files()? {
            if !inner.clients.contains_key(&file.client_id) {
                warn!(
                    client = %file.client_id,
                    path = %file.pathname,
                    "Skipping file owned by unknown client"
                );
                continue;
            }
            inner.cache_file(file);
        }

        info!(
            clients = inner.clients.len(),
            files = inner.files.len(),
            "Directory loaded"
        );

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    pub async fn client_exists(&self, id: &ClientId) -> bool {
        self.inner.lock().await.clients.contains_key(id)
    }

    pub async fn client(&self, id: &ClientId) -> Option<ClientRecord> {
        let inner = self.inner.lock().await;
        inner.clients.get(id).map(|entry| entry.record.clone())
    }

    pub async fn client_name(&self, id: &ClientId) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.clients.get(id).map(|entry| entry.record.name.clone())
    }

    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    /// Allocate a fresh identity for `name`. The name check, id allocation
    /// and both writes happen under one lock.
    pub async fn register(&self, name: &str) -> Result<ClientId> {
        let mut inner = self.inner.lock().await;

        if inner.names.contains_key(name) {
            return Err(ServerError::DuplicateName(name.to_string()));
        }

        let mut id = ClientId::generate();
        while id.is_nil() || inner.clients.contains_key(&id) {
            id = ClientId::generate();
        }

        let record = ClientRecord::new(id, name);
        inner.db.register_client(&record).map_err(|e| match e {
            StoreError::DuplicateName(name) => ServerError::DuplicateName(name),
            other => ServerError::Store(other),
        })?;

        inner.names.insert(record.name.clone(), id);
        inner.clients.insert(
            id,
            ClientEntry {
                record,
                files: HashMap::new(),
            },
        );

        debug!(client = %id, name, "Registered client");
        Ok(id)
    }

    pub async fn set_keys(&self, id: &ClientId, public_key: &[u8], aes_key: &AesKey) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if !inner.db.update_client_keys(id, public_key, aes_key)? {
            return Err(ServerError::UnknownClient(*id));
        }

        if let Some(entry) = inner.clients.get_mut(id) {
            entry.record.public_key = Some(public_key.to_vec());
            entry.record.aes_key = Some(*aes_key);
            entry.record.last_seen = Utc::now();
        }
        Ok(())
    }

    pub async fn aes_key(&self, id: &ClientId) -> Option<AesKey> {
        let inner = self.inner.lock().await;
        inner.clients.get(id).and_then(|entry| entry.record.aes_key)
    }

    pub async fn touch(&self, id: &ClientId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.db.touch_last_seen(id)?;
        inner.touch_cached(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    pub async fn file(&self, pathname: &str) -> Option<FileRecord> {
        self.inner.lock().await.files.get(pathname).cloned()
    }

    pub async fn files_of(&self, id: &ClientId) -> Vec<FileRecord> {
        let inner = self.inner.lock().await;
        inner
            .clients
            .get(id)
            .map(|entry| entry.files.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a completed upload. A new pathname gets a new record; an
    /// existing one has `verified` reset. Returns `true` if created.
    pub async fn record_upload(&self, client_id: &ClientId, filename: &str, pathname: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let file = FileRecord {
            client_id: *client_id,
            filename: filename.to_string(),
            pathname: pathname.to_string(),
            verified: false,
        };
        let created = inner.db.upsert_file_record(&file)?;

        inner.cache_file(file);
        inner.touch_cached(client_id);
        Ok(created)
    }

    /// Returns `false` if there was no such file record.
    pub async fn set_verified(&self, client_id: &ClientId, filename: &str, verified: bool) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let updated = inner.db.update_verification(client_id, filename, verified)?;

        if let Some(entry) = inner.clients.get_mut(client_id) {
            entry.record.last_seen = Utc::now();
            for file in entry.files.values_mut().filter(|f| f.filename == filename) {
                file.verified = verified;
            }
        }
        for file in inner
            .files
            .values_mut()
            .filter(|f| f.client_id == *client_id && f.filename == filename)
        {
            file.verified = verified;
        }
        Ok(updated)
    }

    /// Drop a file record from store and cache. Returns `false` if there was
    /// nothing to delete.
    pub async fn remove_file(&self, client_id: &ClientId, filename: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let deleted = inner.db.delete_file_record(client_id, filename)?;

        if let Some(entry) = inner.clients.get_mut(client_id) {
            entry.record.last_seen = Utc::now();
            entry.files.retain(|_, f| f.filename != filename);
        }
        inner
            .files
            .retain(|_, f| !(f.client_id == *client_id && f.filename == filename));
        Ok(deleted)
    }
}
