use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use vault_shared::checksum::Cksum;
use vault_shared::constants::CHECKSUM_CHUNK_SIZE;
use vault_shared::ClientId;

use crate::error::{Result, ServerError};

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {} // RootDir, CurDir, Prefix: skip
        }
    }
    if !resolved.starts_with(base) {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// On-disk home of uploaded content: `<root>/<client-id-hex>/<filename>`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::Storage(format!(
                "Failed to create storage directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "File storage initialized");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Deterministic location for a client's file. The filename must be a
    /// single plain path component.
    pub fn path_for(&self, client_id: &ClientId, filename: &str) -> Result<PathBuf> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0')
        {
            return Err(ServerError::BadRequest(format!(
                "Unusable filename: {filename:?}"
            )));
        }
        let target = self.base_path.join(client_id.to_hex()).join(filename);
        ensure_within(&self.base_path, &target)
    }

    /// Write (or overwrite) a client's file and return its path.
    pub async fn write(
        &self,
        client_id: &ClientId,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf> {
        let path = self.path_for(client_id, filename)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| {
                ServerError::Storage(format!("Failed to create '{}': {}", dir.display(), e))
            })?;
        }

        fs::write(&path, data).await.map_err(|e| {
            ServerError::Storage(format!("Failed to write '{}': {}", path.display(), e))
        })?;

        debug!(path = %path.display(), size = data.len(), "Stored file");
        Ok(path)
    }

    pub async fn read(&self, client_id: &ClientId, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(client_id, filename)?;
        fs::read(&path).await.map_err(|e| {
            ServerError::Storage(format!("Failed to read '{}': {}", path.display(), e))
        })
    }

    /// Remove a client's file. A file that is already gone is not an error;
    /// returns whether something was deleted.
    pub async fn remove(&self, client_id: &ClientId, filename: &str) -> Result<bool> {
        let path = self.path_for(client_id, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServerError::Storage(format!(
                "Failed to delete '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Stream a stored file through `cksum` in fixed-size chunks.
    pub async fn checksum(&self, path: &Path) -> Result<u32> {
        let mut file = fs::File::open(path).await.map_err(|e| {
            ServerError::Storage(format!("Failed to open '{}': {}", path.display(), e))
        })?;

        let mut digest = Cksum::new();
        let mut buf = vec![0u8; CHECKSUM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| {
                ServerError::Storage(format!("Failed to read '{}': {}", path.display(), e))
            })?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
        }
        Ok(digest.finish())
    }
}
