//! The identity file a client keeps between runs: its name on the first
//! line and the server-issued id, as hex, on the second.

use std::path::Path;

use tokio::fs;
use tracing::debug;
use vault_shared::ClientId;

use crate::error::{ClientError, Result};

/// Default identity file name, looked up in the working directory.
pub const DEFAULT_IDENTITY_FILE: &str = "me.info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub client_id: ClientId,
}

impl Identity {
    pub fn new(name: impl Into<String>, client_id: ClientId) -> Self {
        Self {
            name: name.into(),
            client_id,
        }
    }

    /// Read a saved identity. A missing file is `Ok(None)`.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let identity = Self::parse(&text)?;
        debug!(path = %path.display(), client = %identity.client_id, "Loaded identity");
        Ok(Some(identity))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, format!("{}\n{}\n", self.name, self.client_id.to_hex())).await?;
        debug!(path = %path.display(), client = %self.client_id, "Saved identity");
        Ok(())
    }

    fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim);
        let name = lines
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ClientError::BadIdentity("missing name".into()))?;
        let hex = lines
            .next()
            .ok_or_else(|| ClientError::BadIdentity("missing client id".into()))?;
        let client_id = ClientId::from_hex(hex)
            .map_err(|e| ClientError::BadIdentity(format!("client id {hex:?}: {e}")))?;
        Ok(Self::new(name, client_id))
    }
}
