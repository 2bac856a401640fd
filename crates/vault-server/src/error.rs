use thiserror::Error;
use vault_shared::{ClientId, CryptoError, ProtocolError};
use vault_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed or truncated frame; the session is aborted.
    #[error("Framing error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket failure or peer disconnect.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("File storage error: {0}")]
    Storage(String),

    #[error("Client name already registered: {0}")]
    DuplicateName(String),

    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Client {0} has not completed key exchange")]
    NoSessionKey(ClientId),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ServerError {
    /// Errors after which the connection can no longer be trusted to be in
    /// sync with the framing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Protocol(_) | ServerError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
