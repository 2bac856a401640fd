use thiserror::Error;
use vault_shared::{CryptoError, ProtocolError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Server refused the request (RegistrationErr)")]
    Rejected,

    #[error("Expected response {expected}, got {actual}")]
    UnexpectedResponse { expected: u16, actual: u16 },

    #[error("Not registered yet")]
    NotRegistered,

    #[error("No session key; run the key exchange first")]
    NoSessionKey,

    #[error("Unreadable identity file: {0}")]
    BadIdentity(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
