use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown response code: {0}")]
    UnknownResponseCode(u16),

    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    #[error("String too long for a {max}-byte field: {len} bytes")]
    FieldOverflow { len: usize, max: usize },

    #[error("Declared content size {size} exceeds limit {max}")]
    ContentTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    pub fn truncated(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            what,
            expected,
            actual,
        }
    }
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("RSA operation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Decryption failed: bad padding or wrong key")]
    DecryptionFailed,

    #[error("Public key encodes to {0} bytes, expected 160")]
    PublicKeySize(usize),
}
