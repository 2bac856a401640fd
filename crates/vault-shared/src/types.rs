use serde::{Deserialize, Serialize};

use crate::constants::{AES_KEY_SIZE, CLIENT_ID_SIZE};

/// Server-issued client identity (16 random bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ClientId(pub [u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// The all-zero id carried by error responses that name no valid client.
    pub const NIL: ClientId = ClientId([0u8; CLIENT_ID_SIZE]);

    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; CLIENT_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub type AesKey = [u8; AES_KEY_SIZE];
