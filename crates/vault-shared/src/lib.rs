//! # vault-shared
//!
//! Wire format, opcodes, crypto helpers and the `cksum` digest shared by
//! the vault server and its clients. Pure code, no I/O.

pub mod checksum;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{CryptoError, ProtocolError};
pub use types::{AesKey, ClientId};
