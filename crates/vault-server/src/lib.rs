//! # vault-server
//!
//! Multi-client encrypted file-upload server. Clients register for a
//! server-issued id, receive an AES session key wrapped under their RSA
//! public key, and upload AES-CBC encrypted files whose integrity they
//! confirm through a checksum handshake.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod file_store;
pub mod handlers;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use directory::Directory;
pub use error::ServerError;
pub use file_store::FileStorage;
pub use server::{Server, ServerState};
