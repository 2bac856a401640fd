//! Opcode handlers. Each takes the shared [`ServerState`](crate::server::ServerState)
//! and a decoded request body and returns the frames to send back.

pub mod identity;
pub mod transfer;
