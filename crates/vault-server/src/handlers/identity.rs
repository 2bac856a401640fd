//! Registration and the RSA -> AES key exchange.

use tracing::{info, warn};
use vault_shared::crypto::{generate_aes_key, parse_public_key, wrap_aes_key};
use vault_shared::protocol::{KeyExchangePayload, RegisterPayload, RequestHeader, Response, ResponseCode};
use vault_shared::ClientId;

use crate::dispatcher::Reply;
use crate::error::{Result, ServerError};
use crate::server::ServerState;

/// Allocate an identity for a new name. Empty and already-taken names get a
/// RegistrationErr and change nothing.
pub async fn register(state: &ServerState, payload: RegisterPayload) -> Result<Reply> {
    let name = payload.name;
    if name.is_empty() {
        warn!("Registration with empty name");
        return Ok(registration_error());
    }

    match state.directory.register(&name).await {
        Ok(id) => {
            info!(client = %id, name = %name, "Client registered");
            Ok(Reply::response(Response::new(ResponseCode::RegistrationOk, id)))
        }
        Err(ServerError::DuplicateName(name)) => {
            warn!(name = %name, "Registration refused: name already taken");
            Ok(registration_error())
        }
        Err(e) => Err(e),
    }
}

/// Issue a fresh AES key to the requesting client, wrapped under the RSA
/// public key it sent. The request's client id decides whose keys are
/// stored; the declared name is informational.
pub async fn exchange_keys(
    state: &ServerState,
    header: &RequestHeader,
    payload: KeyExchangePayload,
) -> Result<Reply> {
    let client_id = header.client_id;

    if let Some(registered) = state.directory.client_name(&client_id).await {
        if registered != payload.name {
            warn!(
                client = %client_id,
                registered = %registered,
                declared = %payload.name,
                "Key exchange name does not match registration"
            );
        }
    }

    let public_key = parse_public_key(&payload.public_key)?;
    let aes_key = generate_aes_key();
    let wrapped = wrap_aes_key(&public_key, &aes_key)?;

    state
        .directory
        .set_keys(&client_id, &payload.public_key, &aes_key)
        .await?;

    info!(client = %client_id, wrapped_len = wrapped.len(), "Session key issued");
    Ok(Reply::response(Response::with_payload(
        ResponseCode::SwitchingKeys,
        client_id,
        wrapped,
    )))
}

fn registration_error() -> Reply {
    Reply::response(Response::new(ResponseCode::RegistrationErr, ClientId::NIL))
}
