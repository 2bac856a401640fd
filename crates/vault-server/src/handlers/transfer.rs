//! File upload and the checksum verification handshake.
//!
//! Upload -> PendingVerification -> Verified | Deleted. A re-upload of the
//! same name always lands back in PendingVerification. The server keeps no
//! retry count; the client decides when a mismatch becomes final.

use bytes::BytesMut;
use tracing::{debug, info, warn};
use vault_shared::constants::NAME_FIELD_SIZE;
use vault_shared::crypto::aes_cbc_decrypt;
use vault_shared::protocol::{
    ChecksumFrame, ChecksumResult, RequestHeader, Response, ResponseCode, UploadHeader,
};

use crate::dispatcher::Reply;
use crate::error::{Result, ServerError};
use crate::server::ServerState;

/// Decrypt and store an upload, then answer an empty ChecksumReady followed
/// by the raw length/filename/checksum frame.
pub async fn receive_file(
    state: &ServerState,
    header: &RequestHeader,
    upload: UploadHeader,
    ciphertext: Vec<u8>,
) -> Result<Reply> {
    let client_id = header.client_id;
    if upload.client_id != client_id {
        warn!(
            client = %client_id,
            declared = %upload.client_id,
            "Upload sub-header names another client, using request header"
        );
    }

    let filename = upload.filename.to_lowercase();
    // lowercasing can grow a name past the field it is echoed back in
    if filename.len() > NAME_FIELD_SIZE {
        return Err(ServerError::BadRequest(format!(
            "Filename too long after case folding: {} bytes",
            filename.len()
        )));
    }
    let aes_key = state
        .directory
        .aes_key(&client_id)
        .await
        .ok_or(ServerError::NoSessionKey(client_id))?;

    let plaintext = aes_cbc_decrypt(&aes_key, &ciphertext)?;
    let path = state.storage.write(&client_id, &filename, &plaintext).await?;
    let pathname = path.to_string_lossy().into_owned();

    let created = state
        .directory
        .record_upload(&client_id, &filename, &pathname)
        .await?;
    let checksum = state.storage.checksum(&path).await?;

    info!(
        client = %client_id,
        file = %filename,
        size = plaintext.len(),
        checksum,
        new = created,
        "File received"
    );

    let mut frame = BytesMut::new();
    ChecksumFrame {
        content_length: plaintext.len() as u32,
        filename,
        checksum,
    }
    .encode(&mut frame)
    .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    Ok(Reply::response(Response::new(ResponseCode::ChecksumReady, client_id)).then_raw(frame))
}

pub async fn checksum_ok(
    state: &ServerState,
    header: &RequestHeader,
    result: ChecksumResult,
) -> Result<Reply> {
    let client_id = header.client_id;
    let filename = result.filename.to_lowercase();

    if state.directory.set_verified(&client_id, &filename, true).await? {
        info!(client = %client_id, file = %filename, "Checksum confirmed");
    } else {
        warn!(client = %client_id, file = %filename, "Checksum confirmed for unknown file");
    }

    Ok(message_received(header))
}

/// A mismatch the client will retry. Nothing changes and nothing is sent.
pub async fn checksum_err(
    _state: &ServerState,
    header: &RequestHeader,
    result: ChecksumResult,
) -> Result<Reply> {
    info!(
        client = %header.client_id,
        file = %result.filename.to_lowercase(),
        "Checksum mismatch reported, awaiting re-upload"
    );
    Ok(Reply::none())
}

/// The client gave up: drop the stored content and its record. Always
/// acknowledged, even when there was nothing to drop.
pub async fn checksum_err_final(
    state: &ServerState,
    header: &RequestHeader,
    result: ChecksumResult,
) -> Result<Reply> {
    let client_id = header.client_id;
    let filename = result.filename.to_lowercase();

    let removed_file = match state.storage.remove(&client_id, &filename).await {
        Ok(removed) => removed,
        // a name storage refuses can never have been stored
        Err(ServerError::BadRequest(reason)) => {
            debug!(client = %client_id, file = %filename, %reason, "Nothing to delete");
            false
        }
        Err(e) => return Err(e),
    };
    let removed_record = state.directory.remove_file(&client_id, &filename).await?;
    debug!(
        client = %client_id,
        file = %filename,
        removed_file,
        removed_record,
        "Upload discarded after final checksum failure"
    );

    Ok(message_received(header))
}

fn message_received(header: &RequestHeader) -> Reply {
    Reply::response(Response::new(ResponseCode::MessageReceived, header.client_id))
}
