//! Per-connection loop: read one framed request, dispatch it, write the
//! reply frames, repeat until the peer hangs up.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use vault_shared::constants::{NAME_FIELD_SIZE, REQUEST_HEADER_SIZE, UPLOAD_HEADER_SIZE};
use vault_shared::protocol::{
    ChecksumResult, KeyExchangePayload, RegisterPayload, RequestCode, RequestHeader,
    UploadHeader,
};
use vault_shared::ProtocolError;

use crate::dispatcher::{self, Reply};
use crate::error::Result;
use crate::server::ServerState;

/// A decoded request: header plus its opcode-specific body.
#[derive(Debug, Clone)]
pub struct Request {
    pub header: RequestHeader,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Register(RegisterPayload),
    KeyExchange(KeyExchangePayload),
    Upload {
        header: UploadHeader,
        ciphertext: Vec<u8>,
    },
    ChecksumResult {
        code: RequestCode,
        result: ChecksumResult,
    },
    /// Opcode outside the known set. Its payload has been consumed.
    Unknown(u16),
}

/// Drive one connection to completion. A clean disconnect between requests
/// returns `Ok(())`; framing and socket errors are returned to the caller,
/// which closes the connection.
pub async fn run<S>(mut stream: S, peer: SocketAddr, state: ServerState) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(%peer, "Session started");

    loop {
        let Some(header) = read_header(&mut stream).await? else {
            info!(%peer, "Client disconnected");
            return Ok(());
        };

        let request = read_request(&mut stream, header, state.max_file_size).await?;
        let reply = dispatcher::dispatch(&state, request).await?;
        write_reply(&mut stream, reply).await?;
    }
}

/// Read exactly one request header. `None` means the peer closed the
/// connection before sending a single byte; a partial header is a framing
/// error.
pub async fn read_header<R>(reader: &mut R) -> Result<Option<RequestHeader>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_HEADER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::truncated("request header", REQUEST_HEADER_SIZE, filled).into());
        }
        filled += n;
    }
    Ok(Some(RequestHeader::decode(&buf)?))
}

/// Read and decode the body belonging to `header`.
///
/// Bodies of SendFile and the checksum-result opcodes are taken from the
/// declared payload when `payload_size > 0` and from the stream right after
/// the header otherwise. Both forms decode identically.
pub async fn read_request<R>(
    reader: &mut R,
    header: RequestHeader,
    max_file_size: usize,
) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let declared = header.payload_size as usize;
    let max_payload = max_file_size.saturating_add(UPLOAD_HEADER_SIZE);
    if max_file_size > 0 && declared > max_payload {
        return Err(ProtocolError::ContentTooLarge {
            size: declared,
            max: max_payload,
        }
        .into());
    }

    let Some(code) = header.request_code() else {
        // drain so the stream stays in step with the framing
        read_exact_vec(reader, declared, "payload").await?;
        return Ok(Request {
            header,
            body: RequestBody::Unknown(header.code),
        });
    };

    let body = match code {
        RequestCode::Register => {
            let payload = read_exact_vec(reader, declared, "registration payload").await?;
            RequestBody::Register(RegisterPayload::decode(&payload)?)
        }
        RequestCode::SendPublicKey => {
            let payload = read_exact_vec(reader, declared, "key exchange payload").await?;
            RequestBody::KeyExchange(KeyExchangePayload::decode(&payload)?)
        }
        RequestCode::SendFile if declared > 0 => {
            let payload = read_exact_vec(reader, declared, "upload payload").await?;
            decode_upload(&payload, max_file_size)?
        }
        RequestCode::SendFile => {
            let sub = read_exact_vec(reader, UPLOAD_HEADER_SIZE, "upload header").await?;
            let upload = UploadHeader::decode(&sub)?;
            check_content_size(upload.content_size as usize, max_file_size)?;
            let ciphertext =
                read_exact_vec(reader, upload.content_size as usize, "upload body").await?;
            RequestBody::Upload {
                header: upload,
                ciphertext,
            }
        }
        RequestCode::ChecksumOk | RequestCode::ChecksumErr | RequestCode::ChecksumErrFinal => {
            let len = if declared > 0 { declared } else { NAME_FIELD_SIZE };
            let payload = read_exact_vec(reader, len, "checksum result").await?;
            RequestBody::ChecksumResult {
                code,
                result: ChecksumResult::decode(&payload)?,
            }
        }
    };

    Ok(Request { header, body })
}

fn decode_upload(payload: &[u8], max_file_size: usize) -> Result<RequestBody> {
    if payload.len() < UPLOAD_HEADER_SIZE {
        return Err(ProtocolError::truncated("upload header", UPLOAD_HEADER_SIZE, payload.len()).into());
    }
    let (sub, ciphertext) = payload.split_at(UPLOAD_HEADER_SIZE);
    let upload = UploadHeader::decode(sub)?;
    let content_size = upload.content_size as usize;
    check_content_size(content_size, max_file_size)?;
    if ciphertext.len() != content_size {
        return Err(ProtocolError::truncated("upload body", content_size, ciphertext.len()).into());
    }
    Ok(RequestBody::Upload {
        header: upload,
        ciphertext: ciphertext.to_vec(),
    })
}

fn check_content_size(size: usize, max_file_size: usize) -> Result<()> {
    if max_file_size > 0 && size > max_file_size {
        return Err(ProtocolError::ContentTooLarge {
            size,
            max: max_file_size,
        }
        .into());
    }
    Ok(())
}

async fn read_exact_vec<R>(reader: &mut R, len: usize, what: &'static str) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::truncated(what, len, filled).into());
        }
        filled += n;
    }
    Ok(buf)
}

async fn write_reply<W>(writer: &mut W, reply: Reply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if reply.is_empty() {
        return Ok(());
    }
    let mut out = BytesMut::new();
    for frame in reply.into_frames() {
        out.extend_from_slice(&frame);
    }
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}
