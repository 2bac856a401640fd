//! # vault-client
//!
//! Reference client for the vault server: registration, the RSA key
//! exchange, and encrypted uploads with client-driven checksum retry.

pub mod error;
pub mod identity;

use bytes::BytesMut;
use rsa::RsaPrivateKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};
use vault_shared::checksum::cksum;
use vault_shared::constants::{
    CHECKSUM_FRAME_SIZE, MAX_UPLOAD_ATTEMPTS, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use vault_shared::crypto::{aes_cbc_encrypt, encode_public_key, generate_rsa_keypair, unwrap_aes_key};
use vault_shared::protocol::{
    ChecksumFrame, ChecksumResult, KeyExchangePayload, RegisterPayload,
    RequestCode, RequestHeader, Response, ResponseCode, ResponseHeader, UploadHeader,
};
use vault_shared::{AesKey, ClientId};

pub use error::{ClientError, Result};
pub use identity::Identity;

/// How an upload ended after the checksum handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Checksums matched on attempt `attempts`.
    Verified { attempts: u32 },
    /// Every attempt mismatched; the server discarded the file.
    Rejected { attempts: u32 },
}

/// What the server reported after storing an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumReceipt {
    /// Decrypted content length.
    pub length: u32,
    pub filename: String,
    pub checksum: u32,
}

/// The client's answer to a [`ChecksumReceipt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumVerdict {
    Match,
    /// Mismatch; the client will upload again.
    Retry,
    /// Mismatch; the client gives up and the server deletes the file.
    GiveUp,
}

impl ChecksumVerdict {
    fn request_code(self) -> RequestCode {
        match self {
            Self::Match => RequestCode::ChecksumOk,
            Self::Retry => RequestCode::ChecksumErr,
            Self::GiveUp => RequestCode::ChecksumErrFinal,
        }
    }
}

pub struct Client {
    stream: TcpStream,
    client_id: Option<ClientId>,
    private_key: Option<RsaPrivateKey>,
    aes_key: Option<AesKey>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            client_id: None,
            private_key: None,
            aes_key: None,
        })
    }

    /// Resume as an already registered client.
    pub fn with_identity(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn aes_key(&self) -> Option<AesKey> {
        self.aes_key
    }

    /// Key pair generated during the last key exchange.
    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    pub async fn register(&mut self, name: &str) -> Result<ClientId> {
        let mut payload = BytesMut::new();
        RegisterPayload {
            name: name.to_string(),
        }
        .encode(&mut payload)?;

        let id = self.client_id.unwrap_or(ClientId::NIL);
        self.send(id, RequestCode::Register, &payload).await?;

        let response = self.read_response().await?;
        expect(&response, ResponseCode::RegistrationOk)?;

        info!(client = %response.client_id, name, "Registered");
        self.client_id = Some(response.client_id);
        Ok(response.client_id)
    }

    /// Register as `name`, or pick up `saved` when the server refuses the
    /// name and `saved` was issued for it.
    pub async fn register_or_resume(&mut self, name: &str, saved: Option<&Identity>) -> Result<ClientId> {
        match self.register(name).await {
            Err(ClientError::Rejected) => match saved.filter(|identity| identity.name == name) {
                Some(identity) => {
                    info!(client = %identity.client_id, name, "Name taken, resuming saved identity");
                    self.client_id = Some(identity.client_id);
                    Ok(identity.client_id)
                }
                None => Err(ClientError::Rejected),
            },
            other => other,
        }
    }

    /// Send a fresh RSA public key and unwrap the AES session key the
    /// server answers with.
    pub async fn exchange_keys(&mut self, name: &str) -> Result<AesKey> {
        let id = self.client_id.ok_or(ClientError::NotRegistered)?;

        let private_key = generate_rsa_keypair()?;
        let public_key = encode_public_key(&private_key.to_public_key())?;

        let mut payload = BytesMut::new();
        KeyExchangePayload {
            name: name.to_string(),
            public_key,
        }
        .encode(&mut payload)?;
        self.send(id, RequestCode::SendPublicKey, &payload).await?;

        let response = self.read_response().await?;
        expect(&response, ResponseCode::SwitchingKeys)?;

        let aes_key = unwrap_aes_key(&private_key, &response.payload)?;
        debug!(client = %id, "Session key received");

        self.private_key = Some(private_key);
        self.aes_key = Some(aes_key);
        Ok(aes_key)
    }

    /// Upload `content` and verify it, retrying on mismatch. After the last
    /// allowed attempt a mismatch is reported as final.
    pub async fn upload(&mut self, filename: &str, content: &[u8]) -> Result<UploadOutcome> {
        let expected = cksum(content);

        for attempt in 1..=MAX_UPLOAD_ATTEMPTS {
            let receipt = self.send_file(filename, content).await?;

            if receipt.checksum == expected && receipt.length as usize == content.len() {
                self.report_checksum(ChecksumVerdict::Match, filename).await?;
                info!(file = filename, attempts = attempt, "Upload verified");
                return Ok(UploadOutcome::Verified { attempts: attempt });
            }

            warn!(
                file = filename,
                attempt,
                expected,
                got = receipt.checksum,
                "Checksum mismatch"
            );
            if attempt == MAX_UPLOAD_ATTEMPTS {
                self.report_checksum(ChecksumVerdict::GiveUp, filename).await?;
            } else {
                self.report_checksum(ChecksumVerdict::Retry, filename).await?;
            }
        }

        Ok(UploadOutcome::Rejected {
            attempts: MAX_UPLOAD_ATTEMPTS,
        })
    }

    /// One upload round: encrypt, send, and read back ChecksumReady plus the
    /// length/filename/checksum frame that follows it.
    pub async fn send_file(&mut self, filename: &str, content: &[u8]) -> Result<ChecksumReceipt> {
        let id = self.client_id.ok_or(ClientError::NotRegistered)?;
        let key = self.aes_key.ok_or(ClientError::NoSessionKey)?;

        let ciphertext = aes_cbc_encrypt(&key, content);
        let mut payload = BytesMut::new();
        UploadHeader {
            client_id: id,
            content_size: ciphertext.len() as u32,
            filename: filename.to_string(),
        }
        .encode(&mut payload)?;
        payload.extend_from_slice(&ciphertext);
        self.send(id, RequestCode::SendFile, &payload).await?;

        let response = self.read_response().await?;
        expect(&response, ResponseCode::ChecksumReady)?;

        let mut frame = [0u8; CHECKSUM_FRAME_SIZE];
        self.stream.read_exact(&mut frame).await?;
        let frame = ChecksumFrame::decode(&frame)?;

        Ok(ChecksumReceipt {
            length: frame.content_length,
            filename: frame.filename,
            checksum: frame.checksum,
        })
    }

    /// Tell the server how verification went. Only Match and GiveUp are
    /// acknowledged.
    pub async fn report_checksum(&mut self, verdict: ChecksumVerdict, filename: &str) -> Result<()> {
        let id = self.client_id.ok_or(ClientError::NotRegistered)?;

        let mut payload = BytesMut::new();
        ChecksumResult {
            filename: filename.to_string(),
        }
        .encode(&mut payload)?;
        self.send(id, verdict.request_code(), &payload).await?;

        if verdict != ChecksumVerdict::Retry {
            let response = self.read_response().await?;
            expect(&response, ResponseCode::MessageReceived)?;
        }
        Ok(())
    }

    async fn send(&mut self, id: ClientId, code: RequestCode, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + payload.len());
        RequestHeader::new(id, code, payload.len() as u32).encode(&mut buf);
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one response header and its declared payload.
    pub async fn read_response(&mut self) -> Result<Response> {
        let mut raw = [0u8; RESPONSE_HEADER_SIZE];
        self.stream.read_exact(&mut raw).await?;
        let header = ResponseHeader::decode(&raw)?;

        let mut payload = vec![0u8; header.payload_size as usize];
        self.stream.read_exact(&mut payload).await?;

        Ok(Response::with_payload(
            header.response_code()?,
            header.client_id,
            payload,
        ))
    }
}

fn expect(response: &Response, code: ResponseCode) -> Result<()> {
    if response.code == code {
        return Ok(());
    }
    if response.code == ResponseCode::RegistrationErr {
        return Err(ClientError::Rejected);
    }
    Err(ClientError::UnexpectedResponse {
        expected: code.as_u16(),
        actual: response.code.as_u16(),
    })
}
