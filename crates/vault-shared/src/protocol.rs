//! Fixed-layout binary framing shared by the server and the client.
//!
//! Every multi-byte integer is little-endian, including the file-upload
//! sub-header. String fields are fixed 255-byte slots padded with NUL bytes.
//! Nothing in this module performs I/O: callers read exactly the number of
//! bytes a layout needs and hand the slice over for decoding.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{
    CHECKSUM_FRAME_SIZE, CLIENT_ID_SIZE, KEY_EXCHANGE_PAYLOAD_SIZE, NAME_FIELD_SIZE,
    PROTOCOL_VERSION, PUBLIC_KEY_SIZE, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
    UPLOAD_HEADER_SIZE,
};
use crate::error::ProtocolError;
use crate::types::ClientId;

pub type Result<T> = std::result::Result<T, ProtocolError>;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Client -> server opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestCode {
    Register = 1100,
    SendPublicKey = 1101,
    SendFile = 1103,
    ChecksumOk = 1104,
    ChecksumErr = 1105,
    ChecksumErrFinal = 1106,
}

impl RequestCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1100 => Some(Self::Register),
            1101 => Some(Self::SendPublicKey),
            1103 => Some(Self::SendFile),
            1104 => Some(Self::ChecksumOk),
            1105 => Some(Self::ChecksumErr),
            1106 => Some(Self::ChecksumErrFinal),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Opcodes whose body may follow the header on the stream instead of
    /// being counted in `payload_size`.
    pub fn has_trailing_body(self) -> bool {
        matches!(
            self,
            Self::SendFile | Self::ChecksumOk | Self::ChecksumErr | Self::ChecksumErrFinal
        )
    }
}

/// Server -> client opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    RegistrationOk = 2100,
    RegistrationErr = 2101,
    SwitchingKeys = 2102,
    ChecksumReady = 2103,
    MessageReceived = 2104,
}

impl ResponseCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            2100 => Some(Self::RegistrationOk),
            2101 => Some(Self::RegistrationErr),
            2102 => Some(Self::SwitchingKeys),
            2103 => Some(Self::ChecksumReady),
            2104 => Some(Self::MessageReceived),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

// ---------------------------------------------------------------------------
// Fixed-width string fields
// ---------------------------------------------------------------------------

/// Write `value` into a 255-byte NUL-padded slot.
pub fn put_name_field(buf: &mut BytesMut, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > NAME_FIELD_SIZE {
        return Err(ProtocolError::FieldOverflow {
            len: bytes.len(),
            max: NAME_FIELD_SIZE,
        });
    }
    buf.put_slice(bytes);
    buf.put_bytes(0, NAME_FIELD_SIZE - bytes.len());
    Ok(())
}

/// Read a NUL-terminated string out of a field. Everything from the first
/// NUL onwards is padding.
pub fn read_name_field(field: &[u8]) -> Result<String> {
    if field.len() > NAME_FIELD_SIZE {
        return Err(ProtocolError::FieldOverflow {
            len: field.len(),
            max: NAME_FIELD_SIZE,
        });
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

fn expect_len(what: &'static str, buf: &[u8], expected: usize) -> Result<()> {
    if buf.len() != expected {
        return Err(ProtocolError::truncated(what, expected, buf.len()));
    }
    Ok(())
}

fn get_client_id(buf: &mut &[u8]) -> ClientId {
    let mut id = [0u8; CLIENT_ID_SIZE];
    buf.copy_to_slice(&mut id);
    ClientId(id)
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// `clientId:16 | version:1 | code:2 | payloadSize:4`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    pub fn new(client_id: ClientId, code: RequestCode, payload_size: u32) -> Self {
        Self {
            client_id,
            version: PROTOCOL_VERSION,
            code: code.as_u16(),
            payload_size,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(REQUEST_HEADER_SIZE);
        buf.put_slice(&self.client_id.0);
        buf.put_u8(self.version);
        buf.put_u16_le(self.code);
        buf.put_u32_le(self.payload_size);
    }

    /// Strict: the slice must be exactly one header long.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        expect_len("request header", buf, REQUEST_HEADER_SIZE)?;
        let client_id = get_client_id(&mut buf);
        let version = buf.get_u8();
        let code = buf.get_u16_le();
        let payload_size = buf.get_u32_le();
        Ok(Self {
            client_id,
            version,
            code,
            payload_size,
        })
    }

    pub fn request_code(&self) -> Option<RequestCode> {
        RequestCode::from_u16(self.code)
    }
}

/// `version:1 | code:2 | payloadSize:4 | clientId:16`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
    pub client_id: ClientId,
}

impl ResponseHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RESPONSE_HEADER_SIZE);
        buf.put_u8(self.version);
        buf.put_u16_le(self.code);
        buf.put_u32_le(self.payload_size);
        buf.put_slice(&self.client_id.0);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        expect_len("response header", buf, RESPONSE_HEADER_SIZE)?;
        let version = buf.get_u8();
        let code = buf.get_u16_le();
        let payload_size = buf.get_u32_le();
        let client_id = get_client_id(&mut buf);
        Ok(Self {
            version,
            code,
            payload_size,
            client_id,
        })
    }

    pub fn response_code(&self) -> Result<ResponseCode> {
        ResponseCode::from_u16(self.code).ok_or(ProtocolError::UnknownResponseCode(self.code))
    }
}

/// A framed server response. The header's payload size is always derived
/// from `payload`, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub client_id: ClientId,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn new(code: ResponseCode, client_id: ClientId) -> Self {
        Self {
            code,
            client_id,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(code: ResponseCode, client_id: ClientId, payload: Vec<u8>) -> Self {
        Self {
            code,
            client_id,
            payload,
        }
    }

    pub fn header(&self) -> ResponseHeader {
        ResponseHeader {
            version: PROTOCOL_VERSION,
            code: self.code.as_u16(),
            payload_size: self.payload.len() as u32,
            client_id: self.client_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RESPONSE_HEADER_SIZE + self.payload.len());
        self.header().encode(buf);
        buf.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

// ---------------------------------------------------------------------------
// Opcode-specific payloads
// ---------------------------------------------------------------------------

/// Register: a NUL-terminated name in a field of at most 255 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterPayload {
    pub name: String,
}

impl RegisterPayload {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_name_field(buf, &self.name)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(Self {
            name: read_name_field(buf)?,
        })
    }
}

/// SendPublicKey: `name:255 | rsaPublicKey:160`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchangePayload {
    pub name: String,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyExchangePayload {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(KEY_EXCHANGE_PAYLOAD_SIZE);
        put_name_field(buf, &self.name)?;
        buf.put_slice(&self.public_key);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len("key exchange payload", buf, KEY_EXCHANGE_PAYLOAD_SIZE)?;
        let (name_field, key) = buf.split_at(NAME_FIELD_SIZE);
        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        public_key.copy_from_slice(key);
        Ok(Self {
            name: read_name_field(name_field)?,
            public_key,
        })
    }
}

/// SendFile sub-header: `clientId:16 | contentSize:4 | filename:255`,
/// followed on the wire by `content_size` bytes of ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHeader {
    pub client_id: ClientId,
    pub content_size: u32,
    pub filename: String,
}

impl UploadHeader {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(UPLOAD_HEADER_SIZE);
        buf.put_slice(&self.client_id.0);
        buf.put_u32_le(self.content_size);
        put_name_field(buf, &self.filename)
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        expect_len("upload header", buf, UPLOAD_HEADER_SIZE)?;
        let client_id = get_client_id(&mut buf);
        let content_size = buf.get_u32_le();
        Ok(Self {
            client_id,
            content_size,
            filename: read_name_field(buf)?,
        })
    }
}

/// ChecksumOk / ChecksumErr / ChecksumErrFinal body: `filename:255`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumResult {
    pub filename: String,
}

impl ChecksumResult {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        put_name_field(buf, &self.filename)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len("checksum result", buf, NAME_FIELD_SIZE)?;
        Ok(Self {
            filename: read_name_field(buf)?,
        })
    }
}

/// Raw frame sent right after an empty ChecksumReady response:
/// `content_length:4 | filename:255 | checksum:4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumFrame {
    /// Decrypted content length
    pub content_length: u32,
    pub filename: String,
    pub checksum: u32,
}

impl ChecksumFrame {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(CHECKSUM_FRAME_SIZE);
        buf.put_u32_le(self.content_length);
        put_name_field(buf, &self.filename)?;
        buf.put_u32_le(self.checksum);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        expect_len("checksum frame", buf, CHECKSUM_FRAME_SIZE)?;
        let mut rest = buf;
        let content_length = rest.get_u32_le();
        let (name_field, mut rest) = rest.split_at(NAME_FIELD_SIZE);
        Ok(Self {
            content_length,
            filename: read_name_field(name_field)?,
            checksum: rest.get_u32_le(),
        })
    }
}
