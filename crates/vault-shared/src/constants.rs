/// Protocol version stamped on every response
pub const PROTOCOL_VERSION: u8 = 3;

/// Server-issued client identifier size in bytes
pub const CLIENT_ID_SIZE: usize = 16;

/// Fixed width of every string field on the wire (NUL padded)
pub const NAME_FIELD_SIZE: usize = 255;

/// Fixed width of the RSA public key field (DER SubjectPublicKeyInfo, 1024-bit)
pub const PUBLIC_KEY_SIZE: usize = 160;

/// AES-128 key size in bytes
pub const AES_KEY_SIZE: usize = 16;

/// AES block size; also the length of the all-zero IV
pub const AES_BLOCK_SIZE: usize = 16;

/// Request header: client id (16) + version (1) + code (2) + payload size (4)
pub const REQUEST_HEADER_SIZE: usize = CLIENT_ID_SIZE + 1 + 2 + 4;

/// Response header: version (1) + code (2) + payload size (4) + client id (16)
pub const RESPONSE_HEADER_SIZE: usize = 1 + 2 + 4 + CLIENT_ID_SIZE;

/// File-upload sub-header: client id (16) + content size (4) + filename (255)
pub const UPLOAD_HEADER_SIZE: usize = CLIENT_ID_SIZE + 4 + NAME_FIELD_SIZE;

/// Key-exchange payload: name (255) + public key (160)
pub const KEY_EXCHANGE_PAYLOAD_SIZE: usize = NAME_FIELD_SIZE + PUBLIC_KEY_SIZE;

/// Raw frame after ChecksumReady: content length (4) + filename (255) + checksum (4)
pub const CHECKSUM_FRAME_SIZE: usize = 4 + NAME_FIELD_SIZE + 4;

/// Chunk size used when streaming stored content through the checksum
pub const CHECKSUM_CHUNK_SIZE: usize = 4096;

/// Default TCP port when no port file / env override is usable
pub const DEFAULT_PORT: u16 = 1234;

/// Upload attempts a client makes before giving up with ChecksumErrFinal
pub const MAX_UPLOAD_ATTEMPTS: u32 = 4;
