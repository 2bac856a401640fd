//! Key exchange and content encryption.
//!
//! The client sends a 1024-bit RSA public key; the server answers with a
//! fresh AES-128 key wrapped in RSA-OAEP (SHA-1). File content travels as
//! AES-128-CBC with PKCS#7 padding under an all-zero IV. The fixed IV is a
//! property of the wire protocol and must match what clients produce.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::constants::{AES_BLOCK_SIZE, AES_KEY_SIZE, PUBLIC_KEY_SIZE};
use crate::error::CryptoError;
use crate::types::AesKey;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// Modulus size of client key pairs
pub const RSA_KEY_BITS: usize = 1024;

/// Public exponent that keeps a 1024-bit SubjectPublicKeyInfo at 160 bytes
pub const RSA_PUBLIC_EXPONENT: u32 = 17;

pub fn generate_aes_key() -> AesKey {
    let mut key = [0u8; AES_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn aes_cbc_encrypt(key: &AesKey, plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.into(), &ZERO_IV.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub fn aes_cbc_decrypt(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Aes128CbcDec::new(key.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Parse the 160-byte public key field.
///
/// Accepts DER `SubjectPublicKeyInfo` (what clients send) and, as a fallback,
/// a bare PKCS#1 `RSAPublicKey`. Shorter encodings may arrive NUL padded.
pub fn parse_public_key(field: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    if let Ok(key) = RsaPublicKey::from_public_key_der(field) {
        return Ok(key);
    }
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let trimmed = &field[..end];
    if let Ok(key) = RsaPublicKey::from_public_key_der(trimmed) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_der(trimmed).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Wrap an AES key for the holder of `public_key`.
pub fn wrap_aes_key(public_key: &RsaPublicKey, aes_key: &AesKey) -> Result<Vec<u8>, CryptoError> {
    let wrapped = public_key.encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha1>(), aes_key)?;
    Ok(wrapped)
}

pub fn unwrap_aes_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> Result<AesKey, CryptoError> {
    let key = private_key.decrypt(Oaep::new::<Sha1>(), wrapped)?;
    key.as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)
}

pub fn generate_rsa_keypair() -> Result<RsaPrivateKey, CryptoError> {
    let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
    let key = RsaPrivateKey::new_with_exp(&mut rand::rngs::OsRng, RSA_KEY_BITS, &exponent)?;
    Ok(key)
}

/// Encode a public key into the fixed wire field.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    der.as_bytes()
        .try_into()
        .map_err(|_| CryptoError::PublicKeySize(der.as_bytes().len()))
}
