//! Authenticated encryption for link traffic.
//!
//! AES-256-GCM with a 16-byte wire nonce. The nonce length is a wire
//! contract shared with the peer, independent of the library default.
//! Blob format: base64(nonce || ciphertext || tag).

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::crypto::derive::SessionKey;
use crate::link::LinkError;

/// Wire nonce length in bytes.
pub const NONCE_SIZE: usize = 16;

/// GCM tag length in bytes.
pub const TAG_SIZE: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Encrypt a payload under the session key.
///
/// A fresh random nonce is drawn per call.
pub fn seal(plaintext: &[u8], key: &SessionKey) -> String {
    let cipher =
        Aes256Gcm16::new_from_slice(key.as_bytes()).expect("session key is always 32 bytes");

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("in-memory payloads never exceed the AES-GCM length limit");

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    BASE64.encode(&blob)
}

/// Decrypt a blob produced by [`seal`].
///
/// Fails with `Encoding` on malformed base64 or a blob shorter than
/// nonce plus tag, and with `Authentication` on tag mismatch.
pub fn open(blob: &str, key: &SessionKey) -> Result<Vec<u8>, LinkError> {
    let raw = BASE64
        .decode(blob.trim())
        .map_err(|e| LinkError::Encoding(format!("invalid base64 payload: {e}")))?;

    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(LinkError::Encoding(format!(
            "payload too short: {} bytes",
            raw.len()
        )));
    }

    let cipher =
        Aes256Gcm16::new_from_slice(key.as_bytes()).expect("session key is always 32 bytes");
    let nonce = Nonce::<U16>::from_slice(&raw[..NONCE_SIZE]);

    cipher
        .decrypt(nonce, &raw[NONCE_SIZE..])
        .map_err(|_| LinkError::Authentication)
}
