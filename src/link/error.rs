//! Link error types.

use thiserror::Error;

/// Errors that can occur while establishing or driving a secure link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Transport-level failure (dial, read, write, close).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unexpected or malformed handshake message. Fatal to the attempt.
    #[error("Handshake protocol error: {0}")]
    HandshakeProtocol(String),

    /// AEAD tag verification failed.
    #[error("Authentication failed: ciphertext tag mismatch")]
    Authentication,

    /// Malformed file frame header.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Invalid base64, hex or text decode.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
