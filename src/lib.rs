//! # Quantlink - post-quantum secure chat and file transfer
//!
//! Quantlink is one peer (the sender) of a two-party encrypted link over
//! a raw TCP stream. A shared passphrase seeds a symmetric key, a
//! Kyber-512 ephemeral exchange rekeys it for forward secrecy, both sides
//! confirm the result, and then chat messages and file transfers share
//! the stream as AEAD-encrypted frames.
//!
//! ## Security Model
//!
//! - **Seed key** derived from an out-of-band passphrase, by Argon2id,
//!   SHA3-512 truncation or a literal hex key
//! - **Forward secrecy** from an ephemeral Kyber-512 encapsulation; the
//!   seed key only salts the rekey and never protects traffic
//! - **Mutual confirmation** via SHA3-512 key hashes before any traffic
//! - **Per-message AEAD** (AES-256-GCM, 16-byte wire nonce); no replay
//!   defense and no authentication beyond the per-message tag
//! - **Degraded mode**: an accepted key mismatch shows incoming data raw
//!   instead of silently producing garbage
//!
//! ## Modules
//!
//! - [`crypto`]: key derivation, AEAD codec, Kyber encapsulation
//! - [`link`]: framing, handshake and session orchestration

pub mod crypto;
pub mod link;

// Re-export commonly used types at the crate root
pub use crypto::{KeyChoice, Kyber512, PostQuantumKem, SessionKey};
pub use link::{
    Frame, HandshakeState, LinkConfig, LinkError, LinkSession, MemorySink, PerformanceSink,
    StreamFramer, UiPrompt,
};
