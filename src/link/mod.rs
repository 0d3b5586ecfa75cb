//! # Secure link
//!
//! Establishment and transport of an encrypted two-party link over a raw
//! byte stream.
//!
//! The flow: a passphrase-derived seed key, a Kyber-512 ephemeral
//! exchange that replaces it with a fresh session key, mutual key
//! confirmation, then AEAD-framed chat and file traffic on the same
//! stream with no loss across partial reads.
//!
//! The core is UI-free. Human decisions and display go through the
//! [`UiPrompt`] collaborator; timing data goes to a [`PerformanceSink`].

mod config;
mod error;
mod framer;
mod handshake;
mod perf;
mod prompt;
mod session;

pub use config::{
    LinkConfig, DEFAULT_KEEPALIVE_SECS, DEFAULT_LARGE_FILE_THRESHOLD, DEFAULT_READ_CHUNK,
};
pub use error::LinkError;
pub use framer::{Frame, StreamFramer};
pub use handshake::{Handshake, HandshakeOutcome, HandshakeState};
pub use perf::{MemorySink, PerfCategory, PerfRecord, PerformanceSink};
pub use prompt::UiPrompt;
pub use session::LinkSession;
