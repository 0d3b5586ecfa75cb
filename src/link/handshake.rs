//! Ephemeral key exchange on an established stream.
//!
//! The peer opens with its ephemeral Kyber public key. We encapsulate,
//! send the ciphertext back, replace the seed key with an Argon2id rekey
//! of the shared secret, then exchange a key hash for confirmation.
//!
//! ## Flow
//!
//! 1. Receive `KYBER_EPHEMERAL:<base64 public key>`
//! 2. Send `KYBER_CIPHERTEXT:<base64 ciphertext>\n`
//! 3. Rekey: session key = Argon2id(shared secret, salt = seed key)
//! 4. Send `KEY_HASH:<hex SHA3-512(session key)>\n`
//! 5. Receive `KEY_STATUS:OK` or `KEY_STATUS:CONTINUE`
//!
//! There are no retries. Any failure at any step is terminal for the
//! connection attempt; the caller closes the stream.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::crypto::derive::{rekey_session_key, SessionKey};
use crate::crypto::kem::PostQuantumKem;
use crate::link::config::HANDSHAKE_READ_LIMIT;
use crate::link::error::LinkError;
use crate::link::prompt::UiPrompt;

/// Wire literal introducing the peer's ephemeral public key.
const EPHEMERAL_PREFIX: &str = "KYBER_EPHEMERAL:";

/// Wire literal introducing our ciphertext response.
const CIPHERTEXT_PREFIX: &str = "KYBER_CIPHERTEXT:";

/// Wire literal introducing our key confirmation hash.
const KEY_HASH_PREFIX: &str = "KEY_HASH:";

/// Wire literal introducing the peer's confirmation verdict.
const KEY_STATUS_PREFIX: &str = "KEY_STATUS:";

/// Handshake progress. `Confirmed` and `Failed` are terminal;
/// `MismatchAccepted` is a terminal but degraded success reachable only
/// through an explicit user override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingPeerPublicKey,
    CiphertextSent,
    AwaitingKeyStatus,
    Confirmed,
    MismatchAccepted,
    Failed,
}

/// Result of a completed handshake.
pub struct HandshakeOutcome {
    /// The rekeyed session key. Replaces the seed key for all traffic.
    pub session_key: SessionKey,
    /// True when the peer reported a hash mismatch and the user chose to
    /// continue. The receive path then skips decryption entirely.
    pub degraded: bool,
}

/// Initiator-role handshake over an already-connected stream.
pub struct Handshake<'a> {
    kem: &'a dyn PostQuantumKem,
    prompt: &'a dyn UiPrompt,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Create a handshake in the `Idle` state.
    pub fn new(kem: &'a dyn PostQuantumKem, prompt: &'a dyn UiPrompt) -> Self {
        Self {
            kem,
            prompt,
            state: HandshakeState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Drive the handshake to completion, consuming the seed key.
    ///
    /// On success the returned session key differs from the seed key and
    /// must atomically replace it before any send path is enabled. On
    /// error the state is `Failed` and the caller must close the stream.
    pub async fn run<S>(
        &mut self,
        stream: &mut S,
        seed_key: SessionKey,
    ) -> Result<HandshakeOutcome, LinkError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.state = HandshakeState::AwaitingPeerPublicKey;

        let greeting = match read_message(stream).await {
            Ok(msg) => msg,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(public_key_b64) = greeting.strip_prefix(EPHEMERAL_PREFIX) else {
            return Err(self.fail(LinkError::HandshakeProtocol(
                "expected ephemeral public key from peer".into(),
            )));
        };

        let public_key = match BASE64.decode(public_key_b64) {
            Ok(pk) => pk,
            Err(e) => {
                return Err(self.fail(LinkError::Encoding(format!(
                    "invalid base64 public key: {e}"
                ))))
            }
        };
        debug!("received peer ephemeral public key ({} bytes)", public_key.len());

        let encapsulation = match self.kem.encapsulate(&public_key) {
            Ok(enc) => enc,
            Err(e) => return Err(self.fail(e)),
        };

        let response = format!(
            "{}{}\n",
            CIPHERTEXT_PREFIX,
            BASE64.encode(&encapsulation.ciphertext)
        );
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            return Err(self.fail(e.into()));
        }
        if let Err(e) = stream.flush().await {
            return Err(self.fail(e.into()));
        }
        self.state = HandshakeState::CiphertextSent;

        // The seed key becomes the salt; the Kyber secret is the input.
        let session_key = rekey_session_key(&*encapsulation.shared_secret, &seed_key);
        drop(seed_key);
        debug!("session key rekeyed from encapsulated secret");

        let hash_line = format!("{}{}\n", KEY_HASH_PREFIX, session_key.fingerprint());
        if let Err(e) = stream.write_all(hash_line.as_bytes()).await {
            return Err(self.fail(e.into()));
        }
        if let Err(e) = stream.flush().await {
            return Err(self.fail(e.into()));
        }
        self.state = HandshakeState::AwaitingKeyStatus;

        let status_msg = match read_message(stream).await {
            Ok(msg) => msg,
            Err(e) => return Err(self.fail(e)),
        };
        let Some(status) = status_msg.strip_prefix(KEY_STATUS_PREFIX) else {
            return Err(self.fail(LinkError::HandshakeProtocol(
                "missing key status from peer".into(),
            )));
        };

        match status {
            "OK" => {
                info!("session key confirmed by peer");
                self.state = HandshakeState::Confirmed;
                Ok(HandshakeOutcome {
                    session_key,
                    degraded: false,
                })
            }
            "CONTINUE" => {
                warn!("peer reported a session key hash mismatch");
                let proceed = self
                    .prompt
                    .confirm("Key mismatch detected. Do you still want to continue?")
                    .await;
                if proceed {
                    self.state = HandshakeState::MismatchAccepted;
                    self.prompt
                        .notify_info("Key mismatch accepted. Incoming data will be shown raw.");
                    Ok(HandshakeOutcome {
                        session_key,
                        degraded: true,
                    })
                } else {
                    Err(self.fail(LinkError::HandshakeProtocol(
                        "key mismatch rejected by user".into(),
                    )))
                }
            }
            other => Err(self.fail(LinkError::HandshakeProtocol(format!(
                "unknown key status {other:?}"
            )))),
        }
    }

    fn fail(&mut self, err: LinkError) -> LinkError {
        self.state = HandshakeState::Failed;
        err
    }
}

/// Read one handshake message: a single chunk, trimmed of whitespace.
async fn read_message<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, LinkError> {
    let mut buf = vec![0u8; HANDSHAKE_READ_LIMIT];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(LinkError::Connection(
            "peer closed the stream during handshake".into(),
        ));
    }
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|_| LinkError::Encoding("handshake message is not valid UTF-8".into()))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive::derive_from_kyber_key;
    use crate::crypto::kem::Kyber512;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct FixedPrompt {
        answer: bool,
        asked: AtomicBool,
    }

    impl FixedPrompt {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                asked: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl UiPrompt for FixedPrompt {
        async fn confirm(&self, _question: &str) -> bool {
            self.asked.store(true, Ordering::SeqCst);
            self.answer
        }
        fn notify_error(&self, _message: &str) {}
        fn notify_info(&self, _message: &str) {}
        async fn choose_save_destination(&self, _suggested_name: &str) -> Option<PathBuf> {
            None
        }
        async fn choose_source_file(&self) -> Option<PathBuf> {
            None
        }
    }

    fn seed() -> SessionKey {
        SessionKey::from_bytes(derive_from_kyber_key("handshake test passphrase"))
    }

    /// Drive the receiver side up to the point where it has the session
    /// key and the initiator's hash line, then reply with `status`.
    async fn scripted_peer(
        stream: tokio::io::DuplexStream,
        status: &str,
    ) -> (SessionKey, String) {
        let mut rng = rand::rngs::OsRng;
        let keys = pqc_kyber::keypair(&mut rng).unwrap();
        let mut stream = BufReader::new(stream);

        let greeting = format!("KYBER_EPHEMERAL:{}\n", BASE64.encode(keys.public));
        stream.write_all(greeting.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();

        let mut line = String::new();
        stream.read_line(&mut line).await.unwrap();
        let ct_b64 = line.trim().strip_prefix("KYBER_CIPHERTEXT:").unwrap();
        let ciphertext = BASE64.decode(ct_b64).unwrap();
        let shared = pqc_kyber::decapsulate(&ciphertext, &keys.secret).unwrap();

        let session_key = rekey_session_key(&shared, &seed());

        let mut hash_line = String::new();
        stream.read_line(&mut hash_line).await.unwrap();
        let their_hash = hash_line
            .trim()
            .strip_prefix("KEY_HASH:")
            .unwrap()
            .to_string();

        stream
            .write_all(format!("KEY_STATUS:{status}").as_bytes())
            .await
            .unwrap();
        stream.flush().await.unwrap();

        (session_key, their_hash)
    }

    #[tokio::test]
    async fn test_handshake_reaches_confirmed() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let peer = tokio::spawn(async move { scripted_peer(server, "OK").await });

        let prompt = FixedPrompt::new(false);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let outcome = handshake.run(&mut client, seed()).await.unwrap();

        assert_eq!(handshake.state(), HandshakeState::Confirmed);
        assert!(!outcome.degraded);

        let (peer_key, their_hash) = peer.await.unwrap();
        // Both sides derived the same session key, and it is not the seed
        assert_eq!(outcome.session_key, peer_key);
        assert_eq!(outcome.session_key.fingerprint(), their_hash);
        assert_ne!(outcome.session_key, seed());
        // The mismatch prompt never fired
        assert!(!prompt.asked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_mismatch_declined_fails() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let peer = tokio::spawn(async move { scripted_peer(server, "CONTINUE").await });

        let prompt = FixedPrompt::new(false);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let result = handshake.run(&mut client, seed()).await;

        assert!(matches!(result, Err(LinkError::HandshakeProtocol(_))));
        assert_eq!(handshake.state(), HandshakeState::Failed);
        assert!(prompt.asked.load(Ordering::SeqCst));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatch_accepted_is_degraded() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let peer = tokio::spawn(async move { scripted_peer(server, "CONTINUE").await });

        let prompt = FixedPrompt::new(true);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let outcome = handshake.run(&mut client, seed()).await.unwrap();

        assert_eq!(handshake.state(), HandshakeState::MismatchAccepted);
        assert!(outcome.degraded);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_greeting_fails() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        server.write_all(b"HELLO:nonsense").await.unwrap();

        let prompt = FixedPrompt::new(false);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let result = handshake.run(&mut client, seed()).await;

        assert!(matches!(result, Err(LinkError::HandshakeProtocol(_))));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_key_status_fails() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let peer = tokio::spawn(async move { scripted_peer(server, "MAYBE").await });

        let prompt = FixedPrompt::new(true);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let result = handshake.run(&mut client, seed()).await;

        assert!(matches!(result, Err(LinkError::HandshakeProtocol(_))));
        assert_eq!(handshake.state(), HandshakeState::Failed);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_closing_mid_handshake_fails() {
        let (mut client, server) = tokio::io::duplex(4096);
        drop(server);

        let prompt = FixedPrompt::new(false);
        let mut handshake = Handshake::new(&Kyber512, &prompt);
        let result = handshake.run(&mut client, seed()).await;

        assert!(matches!(result, Err(LinkError::Connection(_))));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }
}
