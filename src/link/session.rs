//! Link session orchestration.
//!
//! A `LinkSession` owns the connected stream, derives the seed key, runs
//! the ephemeral handshake, then splits the stream: the read half feeds a
//! background receive loop, the write half serves chat, file and
//! keepalive sends. The session key is written exactly once, at handshake
//! completion, before either background task starts; after that it is
//! immutable and shared without locks.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::crypto::aead;
use crate::crypto::derive::{KeyChoice, SeedDeriver, SessionKey};
use crate::crypto::kem::PostQuantumKem;
use crate::link::config::LinkConfig;
use crate::link::error::LinkError;
use crate::link::framer::{Frame, StreamFramer};
use crate::link::handshake::{Handshake, HandshakeState};
use crate::link::perf::{PerfCategory, PerfRecord, PerformanceSink};
use crate::link::prompt::UiPrompt;

/// Wire literal for graceful termination.
const DISCONNECT_LITERAL: &[u8] = b"DISCONNECT";

/// An established secure link to one peer.
pub struct LinkSession<S> {
    writer: Arc<Mutex<WriteHalf<S>>>,
    key: Arc<SessionKey>,
    key_choice: KeyChoice,
    degraded: bool,
    state: HandshakeState,
    prompt: Arc<dyn UiPrompt>,
    sink: Arc<dyn PerformanceSink>,
    config: LinkConfig,
    receiver: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl LinkSession<TcpStream> {
    /// Dial `addr`, derive the seed key and run the handshake.
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        addr: &str,
        choice: KeyChoice,
        passphrase: &str,
        kem: Arc<dyn PostQuantumKem>,
        prompt: Arc<dyn UiPrompt>,
        sink: Arc<dyn PerformanceSink>,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| LinkError::Connection(format!("failed to connect to {addr}: {e}")))?;
        info!("connected to {addr}");
        Self::establish(stream, addr, choice, passphrase, kem, prompt, sink, config).await
    }
}

impl<S> LinkSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Run the full establishment sequence on an already-connected stream.
    ///
    /// The send paths and background loops only exist after the handshake
    /// has completed, so nothing can race the single key replacement.
    #[allow(clippy::too_many_arguments)]
    pub async fn establish(
        mut stream: S,
        peer_label: &str,
        choice: KeyChoice,
        passphrase: &str,
        kem: Arc<dyn PostQuantumKem>,
        prompt: Arc<dyn UiPrompt>,
        sink: Arc<dyn PerformanceSink>,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        let started = Instant::now();

        let seed = SeedDeriver::new(choice, sink.clone()).derive(passphrase);

        let mut handshake = Handshake::new(kem.as_ref(), prompt.as_ref());
        let outcome = match handshake.run(&mut stream, seed).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = stream.shutdown().await;
                return Err(e);
            }
        };
        let state = handshake.state();

        sink.record(
            PerfRecord::new(
                "connection_establishment",
                passphrase.len(),
                started.elapsed(),
                choice,
                PerfCategory::Message,
            )
            .with_detail(format!("Connected to {peer_label}")),
        );

        let (read_half, write_half) = split(stream);
        let writer = Arc::new(Mutex::new(write_half));
        let key = Arc::new(outcome.session_key);

        let receiver = tokio::spawn(receive_loop(
            read_half,
            key.clone(),
            outcome.degraded,
            prompt.clone(),
            sink.clone(),
            choice,
            config.read_chunk,
        ));

        let keepalive = config.keepalive.map(|interval| {
            tokio::spawn(keepalive_loop(writer.clone(), key.clone(), interval))
        });

        Ok(Self {
            writer,
            key,
            key_choice: choice,
            degraded: outcome.degraded,
            state,
            prompt,
            sink,
            config,
            receiver: Some(receiver),
            keepalive,
        })
    }

    /// True when the handshake ended in the degraded mismatch mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Final handshake state, `Confirmed` or `MismatchAccepted`.
    pub fn handshake_state(&self) -> HandshakeState {
        self.state
    }

    /// Encrypt `text` and write it as one chat payload.
    pub async fn send_chat_message(&self, text: &str) -> Result<(), LinkError> {
        let started = Instant::now();
        let blob = aead::seal(text.as_bytes(), &self.key);

        let mut writer = self.writer.lock().await;
        writer.write_all(blob.as_bytes()).await?;
        writer.flush().await?;
        drop(writer);

        self.sink.record(
            PerfRecord::new(
                "encrypt",
                text.len(),
                started.elapsed(),
                self.key_choice,
                PerfCategory::Message,
            )
            .with_extra("message_char_count", text.chars().count().to_string()),
        );
        Ok(())
    }

    /// Send a file: header write, then one body write.
    ///
    /// The content is base64-encoded before encryption so the body stays
    /// transport-safe text. Large files ask for confirmation first.
    pub async fn send_file(&self, path: &Path) -> Result<(), LinkError> {
        let file_size = tokio::fs::metadata(path).await?.len();
        if file_size > self.config.large_file_threshold {
            let question = format!(
                "The selected file is {:.2} MiB. Sending large files may take time. Continue?",
                file_size as f64 / (1024.0 * 1024.0)
            );
            if !self.prompt.confirm(&question).await {
                self.prompt.notify_info("File send cancelled");
                return Ok(());
            }
        }

        let started = Instant::now();
        let content = tokio::fs::read(path).await?;
        let blob = aead::seal(BASE64.encode(&content).as_bytes(), &self.key);
        let body = blob.into_bytes();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let header = format!("FILE:{}:{}\n", name, body.len());

        {
            let mut writer = self.writer.lock().await;
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
            writer.flush().await?;
        }

        let elapsed = started.elapsed();
        let rate_kbps = if elapsed.as_secs_f64() > 0.0 {
            (file_size as f64 * 8.0 / 1024.0) / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        self.sink.record(
            PerfRecord::new(
                "file_transfer",
                file_size as usize,
                elapsed,
                self.key_choice,
                PerfCategory::File,
            )
            .with_detail(format!("File: {name}, Rate: {rate_kbps:.2} kbps"))
            .with_extra("file_type", extension)
            .with_extra("encryption_type", "AES-GCM"),
        );

        self.prompt.notify_info(&format!(
            "Sent file {} ({:.2} KiB)",
            name,
            file_size as f64 / 1024.0
        ));
        Ok(())
    }

    /// Graceful termination: write the disconnect literal and shut down
    /// the write direction. The receive loop exits when the peer closes.
    pub async fn disconnect(&self) -> Result<(), LinkError> {
        if let Some(task) = &self.keepalive {
            task.abort();
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(DISCONNECT_LITERAL).await?;
        writer.flush().await?;
        writer.shutdown().await?;
        info!("disconnect sent");
        Ok(())
    }

    /// Take the receive loop handle, for driving session shutdown from a
    /// select loop. Returns `None` after the first call.
    pub fn take_receive_task(&mut self) -> Option<JoinHandle<()>> {
        self.receiver.take()
    }

    /// Wait until the receive loop has exited.
    pub async fn closed(&mut self) {
        if let Some(task) = self.receiver.take() {
            let _ = task.await;
        }
    }
}

impl<S> Drop for LinkSession<S> {
    fn drop(&mut self) {
        if let Some(task) = &self.keepalive {
            task.abort();
        }
    }
}

/// Background receive loop. Exits on end-of-stream or a read error.
async fn receive_loop<S>(
    mut reader: ReadHalf<S>,
    key: Arc<SessionKey>,
    degraded: bool,
    prompt: Arc<dyn UiPrompt>,
    sink: Arc<dyn PerformanceSink>,
    key_choice: KeyChoice,
    chunk_size: usize,
) where
    S: AsyncRead + Send + 'static,
{
    let mut framer = StreamFramer::new();
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                prompt.notify_info("Peer disconnected");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                prompt.notify_error(&format!("Receive failed: {e}"));
                break;
            }
        };
        framer.push(&chunk[..n]);

        loop {
            match framer.try_next() {
                Ok(Some(Frame::Chat { blob })) => {
                    handle_chat(&blob, &key, degraded, prompt.as_ref(), sink.as_ref(), key_choice);
                }
                Ok(Some(Frame::File { filename, blob, .. })) => {
                    handle_file(
                        filename,
                        blob,
                        &key,
                        prompt.as_ref(),
                        sink.as_ref(),
                        key_choice,
                    )
                    .await;
                }
                Ok(None) => break,
                Err(e) => {
                    // Malformed frame: the buffer was discarded, keep reading.
                    warn!("discarded receive buffer: {e}");
                    prompt.notify_error(&e.to_string());
                }
            }
        }
    }
    debug!("receive loop finished");
}

/// Decrypt and display one chat payload. Never fatal.
fn handle_chat(
    blob: &[u8],
    key: &SessionKey,
    degraded: bool,
    prompt: &dyn UiPrompt,
    sink: &dyn PerformanceSink,
    key_choice: KeyChoice,
) {
    if degraded {
        prompt.notify_info(&format!("[peer, raw] {}", String::from_utf8_lossy(blob)));
        return;
    }

    let started = Instant::now();
    let opened = std::str::from_utf8(blob)
        .map_err(|_| LinkError::Encoding("chat payload is not valid UTF-8".into()))
        .and_then(|text| aead::open(text, key));

    match opened {
        Ok(plain) => {
            let text = String::from_utf8_lossy(&plain).into_owned();
            sink.record(
                PerfRecord::new(
                    "decrypt",
                    blob.len(),
                    started.elapsed(),
                    key_choice,
                    PerfCategory::Message,
                )
                .with_extra("message_char_count", text.chars().count().to_string()),
            );
            prompt.notify_info(&format!("[peer] {text}"));
        }
        Err(_) => {
            prompt.notify_info("Received a message that could not be decrypted");
        }
    }
}

/// Decrypt, confirm and save one received file. Never fatal; a decrypt
/// failure offers saving the raw undecrypted bytes instead.
async fn handle_file(
    filename: String,
    blob: Vec<u8>,
    key: &SessionKey,
    prompt: &dyn UiPrompt,
    sink: &dyn PerformanceSink,
    key_choice: KeyChoice,
) {
    let started = Instant::now();
    let opened = std::str::from_utf8(&blob)
        .map_err(|_| LinkError::Encoding("file payload is not valid UTF-8".into()))
        .and_then(|text| aead::open(text, key));

    let (content, save_name) = match opened {
        Ok(plain) => {
            let content = match BASE64.decode(&plain) {
                Ok(content) => content,
                Err(e) => {
                    prompt.notify_error(&format!(
                        "Received file {filename} has an invalid payload: {e}"
                    ));
                    return;
                }
            };
            sink.record(
                PerfRecord::new(
                    "file_receive_decrypt",
                    blob.len(),
                    started.elapsed(),
                    key_choice,
                    PerfCategory::File,
                )
                .with_detail(format!("File: {filename}"))
                .with_extra("decryption_type", "AES-GCM"),
            );

            let question = format!(
                "Received {} ({:.2} KiB). Save it?",
                filename,
                content.len() as f64 / 1024.0
            );
            if !prompt.confirm(&question).await {
                prompt.notify_info(&format!("File '{filename}' received but not saved"));
                return;
            }
            (content, filename.clone())
        }
        Err(_) => {
            let question = format!(
                "Received {filename} but it failed to decrypt. Save the raw encrypted payload instead?"
            );
            if !prompt.confirm(&question).await {
                prompt.notify_info(&format!(
                    "File '{filename}' decryption failed, and saving was skipped"
                ));
                return;
            }
            // The wire body is base64 text; saving it raw means the
            // decoded nonce/ciphertext/tag bytes, distinctly suffixed.
            let raw = BASE64.decode(&blob).unwrap_or(blob);
            let name = if filename.ends_with(".encrypted") {
                filename
            } else {
                format!("{filename}.encrypted")
            };
            (raw, name)
        }
    };

    match prompt.choose_save_destination(&save_name).await {
        Some(path) => match tokio::fs::write(&path, &content).await {
            Ok(()) => prompt.notify_info(&format!("File saved as {}", path.display())),
            Err(e) => prompt.notify_error(&format!("Failed to save file: {e}")),
        },
        None => prompt.notify_info(&format!("File '{save_name}' was not saved")),
    }
}

/// Periodic encrypted probe. Ends quietly on the first failed write; the
/// receive loop is the authority on reporting a dead connection.
async fn keepalive_loop<S>(
    writer: Arc<Mutex<WriteHalf<S>>>,
    key: Arc<SessionKey>,
    interval: Duration,
) where
    S: AsyncWrite + Send + 'static,
{
    loop {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let blob = aead::seal(format!("PING:{stamp}").as_bytes(), &key);

        {
            let mut writer = writer.lock().await;
            if writer.write_all(blob.as_bytes()).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
        tokio::time::sleep(interval).await;
    }
    debug!("keepalive loop finished");
}
