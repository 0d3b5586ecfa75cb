//! Connect command - interactive secure chat over the console.
//!
//! The console adapter implements the `UiPrompt` collaborator directly
//! against stdin/stdout. Prompts raised by the receive loop and the chat
//! input line share stdin, so an answer typed at a prompt is consumed by
//! whichever side asked first.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use quantlink::crypto::{KeyChoice, Kyber512};
use quantlink::link::{LinkConfig, LinkSession, MemorySink, PerfCategory, UiPrompt};

use super::CommandExecutor;

/// Prompt for a passphrase (input hidden).
fn prompt_passphrase(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read passphrase")
}

/// Connect to a listening peer and chat.
///
/// Usage:
///   quantlink connect <host:port>                 Quantum-derived seed key
///   quantlink connect <host:port> -k kyber        SHA3-derived seed key
///   quantlink connect <host:port> -k hybrid       Literal hex key
#[derive(Args, Debug)]
pub struct ConnectCommand {
    /// Peer address as host:port
    pub peer: String,

    /// Seed key derivation strategy
    #[arg(short = 'k', long = "key-type", value_enum, default_value_t = KeyChoice::Quantum)]
    pub key_type: KeyChoice,

    /// Keepalive probe interval in seconds (0 disables the probe)
    #[arg(long, default_value_t = 10)]
    pub keepalive: u64,
}

impl CommandExecutor for ConnectCommand {
    fn execute(&self) -> Result<()> {
        let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
        rt.block_on(self.run())
    }
}

impl ConnectCommand {
    async fn run(&self) -> Result<()> {
        let passphrase = prompt_passphrase("Passphrase: ")?;
        if passphrase.is_empty() {
            bail!("Passphrase cannot be empty");
        }

        let prompt: Arc<dyn UiPrompt> = Arc::new(ConsolePrompt);
        let sink = Arc::new(MemorySink::new());
        let config = if self.keepalive == 0 {
            LinkConfig::default().without_keepalive()
        } else {
            LinkConfig::default().with_keepalive(Duration::from_secs(self.keepalive))
        };

        println!("Connecting to {} ({} key)...", self.peer, self.key_type);
        let mut session = LinkSession::connect(
            &self.peer,
            self.key_type,
            &passphrase,
            Arc::new(Kyber512),
            prompt.clone(),
            sink.clone(),
            config,
        )
        .await
        .context("Failed to establish secure link")?;

        if session.is_degraded() {
            println!("KEY MISMATCH ACCEPTED. Incoming messages will be shown as raw text.");
        } else {
            println!("Keys match. Ready to chat.");
        }
        println!("Type a message, /file <path> to send a file, /quit to leave.");

        let mut closed = session
            .take_receive_task()
            .expect("receive task exists after connect");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                _ = &mut closed => break,

                line = lines.next_line() => {
                    let input = match line {
                        Ok(Some(input)) => input.trim().to_string(),
                        Ok(None) => break,
                        Err(e) => {
                            eprintln!("Input error: {e}");
                            break;
                        }
                    };
                    if input.is_empty() {
                        continue;
                    }

                    if let Some(rest) = input.strip_prefix("/file") {
                        let path = rest.trim();
                        let path = if path.is_empty() {
                            match prompt.choose_source_file().await {
                                Some(path) => path,
                                None => continue,
                            }
                        } else {
                            PathBuf::from(path)
                        };
                        if let Err(e) = session.send_file(&path).await {
                            eprintln!("File send failed: {e}");
                        }
                    } else if input == "/quit" || input == "/q" {
                        break;
                    } else if input == "/stats" {
                        print_stats(&sink);
                    } else if input == "/help" {
                        println!("Commands:");
                        println!("  /file <path>  - Send a file");
                        println!("  /stats        - Show performance counters");
                        println!("  /quit, /q     - Disconnect and exit");
                    } else {
                        match session.send_chat_message(&input).await {
                            Ok(()) => println!("[you] {input}"),
                            Err(e) => eprintln!("Send failed: {e}"),
                        }
                    }
                }
            }
        }

        session.disconnect().await.ok();
        println!(
            "Disconnected. {} performance records collected.",
            sink.len()
        );
        Ok(())
    }
}

fn print_stats(sink: &MemorySink) {
    let records = sink.records();
    let messages = records
        .iter()
        .filter(|r| r.category == PerfCategory::Message)
        .count();
    let files = records
        .iter()
        .filter(|r| r.category == PerfCategory::File)
        .count();
    println!(
        "Performance records: {} total ({} message, {} file)",
        records.len(),
        messages,
        files
    );
    for record in records.iter().rev().take(5) {
        println!(
            "  {} - {} bytes in {:.2}ms",
            record.operation, record.data_size, record.duration_ms
        );
    }
}

/// Console implementation of the `UiPrompt` collaborator.
struct ConsolePrompt;

fn read_stdin_line(prompt_text: String) -> Option<String> {
    eprint!("{prompt_text}");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok()?;
    Some(line.trim().to_string())
}

#[async_trait]
impl UiPrompt for ConsolePrompt {
    async fn confirm(&self, question: &str) -> bool {
        let question = format!("{question} [y/N] ");
        tokio::task::spawn_blocking(move || {
            matches!(
                read_stdin_line(question).as_deref(),
                Some("y") | Some("Y") | Some("yes")
            )
        })
        .await
        .unwrap_or(false)
    }

    fn notify_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn notify_info(&self, message: &str) {
        println!("{message}");
    }

    async fn choose_save_destination(&self, suggested_name: &str) -> Option<PathBuf> {
        let question = format!("Save as [{suggested_name}]: ");
        let suggested = suggested_name.to_string();
        tokio::task::spawn_blocking(move || {
            let answer = read_stdin_line(question)?;
            if answer.is_empty() {
                Some(PathBuf::from(suggested))
            } else {
                Some(PathBuf::from(answer))
            }
        })
        .await
        .unwrap_or(None)
    }

    async fn choose_source_file(&self) -> Option<PathBuf> {
        tokio::task::spawn_blocking(move || {
            let answer = read_stdin_line("File to send: ".to_string())?;
            if answer.is_empty() {
                None
            } else {
                Some(PathBuf::from(answer))
            }
        })
        .await
        .unwrap_or(None)
    }
}
