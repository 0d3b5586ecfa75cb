//! Link configuration.

use std::time::Duration;

/// Default keepalive probe interval in seconds.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 10;

/// Default read chunk size for the receive loop.
pub const DEFAULT_READ_CHUNK: usize = 16 * 1024;

/// Files larger than this require confirmation before sending.
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Maximum bytes read for a single handshake message.
pub const HANDSHAKE_READ_LIMIT: usize = 4096;

/// Configuration for a link session.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Interval between encrypted keepalive probes. `None` disables them.
    pub keepalive: Option<Duration>,

    /// Read chunk size for the receive loop.
    pub read_chunk: usize,

    /// File size above which sending asks for confirmation.
    pub large_file_threshold: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            keepalive: Some(Duration::from_secs(DEFAULT_KEEPALIVE_SECS)),
            read_chunk: DEFAULT_READ_CHUNK,
            large_file_threshold: DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl LinkConfig {
    /// Set a custom keepalive interval.
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }

    /// Disable the keepalive probe.
    pub fn without_keepalive(mut self) -> Self {
        self.keepalive = None;
        self
    }
}
