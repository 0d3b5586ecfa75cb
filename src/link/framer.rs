//! Incremental frame extraction from the receive stream.
//!
//! The stream delivers data in arbitrary chunk sizes. File transfers are
//! length-prefixed by a `FILE:<name>:<len>\n` header; everything else is
//! a chat payload. Chat payloads carry no delimiter, so a buffer that is
//! not a file frame is consumed whole, one logical message per flush.

use crate::link::error::LinkError;

/// File frame header prefix.
const FILE_PREFIX: &[u8] = b"FILE:";

/// One extracted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A chat payload: one base64 AEAD blob per stream flush.
    Chat {
        /// The raw payload bytes as received.
        blob: Vec<u8>,
    },
    /// A file payload.
    File {
        /// File name from the header.
        filename: String,
        /// Declared body length from the header.
        byte_len: usize,
        /// The body, exactly `byte_len` bytes.
        blob: Vec<u8>,
    },
}

/// Accumulates stream chunks and extracts complete frames.
///
/// The buffer always holds exactly the bytes read so far minus the bytes
/// already emitted as frames. A framing error discards the whole buffer
/// and leaves the framer usable for subsequent data.
#[derive(Debug, Default)]
pub struct StreamFramer {
    buffer: Vec<u8>,
}

impl StreamFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered and not yet framed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append an inbound chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Try to extract the next complete frame.
    ///
    /// `Ok(None)` means more data is needed. A `Framing` error clears the
    /// buffer; the malformed frame and anything buffered after it is lost.
    pub fn try_next(&mut self) -> Result<Option<Frame>, LinkError> {
        if self.buffer.starts_with(FILE_PREFIX) {
            return self.try_next_file();
        }

        // A strict prefix of "FILE:" (including an empty buffer) may still
        // grow into a file header. Anything else is one chat payload.
        if FILE_PREFIX.starts_with(&self.buffer) {
            return Ok(None);
        }

        let blob = std::mem::take(&mut self.buffer);
        Ok(Some(Frame::Chat { blob }))
    }

    fn try_next_file(&mut self) -> Result<Option<Frame>, LinkError> {
        let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };

        let (filename, byte_len) = match parse_file_header(&self.buffer[..newline]) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.buffer.clear();
                return Err(e);
            }
        };

        let total = newline + 1 + byte_len;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let blob = self.buffer[newline + 1..total].to_vec();
        self.buffer.drain(..total);

        Ok(Some(Frame::File {
            filename,
            byte_len,
            blob,
        }))
    }
}

/// Parse `FILE:<filename>:<decimal length>` (header without the newline).
fn parse_file_header(header: &[u8]) -> Result<(String, usize), LinkError> {
    let header = std::str::from_utf8(header)
        .map_err(|_| LinkError::Framing("file header is not valid UTF-8".into()))?;

    let parts: Vec<&str> = header.split(':').collect();
    if parts.len() != 3 {
        return Err(LinkError::Framing(format!(
            "file header has {} fields, expected 3",
            parts.len()
        )));
    }

    let byte_len = parts[2]
        .parse::<usize>()
        .map_err(|_| LinkError::Framing(format!("invalid file length: {:?}", parts[2])))?;

    Ok((parts[1].to_string(), byte_len))
}
