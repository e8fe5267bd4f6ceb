//! Ordered pipeline logs.
//!
//! A log is a sequence of chunks in arrival order. Interleaving of stdout and
//! stderr is preserved as observed; chunks are never regrouped per stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One range of bytes received from a process, or a line written by the
/// pipeline itself (always tagged stdout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub stream: LogStream,
    pub data: Bytes,
}

impl LogChunk {
    pub fn stdout(data: impl Into<Bytes>) -> Self {
        Self {
            stream: LogStream::Stdout,
            data: data.into(),
        }
    }

    pub fn stderr(data: impl Into<Bytes>) -> Self {
        Self {
            stream: LogStream::Stderr,
            data: data.into(),
        }
    }
}

/// Append-only log of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineLog {
    chunks: Vec<LogChunk>,
}

impl PipelineLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: LogChunk) {
        self.chunks.push(chunk);
    }

    /// Append a line authored by the pipeline.
    pub fn write_line(&mut self, line: impl AsRef<str>) {
        let mut text = line.as_ref().to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.push(LogChunk::stdout(text));
    }

    pub fn chunks(&self) -> &[LogChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All chunk bytes concatenated in order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let total = self.chunks.iter().map(|c| c.data.len()).sum();
        let mut out = Vec::with_capacity(total);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.data);
        }
        out
    }

    /// Lossy text rendering of the whole log.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}
