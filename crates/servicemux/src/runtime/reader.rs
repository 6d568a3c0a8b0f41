//! Line reader for a single child stream

use crate::runtime::sanitize::sanitize_line;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Separator between prefix and payload
pub const SEPARATOR: &str = ": ";

/// Suffix appended to the service name for stderr lines
pub const ERROR_SUFFIX: &str = ":error";

/// Which of a child's output streams a reader is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Prefix used for lines of this stream kind
    pub fn prefix(&self, name: &str) -> String {
        match self {
            StreamKind::Stdout => name.to_string(),
            StreamKind::Stderr => format!("{}{}", name, ERROR_SUFFIX),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// A prefixed, sanitized line ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Service name, with `:error` for stderr lines
    pub prefix: Arc<str>,
    /// Sanitized line content, never empty
    pub payload: Vec<u8>,
}

impl OutputLine {
    pub fn new(prefix: Arc<str>, payload: Vec<u8>) -> Self {
        Self { prefix, payload }
    }

    /// Render as `prefix + ": " + payload`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(self.prefix.len() + SEPARATOR.len() + self.payload.len());
        bytes.extend_from_slice(self.prefix.as_bytes());
        bytes.extend_from_slice(SEPARATOR.as_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.prefix,
            SEPARATOR,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// How a stream reader finished
#[derive(Debug)]
pub enum StreamEnd {
    /// The stream reached end-of-file
    Eof,
    /// The receiving side of the channel went away
    Closed,
    /// Cancelled and the stream stayed open past the grace period
    Abandoned,
    /// Reading failed with an I/O error
    Failed(io::Error),
}

/// Reads one child stream line by line and forwards prefixed lines.
pub struct StreamReader<R> {
    prefix: Arc<str>,
    reader: BufReader<R>,
    tx: mpsc::Sender<OutputLine>,
    cancel: CancellationToken,
    grace: Duration,
}

impl<R: AsyncRead + Unpin> StreamReader<R> {
    pub fn new(
        stream: R,
        prefix: impl Into<Arc<str>>,
        tx: mpsc::Sender<OutputLine>,
        cancel: CancellationToken,
        grace: Duration,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            reader: BufReader::new(stream),
            tx,
            cancel,
            grace,
        }
    }

    /// Read until end-of-stream, forwarding every non-empty line.
    ///
    /// After cancellation the stream is drained for at most the grace
    /// period, then the handle is dropped.
    pub async fn run(mut self) -> StreamEnd {
        let mut buf = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            // read_until may be dropped mid-line by select; the partial bytes
            // stay in `buf` and the next call appends the rest.
            let read = match deadline {
                Some(deadline) => {
                    let read = self.reader.read_until(b'\n', &mut buf);
                    match tokio::time::timeout_at(deadline, read).await {
                        Ok(read) => read,
                        Err(_) => return StreamEnd::Abandoned,
                    }
                }
                None => tokio::select! {
                    read = self.reader.read_until(b'\n', &mut buf) => read,
                    () = self.cancel.cancelled() => {
                        deadline = Some(Instant::now() + self.grace);
                        continue;
                    }
                },
            };

            match read {
                Ok(0) => {
                    if let Some(end) = self.forward(&mut buf, deadline).await {
                        return end;
                    }
                    return StreamEnd::Eof;
                }
                Ok(_) => {
                    if let Some(end) = self.forward(&mut buf, deadline).await {
                        return end;
                    }
                }
                Err(e) => return StreamEnd::Failed(e),
            }
        }
    }

    /// Send the buffered line, if it has content, and clear the buffer.
    async fn forward(&mut self, buf: &mut Vec<u8>, deadline: Option<Instant>) -> Option<StreamEnd> {
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        let payload = sanitize_line(buf);
        buf.clear();

        if payload.is_empty() {
            return None;
        }

        let send = self.tx.send(OutputLine::new(self.prefix.clone(), payload));
        let sent = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, send).await {
                Ok(sent) => sent,
                Err(_) => return Some(StreamEnd::Abandoned),
            },
            None => send.await,
        };

        match sent {
            Ok(()) => None,
            Err(_) => Some(StreamEnd::Closed),
        }
    }
}
