//! Event sources feeding the runtime.
//!
//! A source yields [`GatewayEvent`]s until it is exhausted. The runtime does
//! not care where they come from: a platform SDK connection, a channel fed by
//! tests, or newline-delimited JSON on stdin.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{error, warn};

use kestrel_core::GatewayEvent;

/// A stream of gateway events.
#[async_trait]
pub trait EventSource: Send {
    /// Returns the next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<GatewayEvent>;
}

// =============================================================================
// JSON lines
// =============================================================================

/// Reads one `{"type": ..., "data": ...}` event per line.
///
/// Blank lines are skipped. Lines that are not UTF-8 or not a known event are
/// logged and skipped; only an I/O error ends the source.
pub struct JsonLinesSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

impl JsonLinesSource<tokio::io::BufReader<tokio::io::Stdin>> {
    /// Reads events from standard input.
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> EventSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Option<GatewayEvent> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    error!(error = %err, "failed to read event source");
                    return None;
                }
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(err) => {
                    warn!(line = self.line_no, error = %err, "skipping undecodable event");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => return Some(event),
                Err(err) => warn!(line = self.line_no, error = %err, "skipping malformed event"),
            }
        }
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Yields events pushed into a tokio mpsc channel.
///
/// The source ends once every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<GatewayEvent>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<GatewayEvent>) -> Self {
        Self { rx }
    }

    /// Creates a bounded channel and its source.
    pub fn channel(buffer: usize) -> (mpsc::Sender<GatewayEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next_event(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }
}
