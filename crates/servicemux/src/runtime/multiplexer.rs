//! Fan-in of every service stream into two merged channels

use crate::runtime::reader::{OutputLine, StreamEnd, StreamKind, StreamReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of each merged channel. A single slot keeps the hand-off close to
/// a rendezvous: readers wait for the consumer, children wait on their pipes.
pub const MERGED_CHANNEL_CAPACITY: usize = 1;

/// The two output streams of one service
#[derive(Debug)]
pub struct ServiceStreams<O, E> {
    pub name: String,
    pub stdout: O,
    pub stderr: E,
}

/// Final state of one stream reader
#[derive(Debug)]
pub struct ReaderReport {
    pub prefix: Arc<str>,
    pub kind: StreamKind,
    pub end: StreamEnd,
}

/// Merged output of all services.
///
/// Every reader owns a sender clone, so `output` and `errors` close once all
/// readers feeding them have finished.
pub struct Multiplexer {
    /// Lines from every service's stdout
    pub output: mpsc::Receiver<OutputLine>,
    /// Lines from every service's stderr
    pub errors: mpsc::Receiver<OutputLine>,
    readers: JoinSet<ReaderReport>,
}

impl Multiplexer {
    /// Spawn two readers per service and return the merged channels.
    pub fn start<I, O, E>(services: I, cancel: &CancellationToken, grace: Duration) -> Self
    where
        I: IntoIterator<Item = ServiceStreams<O, E>>,
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (output_tx, output) = mpsc::channel(MERGED_CHANNEL_CAPACITY);
        let (errors_tx, errors) = mpsc::channel(MERGED_CHANNEL_CAPACITY);
        let mut readers = JoinSet::new();

        for service in services {
            spawn_reader(
                &mut readers,
                service.stdout,
                StreamKind::Stdout,
                &service.name,
                output_tx.clone(),
                cancel,
                grace,
            );
            spawn_reader(
                &mut readers,
                service.stderr,
                StreamKind::Stderr,
                &service.name,
                errors_tx.clone(),
                cancel,
                grace,
            );
        }

        log::debug!("Started {} stream readers", readers.len());

        Self {
            output,
            errors,
            readers,
        }
    }

    /// Wait for every reader to finish and collect how each one ended.
    ///
    /// Receivers must be drained or dropped first, otherwise readers blocked
    /// on a full channel never finish.
    pub async fn join(&mut self) -> Vec<ReaderReport> {
        let mut reports = Vec::with_capacity(self.readers.len());

        while let Some(result) = self.readers.join_next().await {
            match result {
                Ok(report) => {
                    match &report.end {
                        StreamEnd::Failed(e) => {
                            log::warn!("[{}] Failed reading {}: {}", report.prefix, report.kind, e)
                        }
                        StreamEnd::Abandoned => log::warn!(
                            "[{}] {} still open after shutdown, closing it",
                            report.prefix,
                            report.kind
                        ),
                        StreamEnd::Eof | StreamEnd::Closed => {
                            log::debug!("[{}] {} finished", report.prefix, report.kind)
                        }
                    }
                    reports.push(report);
                }
                Err(e) => log::error!("Stream reader task failed: {}", e),
            }
        }

        reports
    }

    /// Close both receivers, so readers stop at their next send
    pub fn close(&mut self) {
        self.output.close();
        self.errors.close();
    }
}

fn spawn_reader<R>(
    readers: &mut JoinSet<ReaderReport>,
    stream: R,
    kind: StreamKind,
    name: &str,
    tx: mpsc::Sender<OutputLine>,
    cancel: &CancellationToken,
    grace: Duration,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let prefix: Arc<str> = Arc::from(kind.prefix(name));
    let reader = StreamReader::new(stream, prefix.clone(), tx, cancel.clone(), grace);

    readers.spawn(async move {
        let end = reader.run().await;
        ReaderReport { prefix, kind, end }
    });
}
