//! Line-oriented front end for the admission service.
//!
//! Each input line is a client key; each output line is the JSON rendering
//! of the admission response for that key.

use chrono::Utc;
use serde::Serialize;
use std::io::{self, BufRead, BufReader, Read};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, SplitStream};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::service::{AdmissionResponse, AdmissionService};
use crate::error::Result;
use crate::ratelimit::{AdmissionControl, Clock};

/// Lines buffered between a blocking reader thread and the server.
const READER_CHANNEL_CAPACITY: usize = 64;

/// One line of output.
#[derive(Debug, Serialize)]
struct LineRecord<'a> {
    key: &'a str,
    #[serde(flatten)]
    response: &'a AdmissionResponse,
    timestamp: String,
}

/// Read lines from a blocking source on a dedicated OS thread.
///
/// Reads on this thread are never awaited by the runtime, so a source that
/// never reaches EOF (an open stdin) cannot hold up runtime shutdown. The
/// thread exits at EOF, on a read error, or once the stream is dropped and
/// the next line arrives.
pub fn spawn_blocking_reader<R>(reader: R) -> io::Result<ReceiverStream<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(READER_CHANNEL_CAPACITY);

    std::thread::Builder::new()
        .name("turnstile-reader".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = Vec::new();
                let item = match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                        }
                        Ok(line)
                    }
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
            debug!("Blocking reader finished");
        })?;

    Ok(ReceiverStream::new(rx))
}

/// Serves admission decisions over a pair of byte streams.
pub struct LineServer<B: AdmissionControl, C: Clock> {
    service: AdmissionService<B, C>,
}

impl<B: AdmissionControl, C: Clock> LineServer<B, C> {
    /// Create a new line server around an admission service.
    pub fn new(service: AdmissionService<B, C>) -> Self {
        Self { service }
    }

    /// Serve until the input is exhausted.
    ///
    /// Returns the number of lines answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.serve_with_shutdown(reader, writer, std::future::pending())
            .await
    }

    /// Serve until the input is exhausted or `signal` resolves.
    ///
    /// Returns the number of lines answered.
    pub async fn serve_with_shutdown<R, W, F>(&self, reader: R, writer: W, signal: F) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: std::future::Future<Output = ()>,
    {
        let lines = SplitStream::new(reader.split(b'\n'));
        self.serve_lines_with_shutdown(lines, writer, signal).await
    }

    /// Serve raw lines (without their trailing newline) until the stream
    /// ends or `signal` resolves.
    ///
    /// A line that is not valid UTF-8 is answered as a request without a
    /// client key; only I/O errors stop the server.
    pub async fn serve_lines_with_shutdown<S, W, F>(&self, lines: S, mut writer: W, signal: F) -> Result<u64>
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Unpin,
        W: AsyncWrite + Unpin,
        F: std::future::Future<Output = ()>,
    {
        let mut lines = lines;
        tokio::pin!(signal);

        info!("Line server accepting client keys");

        let mut served = 0u64;
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!(served = served, "Shutdown signal received, stopping line server");
                    break;
                }
                line = lines.next() => {
                    let Some(line) = line else {
                        debug!(served = served, "Input closed");
                        break;
                    };
                    let line = line?;

                    let (key, response) = match std::str::from_utf8(&line) {
                        Ok(text) => {
                            let key = text.trim();
                            (key.to_string(), self.service.admit(Some(key)))
                        }
                        Err(_) => {
                            warn!("Received client key that is not valid UTF-8");
                            let key = String::from_utf8_lossy(&line).trim().to_string();
                            (key, self.service.admit(None))
                        }
                    };

                    let record = LineRecord {
                        key: &key,
                        response: &response,
                        timestamp: Utc::now().to_rfc3339(),
                    };

                    let mut out = serde_json::to_vec(&record)?;
                    out.push(b'\n');
                    writer.write_all(&out).await?;
                    writer.flush().await?;
                    served += 1;
                }
            }
        }

        Ok(served)
    }
}
