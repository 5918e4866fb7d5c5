//! # Streamed Transfer
//!
//! Byte-level readers and writers handed out by `get_reader_on` /
//! `get_writer_on`.
//!
//! ## Piped Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         NodeWriter (piped)                              │
//! │                                                                         │
//! │   caller task                          background task                  │
//! │   ───────────                          ───────────────                  │
//! │   write_all(..) ──► [ bounded duplex pipe ] ──► upload(reader)          │
//! │        │               (backpressure when full)        │                │
//! │        ▼                                               ▼                │
//! │   finish() ── closes its end ──► EOF ──► upload returns Result          │
//! │        ▲                                               │                │
//! │        └──────────── completion (JoinHandle) ◄─────────┘                │
//! │                                                                         │
//! │   Cancellation drops the upload future, which closes the task's end;   │
//! │   further caller writes then fail with BrokenPipe.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, Sink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{EndpointError, EndpointResult};

/// Default capacity of the in-memory pipe behind a piped writer.
pub const DEFAULT_WRITER_BUFFER: usize = 64 * 1024;

/// Streamed read access to one leaf.
pub type NodeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Wraps an owned buffer as a reader.
pub fn reader_from_bytes(data: Vec<u8>) -> NodeReader {
    Box::new(io::Cursor::new(data))
}

// =============================================================================
// Node Writer
// =============================================================================

enum WriterSink {
    Discard(Sink),
    Pipe(DuplexStream),
}

/// Streamed write access to one leaf.
///
/// Bytes are accepted through [`AsyncWrite`]. The outcome of the transfer is
/// only known after [`NodeWriter::finish`]; dropping the writer without
/// finishing closes the pipe and leaves the outcome to the logs.
pub struct NodeWriter {
    path: String,
    sink: WriterSink,
    completion: Option<JoinHandle<EndpointResult<()>>>,
}

impl NodeWriter {
    /// A writer that accepts and drops every byte.
    pub fn discard(path: impl Into<String>) -> Self {
        NodeWriter {
            path: path.into(),
            sink: WriterSink::Discard(tokio::io::sink()),
            completion: None,
        }
    }

    /// Spawns `upload` on the other end of a bounded pipe.
    ///
    /// `upload` receives the read end and must consume it until EOF. Its
    /// result becomes the result of [`NodeWriter::finish`].
    pub fn spawn<F, Fut>(
        path: impl Into<String>,
        buffer: usize,
        cancel: CancellationToken,
        upload: F,
    ) -> Self
    where
        F: FnOnce(NodeReader) -> Fut + Send + 'static,
        Fut: Future<Output = EndpointResult<()>> + Send + 'static,
    {
        let path = path.into();
        let (caller_end, task_end) = tokio::io::duplex(buffer.max(1));
        let task_path = path.clone();

        let completion = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(EndpointError::Cancelled),
                result = upload(Box::new(task_end)) => result,
            };
            match &result {
                Ok(()) => debug!(path = %task_path, "Background write complete"),
                Err(e) => error!(path = %task_path, error = %e, "Background write failed"),
            }
            result
        });

        NodeWriter {
            path,
            sink: WriterSink::Pipe(caller_end),
            completion: Some(completion),
        }
    }

    /// Logical path this writer targets.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for writers that drop their input.
    pub fn is_discard(&self) -> bool {
        matches!(self.sink, WriterSink::Discard(_))
    }

    /// Closes the stream and waits for the transfer outcome.
    ///
    /// Returns the delegate's error unchanged, `Cancelled` if the call
    /// context fired, or `Internal` if the background task panicked.
    pub async fn finish(mut self) -> EndpointResult<()> {
        let closed = self.shutdown().await;
        match self.completion.take() {
            None => closed.map_err(EndpointError::from),
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(join) => Err(EndpointError::Internal(format!(
                    "write task for {} failed: {}",
                    self.path, join
                ))),
            },
        }
    }
}

impl std::fmt::Debug for NodeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeWriter")
            .field("path", &self.path)
            .field("discard", &self.is_discard())
            .finish()
    }
}

impl AsyncWrite for NodeWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().sink {
            WriterSink::Discard(sink) => Pin::new(sink).poll_write(cx, buf),
            WriterSink::Pipe(pipe) => Pin::new(pipe).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().sink {
            WriterSink::Discard(sink) => Pin::new(sink).poll_flush(cx),
            WriterSink::Pipe(pipe) => Pin::new(pipe).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().sink {
            WriterSink::Discard(sink) => Pin::new(sink).poll_shutdown(cx),
            WriterSink::Pipe(pipe) => Pin::new(pipe).poll_shutdown(cx),
        }
    }
}
