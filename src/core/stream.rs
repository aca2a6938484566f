// src/core/stream.rs

use crate::upstream::{ChunkStream, StreamError};
use bytes::Bytes;
use futures_util::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, info, warn};

/// A response stream bound to the key that produced its first chunk.
///
/// Yields the pre-fetched first chunk, then the rest of the upstream
/// stream. After the first error it yields that error once and ends.
/// An upstream silent for longer than `idle_timeout` counts as an error.
/// Dropping it early drops the upstream connection.
pub struct CommittedStream {
    first: Option<Bytes>,
    inner: ChunkStream,
    key_preview: String,
    delivered: usize,
    finished: bool,
    idle_timeout: Duration,
    idle_deadline: Pin<Box<Sleep>>,
    // Armed while waiting on the upstream, so a slow reader is not blamed on it.
    waiting: bool,
}

impl CommittedStream {
    /// `first` is `None` when the upstream ended without any output.
    pub fn new(
        first: Option<Bytes>,
        inner: ChunkStream,
        key_preview: impl Into<String>,
        idle_timeout: Duration,
    ) -> Self {
        let finished = first.is_none();
        Self {
            first,
            inner,
            key_preview: key_preview.into(),
            delivered: 0,
            finished,
            idle_timeout,
            idle_deadline: Box::pin(sleep(idle_timeout)),
            waiting: false,
        }
    }

    pub fn key_preview(&self) -> &str {
        &self.key_preview
    }
}

impl Stream for CommittedStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.first.take() {
            self.delivered += 1;
            return Poll::Ready(Some(Ok(chunk)));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.delivered += 1;
                self.waiting = false;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                self.finished = true;
                warn!(
                    api_key.preview = %self.key_preview,
                    chunks = self.delivered,
                    error = %error,
                    "Upstream stream failed after output was sent; not retrying"
                );
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                debug!(api_key.preview = %self.key_preview, chunks = self.delivered, "Upstream stream completed");
                Poll::Ready(None)
            }
            Poll::Pending => {
                if !self.waiting {
                    let deadline = Instant::now() + self.idle_timeout;
                    self.idle_deadline.as_mut().reset(deadline);
                    self.waiting = true;
                }
                if self.idle_deadline.as_mut().poll(cx).is_pending() {
                    return Poll::Pending;
                }

                self.finished = true;
                warn!(
                    api_key.preview = %self.key_preview,
                    chunks = self.delivered,
                    idle_timeout = ?self.idle_timeout,
                    "Upstream stream went silent; ending it"
                );
                Poll::Ready(Some(Err(StreamError(format!(
                    "upstream sent nothing for {:?}",
                    self.idle_timeout
                )))))
            }
        }
    }
}

impl Drop for CommittedStream {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                api_key.preview = %self.key_preview,
                chunks = self.delivered,
                "Client went away mid-stream, cancelling upstream call"
            );
        }
    }
}

impl fmt::Debug for CommittedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedStream")
            .field("key_preview", &self.key_preview)
            .field("delivered", &self.delivered)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
