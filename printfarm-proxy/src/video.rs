//! Motion-JPEG proxy
//!
//! The device stream is read chunk by chunk, reassembled into complete JPEG
//! frames by [`FrameBuffer`] and re-emitted as `multipart/x-mixed-replace`
//! parts. A client never sees a partial frame: on upstream end-of-stream the
//! incomplete tail is discarded, on upstream failure the stream ends with an
//! error so the HTTP response is cut off instead of completed.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{ready, Stream, StreamExt, TryStreamExt};
use printfarm_core::metrics;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::{ProxyError, ProxyResult};
use crate::frame::FrameBuffer;
use crate::multipart;
use crate::session::SessionTracker;

/// Multipart byte stream handed to the HTTP layer
pub type VideoStream = BoxStream<'static, ProxyResult<Bytes>>;

#[derive(Debug, Clone)]
pub struct VideoStreamProxy {
    client: reqwest::Client,
    boundary: String,
    max_buffer_bytes: usize,
}

impl VideoStreamProxy {
    /// `client` should carry connect and read timeouts; the stream itself is
    /// unbounded in length.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        boundary: impl Into<String>,
        max_buffer_bytes: usize,
    ) -> Self {
        Self {
            client,
            boundary: boundary.into(),
            max_buffer_bytes,
        }
    }

    #[must_use]
    pub fn content_type(&self) -> String {
        multipart::content_type(&self.boundary)
    }

    /// Connect to the device stream at `url`.
    ///
    /// Errors returned here happen before any byte reaches the client. The
    /// session stays open until the returned stream ends, is dropped, or
    /// `shutdown` fires; on shutdown the stream ends cleanly after the last
    /// complete part.
    pub async fn open(
        &self,
        url: &str,
        mut tracker: SessionTracker,
        shutdown: CancellationToken,
    ) -> ProxyResult<VideoStream> {
        let span = tracker.span();
        let sent = self.client.get(url).send().instrument(span.clone()).await;
        let _entered = span.enter();

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let err = ProxyError::UpstreamUnreachable(format!("Could not open {url}: {e}"));
                warn!(error = %err, "Video upstream unreachable");
                tracker.set_outcome(err.outcome());
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err = ProxyError::UpstreamStatus(status.as_u16());
            warn!(error = %err, "Video upstream refused stream");
            tracker.set_outcome(err.outcome());
            return Err(err);
        }

        debug!(url, "Video upstream connected");

        let boundary = self.boundary.clone();
        let parts = frames(response.bytes_stream().boxed(), self.max_buffer_bytes).map_ok(
            move |frame| {
                metrics::video::FRAMES_EMITTED.inc();
                multipart::encode_part(&boundary, &frame)
            },
        );

        Ok(Tracked::new(parts.boxed(), tracker, shutdown).boxed())
    }
}

struct FrameState<S> {
    chunks: S,
    buffer: FrameBuffer,
    ready: VecDeque<Bytes>,
    failure: Option<ProxyError>,
    done: bool,
}

/// Reassemble complete JPEG frames from an arbitrarily chunked byte stream.
///
/// Frames completed by a chunk are always yielded before an error caused by
/// that same chunk.
pub fn frames<S, E>(chunks: S, max_buffer_bytes: usize) -> impl Stream<Item = ProxyResult<Bytes>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let state = FrameState {
        chunks,
        buffer: FrameBuffer::new(max_buffer_bytes),
        ready: VecDeque::new(),
        failure: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.ready.pop_front() {
                return Some((Ok(frame), state));
            }
            if let Some(err) = state.failure.take() {
                state.done = true;
                return Some((Err(err), state));
            }
            if state.done {
                return None;
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend(&chunk);
                    while let Some(frame) = state.buffer.next_frame() {
                        state.ready.push_back(frame);
                    }
                    if let Err(err) = state.buffer.ensure_within_limit() {
                        state.failure = Some(err);
                    }
                }
                Some(Err(e)) => {
                    state.failure = Some(ProxyError::UpstreamUnreachable(format!(
                        "Video stream interrupted: {e}"
                    )));
                }
                None => {
                    if !state.buffer.is_empty() {
                        debug!(bytes = state.buffer.len(), "Discarding incomplete frame");
                    }
                    state.done = true;
                }
            }
        }
    })
}

/// Records how the session ended once the stream finishes or is dropped.
///
/// Polls run inside the session span, so frame-level events carry the
/// device and session ids.
struct Tracked {
    inner: VideoStream,
    tracker: SessionTracker,
    span: Span,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    finished: bool,
}

impl Tracked {
    fn new(inner: VideoStream, tracker: SessionTracker, shutdown: CancellationToken) -> Self {
        Self {
            inner,
            span: tracker.span(),
            tracker,
            shutdown: Box::pin(shutdown.cancelled_owned()),
            finished: false,
        }
    }
}

impl Stream for Tracked {
    type Item = ProxyResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        let _entered = this.span.enter();

        if this.shutdown.as_mut().poll(cx).is_ready() {
            info!("Ending video stream for shutdown");
            this.tracker.set_outcome("shutdown");
            this.finished = true;
            return Poll::Ready(None);
        }

        let item = ready!(this.inner.poll_next_unpin(cx));
        match &item {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Video stream aborted");
                this.tracker.set_outcome(e.outcome());
                this.finished = true;
            }
            None => {
                this.tracker.set_outcome("upstream_closed");
                this.finished = true;
            }
        }
        Poll::Ready(item)
    }
}
