//! Control channel: device handshake and socket adapters for the relay
//!
//! Ping and pong frames are answered by each transport on its own and are
//! never relayed.

use std::time::Duration;

use axum::extract::ws::{self, WebSocket};
use futures::{future, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

use crate::error::{ProxyError, ProxyResult};
use crate::relay::{
    self, CloseReason, ControlFrame, FrameSink, FrameStream, RelayError, RelayOutcome,
};
use crate::session::SessionTracker;

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the device's control socket, giving up after `timeout`.
pub async fn connect_upstream(url: &str, timeout: Duration) -> ProxyResult<UpstreamSocket> {
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(ProxyError::UpstreamUnreachable(format!(
            "Control handshake with {url} failed: {e}"
        ))),
        Err(_) => Err(ProxyError::UpstreamUnreachable(format!(
            "Timed out connecting to {url}"
        ))),
    }
}

/// Relay an accepted client socket to an already connected device socket.
///
/// Returns once the session is fully torn down.
pub async fn run_session(
    client: WebSocket,
    upstream: UpstreamSocket,
    cancel: CancellationToken,
    close_timeout: Duration,
    mut tracker: SessionTracker,
) -> RelayOutcome {
    let span = tracker.span();
    let outcome = relay::relay(
        split_client(client),
        split_upstream(upstream),
        cancel,
        close_timeout,
    )
    .instrument(span)
    .await;

    match &outcome {
        RelayOutcome::TransportError { side, error } => {
            warn!(
                session_id = tracker.session_id(),
                ?side,
                error = %error,
                "Control session failed"
            );
        }
        _ => info!(
            session_id = tracker.session_id(),
            outcome = outcome.label(),
            "Control session ended"
        ),
    }
    tracker.set_outcome(outcome.label());
    outcome
}

#[must_use]
pub fn split_client(socket: WebSocket) -> (FrameStream, FrameSink) {
    let (sink, stream) = socket.split();

    let stream = stream.filter_map(|message| {
        future::ready(match message {
            Ok(message) => from_client(message).map(Ok),
            Err(e) => Some(Err(RelayError(e.to_string()))),
        })
    });
    let sink = sink
        .sink_map_err(|e| RelayError(e.to_string()))
        .with(|frame: ControlFrame| future::ready(Ok::<_, RelayError>(to_client(frame))));

    (stream.boxed(), Box::pin(sink))
}

#[must_use]
pub fn split_upstream(socket: UpstreamSocket) -> (FrameStream, FrameSink) {
    let (sink, stream) = socket.split();

    let stream = stream.filter_map(|message| {
        future::ready(match message {
            Ok(message) => from_upstream(message).map(Ok),
            Err(e) => Some(Err(RelayError(e.to_string()))),
        })
    });
    let sink = sink
        .sink_map_err(|e| RelayError(e.to_string()))
        .with(|frame: ControlFrame| future::ready(Ok::<_, RelayError>(to_upstream(frame))));

    (stream.boxed(), Box::pin(sink))
}

fn from_client(message: ws::Message) -> Option<ControlFrame> {
    match message {
        ws::Message::Text(text) => Some(ControlFrame::Text(text.as_str().to_owned())),
        ws::Message::Binary(data) => Some(ControlFrame::Binary(data)),
        ws::Message::Close(frame) => Some(ControlFrame::Close(frame.map(|f| CloseReason {
            code: f.code,
            reason: f.reason.as_str().to_owned(),
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(frame: ControlFrame) -> ws::Message {
    match frame {
        ControlFrame::Text(text) => ws::Message::Text(text.into()),
        ControlFrame::Binary(data) => ws::Message::Binary(data),
        ControlFrame::Close(reason) => ws::Message::Close(reason.map(|r| ws::CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        })),
    }
}

fn from_upstream(message: tungstenite::Message) -> Option<ControlFrame> {
    match message {
        tungstenite::Message::Text(text) => Some(ControlFrame::Text(text.as_str().to_owned())),
        tungstenite::Message::Binary(data) => Some(ControlFrame::Binary(data)),
        tungstenite::Message::Close(frame) => {
            Some(ControlFrame::Close(frame.map(|f| CloseReason {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned(),
            })))
        }
        tungstenite::Message::Ping(_)
        | tungstenite::Message::Pong(_)
        | tungstenite::Message::Frame(_) => None,
    }
}

fn to_upstream(frame: ControlFrame) -> tungstenite::Message {
    match frame {
        ControlFrame::Text(text) => tungstenite::Message::Text(text.into()),
        ControlFrame::Binary(data) => tungstenite::Message::Binary(data),
        ControlFrame::Close(reason) => {
            tungstenite::Message::Close(reason.map(|r| tungstenite::protocol::CloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            }))
        }
    }
}
