//! Bidirectional control-message relay
//!
//! One relay pairs a client socket with a device socket. Each direction runs
//! as its own forwarding loop; the first loop to finish (peer closed, read or
//! write error) ends the session and the other loop is dropped right away, so
//! neither side outlives its partner. Both sinks are then closed, bounded by a
//! timeout.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use printfarm_core::metrics;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Close code sent to clients when the server shuts down ("going away")
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Transport-neutral control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Text(String),
    Binary(Bytes),
    Close(Option<CloseReason>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// Transport failure on either socket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RelayError(pub String);

pub type FrameStream = BoxStream<'static, Result<ControlFrame, RelayError>>;
pub type FrameSink = Pin<Box<dyn Sink<ControlFrame, Error = RelayError> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientToUpstream => "client_to_upstream",
            Self::UpstreamToClient => "upstream_to_client",
        }
    }

    /// (reading side, writing side)
    const fn sides(self) -> (Side, Side) {
        match self {
            Self::ClientToUpstream => (Side::Client, Side::Upstream),
            Self::UpstreamToClient => (Side::Upstream, Side::Client),
        }
    }
}

/// Why a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `side` sent a close frame or its stream ended
    PeerClosed { side: Side },
    /// Reading from or writing to `side` failed
    TransportError { side: Side, error: RelayError },
    /// The server is shutting down
    Cancelled,
}

impl RelayOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PeerClosed { side: Side::Client } => "client_closed",
            Self::PeerClosed { side: Side::Upstream } => "upstream_closed",
            Self::TransportError { side: Side::Client, .. } => "client_error",
            Self::TransportError { side: Side::Upstream, .. } => "upstream_error",
            Self::Cancelled => "shutdown",
        }
    }
}

/// Relay messages between `client` and `upstream` until either side ends or
/// `cancel` fires.
///
/// Message order is preserved per direction. When this returns, both sinks
/// have been closed (or given up on after `close_timeout`).
pub async fn relay<CR, CW, UR, UW>(
    client: (CR, CW),
    upstream: (UR, UW),
    cancel: CancellationToken,
    close_timeout: Duration,
) -> RelayOutcome
where
    CR: Stream<Item = Result<ControlFrame, RelayError>> + Unpin,
    CW: Sink<ControlFrame, Error = RelayError> + Unpin,
    UR: Stream<Item = Result<ControlFrame, RelayError>> + Unpin,
    UW: Sink<ControlFrame, Error = RelayError> + Unpin,
{
    let (mut client_rx, mut client_tx) = client;
    let (mut upstream_rx, mut upstream_tx) = upstream;

    // the losing forwarder is dropped here, mid-read or mid-write
    let outcome = tokio::select! {
        outcome = forward(&mut client_rx, &mut upstream_tx, Direction::ClientToUpstream) => outcome,
        outcome = forward(&mut upstream_rx, &mut client_tx, Direction::UpstreamToClient) => outcome,
        () = cancel.cancelled() => RelayOutcome::Cancelled,
    };

    if outcome == RelayOutcome::Cancelled {
        let going_away = ControlFrame::Close(Some(CloseReason {
            code: CLOSE_GOING_AWAY,
            reason: "server shutting down".to_string(),
        }));
        if tokio::time::timeout(close_timeout, client_tx.send(going_away))
            .await
            .is_err()
        {
            debug!("Timed out notifying client of shutdown");
        }
    }

    close_sink(&mut client_tx, Side::Client, close_timeout).await;
    close_sink(&mut upstream_tx, Side::Upstream, close_timeout).await;

    outcome
}

async fn forward<R, W>(source: &mut R, sink: &mut W, direction: Direction) -> RelayOutcome
where
    R: Stream<Item = Result<ControlFrame, RelayError>> + Unpin,
    W: Sink<ControlFrame, Error = RelayError> + Unpin,
{
    let (from, to) = direction.sides();
    let relayed = metrics::control::MESSAGES_RELAYED.with_label_values(&[direction.as_str()]);

    loop {
        let frame = match source.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => return RelayOutcome::TransportError { side: from, error },
            None => return RelayOutcome::PeerClosed { side: from },
        };

        let closing = matches!(frame, ControlFrame::Close(_));
        if let Err(error) = sink.send(frame).await {
            return RelayOutcome::TransportError { side: to, error };
        }
        if closing {
            return RelayOutcome::PeerClosed { side: from };
        }
        relayed.inc();
    }
}

async fn close_sink<W>(sink: &mut W, side: Side, close_timeout: Duration)
where
    W: Sink<ControlFrame, Error = RelayError> + Unpin,
{
    match tokio::time::timeout(close_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        // already gone, nothing left to release
        Ok(Err(e)) => debug!(?side, error = %e, "Socket close failed"),
        Err(_) => debug!(?side, "Timed out closing socket"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

    const WAIT: Duration = Duration::from_secs(2);

    /// Test double for one socket: what the peer sends in, what the relay wrote out
    struct Peer {
        inbound: UnboundedSender<Result<ControlFrame, RelayError>>,
        outbound: UnboundedReceiver<ControlFrame>,
    }

    fn socket() -> (Peer, (FrameStream, FrameSink)) {
        let (inbound, rx) = mpsc::unbounded();
        let (tx, outbound) = mpsc::unbounded::<ControlFrame>();
        let sink: FrameSink = Box::pin(tx.sink_map_err(|e| RelayError(e.to_string())));
        (Peer { inbound, outbound }, (rx.boxed(), sink))
    }

    fn text(s: &str) -> ControlFrame {
        ControlFrame::Text(s.to_string())
    }

    fn spawn_relay(
        client: (FrameStream, FrameSink),
        upstream: (FrameStream, FrameSink),
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<RelayOutcome> {
        tokio::spawn(relay(client, upstream, cancel, Duration::from_millis(500)))
    }

    #[tokio::test]
    async fn test_preserves_order_in_both_directions() {
        let (mut client, client_socket) = socket();
        let (mut device, device_socket) = socket();
        let handle = spawn_relay(client_socket, device_socket, CancellationToken::new());

        for i in 0..50 {
            client.inbound.unbounded_send(Ok(text(&format!("c{i}")))).unwrap();
            device
                .inbound
                .unbounded_send(Ok(ControlFrame::Binary(Bytes::from(vec![i as u8]))))
                .unwrap();
        }

        for i in 0..50 {
            assert_eq!(device.outbound.next().await, Some(text(&format!("c{i}"))));
            assert_eq!(
                client.outbound.next().await,
                Some(ControlFrame::Binary(Bytes::from(vec![i as u8])))
            );
        }

        client.inbound.unbounded_send(Ok(ControlFrame::Close(None))).unwrap();
        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();

        assert_eq!(outcome, RelayOutcome::PeerClosed { side: Side::Client });
        assert_eq!(device.outbound.next().await, Some(ControlFrame::Close(None)));
        assert_eq!(device.outbound.next().await, None);
        assert_eq!(client.outbound.next().await, None);
    }

    #[tokio::test]
    async fn test_upstream_close_reaches_client() {
        let (mut client, client_socket) = socket();
        let (device, device_socket) = socket();
        let handle = spawn_relay(client_socket, device_socket, CancellationToken::new());

        let reason = CloseReason {
            code: 1000,
            reason: "printer offline".to_string(),
        };
        device
            .inbound
            .unbounded_send(Ok(ControlFrame::Close(Some(reason.clone()))))
            .unwrap();

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome, RelayOutcome::PeerClosed { side: Side::Upstream });
        assert_eq!(
            client.outbound.next().await,
            Some(ControlFrame::Close(Some(reason)))
        );
        assert_eq!(client.outbound.next().await, None);
        drop(client.inbound);
    }

    #[tokio::test]
    async fn test_upstream_drop_ends_idle_client_direction() {
        let (mut client, client_socket) = socket();
        let (device, device_socket) = socket();
        let handle = spawn_relay(client_socket, device_socket, CancellationToken::new());

        drop(device.inbound);

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome, RelayOutcome::PeerClosed { side: Side::Upstream });
        assert_eq!(client.outbound.next().await, None);
        drop(client.inbound);
    }

    #[tokio::test]
    async fn test_read_error_is_attributed_to_source() {
        let (_client, client_socket) = socket();
        let (device, device_socket) = socket();
        let handle = spawn_relay(client_socket, device_socket, CancellationToken::new());

        device
            .inbound
            .unbounded_send(Err(RelayError("connection reset".to_string())))
            .unwrap();

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::TransportError {
                side: Side::Upstream,
                error: RelayError("connection reset".to_string()),
            }
        );
        assert_eq!(outcome.label(), "upstream_error");
    }

    #[tokio::test]
    async fn test_write_error_is_attributed_to_sink() {
        let (client, client_socket) = socket();
        let (device, device_socket) = socket();
        let handle = spawn_relay(client_socket, device_socket, CancellationToken::new());

        drop(device.outbound);
        client.inbound.unbounded_send(Ok(text("G28"))).unwrap();

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            RelayOutcome::TransportError {
                side: Side::Upstream,
                ..
            }
        ));
        drop(device.inbound);
    }

    #[tokio::test]
    async fn test_cancel_sends_going_away_to_client() {
        let (mut client, client_socket) = socket();
        let (mut device, device_socket) = socket();
        let cancel = CancellationToken::new();
        let handle = spawn_relay(client_socket, device_socket, cancel.clone());

        cancel.cancel();

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert_eq!(
            client.outbound.next().await,
            Some(ControlFrame::Close(Some(CloseReason {
                code: CLOSE_GOING_AWAY,
                reason: "server shutting down".to_string(),
            })))
        );
        assert_eq!(client.outbound.next().await, None);
        assert_eq!(device.outbound.next().await, None);
        drop((client.inbound, device.inbound));
    }
}
