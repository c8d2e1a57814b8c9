//! Bookkeeping shared by every proxy session: ids, tracing span, metrics

use std::time::Instant;

use printfarm_core::metrics::ActiveSessionGuard;
use printfarm_core::DeviceId;
use tracing::{info, info_span, Span};

/// Lives exactly as long as one proxy session.
///
/// Dropping it records the outcome; sessions that end without an explicit
/// outcome were abandoned by the client.
#[derive(Debug)]
pub struct SessionTracker {
    kind: &'static str,
    device_id: DeviceId,
    session_id: String,
    started: Instant,
    outcome: Option<&'static str>,
    guard: Option<ActiveSessionGuard>,
}

impl SessionTracker {
    #[must_use]
    pub fn start(kind: &'static str, device_id: DeviceId) -> Self {
        let session_id = nanoid::nanoid!(12);
        info!(kind, device_id = %device_id, session_id = %session_id, "Proxy session opened");
        Self {
            kind,
            device_id,
            session_id,
            started: Instant::now(),
            outcome: None,
            guard: Some(ActiveSessionGuard::new(kind)),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn span(&self) -> Span {
        info_span!(
            "proxy_session",
            kind = self.kind,
            device_id = %self.device_id,
            session_id = %self.session_id
        )
    }

    /// First outcome wins.
    pub fn set_outcome(&mut self, outcome: &'static str) {
        self.outcome.get_or_insert(outcome);
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        let outcome = self.outcome.unwrap_or("client_disconnected");
        if let Some(guard) = self.guard.take() {
            guard.finish(outcome);
        }
        info!(
            kind = self.kind,
            device_id = %self.device_id,
            session_id = %self.session_id,
            outcome,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Proxy session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printfarm_core::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL};

    #[test]
    fn test_first_outcome_is_recorded() {
        let abandoned = SESSIONS_TOTAL.with_label_values(&["tracker_test", "client_disconnected"]);
        let closed = SESSIONS_TOTAL.with_label_values(&["tracker_test", "upstream_closed"]);

        let mut tracker = SessionTracker::start("tracker_test", DeviceId::from("p-1"));
        assert_eq!(tracker.session_id().len(), 12);
        assert_eq!(SESSIONS_ACTIVE.with_label_values(&["tracker_test"]).get(), 1);

        tracker.set_outcome("upstream_closed");
        tracker.set_outcome("stream_corruption");
        drop(tracker);

        assert_eq!(SESSIONS_ACTIVE.with_label_values(&["tracker_test"]).get(), 0);
        assert_eq!(closed.get(), 1);
        assert_eq!(abandoned.get(), 0);
    }

    #[test]
    fn test_drop_without_outcome_counts_as_client_disconnect() {
        let abandoned =
            SESSIONS_TOTAL.with_label_values(&["tracker_abandon_test", "client_disconnected"]);

        drop(SessionTracker::start("tracker_abandon_test", DeviceId::from("p-2")));

        assert_eq!(abandoned.get(), 1);
    }
}
