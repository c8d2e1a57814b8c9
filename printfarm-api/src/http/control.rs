//! Control channel WebSocket endpoint

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use printfarm_core::DeviceId;
use printfarm_proxy::{control, SessionTracker};
use tracing::warn;

use crate::http::{AppResult, AppState};

/// GET /devices/{device_id}/control
///
/// The device socket is connected before the client upgrade is accepted;
/// unknown devices are refused with 404 and unreachable ones with 502.
pub async fn control_socket(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let device_id = DeviceId::from_string(device_id);
    let device = state.resolve(&device_id).await?;

    let mut tracker = SessionTracker::start("control", device_id);
    let url = state.endpoints.control_url(&device);
    let upstream = match control::connect_upstream(&url, state.proxy.upstream_timeout()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(
                session_id = tracker.session_id(),
                error = %e,
                "Device control socket unavailable"
            );
            tracker.set_outcome(e.outcome());
            return Err(e.into());
        }
    };

    let cancel = state.shutdown.child_token();
    let close_timeout = state.proxy.control_close_timeout();
    Ok(ws
        .max_message_size(state.proxy.max_control_message_bytes)
        .on_upgrade(move |socket| async move {
            control::run_session(socket, upstream, cancel, close_timeout, tracker).await;
        }))
}
