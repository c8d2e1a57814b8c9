//! Video stream and static resource endpoints

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use printfarm_core::DeviceId;
use printfarm_proxy::SessionTracker;

use crate::http::{AppError, AppResult, AppState};

/// GET /devices/{device_id}/video
///
/// The upstream stream is opened before the response starts, so an
/// unreachable device is still reported as 502. The body ends on server
/// shutdown so graceful shutdown is not held up by viewers.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Response> {
    let device_id = DeviceId::from_string(device_id);
    let device = state.resolve(&device_id).await?;

    let url = state.endpoints.video_url(&device);
    let stream = state
        .video
        .open(
            &url,
            SessionTracker::start("video", device_id),
            state.shutdown.child_token(),
        )
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, state.video.content_type())
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::internal(format!("Failed to build video response: {e}")))
}

/// GET /devices/{device_id}/resource/{resource_id}
pub async fn fetch_resource(
    State(state): State<AppState>,
    Path((device_id, resource_id)): Path<(String, String)>,
) -> AppResult<Response> {
    proxy_resource(&state, DeviceId::from_string(device_id), &resource_id).await
}

/// GET /printers/{device_id}/board-resource/history_image/{file}
///
/// Older frontends address history images by file name; `{task_id}.png`
/// maps onto resource `task_id`.
pub async fn fetch_history_image(
    State(state): State<AppState>,
    Path((device_id, file)): Path<(String, String)>,
) -> AppResult<Response> {
    let Some(resource_id) = file.strip_suffix(".png") else {
        return Err(AppError::not_found(format!("No history image named {file}")));
    };
    proxy_resource(&state, DeviceId::from_string(device_id), resource_id).await
}

async fn proxy_resource(
    state: &AppState,
    device_id: DeviceId,
    resource_id: &str,
) -> AppResult<Response> {
    let device = state.resolve(&device_id).await?;

    let url = state.endpoints.resource_url(&device, resource_id)?;
    let resource = state
        .fetcher
        .fetch(&url, SessionTracker::start("resource", device_id))
        .await?;

    Ok(([(header::CONTENT_TYPE, resource.content_type)], resource.body).into_response())
}
