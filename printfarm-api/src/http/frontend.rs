//! Optional hosting of the built web frontend

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::http::AppState;

/// Serve `static_dir` at `/`, falling back to its `index.html` for client
/// side routes. Without a frontend, `/` answers with a small JSON banner.
pub fn with_frontend(router: Router<AppState>, static_dir: Option<&str>) -> Router<AppState> {
    match static_dir.map(Path::new).filter(|dir| dir.is_dir()) {
        Some(dir) => {
            info!(dir = %dir.display(), "Serving frontend");
            let index = ServeFile::new(dir.join("index.html"));
            router.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => router.route("/", get(banner)),
    }
}

async fn banner() -> Json<Value> {
    Json(json!({
        "name": "printfarm",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}
