//! HTTP surface of the printer farm proxy

pub mod http;

pub use http::{create_router, AppState};
