//! Axum middleware things
//!

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// The app is meant for a trusted LAN, so any device on it may call the API
pub fn corslayer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any)
}
