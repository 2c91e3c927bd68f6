//! Logging things
//!

use std::time::Duration;

use axum::extract::MatchedPath;
use axum::http::{header::CONTENT_LENGTH, Request};
use axum::response::Response;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{MakeSpan, OnRequest, OnResponse, TraceLayer},
};
use tracing::{debug, info, trace, warn, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` isn't set
pub fn default_filter(debug: bool) -> &'static str {
    match debug {
        true => "notebox=debug,notebox_backend=debug,tower_http=debug",
        false => "notebox=info,notebox_backend=info,tower_http=info",
    }
}

pub fn init_tracing(debug: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(debug).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

const NOTE_ROUTE: &str = "/api/notes/{id}";

/// The route template a request matched, `-` when it fell through to static files
fn route_of<B>(request: &Request<B>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or("-")
}

/// Note id out of `/api/notes/{id}` requests, so a note's history can be grepped for
fn note_id_of(route: &str, path: &str) -> Option<i64> {
    if route != NOTE_ROUTE {
        return None;
    }
    path.rsplit('/').next()?.parse().ok()
}

/// Builds one span per request and fills in the outcome once the response is ready
#[derive(Copy, Clone)]
pub(crate) struct NoteSpanner {}

impl<B> MakeSpan<B> for NoteSpanner {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let route = route_of(request);
        let span = tracing::info_span!(
            "request",
            method = %request.method(),
            route = %route,
            path = %request.uri().path(),
            note_id = tracing::field::Empty,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            bytes = tracing::field::Empty
        );
        if let Some(id) = note_id_of(route, request.uri().path()) {
            span.record("note_id", id);
        }
        span
    }
}

impl<B> OnRequest<B> for NoteSpanner {
    fn on_request(&mut self, _request: &Request<B>, _span: &Span) {
        trace!("request received");
    }
}

impl<B> OnResponse<B> for NoteSpanner {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record("status", status.as_u16());
        span.record("latency_ms", latency.as_millis() as u64);
        if let Some(bytes) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
        {
            span.record("bytes", bytes);
        }

        if status.is_server_error() {
            warn!("request failed");
        } else if status.is_client_error() {
            debug!("request rejected");
        } else {
            info!("response sent");
        }
    }
}

pub(crate) fn logging_layer(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, NoteSpanner, NoteSpanner, NoteSpanner> {
    TraceLayer::new_for_http()
        .on_request(NoteSpanner {})
        .make_span_with(NoteSpanner {})
        .on_response(NoteSpanner {})
}
