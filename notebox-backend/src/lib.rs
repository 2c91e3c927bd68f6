pub mod cli;
pub mod db;
pub mod entity;
pub mod files;
pub mod graceful_shutdown;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod migration;
pub mod notes;
pub mod openapi;
pub mod storage;
pub mod uploads;
#[cfg(test)]
mod tests;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use notebox_shared::error::NoteError;
use notes::MAX_FILES_PER_REQUEST;
use sea_orm::DatabaseConnection;
use std::{borrow::Cow, path::PathBuf, sync::Arc, time::Duration};
use tower::{BoxError, ServiceBuilder};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::error;

use crate::{cli::CliOpts, logging::logging_layer, uploads::UploadStore};

/// Room for the form fields and multipart framing on top of the files themselves
const BODY_OVERHEAD: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub conn: DatabaseConnection,
    pub uploads: UploadStore,
    pub static_dir: PathBuf,
}

impl AppState {
    pub async fn new(cli: &CliOpts) -> Result<Self, NoteError> {
        let conn = storage::start_db(Some(&cli::expand_path(&cli.db_path))).await?;
        let uploads =
            UploadStore::open(cli::expand_path(&cli.uploads_dir), cli.max_upload_bytes()).await?;
        Ok(Self {
            conn,
            uploads,
            static_dir: cli::expand_path(&cli.static_dir),
        })
    }

    #[cfg(test)]
    pub async fn test(uploads_dir: &std::path::Path, max_file_bytes: usize) -> Self {
        let conn = storage::start_db(None)
            .await
            .expect("Failed to start test DB");
        let uploads = UploadStore::open(uploads_dir.join("uploads"), max_file_bytes)
            .await
            .expect("Failed to open test upload store");
        Self {
            conn,
            uploads,
            static_dir: uploads_dir.join("static"),
        }
    }

    /// Largest request body the create route accepts
    pub fn max_body_bytes(&self) -> usize {
        self.uploads
            .max_file_bytes()
            .saturating_mul(MAX_FILES_PER_REQUEST)
            .saturating_add(BODY_OVERHEAD)
    }
}

pub fn build_app(shared_state: &SharedState) -> Router {
    let static_service =
        ServeDir::new(&shared_state.static_dir).append_index_html_on_directories(true);

    // Build our application by composing routes
    let router = Router::new()
        .route(
            "/api/notes",
            get(notes::list_notes).post(notes::create_note).layer(
                DefaultBodyLimit::max(shared_state.max_body_bytes()),
            ),
        )
        .route(
            "/api/notes/{id}",
            get(notes::get_note).delete(notes::delete_note),
        )
        .route("/files/{filename}", get(files::serve_file))
        .route("/api/health", get(health::health))
        .merge(openapi::api_route())
        .nest_service("/static", static_service.clone())
        .fallback_service(static_service);

    router
        // Add middleware to all routes
        .layer(
            ServiceBuilder::new()
                .layer(middleware::corslayer())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    |response: &Response<Body>| {
                        if response.status() == StatusCode::OK {
                            "private, no-transform max-age=0".parse().ok()
                        } else {
                            None
                        }
                    },
                ))
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .concurrency_limit(1024)
                .timeout(REQUEST_TIMEOUT)
                .layer(logging_layer()),
        )
        .with_state(shared_state.clone())
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        let msg = "service is overloaded, try again later";
        error!("{}", msg);
        return (StatusCode::SERVICE_UNAVAILABLE, Cow::from(msg));
    }

    let msg = format!("Unhandled internal error: {error}");
    error!("{}", msg);
    (StatusCode::INTERNAL_SERVER_ERROR, Cow::from(msg))
}

#[tokio::test]
async fn test_handle_error() {
    let err = tower::timeout::error::Elapsed::new();
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);

    let err = tower::load_shed::error::Overloaded::new();
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let err = std::io::Error::other("boom");
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
