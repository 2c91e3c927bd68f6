//! Serving uploaded files back out
//!

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use notebox_shared::error::NoteError;
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;
use utoipa::IntoParams;

use crate::db;
use crate::notes::WebError;
use crate::SharedState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FileQuery {
    /// Ask the browser to save the file instead of showing it
    #[serde(default)]
    pub download: bool,
}

/// Quote-safe version of an uploaded file name for `Content-Disposition`
fn disposition_name(file_name: &str) -> String {
    let name: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    match name.trim().is_empty() {
        true => "download".to_string(),
        false => name,
    }
}

fn content_disposition(file_name: &str, download: bool) -> String {
    let kind = match download {
        true => "attachment",
        false => "inline",
    };
    format!("{kind}; filename=\"{}\"", disposition_name(file_name))
}

#[utoipa::path(
    get,
    path = "/files/{filename}",
    tag = "Files",
    params(
        ("filename" = String, Path, description = "Stored name of the upload"),
        FileQuery
    ),
    responses(
        (status = 200, description = "The file contents"),
        (status = 206, description = "Part of the file, for range requests"),
        (status = 400, description = "Filename is not a plain name"),
        (status = 403, description = "Filename resolves outside of the uploads directory"),
        (status = 404, description = "No note references this file")
    )
)]
pub async fn serve_file(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    query: Result<Query<FileQuery>, QueryRejection>,
    request: Request,
) -> Result<Response, WebError> {
    let Query(query) = query?;
    let path = state.uploads.locate(&filename).await?;

    // only files that still belong to a note are reachable
    let note = db::find_note_by_file_path(&state.conn, &filename)
        .await?
        .ok_or_else(|| NoteError::NotFound(format!("File {filename} not found")))?;
    debug!("Serving {} for note {}", filename, note.id);

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);
    if !matches!(
        response.status(),
        StatusCode::OK | StatusCode::PARTIAL_CONTENT
    ) {
        return Ok(response);
    }

    let headers = response.headers_mut();
    if let Some(mime) = note
        .mime_type
        .as_deref()
        .and_then(|mime| HeaderValue::from_str(mime).ok())
    {
        headers.insert(CONTENT_TYPE, mime);
    }
    let file_name = note.file_name.as_deref().unwrap_or(filename.as_str());
    let disposition = HeaderValue::from_str(&content_disposition(file_name, query.download))
        .map_err(|err| {
            WebError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to build Content-Disposition header: {err}"),
            )
        })?;
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    Ok(response)
}
