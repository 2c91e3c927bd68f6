use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use notebox_shared::api::{CreateNoteRequest, CreatedNotes, DeletedNote, ListQuery, NoteList};
use notebox_shared::error::NoteError;
use notebox_shared::note::{non_blank, Note, NoteBody, NoteType, StoredFile};
use tracing::{debug, error, warn};

use crate::db::{self, NewNote};
use crate::uploads::UploadStore;
use crate::SharedState;

/// Upper bound on file parts in a single create request
pub const MAX_FILES_PER_REQUEST: usize = 10;

#[derive(Debug)]
pub struct WebError {
    status: StatusCode,
    message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        WebError {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: String) -> Self {
        WebError {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        let mut response = axum::response::Response::new(body.to_string().into());
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

impl From<NoteError> for WebError {
    fn from(err: NoteError) -> Self {
        let status = match &err {
            NoteError::Validation(_) | NoteError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            NoteError::Forbidden(_) => StatusCode::FORBIDDEN,
            NoteError::NotFound(_) => StatusCode::NOT_FOUND,
            NoteError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NoteError::Storage(_) | NoteError::Database(_) | NoteError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("{}", err);
        }
        WebError::new(status, err.to_string())
    }
}

impl From<MultipartError> for WebError {
    fn from(err: MultipartError) -> Self {
        // keeps the 413 when the body limit kicks in half way through a part
        debug!("Failed to read multipart body: {:?}", err);
        WebError::new(err.status(), err.body_text())
    }
}

macro_rules! from_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for WebError {
                fn from(rejection: $rejection) -> Self {
                    WebError::new(rejection.status(), rejection.body_text())
                }
            }
        )*
    };
}

from_rejection!(
    FormRejection,
    JsonRejection,
    MultipartRejection,
    PathRejection,
    QueryRejection
);

/// A file part read from a multipart body, not yet on disk
#[derive(Debug)]
struct UploadedPart {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// Everything a create request carried, whatever its encoding
#[derive(Debug, Default)]
struct Submission {
    fields: CreateNoteRequest,
    files: Vec<UploadedPart>,
}

impl Submission {
    /// Work out which kind of note this is, detecting it when not given
    fn note_type(&self) -> Result<NoteType, NoteError> {
        if let Some(note_type) = non_blank(self.fields.note_type.clone()) {
            return note_type.parse();
        }

        if !self.files.is_empty() {
            Ok(NoteType::File)
        } else if non_blank(self.fields.link.clone()).is_some() {
            Ok(NoteType::Link)
        } else if non_blank(self.fields.content.clone()).is_some() {
            Ok(NoteType::Text)
        } else {
            Err(NoteError::Validation(
                "Provide content, a link or at least one file".to_string(),
            ))
        }
    }
}

async fn read_multipart(
    mut multipart: Multipart,
    uploads: &UploadStore,
) -> Result<Submission, WebError> {
    let mut submission = Submission::default();

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        if let Some(file_name) = field.file_name().map(ToString::to_string) {
            // browsers send an empty part when no file was picked
            if file_name.is_empty() {
                debug!("Skipping empty file field {}", field_name);
                continue;
            }
            if submission.files.len() >= MAX_FILES_PER_REQUEST {
                return Err(NoteError::Validation(format!(
                    "At most {MAX_FILES_PER_REQUEST} files can be uploaded at once"
                ))
                .into());
            }

            let content_type = field.content_type().map(ToString::to_string);
            let mut data = Vec::new();
            while let Some(chunk) = field.chunk().await? {
                uploads.check_size(&file_name, data.len() + chunk.len())?;
                data.extend_from_slice(&chunk);
            }
            debug!(
                "Read file field {}: {:?} ({} bytes, {:?})",
                field_name,
                file_name,
                data.len(),
                content_type
            );

            submission.files.push(UploadedPart {
                file_name,
                content_type,
                data,
            });
            continue;
        }

        let value = field.text().await?;
        match field_name.as_str() {
            "note_type" => submission.fields.note_type = Some(value),
            "content" => submission.fields.content = Some(value),
            "link" => submission.fields.link = Some(value),
            "tags" => submission.fields.tags = Some(value),
            _ => debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    Ok(submission)
}

/// Pull the submission out of whichever body encoding the client used
async fn read_submission(state: &SharedState, request: Request) -> Result<Submission, WebError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state).await?;
        read_multipart(multipart, &state.uploads).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<CreateNoteRequest>::from_request(request, state).await?;
        Ok(Submission {
            fields,
            files: Vec::new(),
        })
    } else {
        let Json(fields) = Json::<CreateNoteRequest>::from_request(request, state).await?;
        Ok(Submission {
            fields,
            files: Vec::new(),
        })
    }
}

/// Write every file to disk, undoing the lot if one of them fails
async fn store_files(
    uploads: &UploadStore,
    files: Vec<UploadedPart>,
) -> Result<Vec<StoredFile>, NoteError> {
    for part in &files {
        uploads.check_size(&part.file_name, part.data.len())?;
    }

    let mut stored = Vec::with_capacity(files.len());
    for part in files {
        match uploads
            .store(&part.file_name, part.content_type.as_deref(), &part.data)
            .await
        {
            Ok(file) => stored.push(file),
            Err(err) => {
                discard_files(uploads, &stored).await;
                return Err(err);
            }
        }
    }
    Ok(stored)
}

async fn discard_files(uploads: &UploadStore, files: &[StoredFile]) {
    for file in files {
        if let Err(err) = uploads.remove(&file.file_path).await {
            warn!("Failed to clean up upload {}: {}", file.file_path, err);
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/notes",
    tag = "Notes",
    request_body(
        content = CreateNoteRequest,
        description = "JSON, urlencoded form, or multipart with any number of file parts"
    ),
    responses(
        (status = 201, description = "Notes created, one per uploaded file", body = CreatedNotes),
        (status = 400, description = "Invalid note"),
        (status = 413, description = "A file is over the upload limit")
    )
)]
pub async fn create_note(
    State(state): State<SharedState>,
    request: Request,
) -> Result<(StatusCode, Json<CreatedNotes>), WebError> {
    let submission = read_submission(&state, request).await?;
    let note_type = submission.note_type()?;
    let Submission { fields, files } = submission;
    if note_type != NoteType::File && !files.is_empty() {
        debug!("Ignoring {} file(s) sent with a {} note", files.len(), note_type);
    }

    let mut stored = Vec::new();
    let new_notes = match note_type {
        NoteType::Text => {
            let body = NoteBody::text(fields.content.clone().unwrap_or_default())?;
            vec![NewNote::new(body, fields.tags.clone())]
        }
        NoteType::Link => {
            let url = non_blank(fields.link.clone())
                .or_else(|| fields.content.clone())
                .unwrap_or_default();
            vec![NewNote::new(NoteBody::link(&url)?, fields.tags.clone())]
        }
        NoteType::File => {
            if files.is_empty() {
                return Err(NoteError::Validation(
                    "A file note needs at least one file".to_string(),
                )
                .into());
            }
            stored = store_files(&state.uploads, files).await?;
            stored
                .iter()
                .cloned()
                .map(|file| {
                    NewNote::new(
                        NoteBody::file(fields.content.clone(), file),
                        fields.tags.clone(),
                    )
                })
                .collect()
        }
    };

    let saved = match db::insert_notes(&state.conn, new_notes).await {
        Ok(saved) => saved,
        Err(err) => {
            error!("Failed to save notes: {}", err);
            discard_files(&state.uploads, &stored).await;
            return Err(err.into());
        }
    };
    debug!("Created {} {} note(s)", saved.len(), note_type);

    let notes: Vec<Note> = saved.into_iter().map(Note::from).collect();
    Ok((StatusCode::CREATED, Json(CreatedNotes::from(notes))))
}

#[utoipa::path(
    get,
    path = "/api/notes",
    tag = "Notes",
    params(ListQuery),
    responses(
        (status = 200, description = "Notes, newest first", body = NoteList),
        (status = 400, description = "Invalid query")
    )
)]
pub async fn list_notes(
    State(state): State<SharedState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<NoteList>, WebError> {
    let Query(query) = query?;
    let window = query.window();

    let (items, total) = db::list_notes(&state.conn, query.search_term(), window).await?;
    let items = items.into_iter().map(Note::from).collect();

    Ok(Json(NoteList::new(items, total, window)))
}

#[utoipa::path(
    get,
    path = "/api/notes/{id}",
    tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses(
        (status = 200, description = "The note", body = Note),
        (status = 400, description = "Id is not a number"),
        (status = 404, description = "No such note")
    )
)]
pub async fn get_note(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Note>, WebError> {
    let Path(id) = id?;
    match db::find_note(&state.conn, id).await? {
        Some(model) => Ok(Json(model.into())),
        None => Err(WebError::not_found(format!("Note {id} not found"))),
    }
}

#[utoipa::path(
    delete,
    path = "/api/notes/{id}",
    tag = "Notes",
    params(("id" = i64, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note deleted", body = DeletedNote),
        (status = 400, description = "Id is not a number"),
        (status = 404, description = "No such note")
    )
)]
pub async fn delete_note(
    State(state): State<SharedState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeletedNote>, WebError> {
    let Path(id) = id?;
    let Some(model) = db::delete_note(&state.conn, id).await? else {
        return Err(WebError::not_found(format!("Note {id} not found")));
    };
    debug!("Deleted note {}", id);

    let mut response = DeletedNote {
        id,
        message: format!("Note {id} deleted"),
        file_removed: None,
        warning: None,
    };

    // the row is already gone, a file left behind is only worth a warning
    if let Some(file_path) = model.file_path.as_deref() {
        match state.uploads.remove(file_path).await {
            Ok(()) => response.file_removed = Some(true),
            Err(err) => {
                warn!("Note {} deleted but its file {} was not: {}", id, file_path, err);
                response.file_removed = Some(false);
                response.warning = Some(format!("The attached file could not be removed: {err}"));
            }
        }
    }

    Ok(Json(response))
}
