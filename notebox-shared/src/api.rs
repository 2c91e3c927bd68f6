//! Request and response bodies of the HTTP API
//!

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::note::Note;

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 500;
/// SQLite binds offsets as signed 64-bit integers
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// Body of `POST /api/notes` when sent as JSON or urlencoded form
///
/// Multipart requests use the same field names plus file parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateNoteRequest {
    /// `text`, `link` or `file`; detected from the other fields when absent
    #[serde(default)]
    pub note_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// URL of a link note, `content` is used when this is absent
    #[serde(default)]
    pub link: Option<String>,
    /// Comma-separated tags
    #[serde(default)]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring matched against content, tags and filename
    pub search: Option<String>,
    /// 1-based page number, takes precedence over `offset`
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// The slice of the timeline a list request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    pub fn page(&self) -> u64 {
        self.offset / self.limit + 1
    }
}

impl ListQuery {
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    pub fn window(&self) -> PageWindow {
        if self.page.is_some() || self.page_size.is_some() {
            let page_size = clamp_limit(self.page_size.unwrap_or(DEFAULT_LIMIT));
            let page = self.page.unwrap_or(1).max(1);
            PageWindow {
                offset: (page - 1).saturating_mul(page_size).min(MAX_OFFSET),
                limit: page_size,
            }
        } else {
            PageWindow {
                offset: self.offset.unwrap_or(0).min(MAX_OFFSET),
                limit: clamp_limit(self.limit.unwrap_or(DEFAULT_LIMIT)),
            }
        }
    }
}

fn clamp_limit(limit: u64) -> u64 {
    limit.clamp(1, MAX_LIMIT)
}

/// Response of `GET /api/notes`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteList {
    pub items: Vec<Note>,
    /// Number of notes matching the search, ignoring pagination
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub page: u64,
    pub page_size: u64,
    pub has_more: bool,
}

impl NoteList {
    pub fn new(items: Vec<Note>, total: u64, window: PageWindow) -> Self {
        let has_more = window.offset + (items.len() as u64) < total;
        Self {
            items,
            total,
            offset: window.offset,
            limit: window.limit,
            page: window.page(),
            page_size: window.limit,
            has_more,
        }
    }
}

/// Response of `POST /api/notes`, one note per uploaded file
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedNotes {
    pub notes: Vec<Note>,
    pub count: usize,
}

impl From<Vec<Note>> for CreatedNotes {
    fn from(notes: Vec<Note>) -> Self {
        Self {
            count: notes.len(),
            notes,
        }
    }
}

/// Response of `DELETE /api/notes/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeletedNote {
    pub id: i64,
    pub message: String,
    /// `None` when the note had no file attached
    pub file_removed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<String>,
}

/// Response of `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub note_count: u64,
    pub version: String,
}
