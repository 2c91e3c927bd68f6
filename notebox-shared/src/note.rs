//! Note-related schema
//!

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::NoteError;

/// The kind of a note, stored as lowercase text in the `note_type` column
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[sea_orm(string_value = "text")]
    Text,
    #[sea_orm(string_value = "link")]
    Link,
    #[sea_orm(string_value = "file")]
    File,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Text => "text",
            NoteType::Link => "link",
            NoteType::File => "file",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(NoteType::Text),
            "link" => Ok(NoteType::Link),
            "file" => Ok(NoteType::File),
            other => Err(NoteError::Validation(format!(
                "Invalid note_type '{other}', expected one of: text, link, file"
            ))),
        }
    }
}

/// What the upload store hands back after writing a file to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Name the file had on the client
    pub file_name: String,
    /// Generated name, relative to the uploads directory
    pub file_path: String,
    pub mime_type: String,
    pub size: u64,
}

/// Validated payload of a note, one variant per [`NoteType`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteBody {
    Text(String),
    Link(String),
    File {
        caption: Option<String>,
        file: StoredFile,
    },
}

impl NoteBody {
    pub fn text(content: impl Into<String>) -> Result<Self, NoteError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(NoteError::Validation(
                "A text note needs some content".to_string(),
            ));
        }
        Ok(NoteBody::Text(content))
    }

    pub fn link(url: &str) -> Result<Self, NoteError> {
        let url = clean_url_value(url);
        if url.is_empty() {
            return Err(NoteError::Validation(
                "A link note needs a URL".to_string(),
            ));
        }
        Ok(NoteBody::Link(url))
    }

    pub fn file(caption: Option<String>, file: StoredFile) -> Self {
        NoteBody::File {
            caption: non_blank(caption),
            file,
        }
    }

    pub fn note_type(&self) -> NoteType {
        match self {
            NoteBody::Text(_) => NoteType::Text,
            NoteBody::Link(_) => NoteType::Link,
            NoteBody::File { .. } => NoteType::File,
        }
    }
}

/// A note as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Note {
    pub id: i64,
    pub note_type: NoteType,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
    pub tags: Option<String>,
    /// `tags` split on commas, trimmed, empties dropped
    #[serde(default)]
    pub tag_list: Vec<String>,
    /// Where the attached file can be fetched from
    #[serde(default)]
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Split a comma-separated tag string
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Turn blank strings into `None`, leave everything else untouched
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Public URL of a stored upload
pub fn file_url(file_path: &str) -> String {
    format!("/files/{file_path}")
}

/// Zero-width characters and directional isolates that sneak into pasted links
fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{2066}'..='\u{2069}')
}

/// Strip invisible formatting characters from a pasted URL, then trim it
pub fn clean_url_value(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| !is_invisible(*c)).collect();
    cleaned.trim().to_string()
}
