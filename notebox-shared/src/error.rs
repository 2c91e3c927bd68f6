use std::fmt;

const MIB: usize = 1024 * 1024;

#[derive(Debug)]
pub enum NoteError {
    /// Bad or missing input, e.g. an unknown note type or an empty link
    Validation(String),
    NotFound(String),
    PayloadTooLarge {
        file_name: String,
        limit_bytes: usize,
    },
    /// Disk I/O failure in the uploads directory
    Storage(String),
    /// A file name that could never be valid, e.g. one containing `..`
    InvalidPath(String),
    /// A path that resolved outside of the uploads directory
    Forbidden(String),
    Database(String),
    Configuration(String),
}

impl fmt::Display for NoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteError::Validation(msg) => write!(f, "{msg}"),
            NoteError::NotFound(msg) => write!(f, "{msg}"),
            NoteError::PayloadTooLarge {
                file_name,
                limit_bytes,
            } if *limit_bytes >= MIB => write!(
                f,
                "File {} is too large (max {}MB)",
                file_name,
                limit_bytes / MIB
            ),
            NoteError::PayloadTooLarge {
                file_name,
                limit_bytes,
            } => write!(f, "File {file_name} is too large (max {limit_bytes} bytes)"),
            NoteError::Storage(msg) => write!(f, "Storage error: {msg}"),
            NoteError::InvalidPath(msg) => write!(f, "Invalid filename: {msg}"),
            NoteError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            NoteError::Database(msg) => write!(f, "Database error: {msg}"),
            NoteError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for NoteError {}

impl From<std::io::Error> for NoteError {
    fn from(err: std::io::Error) -> Self {
        NoteError::Storage(err.to_string())
    }
}

impl From<sea_orm::DbErr> for NoteError {
    fn from(err: sea_orm::DbErr) -> Self {
        NoteError::Database(err.to_string())
    }
}
