//! On-disk storage of uploaded files
//!
//! Every upload gets a fresh UUID based name, so nothing a client sends ends up in a path except
//! a sanitised extension. Reads and deletes go through [`UploadStore::locate`], which refuses
//! anything that would resolve outside of the uploads root.

use std::path::{Component, Path, PathBuf};

use notebox_shared::error::NoteError;
use notebox_shared::note::StoredFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Clone, Debug)]
pub struct UploadStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl UploadStore {
    /// Create the uploads directory if needed and pin its canonical location
    pub async fn open(root: impl AsRef<Path>, max_file_bytes: usize) -> Result<Self, NoteError> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root).await.map_err(|err| {
            NoteError::Configuration(format!(
                "Failed to create uploads directory {}: {err}",
                root.display()
            ))
        })?;
        let root = tokio::fs::canonicalize(root).await?;
        debug!("Upload directory: {}", root.display());

        Ok(Self {
            root,
            max_file_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    pub fn check_size(&self, file_name: &str, len: usize) -> Result<(), NoteError> {
        if len > self.max_file_bytes {
            return Err(NoteError::PayloadTooLarge {
                file_name: file_name.to_string(),
                limit_bytes: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Write an upload under a generated name
    pub async fn store(
        &self,
        original_name: &str,
        declared_mime: Option<&str>,
        data: &[u8],
    ) -> Result<StoredFile, NoteError> {
        self.check_size(original_name, data.len())?;

        let stored_name = generated_name(original_name);
        let path = self.root.join(&stored_name);

        // create_new: a name clash must never overwrite somebody else's file
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        if let Err(err) = write_all(&mut file, data).await {
            drop(file);
            discard_partial(&path).await;
            return Err(err.into());
        }

        debug!(
            "Stored {} bytes of {:?} as {}",
            data.len(),
            original_name,
            stored_name
        );

        Ok(StoredFile {
            file_name: original_name.to_string(),
            file_path: stored_name,
            mime_type: detect_mime(declared_mime, data),
            size: data.len() as u64,
        })
    }

    /// Resolve a stored name to a canonical path inside the root
    pub async fn locate(&self, name: &str) -> Result<PathBuf, NoteError> {
        let candidate = self.root.join(validate_name(name)?);

        let canonical = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(NoteError::NotFound(format!("File {name} not found")))
            }
            Err(err) => return Err(err.into()),
        };

        // a symlink inside the root can still point elsewhere
        if !canonical.starts_with(&self.root) {
            return Err(NoteError::Forbidden(format!(
                "{name} resolves outside of the uploads directory"
            )));
        }
        if !canonical.is_file() {
            return Err(NoteError::NotFound(format!("File {name} not found")));
        }

        Ok(canonical)
    }

    pub async fn remove(&self, name: &str) -> Result<(), NoteError> {
        let path = self.locate(name).await?;
        tokio::fs::remove_file(&path).await?;
        debug!("Removed upload {}", path.display());
        Ok(())
    }
}

/// Best-effort removal of a file whose write failed half way
async fn discard_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(
            "Failed to remove partially written upload {}: {}",
            path.display(),
            err
        );
    }
}

async fn write_all(file: &mut tokio::fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await
}

/// Reject names that could point anywhere but directly into the root
fn validate_name(name: &str) -> Result<&str, NoteError> {
    if name.is_empty() {
        return Err(NoteError::InvalidPath("empty filename".to_string()));
    }
    if name.contains(['/', '\\', '\0']) || name.contains("..") {
        return Err(NoteError::InvalidPath(name.to_string()));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(NoteError::InvalidPath(name.to_string())),
    }
}

/// `<uuid>.<ext>`, keeping a sanitised version of the original extension
fn generated_name(original_name: &str) -> String {
    let id = Uuid::new_v4();
    match sanitized_extension(original_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn sanitized_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Prefer what the client declared, unless it's missing or the generic fallback
fn detect_mime(declared: Option<&str>, data: &[u8]) -> String {
    let declared = declared
        .map(str::trim)
        .filter(|mime| !mime.is_empty() && *mime != FALLBACK_MIME)
        .filter(|mime| mime.contains('/') && mime.chars().all(|c| c.is_ascii_graphic() || c == ' '));

    match declared {
        Some(mime) => mime.to_string(),
        None => infer::get(data)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| FALLBACK_MIME.to_string()),
    }
}
