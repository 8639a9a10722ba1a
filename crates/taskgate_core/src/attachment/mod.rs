//! Attachment storage contract and filesystem implementation.
//!
//! # Responsibility
//! - Store uploaded files for a task and hand back opaque references.
//! - Remove every blob of a task when the task is deleted.
//!
//! # Invariants
//! - Stored file names are sanitized; no upload can escape its task directory.
//! - `delete_all` is idempotent.

use crate::model::task::{truncate_to_millis, AttachmentRef, AttachmentUpload, TaskId};
use chrono::Utc;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_FILE_NAME_CHARS: usize = 120;

static UNSAFE_FILE_NAME_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid file name regex"));

/// Blob storage collaborator for task attachments.
pub trait AttachmentStore {
    /// Stores one upload under `task_id`.
    fn store(
        &self,
        task_id: TaskId,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentRef, AttachmentError>;
    /// Removes one stored blob. Missing blobs are not an error.
    fn remove(&self, attachment: &AttachmentRef) -> Result<(), AttachmentError>;
    /// Removes every blob stored under `task_id`.
    fn delete_all(&self, task_id: TaskId) -> Result<(), AttachmentError>;
}

/// Attachment store failures.
#[derive(Debug)]
pub enum AttachmentError {
    /// File name is empty after sanitizing.
    InvalidFileName(String),
    /// No store configured for an operation that needs one.
    StoreUnavailable,
    Io { path: PathBuf, source: io::Error },
}

impl Display for AttachmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFileName(value) => write!(f, "invalid attachment file name: `{value}`"),
            Self::StoreUnavailable => write!(f, "no attachment store configured"),
            Self::Io { path, source } => {
                write!(f, "attachment i/o failed at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Stores blobs under `<root>/<task_id>/<attachment_id>_<file_name>`.
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    /// Creates the store, creating `root` when missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AttachmentError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| AttachmentError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads back the bytes of one stored attachment.
    pub fn read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, AttachmentError> {
        let path = self.root.join(&attachment.storage_key);
        std::fs::read(&path).map_err(|source| AttachmentError::Io { path, source })
    }

    fn task_dir(&self, task_id: TaskId) -> PathBuf {
        self.root.join(task_id.to_string())
    }
}

impl AttachmentStore for FsAttachmentStore {
    fn store(
        &self,
        task_id: TaskId,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentRef, AttachmentError> {
        let file_name = sanitize_file_name(&upload.file_name)
            .ok_or_else(|| AttachmentError::InvalidFileName(upload.file_name.clone()))?;
        let id = Uuid::new_v4();
        let storage_key = format!("{task_id}/{id}_{file_name}");

        let dir = self.task_dir(task_id);
        std::fs::create_dir_all(&dir).map_err(|source| AttachmentError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = self.root.join(&storage_key);
        std::fs::write(&path, &upload.bytes).map_err(|source| AttachmentError::Io {
            path: path.clone(),
            source,
        })?;

        info!(
            "event=attachment_store module=attachment status=ok task_id={task_id} attachment_id={id} bytes={}",
            upload.bytes.len()
        );
        Ok(AttachmentRef {
            id,
            file_name,
            storage_key,
            uploaded_at: truncate_to_millis(Utc::now()),
        })
    }

    fn remove(&self, attachment: &AttachmentRef) -> Result<(), AttachmentError> {
        let path = self.root.join(&attachment.storage_key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AttachmentError::Io { path, source }),
        }
    }

    fn delete_all(&self, task_id: TaskId) -> Result<(), AttachmentError> {
        let dir = self.task_dir(task_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AttachmentError::Io { path: dir, source }),
        }
    }
}

/// Reduces an uploaded file name to a safe single path component.
///
/// Returns `None` when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let replaced = UNSAFE_FILE_NAME_CHARS_RE.replace_all(base.trim(), "_");
    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return None;
    }
    Some(trimmed.chars().take(MAX_FILE_NAME_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::sanitize_file_name;

    #[test]
    fn keeps_plain_file_names() {
        assert_eq!(sanitize_file_name("report-v2.pdf").as_deref(), Some("report-v2.pdf"));
    }

    #[test]
    fn strips_directories_and_unsafe_characters() {
        assert_eq!(
            sanitize_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\notes final.txt").as_deref(),
            Some("notes_final.txt")
        );
        assert_eq!(sanitize_file_name(".hidden").as_deref(), Some("hidden"));
    }

    #[test]
    fn rejects_names_without_usable_characters() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("../"), None);
        assert_eq!(sanitize_file_name("???"), None);
    }
}
