//! Task domain model.
//!
//! # Responsibility
//! - Define the task record protected by the access policy.
//! - Encode the status state machine and caller-input validation.
//!
//! # Invariants
//! - `assignees` is never empty once a task is persisted.
//! - `created_by` and `assigned_at` are write-once.
//! - `status` never returns to `Pending` once advanced; `Completed` is terminal.
//! - `version == 0` means the task has never been persisted.

use crate::model::principal::PrincipalId;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 255;
/// Maximum label length in characters.
pub const LABEL_MAX_CHARS: usize = 50;

static DOCS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid docs url regex"));

/// Stable identifier of a task.
pub type TaskId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Assigned but not started.
    Pending,
    /// Work has started.
    InProgress,
    /// Terminal state.
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parses a status name case-insensitively.
    ///
    /// `in_progress` also accepts `-`, space or no separator.
    pub fn parse(value: &str) -> Result<Self, TaskValidationError> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            _ => Err(TaskValidationError::InvalidStatus(value.to_string())),
        }
    }

    /// Returns whether `self -> next` is an edge of the status machine.
    ///
    /// Self-edges are permitted no-ops.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Completed)
                | (Self::InProgress, Self::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one stored attachment blob.
///
/// The blob itself is owned by the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: Uuid,
    /// Sanitized original file name.
    pub file_name: String,
    /// Store-specific locator for the blob.
    pub storage_key: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Raw file upload handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Canonical task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    /// Optional reference document URL.
    pub docs: Option<String>,
    /// Creator/assigner. Write-once.
    pub created_by: PrincipalId,
    pub assignees: BTreeSet<PrincipalId>,
    pub deadline: NaiveDate,
    /// Creation time with millisecond precision. Write-once.
    pub assigned_at: DateTime<Utc>,
    pub labels: BTreeSet<String>,
    pub status: TaskStatus,
    pub attachments: Vec<AttachmentRef>,
    /// Storage-managed optimistic concurrency counter.
    pub version: u64,
}

impl Task {
    /// Validates caller-visible invariants before persistence.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(TaskValidationError::TitleTooLong {
                max_chars: TITLE_MAX_CHARS,
            });
        }
        if self.description.trim().is_empty() {
            return Err(TaskValidationError::EmptyDescription);
        }
        if let Some(docs) = self.docs.as_deref() {
            validate_docs_url(docs)?;
        }
        if self.assignees.is_empty() {
            return Err(TaskValidationError::EmptyAssignees);
        }
        for label in &self.labels {
            validate_label(label)?;
        }
        Ok(())
    }

    pub fn is_assigned_to(&self, principal_id: PrincipalId) -> bool {
        self.assignees.contains(&principal_id)
    }

    pub fn is_created_by(&self, principal_id: PrincipalId) -> bool {
        self.created_by == principal_id
    }
}

/// Creation request for a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub docs: Option<String>,
    /// ISO calendar date (`YYYY-MM-DD`).
    pub deadline: String,
    pub assignees: Vec<PrincipalId>,
    pub labels: Vec<String>,
    pub attachments: Vec<AttachmentUpload>,
}

/// Partial update of general task metadata.
///
/// `created_by` and `assigned_at` are accepted only when equal to the stored
/// values; any other value is rejected as an immutable field change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the docs reference.
    pub docs: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub created_by: Option<PrincipalId>,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// Caller-input validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyTitle,
    TitleTooLong { max_chars: usize },
    EmptyDescription,
    InvalidDocsUrl(String),
    EmptyAssignees,
    NonEmployeeAssignee(PrincipalId),
    InvalidDeadline(String),
    InvalidStatus(String),
    InvalidLabel(String),
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title must not be blank"),
            Self::TitleTooLong { max_chars } => {
                write!(f, "task title must be at most {max_chars} characters")
            }
            Self::EmptyDescription => write!(f, "task description must not be blank"),
            Self::InvalidDocsUrl(value) => write!(f, "docs must be an http(s) url: `{value}`"),
            Self::EmptyAssignees => write!(f, "task must be assigned to at least one employee"),
            Self::NonEmployeeAssignee(id) => write!(f, "assignee is not an employee: {id}"),
            Self::InvalidDeadline(value) => {
                write!(f, "deadline must be a calendar date (YYYY-MM-DD): `{value}`")
            }
            Self::InvalidStatus(value) => write!(
                f,
                "unsupported task status `{value}`; expected pending|in_progress|completed"
            ),
            Self::InvalidLabel(value) => write!(f, "invalid label: `{value}`"),
        }
    }
}

impl Error for TaskValidationError {}

/// Parses an ISO calendar date.
///
/// No constraint against the current date is applied.
pub fn parse_deadline(value: &str) -> Result<NaiveDate, TaskValidationError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| TaskValidationError::InvalidDeadline(value.to_string()))
}

/// Normalizes one label: trimmed and lowercased, `None` when blank.
pub fn normalize_label(label: &str) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates labels, dropping blank entries.
pub fn normalize_labels(labels: &[String]) -> BTreeSet<String> {
    labels
        .iter()
        .filter_map(|label| normalize_label(label))
        .collect()
}

/// Splits a comma-separated label list (`"a, b,c"`).
pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(normalize_label)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Truncates a timestamp to the millisecond precision used by storage.
pub fn truncate_to_millis(value: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or(value)
}

fn validate_docs_url(value: &str) -> Result<(), TaskValidationError> {
    if DOCS_URL_RE.is_match(value.trim()) {
        Ok(())
    } else {
        Err(TaskValidationError::InvalidDocsUrl(value.to_string()))
    }
}

fn validate_label(label: &str) -> Result<(), TaskValidationError> {
    if label.trim().is_empty() || label.chars().count() > LABEL_MAX_CHARS || label.contains(',') {
        return Err(TaskValidationError::InvalidLabel(label.to_string()));
    }
    Ok(())
}
