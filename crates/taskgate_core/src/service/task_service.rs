//! Task lifecycle use-case service.
//!
//! # Responsibility
//! - Authorize every task operation through `AccessPolicy`.
//! - Apply mutations while enforcing the invariants the policy cannot express
//!   (status machine, write-once fields, employee-only assignment).
//! - Publish change events after the repository write succeeded.
//!
//! # Invariants
//! - Existence is checked before authorization.
//! - `created_by` and `assigned_at` never change after `create`.
//! - Only newly added assignees are notified on reassignment.
//! - Notification failures never fail a mutation.

use crate::attachment::{AttachmentError, AttachmentStore};
use crate::config::{EngineConfig, ExistenceDisclosure};
use crate::model::principal::{Principal, PrincipalId, Role};
use crate::model::task::{
    normalize_labels, parse_deadline, truncate_to_millis, AttachmentRef, AttachmentUpload, Task,
    TaskDraft, TaskId, TaskPatch, TaskStatus, TaskValidationError,
};
use crate::notify::dispatcher::EventSink;
use crate::notify::event::TaskEvent;
use crate::policy::access::{AccessPolicy, Operation};
use crate::repo::principal_repo::PrincipalDirectory;
use crate::repo::task_repo::{TaskOrder, TaskQuery, TaskRepository};
use crate::repo::RepoError;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for task use-cases.
#[derive(Debug)]
pub enum TaskServiceError {
    /// Target task does not exist (or is concealed from the caller).
    NotFound(TaskId),
    /// Referenced assignee is not a known principal.
    PrincipalNotFound(PrincipalId),
    /// Malformed caller input.
    Validation(TaskValidationError),
    /// Attempt to change a write-once field.
    ImmutableField(&'static str),
    /// Status change outside the status machine.
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    /// Access policy denied the operation.
    Unauthorized {
        principal: PrincipalId,
        operation: Operation,
    },
    /// Task changed since it was loaded.
    Conflict(TaskId),
    Attachment(AttachmentError),
    Repo(RepoError),
}

impl Display for TaskServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::PrincipalNotFound(id) => write!(f, "principal not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::ImmutableField(field) => write!(f, "field `{field}` cannot be changed"),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid status transition from `{from}` to `{to}`")
            }
            Self::Unauthorized {
                principal,
                operation,
            } => write!(f, "principal {principal} is not allowed to {operation}"),
            Self::Conflict(id) => write!(f, "task {id} was modified concurrently"),
            Self::Attachment(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaskServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Attachment(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaskServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Conflict { id, .. } => Self::Conflict(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<TaskValidationError> for TaskServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<AttachmentError> for TaskServiceError {
    fn from(value: AttachmentError) -> Self {
        Self::Attachment(value)
    }
}

pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Caller-facing listing filter.
///
/// Raw strings are parsed by the service so malformed input surfaces as
/// `TaskServiceError::Validation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Status name, matched case-insensitively.
    pub status: Option<String>,
    /// Inclusive deadline bound (`YYYY-MM-DD`).
    pub deadline_on_or_before: Option<String>,
    pub order: TaskOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Listing result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPage {
    pub items: Vec<Task>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
}

/// Task lifecycle engine over injected collaborators.
pub struct TaskService<R: TaskRepository, P: PrincipalDirectory> {
    repo: R,
    principals: P,
    policy: AccessPolicy,
    config: EngineConfig,
    attachments: Option<Box<dyn AttachmentStore>>,
    events: Box<dyn EventSink>,
}

impl<R: TaskRepository, P: PrincipalDirectory> TaskService<R, P> {
    /// Creates a service with default configuration and no attachment store.
    pub fn new(repo: R, principals: P, events: Box<dyn EventSink>) -> Self {
        let config = EngineConfig::default();
        Self {
            repo,
            principals,
            policy: AccessPolicy::new(config.manager_read_scope),
            config,
            attachments: None,
            events,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.policy = AccessPolicy::new(config.manager_read_scope);
        self.config = config;
        self
    }

    pub fn with_attachment_store(mut self, store: Box<dyn AttachmentStore>) -> Self {
        self.attachments = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Creates a task on behalf of `principal`.
    ///
    /// Draft uploads are stored before the task row is written and removed
    /// again when the write fails.
    pub fn create(&self, principal: &Principal, draft: TaskDraft) -> TaskServiceResult<Task> {
        self.authorize(principal, Operation::Create, None)?;

        let deadline = parse_deadline(&draft.deadline)?;
        let assignees = self.resolve_assignees(&draft.assignees)?;
        let mut task = Task {
            id: Uuid::new_v4(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            docs: normalize_docs(draft.docs),
            created_by: principal.id,
            assignees,
            deadline,
            assigned_at: truncate_to_millis(Utc::now()),
            labels: normalize_labels(&draft.labels),
            status: TaskStatus::Pending,
            attachments: Vec::new(),
            version: 0,
        };
        task.validate()?;

        if !draft.attachments.is_empty() {
            task.attachments = self.store_uploads(task.id, &draft.attachments)?;
        }

        let saved = match self.repo.save_task(&task) {
            Ok(saved) => saved,
            Err(err) => {
                if !task.attachments.is_empty() {
                    self.discard_task_blobs(task.id);
                }
                return Err(err.into());
            }
        };

        info!(
            "event=task_create module=service status=ok task_id={} principal_id={} assignees={} attachments={}",
            saved.id,
            principal.id,
            saved.assignees.len(),
            saved.attachments.len()
        );
        self.events.publish(TaskEvent::TaskCreated {
            task_id: saved.id,
            task_title: saved.title.clone(),
            assigned_by: principal.id,
            assignees: saved.assignees.clone(),
        });
        Ok(saved)
    }

    /// Loads one task the principal may read.
    pub fn get(&self, principal: &Principal, task_id: TaskId) -> TaskServiceResult<Task> {
        self.load_authorized(principal, task_id, Operation::Read)
    }

    /// Lists tasks visible to `principal`.
    pub fn list(&self, principal: &Principal, filter: &TaskFilter) -> TaskServiceResult<TaskPage> {
        let status = non_blank(filter.status.as_deref())
            .map(TaskStatus::parse)
            .transpose()?;
        let deadline_on_or_before = non_blank(filter.deadline_on_or_before.as_deref())
            .map(parse_deadline)
            .transpose()?;
        let applied_limit = self.config.normalize_limit(filter.limit);

        let query = TaskQuery {
            visibility: self.policy.visibility(principal),
            status,
            deadline_on_or_before,
            order: filter.order,
            limit: Some(applied_limit),
            offset: filter.offset,
        };
        let items = self.repo.query_tasks(&query)?;
        debug!(
            "event=task_list module=service status=ok principal_id={} role={} count={} limit={applied_limit} offset={}",
            principal.id,
            principal.role,
            items.len(),
            filter.offset
        );
        Ok(TaskPage {
            items,
            applied_limit,
        })
    }

    /// Loads and authorizes the task, then parses `status` and applies it.
    pub fn update_status(
        &self,
        principal: &Principal,
        task_id: TaskId,
        status: &str,
    ) -> TaskServiceResult<Task> {
        let task = self.load_authorized(principal, task_id, Operation::UpdateStatus)?;
        let status = TaskStatus::parse(status)?;
        self.apply_transition(principal, task, status)
    }

    /// Moves a task along the status machine.
    ///
    /// A transition to the current status succeeds without writing.
    pub fn transition_status(
        &self,
        principal: &Principal,
        task_id: TaskId,
        status: TaskStatus,
    ) -> TaskServiceResult<Task> {
        let task = self.load_authorized(principal, task_id, Operation::UpdateStatus)?;
        self.apply_transition(principal, task, status)
    }

    pub fn mark_complete(&self, principal: &Principal, task_id: TaskId) -> TaskServiceResult<Task> {
        self.transition_status(principal, task_id, TaskStatus::Completed)
    }

    fn apply_transition(
        &self,
        principal: &Principal,
        mut task: Task,
        status: TaskStatus,
    ) -> TaskServiceResult<Task> {
        let previous = task.status;
        if previous == status {
            return Ok(task);
        }
        if !previous.can_transition_to(status) {
            return Err(TaskServiceError::InvalidTransition {
                from: previous,
                to: status,
            });
        }

        task.status = status;
        let saved = self.repo.save_task(&task)?;
        info!(
            "event=task_update module=service status=ok field=status task_id={} principal_id={} from={previous} to={status} version={}",
            saved.id, principal.id, saved.version
        );
        Ok(saved)
    }

    /// Replaces the deadline. Past dates are accepted.
    pub fn update_deadline(
        &self,
        principal: &Principal,
        task_id: TaskId,
        deadline: &str,
    ) -> TaskServiceResult<Task> {
        let mut task = self.load_authorized(principal, task_id, Operation::UpdateDeadline)?;
        let deadline = parse_deadline(deadline)?;
        if task.deadline == deadline {
            return Ok(task);
        }

        task.deadline = deadline;
        let saved = self.repo.save_task(&task)?;
        info!(
            "event=task_update module=service status=ok field=deadline task_id={task_id} principal_id={} version={}",
            principal.id, saved.version
        );
        Ok(saved)
    }

    /// Replaces the assignee set and notifies only newly added assignees.
    pub fn update_assignees(
        &self,
        principal: &Principal,
        task_id: TaskId,
        assignees: Vec<PrincipalId>,
    ) -> TaskServiceResult<Task> {
        let mut task = self.load_authorized(principal, task_id, Operation::UpdateAssignees)?;
        let assignees = self.resolve_assignees(&assignees)?;
        if task.assignees == assignees {
            return Ok(task);
        }

        let added: BTreeSet<PrincipalId> =
            assignees.difference(&task.assignees).copied().collect();
        let removed = task.assignees.difference(&assignees).count();
        task.assignees = assignees;
        let saved = self.repo.save_task(&task)?;
        info!(
            "event=task_update module=service status=ok field=assignees task_id={task_id} principal_id={} added={} removed={removed} version={}",
            principal.id,
            added.len(),
            saved.version
        );

        if !added.is_empty() {
            self.events.publish(TaskEvent::AssigneesAdded {
                task_id: saved.id,
                task_title: saved.title.clone(),
                assigned_by: principal.id,
                added,
            });
        }
        Ok(saved)
    }

    /// Applies a partial metadata update.
    ///
    /// Write-once fields are accepted only with their stored value.
    pub fn update_general(
        &self,
        principal: &Principal,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> TaskServiceResult<Task> {
        let mut task = self.load_authorized(principal, task_id, Operation::UpdateGeneral)?;

        if patch
            .created_by
            .is_some_and(|created_by| created_by != task.created_by)
        {
            return Err(TaskServiceError::ImmutableField("created_by"));
        }
        if patch
            .assigned_at
            .is_some_and(|assigned_at| truncate_to_millis(assigned_at) != task.assigned_at)
        {
            return Err(TaskServiceError::ImmutableField("assigned_at"));
        }

        let mut changed: Vec<&'static str> = Vec::new();
        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title != task.title {
                task.title = title;
                changed.push("title");
            }
        }
        if let Some(description) = patch.description {
            let description = description.trim().to_string();
            if description != task.description {
                task.description = description;
                changed.push("description");
            }
        }
        if let Some(docs) = patch.docs {
            let docs = normalize_docs(docs);
            if docs != task.docs {
                task.docs = docs;
                changed.push("docs");
            }
        }
        if let Some(labels) = patch.labels {
            let labels = normalize_labels(&labels);
            if labels != task.labels {
                task.labels = labels;
                changed.push("labels");
            }
        }

        if changed.is_empty() {
            return Ok(task);
        }
        task.validate()?;
        let saved = self.repo.save_task(&task)?;
        info!(
            "event=task_update module=service status=ok field=general fields={} task_id={task_id} principal_id={} version={}",
            changed.join(","),
            principal.id,
            saved.version
        );
        Ok(saved)
    }

    /// Stores one upload and appends it to the task's attachments.
    pub fn attach_file(
        &self,
        principal: &Principal,
        task_id: TaskId,
        upload: AttachmentUpload,
    ) -> TaskServiceResult<Task> {
        let mut task = self.load_authorized(principal, task_id, Operation::UpdateGeneral)?;
        let store = self.attachment_store()?;
        let attachment = store.store(task_id, &upload)?;
        task.attachments.push(attachment.clone());

        match self.repo.save_task(&task) {
            Ok(saved) => {
                info!(
                    "event=task_update module=service status=ok field=attachments task_id={task_id} principal_id={} attachment_id={} version={}",
                    principal.id, attachment.id, saved.version
                );
                Ok(saved)
            }
            Err(err) => {
                self.discard_blob(task_id, &attachment);
                Err(err.into())
            }
        }
    }

    /// Hard-deletes a task and its attachment blobs.
    pub fn delete(&self, principal: &Principal, task_id: TaskId) -> TaskServiceResult<()> {
        let task = self.load_authorized(principal, task_id, Operation::Delete)?;
        self.repo.delete_task(task_id)?;
        info!(
            "event=task_delete module=service status=ok task_id={task_id} principal_id={} attachments={}",
            principal.id,
            task.attachments.len()
        );
        if self.attachments.is_some() {
            self.discard_task_blobs(task_id);
        }
        Ok(())
    }

    fn load_authorized(
        &self,
        principal: &Principal,
        task_id: TaskId,
        operation: Operation,
    ) -> TaskServiceResult<Task> {
        let task = self
            .repo
            .get_task(task_id)?
            .ok_or(TaskServiceError::NotFound(task_id))?;
        self.authorize(principal, operation, Some(&task))?;
        Ok(task)
    }

    fn authorize(
        &self,
        principal: &Principal,
        operation: Operation,
        task: Option<&Task>,
    ) -> TaskServiceResult<()> {
        if self.policy.decide(principal, operation, task).is_allowed() {
            return Ok(());
        }

        let task_id = task.map_or_else(|| "-".to_string(), |task| task.id.to_string());
        warn!(
            "event=access_denied module=service status=denied principal_id={} role={} operation={operation} task_id={task_id}",
            principal.id, principal.role
        );

        // A caller that can read the task already knows it exists.
        if let Some(task) = task {
            if self.config.existence_disclosure == ExistenceDisclosure::Conceal
                && !self
                    .policy
                    .decide(principal, Operation::Read, Some(task))
                    .is_allowed()
            {
                return Err(TaskServiceError::NotFound(task.id));
            }
        }
        Err(TaskServiceError::Unauthorized {
            principal: principal.id,
            operation,
        })
    }

    fn resolve_assignees(
        &self,
        assignees: &[PrincipalId],
    ) -> TaskServiceResult<BTreeSet<PrincipalId>> {
        if assignees.is_empty() {
            return Err(TaskValidationError::EmptyAssignees.into());
        }

        let mut resolved = BTreeSet::new();
        for id in assignees {
            let principal = self
                .principals
                .get_principal(*id)?
                .ok_or(TaskServiceError::PrincipalNotFound(*id))?;
            if principal.role != Role::Employee {
                return Err(TaskValidationError::NonEmployeeAssignee(*id).into());
            }
            resolved.insert(principal.id);
        }
        Ok(resolved)
    }

    fn attachment_store(&self) -> Result<&dyn AttachmentStore, AttachmentError> {
        self.attachments
            .as_deref()
            .ok_or(AttachmentError::StoreUnavailable)
    }

    fn store_uploads(
        &self,
        task_id: TaskId,
        uploads: &[AttachmentUpload],
    ) -> TaskServiceResult<Vec<AttachmentRef>> {
        let store = self.attachment_store()?;
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match store.store(task_id, upload) {
                Ok(attachment) => stored.push(attachment),
                Err(err) => {
                    if !stored.is_empty() {
                        self.discard_task_blobs(task_id);
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(stored)
    }

    fn discard_task_blobs(&self, task_id: TaskId) {
        let Some(store) = self.attachments.as_deref() else {
            return;
        };
        if let Err(err) = store.delete_all(task_id) {
            warn!(
                "event=attachment_cleanup module=service status=error task_id={task_id} error={err}"
            );
        }
    }

    fn discard_blob(&self, task_id: TaskId, attachment: &AttachmentRef) {
        let Some(store) = self.attachments.as_deref() else {
            return;
        };
        if let Err(err) = store.remove(attachment) {
            warn!(
                "event=attachment_cleanup module=service status=error task_id={task_id} attachment_id={} error={err}",
                attachment.id
            );
        }
    }
}

fn normalize_docs(docs: Option<String>) -> Option<String> {
    docs.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
