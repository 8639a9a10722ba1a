//! Core domain logic for TaskGate.
//! This crate is the single source of truth for task authorization and
//! lifecycle invariants.

pub mod attachment;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod policy;
pub mod repo;
pub mod service;

pub use attachment::{AttachmentError, AttachmentStore, FsAttachmentStore};
pub use config::{ConfigError, EngineConfig, ExistenceDisclosure};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, init_stderr_logging, logging_status, LogDestination,
};
pub use model::principal::{Principal, PrincipalId, Role, RoleParseError};
pub use model::task::{
    AttachmentRef, AttachmentUpload, Task, TaskDraft, TaskId, TaskPatch, TaskStatus,
    TaskValidationError,
};
pub use notify::dispatcher::{
    BackgroundDispatcher, DispatchError, EventSink, NotificationDispatcher, NotificationTransport,
};
pub use notify::event::{NotificationPayload, TaskEvent};
pub use notify::hub::{ChannelHub, Subscription};
pub use policy::access::{AccessPolicy, Decision, ManagerReadScope, Operation, Visibility};
pub use repo::principal_repo::{PrincipalDirectory, SqlitePrincipalDirectory};
pub use repo::task_repo::{SqliteTaskRepository, TaskOrder, TaskQuery, TaskRepository};
pub use repo::{RepoError, RepoResult};
pub use service::task_service::{
    TaskFilter, TaskPage, TaskService, TaskServiceError, TaskServiceResult,
};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
