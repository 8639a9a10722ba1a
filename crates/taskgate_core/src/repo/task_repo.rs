//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist tasks with their assignees, labels and attachment refs.
//! - Translate the visibility predicate and listing filters into SQL.
//! - Guard each record with an optimistic concurrency version.
//!
//! # Invariants
//! - `save_task` writes the task row and all child rows in one transaction.
//! - `created_by` and `assigned_at` are only written on insert.
//! - A stale `version` never overwrites newer state (`RepoError::Conflict`).
//! - Listing filters run in SQL; nothing is post-filtered in memory.

use crate::model::principal::PrincipalId;
use crate::model::task::{AttachmentRef, Task, TaskId, TaskStatus};
use crate::policy::access::Visibility;
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;

const TASK_SELECT_SQL: &str = "SELECT
    tasks.id,
    tasks.title,
    tasks.description,
    tasks.docs,
    tasks.created_by,
    tasks.deadline,
    tasks.assigned_at,
    tasks.status,
    tasks.version
FROM tasks";

const ASSIGNED_TO_SQL: &str = "EXISTS (
    SELECT 1
    FROM task_assignees ta
    WHERE ta.task_id = tasks.id
      AND ta.principal_id = ?
)";

const DEADLINE_FORMAT: &str = "%Y-%m-%d";

/// Result ordering for task listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskOrder {
    /// Newest assignments first.
    #[default]
    AssignedAtDesc,
    /// Earliest deadline first.
    DeadlineAsc,
}

/// Query options for listing tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    pub visibility: Visibility,
    pub status: Option<TaskStatus>,
    /// Inclusive upper bound on `deadline`.
    pub deadline_on_or_before: Option<NaiveDate>,
    pub order: TaskOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            visibility: Visibility::All,
            status: None,
            deadline_on_or_before: None,
            order: TaskOrder::default(),
            limit: None,
            offset: 0,
        }
    }
}

/// Storage contract used by the lifecycle engine.
pub trait TaskRepository {
    /// Loads one task with all child collections.
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Atomic upsert keyed on `(id, version)`.
    ///
    /// `version == 0` inserts; otherwise the stored version must match.
    /// Returns the persisted task with its new version.
    fn save_task(&self, task: &Task) -> RepoResult<Task>;
    /// Hard-deletes one task; child rows cascade.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Lists tasks matching the query.
    fn query_tasks(&self, query: &TaskQuery) -> RepoResult<Vec<Task>>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Creates the repository over a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            &["tasks", "task_assignees", "task_labels", "task_attachments"],
        )?;
        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE tasks.id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(self.conn, row)?));
        }
        Ok(None)
    }

    fn save_task(&self, task: &Task) -> RepoResult<Task> {
        task.validate()?;
        let id_text = task.id.to_string();
        let expected_version = version_to_db(task.version)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if task.version == 0 {
            if task_exists(&tx, &id_text)? {
                return Err(RepoError::Conflict {
                    id: task.id,
                    expected_version: task.version,
                });
            }
            tx.execute(
                "INSERT INTO tasks (
                    id,
                    title,
                    description,
                    docs,
                    created_by,
                    deadline,
                    assigned_at,
                    status,
                    version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1);",
                params![
                    id_text.as_str(),
                    task.title.trim(),
                    task.description.trim(),
                    task.docs.as_deref().map(str::trim),
                    task.created_by.to_string(),
                    task.deadline.format(DEADLINE_FORMAT).to_string(),
                    task.assigned_at.timestamp_millis(),
                    task.status.as_str(),
                ],
            )?;
        } else {
            let changed = tx.execute(
                "UPDATE tasks
                 SET
                    title = ?1,
                    description = ?2,
                    docs = ?3,
                    deadline = ?4,
                    status = ?5,
                    version = version + 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?6
                   AND version = ?7;",
                params![
                    task.title.trim(),
                    task.description.trim(),
                    task.docs.as_deref().map(str::trim),
                    task.deadline.format(DEADLINE_FORMAT).to_string(),
                    task.status.as_str(),
                    id_text.as_str(),
                    expected_version,
                ],
            )?;
            if changed == 0 {
                return Err(if task_exists(&tx, &id_text)? {
                    RepoError::Conflict {
                        id: task.id,
                        expected_version: task.version,
                    }
                } else {
                    RepoError::NotFound(task.id)
                });
            }
        }

        replace_child_rows(&tx, &id_text, task)?;
        tx.commit()?;

        self.get_task(task.id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("task {} missing after save", task.id))
        })
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn query_tasks(&self, query: &TaskQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        match query.visibility {
            Visibility::All => {}
            Visibility::AssignedTo(principal_id) => {
                sql.push_str(&format!(" AND {ASSIGNED_TO_SQL}"));
                bind_values.push(Value::Text(principal_id.to_string()));
            }
            Visibility::CreatedByOrAssignedTo(principal_id) => {
                sql.push_str(&format!(
                    " AND (tasks.created_by = ? OR {ASSIGNED_TO_SQL})"
                ));
                bind_values.push(Value::Text(principal_id.to_string()));
                bind_values.push(Value::Text(principal_id.to_string()));
            }
        }

        if let Some(status) = query.status {
            sql.push_str(" AND tasks.status = ? COLLATE NOCASE");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        if let Some(deadline) = query.deadline_on_or_before {
            sql.push_str(" AND tasks.deadline <= ?");
            bind_values.push(Value::Text(deadline.format(DEADLINE_FORMAT).to_string()));
        }

        sql.push_str(match query.order {
            TaskOrder::AssignedAtDesc => " ORDER BY tasks.assigned_at DESC, tasks.id ASC",
            TaskOrder::DeadlineAsc => " ORDER BY tasks.deadline ASC, tasks.id ASC",
        });

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(self.conn, row)?);
        }
        Ok(tasks)
    }
}

fn replace_child_rows(tx: &Transaction<'_>, task_id: &str, task: &Task) -> RepoResult<()> {
    tx.execute("DELETE FROM task_assignees WHERE task_id = ?1;", [task_id])?;
    for assignee in &task.assignees {
        tx.execute(
            "INSERT INTO task_assignees (task_id, principal_id) VALUES (?1, ?2);",
            params![task_id, assignee.to_string()],
        )?;
    }

    tx.execute("DELETE FROM task_labels WHERE task_id = ?1;", [task_id])?;
    for label in &task.labels {
        tx.execute(
            "INSERT INTO task_labels (task_id, label) VALUES (?1, ?2);",
            params![task_id, label.as_str()],
        )?;
    }

    tx.execute("DELETE FROM task_attachments WHERE task_id = ?1;", [task_id])?;
    for (position, attachment) in task.attachments.iter().enumerate() {
        tx.execute(
            "INSERT INTO task_attachments (
                id,
                task_id,
                position,
                file_name,
                storage_key,
                uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                attachment.id.to_string(),
                task_id,
                i64::try_from(position).map_err(|_| {
                    RepoError::InvalidData(format!("attachment position overflow: {position}"))
                })?,
                attachment.file_name.as_str(),
                attachment.storage_key.as_str(),
                attachment.uploaded_at.timestamp_millis(),
            ],
        )?;
    }
    Ok(())
}

fn parse_task_row(conn: &Connection, row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "tasks.id")?;

    let created_by_text: String = row.get("created_by")?;
    let created_by = parse_uuid(&created_by_text, "tasks.created_by")?;

    let deadline_text: String = row.get("deadline")?;
    let deadline = NaiveDate::parse_from_str(&deadline_text, DEADLINE_FORMAT).map_err(|_| {
        RepoError::InvalidData(format!("invalid deadline `{deadline_text}` in tasks.deadline"))
    })?;

    let assigned_at = millis_to_datetime(row.get("assigned_at")?, "tasks.assigned_at")?;

    let status_text: String = row.get("status")?;
    let status = TaskStatus::parse(&status_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in tasks.status"))
    })?;

    let version_raw: i64 = row.get("version")?;
    let version = u64::try_from(version_raw).map_err(|_| {
        RepoError::InvalidData(format!("invalid version `{version_raw}` in tasks.version"))
    })?;

    let task = Task {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        docs: row.get("docs")?,
        created_by,
        assignees: load_assignees(conn, &id_text)?,
        deadline,
        assigned_at,
        labels: load_labels(conn, &id_text)?,
        status,
        attachments: load_attachments(conn, &id_text)?,
        version,
    };
    task.validate()?;
    Ok(task)
}

fn load_assignees(conn: &Connection, task_id: &str) -> RepoResult<BTreeSet<PrincipalId>> {
    let mut stmt = conn.prepare(
        "SELECT principal_id
         FROM task_assignees
         WHERE task_id = ?1;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut assignees = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        assignees.insert(parse_uuid(&value, "task_assignees.principal_id")?);
    }
    Ok(assignees)
}

fn load_labels(conn: &Connection, task_id: &str) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT label
         FROM task_labels
         WHERE task_id = ?1;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut labels = BTreeSet::new();
    while let Some(row) = rows.next()? {
        labels.insert(row.get::<_, String>(0)?);
    }
    Ok(labels)
}

fn load_attachments(conn: &Connection, task_id: &str) -> RepoResult<Vec<AttachmentRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, file_name, storage_key, uploaded_at
         FROM task_attachments
         WHERE task_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([task_id])?;
    let mut attachments = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        attachments.push(AttachmentRef {
            id: parse_uuid(&id_text, "task_attachments.id")?,
            file_name: row.get("file_name")?,
            storage_key: row.get("storage_key")?,
            uploaded_at: millis_to_datetime(
                row.get("uploaded_at")?,
                "task_attachments.uploaded_at",
            )?,
        });
    }
    Ok(attachments)
}

fn task_exists(tx: &Transaction<'_>, task_id: &str) -> RepoResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1);",
        [task_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn millis_to_datetime(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn version_to_db(version: u64) -> RepoResult<i64> {
    i64::try_from(version)
        .map_err(|_| RepoError::InvalidData(format!("task version out of range: {version}")))
}
