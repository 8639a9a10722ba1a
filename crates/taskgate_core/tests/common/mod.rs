#![allow(dead_code)]

use chrono::{Duration, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use taskgate_core::{
    DispatchError, EventSink, NotificationPayload, NotificationTransport, Principal,
    PrincipalDirectory, PrincipalId, Role, SqlitePrincipalDirectory, SqliteTaskRepository,
    TaskDraft, TaskEvent, TaskService,
};

pub type SqliteTaskService<'conn> =
    TaskService<SqliteTaskRepository<'conn>, SqlitePrincipalDirectory<'conn>>;

/// Principals registered in the directory for every scenario.
pub struct Cast {
    pub admin: Principal,
    pub manager: Principal,
    pub other_manager: Principal,
    pub employee: Principal,
    pub other_employee: Principal,
}

pub fn seed_cast(conn: &Connection) -> Cast {
    let directory = SqlitePrincipalDirectory::try_new(conn).unwrap();
    let cast = Cast {
        admin: Principal::generate(Role::Admin),
        manager: Principal::generate(Role::Manager),
        other_manager: Principal::generate(Role::Manager),
        employee: Principal::generate(Role::Employee),
        other_employee: Principal::generate(Role::Employee),
    };
    for principal in [
        &cast.admin,
        &cast.manager,
        &cast.other_manager,
        &cast.employee,
        &cast.other_employee,
    ] {
        directory.upsert_principal(principal).unwrap();
    }
    cast
}

pub fn build_service<'conn>(
    conn: &'conn Connection,
    sink: Box<dyn EventSink>,
) -> SqliteTaskService<'conn> {
    TaskService::new(
        SqliteTaskRepository::try_new(conn).unwrap(),
        SqlitePrincipalDirectory::try_new(conn).unwrap(),
        sink,
    )
}

pub fn days_from_today(days: i64) -> String {
    (Utc::now().date_naive() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn draft_for(title: &str, assignees: Vec<PrincipalId>, deadline: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: format!("{title} description"),
        deadline: deadline.to_string(),
        assignees,
        ..TaskDraft::default()
    }
}

/// Event sink that keeps every published event.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: TaskEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Transport that records one entry per delivery call.
#[derive(Default)]
pub struct RecordingTransport {
    deliveries: Mutex<Vec<(PrincipalId, NotificationPayload)>>,
}

impl RecordingTransport {
    pub fn deliveries(&self) -> Vec<(PrincipalId, NotificationPayload)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<PrincipalId> {
        self.deliveries()
            .into_iter()
            .map(|(recipient, _)| recipient)
            .collect()
    }
}

impl NotificationTransport for RecordingTransport {
    fn deliver(
        &self,
        recipient: PrincipalId,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((recipient, payload.clone()));
        Ok(())
    }
}

/// Transport whose every delivery fails.
#[derive(Default)]
pub struct FailingTransport {
    attempts: Mutex<usize>,
}

impl FailingTransport {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

impl NotificationTransport for FailingTransport {
    fn deliver(
        &self,
        _recipient: PrincipalId,
        _payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        *self.attempts.lock().unwrap() += 1;
        Err(DispatchError::Transport("channel layer offline".to_string()))
    }
}
