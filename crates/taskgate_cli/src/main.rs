//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire `taskgate_core` together against a database file or memory.
//! - Walk the assignment, status and delete scenarios and print outcomes.
//!
//! Usage: `taskgate_cli [DB_PATH]`

use chrono::{Duration, Utc};
use log::info;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use taskgate_core::{
    default_log_level, init_stderr_logging, open_db, open_db_in_memory, ChannelHub,
    NotificationDispatcher, Principal, PrincipalDirectory, Role, SqlitePrincipalDirectory,
    SqliteTaskRepository, TaskDraft, TaskService, TaskServiceError, TaskStatus,
};

fn main() -> ExitCode {
    if let Err(err) = init_stderr_logging(default_log_level()) {
        eprintln!("logging disabled: {err}");
    }
    println!("taskgate_core ping={}", taskgate_core::ping());
    println!("taskgate_core version={}", taskgate_core::core_version());

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("smoke run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: Option<String>) -> Result<(), Box<dyn Error>> {
    let conn = match db_path.as_deref() {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };

    let directory = SqlitePrincipalDirectory::try_new(&conn)?;
    let manager = Principal::generate(Role::Manager);
    let other_manager = Principal::generate(Role::Manager);
    let employee = Principal::generate(Role::Employee);
    for principal in [&manager, &other_manager, &employee] {
        directory.upsert_principal(principal)?;
    }

    let hub = Arc::new(ChannelHub::new());
    let inbox = hub.subscribe(employee.id);
    let service = TaskService::new(
        SqliteTaskRepository::try_new(&conn)?,
        SqlitePrincipalDirectory::try_new(&conn)?,
        Box::new(NotificationDispatcher::new(hub.clone())),
    );

    // Assignment: manager creates a task for the employee.
    let deadline = (Utc::now().date_naive() + Duration::days(7))
        .format("%Y-%m-%d")
        .to_string();
    let task = service.create(
        &manager,
        TaskDraft {
            title: "Prepare onboarding checklist".to_string(),
            description: "Collect accounts and hardware for the new hire".to_string(),
            deadline,
            assignees: vec![employee.id],
            labels: vec!["onboarding".to_string()],
            ..TaskDraft::default()
        },
    )?;
    println!(
        "create: task_id={} status={} deadline={}",
        task.id, task.status, task.deadline
    );
    for message in inbox.try_iter() {
        println!("notify: recipient={} payload={message}", employee.id);
    }

    // Status: employee starts the task, then tries to move it back.
    let task = service.transition_status(&employee, task.id, TaskStatus::InProgress)?;
    println!("update_status: status={} version={}", task.status, task.version);
    match service.transition_status(&employee, task.id, TaskStatus::Pending) {
        Err(err @ TaskServiceError::InvalidTransition { .. }) => {
            println!("update_status: rejected ({err})");
        }
        other => return Err(format!("expected invalid transition, got {other:?}").into()),
    }

    // Delete: a manager who did not create the task is refused.
    match service.delete(&other_manager, task.id) {
        Err(err @ TaskServiceError::Unauthorized { .. }) => println!("delete: rejected ({err})"),
        other => return Err(format!("expected unauthorized delete, got {other:?}").into()),
    }
    let still_there = service.get(&manager, task.id)?;
    println!("get: task_id={} still present", still_there.id);

    info!("event=smoke_run module=cli status=ok task_id={}", task.id);
    Ok(())
}
