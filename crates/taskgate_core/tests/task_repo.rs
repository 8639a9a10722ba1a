mod common;

use chrono::{DateTime, NaiveDate, Utc};
use common::seed_cast;
use rusqlite::Connection;
use std::collections::BTreeSet;
use taskgate_core::db::open_db_in_memory;
use taskgate_core::{
    AttachmentRef, PrincipalDirectory, PrincipalId, RepoError, Role, SqlitePrincipalDirectory,
    SqliteTaskRepository, Task, TaskOrder, TaskQuery, TaskRepository, TaskStatus, Visibility,
};
use uuid::Uuid;

fn new_task(created_by: PrincipalId, assignees: &[PrincipalId], deadline: &str) -> Task {
    Task {
        id: Uuid::new_v4(),
        title: "Audit vendor contracts".to_string(),
        description: "Check renewal dates".to_string(),
        docs: None,
        created_by,
        assignees: assignees.iter().copied().collect(),
        deadline: NaiveDate::parse_from_str(deadline, "%Y-%m-%d").unwrap(),
        assigned_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        labels: BTreeSet::new(),
        status: TaskStatus::Pending,
        attachments: Vec::new(),
        version: 0,
    }
}

fn set_assigned_at(conn: &Connection, task_id: Uuid, millis: i64) {
    conn.execute(
        "UPDATE tasks SET assigned_at = ?1 WHERE id = ?2;",
        rusqlite::params![millis, task_id.to_string()],
    )
    .unwrap();
}

#[test]
fn save_inserts_and_reads_back_children() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let mut task = new_task(
        cast.manager.id,
        &[cast.employee.id, cast.other_employee.id],
        "2030-05-01",
    );
    task.docs = Some("https://wiki.example.com/contracts".to_string());
    task.labels = BTreeSet::from(["legal".to_string(), "q3".to_string()]);
    task.attachments = vec![
        AttachmentRef {
            id: Uuid::new_v4(),
            file_name: "b.pdf".to_string(),
            storage_key: format!("{}/b.pdf", task.id),
            uploaded_at: DateTime::from_timestamp_millis(1_700_000_000_500).unwrap(),
        },
        AttachmentRef {
            id: Uuid::new_v4(),
            file_name: "a.pdf".to_string(),
            storage_key: format!("{}/a.pdf", task.id),
            uploaded_at: DateTime::from_timestamp_millis(1_700_000_000_600).unwrap(),
        },
    ];

    let saved = repo.save_task(&task).unwrap();
    assert_eq!(saved.version, 1);
    assert_eq!(saved.assignees, task.assignees);
    assert_eq!(saved.labels, task.labels);
    assert_eq!(saved.attachments, task.attachments);
    assert_eq!(saved.assigned_at, task.assigned_at);
    assert_eq!(saved.docs, task.docs);

    let loaded = repo.get_task(task.id).unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn update_bumps_version_and_keeps_write_once_columns() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let saved = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-05-01"))
        .unwrap();

    let mut edited = saved.clone();
    edited.status = TaskStatus::InProgress;
    edited.created_by = cast.other_manager.id;
    edited.assigned_at = Utc::now();
    edited.assignees = BTreeSet::from([cast.other_employee.id]);
    let updated = repo.save_task(&edited).unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.assignees, BTreeSet::from([cast.other_employee.id]));
    assert_eq!(updated.created_by, saved.created_by);
    assert_eq!(updated.assigned_at, saved.assigned_at);
}

#[test]
fn stale_version_is_rejected_and_leaves_record_unchanged() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let saved = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-05-01"))
        .unwrap();

    let mut first = saved.clone();
    first.title = "First writer".to_string();
    repo.save_task(&first).unwrap();

    let mut stale = saved.clone();
    stale.title = "Second writer".to_string();
    match repo.save_task(&stale).unwrap_err() {
        RepoError::Conflict {
            id,
            expected_version,
        } => {
            assert_eq!(id, saved.id);
            assert_eq!(expected_version, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let stored = repo.get_task(saved.id).unwrap().unwrap();
    assert_eq!(stored.title, "First writer");
    assert_eq!(stored.version, 2);
}

#[test]
fn inserting_existing_id_is_a_conflict_and_updating_missing_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let task = new_task(cast.manager.id, &[cast.employee.id], "2030-05-01");
    repo.save_task(&task).unwrap();
    assert!(matches!(
        repo.save_task(&task),
        Err(RepoError::Conflict { .. })
    ));

    let mut missing = new_task(cast.manager.id, &[cast.employee.id], "2030-05-01");
    missing.version = 3;
    assert!(matches!(
        repo.save_task(&missing),
        Err(RepoError::NotFound(id)) if id == missing.id
    ));
}

#[test]
fn invalid_task_is_rejected_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let task = new_task(cast.manager.id, &[], "2030-05-01");
    assert!(matches!(
        repo.save_task(&task),
        Err(RepoError::Validation(_))
    ));
    assert!(repo.get_task(task.id).unwrap().is_none());
}

#[test]
fn delete_cascades_children_and_reports_missing() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let mut task = new_task(cast.manager.id, &[cast.employee.id], "2030-05-01");
    task.labels = BTreeSet::from(["ops".to_string()]);
    repo.save_task(&task).unwrap();

    repo.delete_task(task.id).unwrap();
    assert!(repo.get_task(task.id).unwrap().is_none());
    let leftovers: i64 = conn
        .query_row(
            "SELECT
                (SELECT COUNT(*) FROM task_assignees WHERE task_id = ?1)
              + (SELECT COUNT(*) FROM task_labels WHERE task_id = ?1);",
            [task.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(leftovers, 0);

    assert!(matches!(
        repo.delete_task(task.id),
        Err(RepoError::NotFound(id)) if id == task.id
    ));
}

#[test]
fn query_applies_visibility_in_sql() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let mine = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-05-01"))
        .unwrap();
    let theirs = repo
        .save_task(&new_task(
            cast.other_manager.id,
            &[cast.other_employee.id],
            "2030-05-02",
        ))
        .unwrap();

    let ids = |visibility: Visibility| -> BTreeSet<Uuid> {
        repo.query_tasks(&TaskQuery {
            visibility,
            ..TaskQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect()
    };

    assert_eq!(ids(Visibility::All), BTreeSet::from([mine.id, theirs.id]));
    assert_eq!(
        ids(Visibility::AssignedTo(cast.employee.id)),
        BTreeSet::from([mine.id])
    );
    assert_eq!(
        ids(Visibility::CreatedByOrAssignedTo(cast.manager.id)),
        BTreeSet::from([mine.id])
    );
    assert_eq!(
        ids(Visibility::CreatedByOrAssignedTo(cast.other_employee.id)),
        BTreeSet::from([theirs.id])
    );
}

#[test]
fn query_filters_status_and_inclusive_deadline() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let early = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-01-10"))
        .unwrap();
    let on_bound = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-01-20"))
        .unwrap();
    let late = repo
        .save_task(&new_task(cast.manager.id, &[cast.employee.id], "2030-01-21"))
        .unwrap();

    let mut started = on_bound.clone();
    started.status = TaskStatus::InProgress;
    repo.save_task(&started).unwrap();

    let due = repo
        .query_tasks(&TaskQuery {
            deadline_on_or_before: NaiveDate::from_ymd_opt(2030, 1, 20),
            order: TaskOrder::DeadlineAsc,
            ..TaskQuery::default()
        })
        .unwrap();
    assert_eq!(
        due.iter().map(|task| task.id).collect::<Vec<_>>(),
        vec![early.id, on_bound.id]
    );

    let pending = repo
        .query_tasks(&TaskQuery {
            status: Some(TaskStatus::Pending),
            order: TaskOrder::DeadlineAsc,
            ..TaskQuery::default()
        })
        .unwrap();
    assert_eq!(
        pending.iter().map(|task| task.id).collect::<Vec<_>>(),
        vec![early.id, late.id]
    );
}

#[test]
fn query_orders_by_assigned_at_desc_and_paginates() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let repo = SqliteTaskRepository::try_new(&conn).unwrap();

    let mut ids = Vec::new();
    for (index, millis) in [1_000_i64, 3_000, 2_000].into_iter().enumerate() {
        let task = repo
            .save_task(&new_task(
                cast.manager.id,
                &[cast.employee.id],
                &format!("2030-02-0{}", index + 1),
            ))
            .unwrap();
        set_assigned_at(&conn, task.id, millis);
        ids.push(task.id);
    }

    let ordered = repo
        .query_tasks(&TaskQuery::default())
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect::<Vec<_>>();
    assert_eq!(ordered, vec![ids[1], ids[2], ids[0]]);

    let second_page = repo
        .query_tasks(&TaskQuery {
            limit: Some(1),
            offset: 1,
            ..TaskQuery::default()
        })
        .unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id, ids[2]);

    let skipped = repo
        .query_tasks(&TaskQuery {
            offset: 2,
            ..TaskQuery::default()
        })
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].id, ids[0]);
}

#[test]
fn principal_directory_upserts_and_lists_by_role() {
    let conn = open_db_in_memory().unwrap();
    let cast = seed_cast(&conn);
    let directory = SqlitePrincipalDirectory::try_new(&conn).unwrap();

    let found = directory.get_principal(cast.employee.id).unwrap().unwrap();
    assert_eq!(found.role, Role::Employee);
    assert!(directory.get_principal(Uuid::new_v4()).unwrap().is_none());

    let employees = directory.list_principals(Role::Employee).unwrap();
    assert_eq!(employees.len(), 2);
    assert!(employees.windows(2).all(|pair| pair[0].id <= pair[1].id));

    let mut promoted = cast.employee;
    promoted.role = Role::Manager;
    directory.upsert_principal(&promoted).unwrap();
    assert_eq!(
        directory.get_principal(promoted.id).unwrap().unwrap().role,
        Role::Manager
    );
    assert_eq!(directory.list_principals(Role::Employee).unwrap().len(), 1);
}
