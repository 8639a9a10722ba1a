//! Task change events and the notification payload derived from them.

use crate::model::principal::PrincipalId;
use crate::model::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Title carried by every assignment notification.
pub const ASSIGNMENT_NOTIFICATION_TITLE: &str = "New Task Assigned";

/// Change event emitted after a committed task mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was created; every assignee is a recipient.
    TaskCreated {
        task_id: TaskId,
        task_title: String,
        assigned_by: PrincipalId,
        assignees: BTreeSet<PrincipalId>,
    },
    /// Assignees were replaced; only the newly added ids are recipients.
    AssigneesAdded {
        task_id: TaskId,
        task_title: String,
        assigned_by: PrincipalId,
        added: BTreeSet<PrincipalId>,
    },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "task_created",
            Self::AssigneesAdded { .. } => "assignees_added",
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated { task_id, .. } | Self::AssigneesAdded { task_id, .. } => *task_id,
        }
    }

    /// Principals that must be notified about this event.
    pub fn recipients(&self) -> &BTreeSet<PrincipalId> {
        match self {
            Self::TaskCreated { assignees, .. } => assignees,
            Self::AssigneesAdded { added, .. } => added,
        }
    }

    /// Payload delivered to each recipient.
    pub fn payload(&self) -> NotificationPayload {
        let (task_id, task_title, assigned_by) = match self {
            Self::TaskCreated {
                task_id,
                task_title,
                assigned_by,
                ..
            }
            | Self::AssigneesAdded {
                task_id,
                task_title,
                assigned_by,
                ..
            } => (*task_id, task_title.clone(), *assigned_by),
        };
        NotificationPayload {
            title: ASSIGNMENT_NOTIFICATION_TITLE.to_string(),
            task_id,
            task_title,
            assigned_by,
        }
    }
}

/// Message pushed to a recipient's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub task_id: TaskId,
    pub task_title: String,
    pub assigned_by: PrincipalId,
}
