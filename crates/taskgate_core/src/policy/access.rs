//! Role-based access decisions for task operations.
//!
//! # Responsibility
//! - Decide `Allow`/`Deny` for (principal, operation, task) without I/O.
//! - Derive the listing visibility predicate for a principal.
//!
//! # Invariants
//! - Admin is allowed every operation.
//! - Anything not explicitly allowed is denied.
//! - Operations that target a task are denied when no task is supplied.

use crate::model::principal::{Principal, PrincipalId, Role};
use crate::model::task::Task;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Task operation subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    UpdateGeneral,
    UpdateStatus,
    UpdateDeadline,
    UpdateAssignees,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::Read,
        Operation::UpdateGeneral,
        Operation::UpdateStatus,
        Operation::UpdateDeadline,
        Operation::UpdateAssignees,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::UpdateGeneral => "update_general",
            Self::UpdateStatus => "update_status",
            Self::UpdateDeadline => "update_deadline",
            Self::UpdateAssignees => "update_assignees",
            Self::Delete => "delete",
        }
    }

    /// Whether the decision needs the target task.
    pub fn targets_task(self) -> bool {
        self != Self::Create
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

impl From<bool> for Decision {
    fn from(value: bool) -> Self {
        if value {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// How far a manager's read access reaches.
///
/// The originating service granted any manager single-task reads while its
/// listing only showed managers their own tasks; both behaviours are kept as
/// named variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerReadScope {
    /// Managers may read and list every task.
    #[default]
    AllTasks,
    /// Managers may read and list only tasks they created or are assigned to.
    OwnOrAssigned,
}

/// Query-time filter describing which tasks a principal may enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    CreatedByOrAssignedTo(PrincipalId),
    AssignedTo(PrincipalId),
}

impl Visibility {
    /// In-memory form of the predicate; SQL repositories translate it instead.
    pub fn admits(&self, task: &Task) -> bool {
        match *self {
            Self::All => true,
            Self::CreatedByOrAssignedTo(id) => task.is_created_by(id) || task.is_assigned_to(id),
            Self::AssignedTo(id) => task.is_assigned_to(id),
        }
    }
}

/// Pure, table-driven access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    manager_read_scope: ManagerReadScope,
}

impl AccessPolicy {
    pub fn new(manager_read_scope: ManagerReadScope) -> Self {
        Self { manager_read_scope }
    }

    pub fn manager_read_scope(&self) -> ManagerReadScope {
        self.manager_read_scope
    }

    /// Decides whether `principal` may perform `operation` on `task`.
    ///
    /// Rules, first match wins:
    /// 1. Admin: allow.
    /// 2. Create: allow managers.
    /// 3. Delete, UpdateGeneral, UpdateDeadline, UpdateAssignees: allow the
    ///    manager who created the task.
    /// 4. UpdateStatus: allow the creating manager or an assigned employee.
    /// 5. Read: allow managers within their read scope or an assigned employee.
    /// 6. Otherwise deny.
    pub fn decide(
        &self,
        principal: &Principal,
        operation: Operation,
        task: Option<&Task>,
    ) -> Decision {
        if principal.is_admin() {
            return Decision::Allow;
        }
        if operation == Operation::Create {
            return Decision::from(principal.role == Role::Manager);
        }

        let Some(task) = task else {
            return Decision::Deny;
        };
        let is_creator = task.is_created_by(principal.id);
        let is_assignee = task.is_assigned_to(principal.id);

        let allowed = match (principal.role, operation) {
            (
                Role::Manager,
                Operation::Delete
                | Operation::UpdateGeneral
                | Operation::UpdateDeadline
                | Operation::UpdateAssignees
                | Operation::UpdateStatus,
            ) => is_creator,
            (Role::Manager, Operation::Read) => match self.manager_read_scope {
                ManagerReadScope::AllTasks => true,
                ManagerReadScope::OwnOrAssigned => is_creator || is_assignee,
            },
            (Role::Employee, Operation::Read | Operation::UpdateStatus) => is_assignee,
            _ => false,
        };
        Decision::from(allowed)
    }

    /// Returns the listing predicate for `principal`.
    pub fn visibility(&self, principal: &Principal) -> Visibility {
        match principal.role {
            Role::Admin => Visibility::All,
            Role::Manager => match self.manager_read_scope {
                ManagerReadScope::AllTasks => Visibility::All,
                ManagerReadScope::OwnOrAssigned => {
                    Visibility::CreatedByOrAssignedTo(principal.id)
                }
            },
            Role::Employee => Visibility::AssignedTo(principal.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessPolicy, Decision, ManagerReadScope, Operation, Visibility};
    use crate::model::principal::{Principal, Role};
    use crate::model::task::{Task, TaskStatus};
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn task_for(creator: &Principal, assignee: &Principal) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Audit invoices".to_string(),
            description: "Cross-check March invoices".to_string(),
            docs: None,
            created_by: creator.id,
            assignees: BTreeSet::from([assignee.id]),
            deadline: NaiveDate::from_ymd_opt(2030, 3, 31).unwrap(),
            assigned_at: Utc::now(),
            labels: BTreeSet::new(),
            status: TaskStatus::Pending,
            attachments: vec![],
            version: 1,
        }
    }

    /// Expected decision for every (role, relation, operation) cell.
    fn expected(role: Role, creator: bool, assignee: bool, op: Operation) -> Decision {
        use Operation::*;
        let allowed = match role {
            Role::Admin => true,
            Role::Manager => match op {
                Create | Read => true,
                UpdateGeneral | UpdateStatus | UpdateDeadline | UpdateAssignees | Delete => creator,
            },
            Role::Employee => matches!(op, Read | UpdateStatus) && assignee,
        };
        Decision::from(allowed)
    }

    #[test]
    fn decision_table_is_exhaustively_default_deny() {
        let policy = AccessPolicy::default();
        let owner = Principal::generate(Role::Manager);
        let worker = Principal::generate(Role::Employee);

        for role in Role::ALL {
            for (creator, assignee) in [(false, false), (true, false), (false, true)] {
                let actor = match (creator, assignee) {
                    (true, _) => Principal::new(owner.id, role),
                    (_, true) => Principal::new(worker.id, role),
                    _ => Principal::generate(role),
                };
                let task = task_for(&owner, &worker);
                for op in Operation::ALL {
                    let target = op.targets_task().then_some(&task);
                    assert_eq!(
                        policy.decide(&actor, op, target),
                        expected(role, creator, assignee, op),
                        "role={role} creator={creator} assignee={assignee} op={op}"
                    );
                }
            }
        }
    }

    #[test]
    fn admin_is_allowed_everything_even_without_task() {
        let policy = AccessPolicy::new(ManagerReadScope::OwnOrAssigned);
        let admin = Principal::generate(Role::Admin);
        let task = task_for(
            &Principal::generate(Role::Manager),
            &Principal::generate(Role::Employee),
        );
        for op in Operation::ALL {
            assert_eq!(policy.decide(&admin, op, Some(&task)), Decision::Allow);
            assert_eq!(policy.decide(&admin, op, None), Decision::Allow);
        }
    }

    #[test]
    fn non_creator_manager_may_read_but_not_mutate() {
        let policy = AccessPolicy::default();
        let creator = Principal::generate(Role::Manager);
        let other = Principal::generate(Role::Manager);
        let task = task_for(&creator, &Principal::generate(Role::Employee));

        assert!(policy.decide(&other, Operation::Read, Some(&task)).is_allowed());
        for op in [
            Operation::UpdateGeneral,
            Operation::UpdateDeadline,
            Operation::UpdateAssignees,
            Operation::Delete,
        ] {
            assert_eq!(policy.decide(&other, op, Some(&task)), Decision::Deny);
        }
    }

    #[test]
    fn own_or_assigned_scope_restricts_manager_reads() {
        let policy = AccessPolicy::new(ManagerReadScope::OwnOrAssigned);
        let creator = Principal::generate(Role::Manager);
        let other = Principal::generate(Role::Manager);
        let task = task_for(&creator, &Principal::generate(Role::Employee));

        assert!(policy.decide(&creator, Operation::Read, Some(&task)).is_allowed());
        assert_eq!(
            policy.decide(&other, Operation::Read, Some(&task)),
            Decision::Deny
        );
    }

    #[test]
    fn task_targeting_operations_without_task_are_denied() {
        let policy = AccessPolicy::default();
        let manager = Principal::generate(Role::Manager);
        for op in Operation::ALL.into_iter().filter(|op| op.targets_task()) {
            assert_eq!(policy.decide(&manager, op, None), Decision::Deny);
        }
        assert!(policy.decide(&manager, Operation::Create, None).is_allowed());
    }

    #[test]
    fn visibility_follows_role_and_scope() {
        let manager = Principal::generate(Role::Manager);
        let employee = Principal::generate(Role::Employee);
        let admin = Principal::generate(Role::Admin);

        let all_scope = AccessPolicy::new(ManagerReadScope::AllTasks);
        let own_scope = AccessPolicy::new(ManagerReadScope::OwnOrAssigned);

        assert_eq!(all_scope.visibility(&admin), Visibility::All);
        assert_eq!(all_scope.visibility(&manager), Visibility::All);
        assert_eq!(
            own_scope.visibility(&manager),
            Visibility::CreatedByOrAssignedTo(manager.id)
        );
        assert_eq!(
            own_scope.visibility(&employee),
            Visibility::AssignedTo(employee.id)
        );

        let task = task_for(&manager, &employee);
        assert!(own_scope.visibility(&manager).admits(&task));
        assert!(own_scope.visibility(&employee).admits(&task));
        let stranger = Principal::generate(Role::Employee);
        assert!(!own_scope.visibility(&stranger).admits(&task));
    }
}
