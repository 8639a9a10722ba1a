//! Domain model for principals and tasks.
//!
//! # Responsibility
//! - Define the value types consumed by policy, repository and service layers.
//! - Keep role and status as closed enumerations.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod principal;
pub mod task;
