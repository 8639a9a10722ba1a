//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate policy, repository and collaborator calls into task use-cases.
//! - Keep host request layers decoupled from storage and policy details.

pub mod task_service;
