//! Authorization layer.
//!
//! # Responsibility
//! - Consolidate every role check into one pure decision function.
//! - Provide the visibility predicate used by listing queries.
//!
//! # Invariants
//! - Policy evaluation performs no I/O and never mutates state.
//! - Closed-world default deny.

pub mod access;
