//! Assignment notification fan-out.
//!
//! # Responsibility
//! - Model change events emitted by the lifecycle engine.
//! - Fan events out to each newly assigned principal's channel.
//!
//! # Invariants
//! - One transport call per recipient; never a broadcast with a recipient list.
//! - Delivery is best effort and decoupled from the mutation outcome.

pub mod dispatcher;
pub mod event;
pub mod hub;
