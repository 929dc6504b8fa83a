//! Domain model for student records.
//!
//! # Responsibility
//! - Define the `Student` entity and its column vocabulary.
//! - Define dynamically typed field values used by projections and filters.
//!
//! # Invariants
//! - Model types carry no validation; constraints are enforced by the store
//!   at commit time.

pub mod student;
pub mod value;
