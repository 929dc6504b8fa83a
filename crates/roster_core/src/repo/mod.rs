//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define row-level data access contracts for students.
//! - Isolate SQLite statement details from the session/unit of work.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Constraint`) in
//!   addition to DB transport errors.

pub mod student_repo;
