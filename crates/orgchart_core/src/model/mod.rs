//! Organization domain model.
//!
//! # Responsibility
//! - Define department/employee records and their typed identifiers.
//! - Provide explicit validation steps instead of implicit constraints.
//! - Provide an in-memory object graph for unsaved or detached records.
//!
//! # Invariants
//! - Every relationship is stored once, on its foreign-key side.
//! - Inverse collections (department employees, direct reports) are derived.

pub mod department;
pub mod employee;
pub mod graph;
pub mod ids;
pub mod validation;
