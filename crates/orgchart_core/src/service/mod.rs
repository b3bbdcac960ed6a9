//! Core use-case services.
//!
//! # Responsibility
//! - Run explicit validation before every write.
//! - Enforce rules the records leave open: referential checks, uniqueness,
//!   reporting-cycle freedom, department manager membership.
//! - Keep callers decoupled from storage details.

pub mod org_service;
