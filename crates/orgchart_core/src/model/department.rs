//! Department record.
//!
//! # Invariants
//! - `id` is `None` until the store assigns one, and never changes afterwards.
//! - `name` is required and unique across departments (uniqueness is checked
//!   against the store, not here).
//! - `manager_id` should reference an employee of this department; the rule
//!   is enforced by the service layer, not by the record.

use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::{EntityKind, ValidationErrors, Violations};
use serde::{Deserialize, Serialize};

/// Organizational unit with an optional manager.
///
/// The member list is not stored here; it is the inverse of
/// `Employee::department_id` and is derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: Option<DepartmentId>,
    pub name: String,
    pub manager_id: Option<EmployeeId>,
}

impl Department {
    /// Creates an unsaved department with no manager.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            manager_id: None,
        }
    }

    /// Returns whether the store has assigned an id yet.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Checks field-level rules.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut violations = Violations::default();
        violations.require_non_blank(EntityKind::Department, "name", &self.name);
        violations.finish()
    }
}
