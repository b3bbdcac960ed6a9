//! Employee record.
//!
//! # Invariants
//! - `first_name` and `last_name` are required.
//! - `email`, when present, has a valid shape and is unique across employees.
//! - `hire_date`, when present, is not after the current day.
//! - Following `manager_id` must terminate (no reporting cycles); checked by
//!   the graph and service layers.

use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::{
    local_today, normalize_optional, EntityKind, ValidationErrors, Violations,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Person employed by the organization.
///
/// Direct reports are not stored here; they are the inverse of
/// `manager_id` and are derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Option<EmployeeId>,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub department_id: Option<DepartmentId>,
    pub manager_id: Option<EmployeeId>,
}

impl Employee {
    /// Creates an unsaved employee with no optional fields or relationships.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            title: None,
            email: None,
            phone: None,
            hire_date: None,
            department_id: None,
            manager_id: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_hire_date(mut self, hire_date: NaiveDate) -> Self {
        self.hire_date = Some(hire_date);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Trims optional text fields and drops blank ones.
    pub fn normalize(&mut self) {
        self.title = normalize_optional(self.title.take());
        self.email = normalize_optional(self.email.take());
        self.phone = normalize_optional(self.phone.take());
    }

    /// Checks field-level rules against the local calendar day.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(local_today())
    }

    /// Checks field-level rules against an explicit reference day.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut violations = Violations::default();
        violations.require_non_blank(EntityKind::Employee, "first_name", &self.first_name);
        violations.require_non_blank(EntityKind::Employee, "last_name", &self.last_name);
        violations.check_email("email", self.email.as_deref());
        violations.check_past_or_present("hire_date", self.hire_date, today);
        violations.finish()
    }
}
