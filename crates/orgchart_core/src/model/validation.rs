//! Explicit validation rules for organization records.
//!
//! # Responsibility
//! - Turn field-level constraints (non-blank, email shape, past-or-present
//!   dates, uniqueness) into values a caller can inspect.
//! - Collect every violation of one record instead of stopping at the first.
//!
//! # Invariants
//! - Validation never mutates the record it checks.
//! - A `ValidationErrors` value is never empty.

use crate::model::ids::EmployeeId;
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_EMAIL_LOCAL_PART_CHARS: usize = 64;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("valid email regex")
});

/// Record kind named in validation and repository errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Department,
    Employee,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Department => write!(f, "department"),
            Self::Employee => write!(f, "employee"),
        }
    }
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text is missing or blank after trim.
    MissingRequiredField {
        entity: EntityKind,
        field: &'static str,
    },
    /// Value is present but malformed.
    InvalidFormat { field: &'static str, value: String },
    /// Date lies after the reference day.
    FutureDate {
        field: &'static str,
        date: NaiveDate,
        today: NaiveDate,
    },
    /// Another record already holds this value.
    UniquenessViolation {
        entity: EntityKind,
        field: &'static str,
        value: String,
    },
    /// Reference points at a row that does not exist.
    ReferentialIntegrity {
        entity: EntityKind,
        field: &'static str,
        id: i64,
    },
    /// Assigning `manager` to `employee` would close a reporting loop.
    CycleDetected {
        employee: EmployeeId,
        manager: EmployeeId,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequiredField { entity, field } => {
                write!(f, "{entity} {field} is required")
            }
            Self::InvalidFormat { field, value } => {
                write!(f, "{field} has invalid format: `{value}`")
            }
            Self::FutureDate { field, date, today } => {
                write!(f, "{field} {date} cannot be after {today}")
            }
            Self::UniquenessViolation {
                entity,
                field,
                value,
            } => write!(f, "{entity} {field} `{value}` is already in use"),
            Self::ReferentialIntegrity { entity, field, id } => {
                write!(f, "{entity} {field} references missing row {id}")
            }
            Self::CycleDetected { employee, manager } => write!(
                f,
                "reporting cycle: {employee} cannot report to {manager}"
            ),
        }
    }
}

impl Error for ValidationError {}

/// Non-empty set of violations produced by one validation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Returns all collected violations in detection order.
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn contains(&self, error: &ValidationError) -> bool {
        self.0.contains(error)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.0
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(value: ValidationError) -> Self {
        Self(vec![value])
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl Error for ValidationErrors {}

/// Accumulates violations while a record is being checked.
#[derive(Debug, Default)]
pub struct Violations(Vec<ValidationError>);

impl Violations {
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, errors: ValidationErrors) {
        self.0.extend(errors.into_vec());
    }

    pub fn require_non_blank(&mut self, entity: EntityKind, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.push(ValidationError::MissingRequiredField { entity, field });
        }
    }

    pub fn check_email(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(value) = value {
            if !is_valid_email(value) {
                self.push(ValidationError::InvalidFormat {
                    field,
                    value: value.to_string(),
                });
            }
        }
    }

    pub fn check_past_or_present(
        &mut self,
        field: &'static str,
        date: Option<NaiveDate>,
        today: NaiveDate,
    ) {
        if let Err(err) = ensure_past_or_present(field, date, today) {
            self.push(err);
        }
    }

    /// Converts collected violations into a validation result.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.0))
        }
    }
}

/// Returns whether `value` has a syntactically valid email shape.
///
/// Absent emails are handled by callers; an empty string is not an email.
pub fn is_valid_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, _)) if local.chars().count() > MAX_EMAIL_LOCAL_PART_CHARS => false,
        Some(_) => EMAIL_RE.is_match(value),
        None => false,
    }
}

/// Rejects dates after `today`; `None` is accepted.
pub fn ensure_past_or_present(
    field: &'static str,
    date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    match date {
        Some(date) if date > today => Err(ValidationError::FutureDate { field, date, today }),
        _ => Ok(()),
    }
}

/// Trims optional text and collapses blank values to `None`.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Current calendar day in the local time zone.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::{ensure_past_or_present, is_valid_email, normalize_optional, ValidationError};
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn email_shape_accepts_common_addresses() {
        assert!(is_valid_email("ana@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(is_valid_email("ops@localhost"));
    }

    #[test]
    fn email_shape_rejects_malformed_addresses() {
        for value in [
            "",
            "plainaddress",
            "@x.com",
            "ana@",
            "ana@@x.com",
            ".ana@x.com",
            "ana..lee@x.com",
            "ana lee@x.com",
            "ana@-x.com",
        ] {
            assert!(!is_valid_email(value), "`{value}` should be rejected");
        }
    }

    #[test]
    fn email_local_part_length_is_capped() {
        let local = "a".repeat(65);
        assert!(!is_valid_email(&format!("{local}@x.com")));
        let local = "a".repeat(64);
        assert!(is_valid_email(&format!("{local}@x.com")));
    }

    #[test]
    fn past_or_present_boundary() {
        let today = day(2024, 3, 10);
        assert!(ensure_past_or_present("hire_date", Some(today), today).is_ok());
        assert!(ensure_past_or_present("hire_date", Some(day(2024, 3, 9)), today).is_ok());
        assert!(ensure_past_or_present("hire_date", None, today).is_ok());

        let err = ensure_past_or_present("hire_date", Some(day(2024, 3, 11)), today).unwrap_err();
        assert_eq!(
            err,
            ValidationError::FutureDate {
                field: "hire_date",
                date: day(2024, 3, 11),
                today,
            }
        );
    }

    #[test]
    fn normalize_optional_collapses_blank_text() {
        assert_eq!(normalize_optional(None), None);
        assert_eq!(normalize_optional(Some("   ".to_string())), None);
        assert_eq!(
            normalize_optional(Some("  Lead ".to_string())).as_deref(),
            Some("Lead")
        );
    }
}
