//! Organization use-case service.
//!
//! # Responsibility
//! - Create, update and delete departments and employees.
//! - Maintain membership and reporting lines through their foreign keys.
//! - Answer derived views (members, direct reports, chains) by query.
//!
//! # Invariants
//! - Writes are validated first; a rejected write leaves the store untouched.
//! - A department manager must be a member of that department. Assigning a
//!   non-member is rejected; a manager who leaves the department (move,
//!   removal, inherited report department, full update) stops managing it
//!   in the same store write.
//! - Reporting lines never form a cycle.

use crate::config::HierarchyConfig;
use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::graph::ReportDepartmentPolicy;
use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::{
    local_today, EntityKind, ValidationError, ValidationErrors, Violations,
};
use crate::repo::department_repo::DepartmentRepository;
use crate::repo::employee_repo::{EmployeeListQuery, EmployeeRepository};
use crate::repo::RepoError;
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from organization service operations.
#[derive(Debug)]
pub enum OrgServiceError {
    /// One or more rules rejected the request.
    Validation(ValidationErrors),
    DepartmentNotFound(DepartmentId),
    EmployeeNotFound(EmployeeId),
    /// Proposed department manager is not a member of the department.
    ManagerOutsideDepartment {
        department: DepartmentId,
        manager: EmployeeId,
    },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for OrgServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(errors) => write!(f, "validation failed: {errors}"),
            Self::DepartmentNotFound(id) => write!(f, "{id} not found"),
            Self::EmployeeNotFound(id) => write!(f, "{id} not found"),
            Self::ManagerOutsideDepartment {
                department,
                manager,
            } => write!(f, "{manager} cannot manage {department}: not a member"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OrgServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(errors) => Some(errors),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for OrgServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound {
                entity: EntityKind::Department,
                id,
            } => Self::DepartmentNotFound(DepartmentId(id)),
            RepoError::NotFound {
                entity: EntityKind::Employee,
                id,
            } => Self::EmployeeNotFound(EmployeeId(id)),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationErrors> for OrgServiceError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

impl From<ValidationError> for OrgServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value.into())
    }
}

pub type ServiceResult<T> = Result<T, OrgServiceError>;

/// Organization service facade over department and employee repositories.
pub struct OrgService<D: DepartmentRepository, E: EmployeeRepository> {
    departments: D,
    employees: E,
    policy: ReportDepartmentPolicy,
    today: Box<dyn Fn() -> NaiveDate>,
}

impl<D: DepartmentRepository, E: EmployeeRepository> OrgService<D, E> {
    /// Creates a service with the default report policy and the local clock.
    pub fn new(departments: D, employees: E) -> Self {
        Self {
            departments,
            employees,
            policy: ReportDepartmentPolicy::default(),
            today: Box::new(local_today),
        }
    }

    pub fn configured(departments: D, employees: E, config: &HierarchyConfig) -> Self {
        Self::new(departments, employees).with_policy(config.report_department_policy)
    }

    pub fn with_policy(mut self, policy: ReportDepartmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the clock used for past-or-present date rules.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn policy(&self) -> ReportDepartmentPolicy {
        self.policy
    }

    /// Creates a department with a trimmed, unique name.
    pub fn create_department(&self, name: impl Into<String>) -> ServiceResult<Department> {
        let department = Department::new(name.into().trim());
        department.validate()?;
        self.ensure_department_name_free(&department.name, None)?;

        let created = self
            .departments
            .create_department(&department)
            .map_err(|err| {
                unique_to_validation(err, EntityKind::Department, "name", &department.name)
            })?;
        info!(
            "event=department_create module=service status=ok id={:?}",
            created.id.map(|id| id.0)
        );
        Ok(created)
    }

    pub fn rename_department(
        &self,
        id: DepartmentId,
        name: impl Into<String>,
    ) -> ServiceResult<Department> {
        let mut department = self.require_department(id)?;
        department.name = name.into().trim().to_string();
        department.validate()?;
        self.ensure_department_name_free(&department.name, Some(id))?;

        self.departments
            .update_department(&department)
            .map_err(|err| {
                unique_to_validation(err, EntityKind::Department, "name", &department.name)
            })?;
        Ok(department)
    }

    pub fn get_department(&self, id: DepartmentId) -> ServiceResult<Option<Department>> {
        Ok(self.departments.get_department(id)?)
    }

    pub fn list_departments(&self) -> ServiceResult<Vec<Department>> {
        Ok(self.departments.list_departments()?)
    }

    /// Sets or clears the department manager.
    ///
    /// The manager must already be a member of the department.
    pub fn assign_department_manager(
        &self,
        department_id: DepartmentId,
        manager_id: Option<EmployeeId>,
    ) -> ServiceResult<()> {
        self.require_department(department_id)?;
        if let Some(manager_id) = manager_id {
            let manager = self.require_employee(manager_id)?;
            if manager.department_id != Some(department_id) {
                return Err(OrgServiceError::ManagerOutsideDepartment {
                    department: department_id,
                    manager: manager_id,
                });
            }
        }
        self.departments
            .set_department_manager(department_id, manager_id)?;
        Ok(())
    }

    /// Deletes a department together with its employees.
    pub fn delete_department(&self, id: DepartmentId) -> ServiceResult<()> {
        self.require_department(id)?;
        let members = self
            .employees
            .list_employees(&EmployeeListQuery::in_department(id))?
            .len();
        self.departments.delete_department(id)?;
        info!(
            "event=department_delete module=service status=ok id={} cascaded_employees={}",
            id.0, members
        );
        Ok(())
    }

    /// Persists a new employee and returns it with its assigned id.
    pub fn hire_employee(&self, mut employee: Employee) -> ServiceResult<Employee> {
        employee.normalize();
        self.validate_employee(&employee)?;

        let created = self
            .employees
            .create_employee(&employee)
            .map_err(|err| employee_unique_to_validation(err, &employee))?;
        info!(
            "event=employee_create module=service status=ok id={:?}",
            created.id.map(|id| id.0)
        );
        Ok(created)
    }

    /// Replaces every field of a persisted employee.
    pub fn update_employee(&self, employee: &Employee) -> ServiceResult<Employee> {
        let id = employee
            .id
            .ok_or(RepoError::NotPersisted(EntityKind::Employee))?;
        self.require_employee(id)?;

        let mut employee = employee.clone();
        employee.normalize();
        self.validate_employee(&employee)?;
        if let Some(manager_id) = employee.manager_id {
            self.ensure_no_cycle(id, manager_id)?;
        }

        self.employees
            .update_employee(&employee)
            .map_err(|err| employee_unique_to_validation(err, &employee))?;
        Ok(employee)
    }

    pub fn get_employee(&self, id: EmployeeId) -> ServiceResult<Option<Employee>> {
        Ok(self.employees.get_employee(id)?)
    }

    pub fn list_employees(&self, query: &EmployeeListQuery) -> ServiceResult<Vec<Employee>> {
        Ok(self.employees.list_employees(query)?)
    }

    /// Deletes an employee. Reports lose their manager and a department
    /// managed by this employee loses its manager.
    pub fn delete_employee(&self, id: EmployeeId) -> ServiceResult<()> {
        self.employees.delete_employee(id)?;
        info!("event=employee_delete module=service status=ok id={}", id.0);
        Ok(())
    }

    /// Makes the employee a member of the department.
    ///
    /// An employee who managed their previous department no longer does.
    pub fn add_employee(
        &self,
        department_id: DepartmentId,
        employee_id: EmployeeId,
    ) -> ServiceResult<()> {
        self.require_department(department_id)?;
        self.employees
            .set_employee_department(employee_id, Some(department_id))?;
        Ok(())
    }

    /// Detaches the employee from the department without deleting it.
    ///
    /// Returns `false` when the employee was not a member. A detached
    /// manager leaves the department without a manager.
    pub fn remove_employee(
        &self,
        department_id: DepartmentId,
        employee_id: EmployeeId,
    ) -> ServiceResult<bool> {
        self.require_department(department_id)?;
        let employee = self.require_employee(employee_id)?;
        if employee.department_id != Some(department_id) {
            return Ok(false);
        }
        self.employees.set_employee_department(employee_id, None)?;
        Ok(true)
    }

    /// Members of the department ordered by id.
    pub fn employees_of(&self, department_id: DepartmentId) -> ServiceResult<Vec<Employee>> {
        self.require_department(department_id)?;
        Ok(self
            .employees
            .list_employees(&EmployeeListQuery::in_department(department_id))?)
    }

    /// Places `report_id` under `manager_id`.
    ///
    /// Under `ReportDepartmentPolicy::InheritFromManager` a manager with a
    /// department also moves the report into it, which ends the report's
    /// management of its previous department.
    pub fn add_direct_report(
        &self,
        manager_id: EmployeeId,
        report_id: EmployeeId,
    ) -> ServiceResult<()> {
        let manager = self.require_employee(manager_id)?;
        let report = self.require_employee(report_id)?;
        self.ensure_no_cycle(report_id, manager_id)?;

        let department_id = match self.policy {
            ReportDepartmentPolicy::InheritFromManager => manager.department_id,
            ReportDepartmentPolicy::Preserve => None,
        };
        if department_id.is_some() && department_id != report.department_id {
            debug!(
                "event=report_department_inherited module=service report={} from={:?} to={:?}",
                report_id.0,
                report.department_id.map(|id| id.0),
                department_id.map(|id| id.0)
            );
        }

        self.employees
            .place_under_manager(report_id, manager_id, department_id)?;
        Ok(())
    }

    /// Clears `report_id`'s manager if, and only if, it is `manager_id`.
    pub fn remove_direct_report(
        &self,
        manager_id: EmployeeId,
        report_id: EmployeeId,
    ) -> ServiceResult<bool> {
        self.require_employee(manager_id)?;
        let report = self.require_employee(report_id)?;
        if report.manager_id != Some(manager_id) {
            return Ok(false);
        }
        self.employees.set_employee_manager(report_id, None)?;
        Ok(true)
    }

    /// Employees whose manager is `manager_id`, ordered by id.
    pub fn direct_reports_of(&self, manager_id: EmployeeId) -> ServiceResult<Vec<Employee>> {
        self.require_employee(manager_id)?;
        Ok(self
            .employees
            .list_employees(&EmployeeListQuery::reporting_to(manager_id))?)
    }

    /// Managers above the employee, nearest first.
    pub fn reporting_chain(&self, employee_id: EmployeeId) -> ServiceResult<Vec<Employee>> {
        let employee = self.require_employee(employee_id)?;
        let mut chain = Vec::new();
        let mut visited = HashSet::from([employee_id]);
        let mut cursor = employee.manager_id;
        while let Some(current) = cursor {
            if !visited.insert(current) {
                warn!(
                    "event=reporting_chain module=service status=cycle employee={} at={}",
                    employee_id.0, current.0
                );
                break;
            }
            let manager = self.require_employee(current)?;
            cursor = manager.manager_id;
            chain.push(manager);
        }
        Ok(chain)
    }

    /// Every transitive report of the employee, ordered by id.
    pub fn all_reports_of(&self, manager_id: EmployeeId) -> ServiceResult<Vec<Employee>> {
        self.require_employee(manager_id)?;
        Ok(self.employees.list_all_reports(manager_id)?)
    }

    fn require_department(&self, id: DepartmentId) -> ServiceResult<Department> {
        self.departments
            .get_department(id)?
            .ok_or(OrgServiceError::DepartmentNotFound(id))
    }

    fn require_employee(&self, id: EmployeeId) -> ServiceResult<Employee> {
        self.employees
            .get_employee(id)?
            .ok_or(OrgServiceError::EmployeeNotFound(id))
    }

    fn ensure_department_name_free(
        &self,
        name: &str,
        owner: Option<DepartmentId>,
    ) -> ServiceResult<()> {
        match self.departments.find_department_by_name(name)? {
            Some(existing) if existing.id != owner => {
                Err(ValidationError::UniquenessViolation {
                    entity: EntityKind::Department,
                    field: "name",
                    value: name.to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Field rules, referenced rows and email uniqueness, all collected.
    fn validate_employee(&self, employee: &Employee) -> ServiceResult<()> {
        let mut violations = Violations::default();
        if let Err(errors) = employee.validate_at((self.today)()) {
            violations.extend(errors);
        }

        if let Some(department_id) = employee.department_id {
            if self.departments.get_department(department_id)?.is_none() {
                violations.push(ValidationError::ReferentialIntegrity {
                    entity: EntityKind::Employee,
                    field: "department_id",
                    id: department_id.0,
                });
            }
        }
        if let Some(manager_id) = employee.manager_id {
            if employee.id != Some(manager_id)
                && self.employees.get_employee(manager_id)?.is_none()
            {
                violations.push(ValidationError::ReferentialIntegrity {
                    entity: EntityKind::Employee,
                    field: "manager_id",
                    id: manager_id.0,
                });
            }
        }
        if let Some(email) = employee.email.as_deref() {
            if let Some(existing) = self.employees.find_employee_by_email(email)? {
                if existing.id != employee.id {
                    violations.push(ValidationError::UniquenessViolation {
                        entity: EntityKind::Employee,
                        field: "email",
                        value: email.to_string(),
                    });
                }
            }
        }

        Ok(violations.finish()?)
    }

    fn ensure_no_cycle(&self, report_id: EmployeeId, manager_id: EmployeeId) -> ServiceResult<()> {
        if self.would_create_cycle(report_id, manager_id)? {
            warn!(
                "event=assign_manager module=service status=rejected reason=cycle report={} manager={}",
                report_id.0, manager_id.0
            );
            return Err(ValidationError::CycleDetected {
                employee: report_id,
                manager: manager_id,
            }
            .into());
        }
        Ok(())
    }

    fn would_create_cycle(
        &self,
        report_id: EmployeeId,
        candidate_manager_id: EmployeeId,
    ) -> ServiceResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_manager_id);
        while let Some(current) = cursor {
            if current == report_id || !visited.insert(current) {
                return Ok(true);
            }
            cursor = self.require_employee(current)?.manager_id;
        }
        Ok(false)
    }
}

/// Maps a storage-level unique failure to the validation taxonomy.
fn unique_to_validation(
    err: RepoError,
    entity: EntityKind,
    field: &'static str,
    value: &str,
) -> OrgServiceError {
    match err {
        RepoError::UniqueViolation { .. } => ValidationError::UniquenessViolation {
            entity,
            field,
            value: value.to_string(),
        }
        .into(),
        other => other.into(),
    }
}

fn employee_unique_to_validation(err: RepoError, employee: &Employee) -> OrgServiceError {
    let email = employee.email.as_deref().unwrap_or_default();
    unique_to_validation(err, EntityKind::Employee, "email", email)
}
