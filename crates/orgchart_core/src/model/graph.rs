//! In-memory organization object graph.
//!
//! # Responsibility
//! - Hold departments and employees that are not (or not yet) persisted.
//! - Keep department membership and reporting lines consistent in memory.
//! - Derive inverse views (members, direct reports) from one stored link.
//!
//! # Invariants
//! - Each relationship is stored once: employee -> department,
//!   employee -> manager, department -> manager.
//! - The reporting relation is acyclic; `add_direct_report` and
//!   `set_manager` reject links that would close a loop.
//! - Foreign-key fields on records held by the graph mirror the linked
//!   node's id and are rewritten on every link change.

use crate::model::department::Department;
use crate::model::employee::Employee;
use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::{EntityKind, ValidationError, ValidationErrors, Violations};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Handle of a department node inside one `OrgGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepartmentKey(usize);

/// Handle of an employee node inside one `OrgGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmployeeKey(usize);

/// How `add_direct_report` treats the report's department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDepartmentPolicy {
    /// Copy the manager's department onto the report when the manager has
    /// one, overriding the report's current department.
    #[default]
    InheritFromManager,
    /// Leave the report's department untouched.
    Preserve,
}

/// Errors from graph mutations and graph loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownDepartment(DepartmentKey),
    UnknownEmployee(EmployeeKey),
    /// Linking `report` under `manager` would close a reporting loop.
    CycleDetected {
        report: EmployeeKey,
        manager: EmployeeKey,
    },
    /// Loaded record references an id that is not part of the input.
    DanglingReference {
        entity: EntityKind,
        field: &'static str,
        id: i64,
    },
    /// Two loaded records share one id, or a loaded record has none.
    InvalidIdentity { entity: EntityKind, id: Option<i64> },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDepartment(key) => write!(f, "unknown department node {}", key.0),
            Self::UnknownEmployee(key) => write!(f, "unknown employee node {}", key.0),
            Self::CycleDetected { report, manager } => write!(
                f,
                "reporting cycle: employee node {} cannot report to node {}",
                report.0, manager.0
            ),
            Self::DanglingReference { entity, field, id } => {
                write!(f, "{entity} {field} references missing row {id}")
            }
            Self::InvalidIdentity { entity, id: Some(id) } => {
                write!(f, "duplicate {entity} id {id}")
            }
            Self::InvalidIdentity { entity, id: None } => {
                write!(f, "{entity} record has no id")
            }
        }
    }
}

impl Error for GraphError {}

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone)]
struct DepartmentNode {
    record: Department,
    manager: Option<EmployeeKey>,
}

#[derive(Debug, Clone)]
struct EmployeeNode {
    record: Employee,
    department: Option<DepartmentKey>,
    manager: Option<EmployeeKey>,
}

/// Arena of departments and employees with single-sided links.
#[derive(Debug, Clone, Default)]
pub struct OrgGraph {
    departments: Vec<DepartmentNode>,
    employees: Vec<EmployeeNode>,
    policy: ReportDepartmentPolicy,
}

impl OrgGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ReportDepartmentPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ReportDepartmentPolicy {
        self.policy
    }

    /// Builds a graph from persisted records, resolving ids into handles.
    ///
    /// # Errors
    /// - `InvalidIdentity` when a record has no id or an id repeats.
    /// - `DanglingReference` when a foreign key names an absent record.
    /// - `CycleDetected` when the loaded reporting lines contain a loop.
    pub fn from_records(
        departments: Vec<Department>,
        employees: Vec<Employee>,
        policy: ReportDepartmentPolicy,
    ) -> GraphResult<Self> {
        let mut graph = Self::with_policy(policy);
        let mut department_keys: HashMap<DepartmentId, DepartmentKey> = HashMap::new();
        let mut employee_keys: HashMap<EmployeeId, EmployeeKey> = HashMap::new();

        for department in &departments {
            let id = department.id.ok_or(GraphError::InvalidIdentity {
                entity: EntityKind::Department,
                id: None,
            })?;
            let key = graph.insert_department(department.clone());
            if department_keys.insert(id, key).is_some() {
                return Err(GraphError::InvalidIdentity {
                    entity: EntityKind::Department,
                    id: Some(id.0),
                });
            }
        }
        for employee in &employees {
            let id = employee.id.ok_or(GraphError::InvalidIdentity {
                entity: EntityKind::Employee,
                id: None,
            })?;
            let key = graph.insert_employee(employee.clone());
            if employee_keys.insert(id, key).is_some() {
                return Err(GraphError::InvalidIdentity {
                    entity: EntityKind::Employee,
                    id: Some(id.0),
                });
            }
        }

        let resolve_employee = |field: &'static str, entity: EntityKind, id: EmployeeId| {
            employee_keys
                .get(&id)
                .copied()
                .ok_or(GraphError::DanglingReference {
                    entity,
                    field,
                    id: id.0,
                })
        };

        for (index, department) in departments.iter().enumerate() {
            if let Some(manager_id) = department.manager_id {
                let manager = resolve_employee("manager_id", EntityKind::Department, manager_id)?;
                graph.departments[index].manager = Some(manager);
            }
        }
        for (index, employee) in employees.iter().enumerate() {
            if let Some(department_id) = employee.department_id {
                let department = department_keys.get(&department_id).copied().ok_or(
                    GraphError::DanglingReference {
                        entity: EntityKind::Employee,
                        field: "department_id",
                        id: department_id.0,
                    },
                )?;
                graph.employees[index].department = Some(department);
            }
            if let Some(manager_id) = employee.manager_id {
                let manager = resolve_employee("manager_id", EntityKind::Employee, manager_id)?;
                let report = EmployeeKey(index);
                if graph.would_create_cycle(report, manager) {
                    return Err(GraphError::CycleDetected { report, manager });
                }
                graph.employees[index].manager = Some(manager);
            }
        }

        graph.sync_all();
        Ok(graph)
    }

    /// Adds a department node. Links are made through graph operations only,
    /// so any `manager_id` on the record is cleared.
    pub fn insert_department(&mut self, mut department: Department) -> DepartmentKey {
        department.manager_id = None;
        self.departments.push(DepartmentNode {
            record: department,
            manager: None,
        });
        DepartmentKey(self.departments.len() - 1)
    }

    /// Adds an employee node with no department and no manager.
    ///
    /// Optional text is normalized the same way the store normalizes it.
    pub fn insert_employee(&mut self, mut employee: Employee) -> EmployeeKey {
        employee.normalize();
        employee.department_id = None;
        employee.manager_id = None;
        self.employees.push(EmployeeNode {
            record: employee,
            department: None,
            manager: None,
        });
        EmployeeKey(self.employees.len() - 1)
    }

    pub fn department(&self, key: DepartmentKey) -> Option<&Department> {
        self.departments.get(key.0).map(|node| &node.record)
    }

    pub fn employee(&self, key: EmployeeKey) -> Option<&Employee> {
        self.employees.get(key.0).map(|node| &node.record)
    }

    pub fn department_keys(&self) -> impl Iterator<Item = DepartmentKey> {
        (0..self.departments.len()).map(DepartmentKey)
    }

    pub fn employee_keys(&self) -> impl Iterator<Item = EmployeeKey> {
        (0..self.employees.len()).map(EmployeeKey)
    }

    /// Edits scalar fields of a department. Link fields are restored afterwards.
    pub fn update_department(
        &mut self,
        key: DepartmentKey,
        edit: impl FnOnce(&mut Department),
    ) -> GraphResult<()> {
        let node = self
            .departments
            .get_mut(key.0)
            .ok_or(GraphError::UnknownDepartment(key))?;
        edit(&mut node.record);
        self.sync_all();
        Ok(())
    }

    /// Edits scalar fields of an employee. Optional text is normalized and
    /// link fields are restored afterwards.
    pub fn update_employee(
        &mut self,
        key: EmployeeKey,
        edit: impl FnOnce(&mut Employee),
    ) -> GraphResult<()> {
        let node = self
            .employees
            .get_mut(key.0)
            .ok_or(GraphError::UnknownEmployee(key))?;
        edit(&mut node.record);
        node.record.normalize();
        self.sync_all();
        Ok(())
    }

    /// Makes `employee` a member of `department`.
    pub fn add_employee(
        &mut self,
        department: DepartmentKey,
        employee: EmployeeKey,
    ) -> GraphResult<()> {
        self.ensure_department(department)?;
        self.ensure_employee(employee)?;
        self.employees[employee.0].department = Some(department);
        self.sync_employee(employee);
        Ok(())
    }

    /// Detaches `employee` from `department`.
    ///
    /// Returns `false` without changes when the employee is not a member.
    /// The employee node itself is kept.
    pub fn remove_employee(
        &mut self,
        department: DepartmentKey,
        employee: EmployeeKey,
    ) -> GraphResult<bool> {
        self.ensure_department(department)?;
        self.ensure_employee(employee)?;
        if self.employees[employee.0].department != Some(department) {
            return Ok(false);
        }
        self.employees[employee.0].department = None;
        self.sync_employee(employee);
        Ok(true)
    }

    /// Members of `department`, in node insertion order.
    pub fn employees(&self, department: DepartmentKey) -> Vec<EmployeeKey> {
        self.employees
            .iter()
            .enumerate()
            .filter(|(_, node)| node.department == Some(department))
            .map(|(index, _)| EmployeeKey(index))
            .collect()
    }

    pub fn department_of(&self, employee: EmployeeKey) -> Option<DepartmentKey> {
        self.employees.get(employee.0).and_then(|node| node.department)
    }

    /// Sets or clears the department's manager. Membership is not checked.
    pub fn set_department_manager(
        &mut self,
        department: DepartmentKey,
        manager: Option<EmployeeKey>,
    ) -> GraphResult<()> {
        self.ensure_department(department)?;
        if let Some(manager) = manager {
            self.ensure_employee(manager)?;
        }
        self.departments[department.0].manager = manager;
        self.sync_department(department);
        Ok(())
    }

    pub fn department_manager(&self, department: DepartmentKey) -> Option<EmployeeKey> {
        self.departments
            .get(department.0)
            .and_then(|node| node.manager)
    }

    /// Places `report` under `manager`.
    ///
    /// With `ReportDepartmentPolicy::InheritFromManager`, a manager that has a
    /// department also moves the report into it.
    pub fn add_direct_report(
        &mut self,
        manager: EmployeeKey,
        report: EmployeeKey,
    ) -> GraphResult<()> {
        self.link_manager(report, manager)?;

        if self.policy == ReportDepartmentPolicy::InheritFromManager {
            if let Some(department) = self.employees[manager.0].department {
                let previous = self.employees[report.0].department;
                if previous != Some(department) {
                    debug!(
                        "event=report_department_inherited module=graph report={} from={:?} to={}",
                        report.0,
                        previous.map(|key| key.0),
                        department.0
                    );
                }
                self.employees[report.0].department = Some(department);
            }
        }

        self.sync_employee(report);
        Ok(())
    }

    /// Detaches `report` from `manager`.
    ///
    /// Returns `false` without changes when `report` does not report to
    /// `manager`. Department membership is left as is.
    pub fn remove_direct_report(
        &mut self,
        manager: EmployeeKey,
        report: EmployeeKey,
    ) -> GraphResult<bool> {
        self.ensure_employee(manager)?;
        self.ensure_employee(report)?;
        if self.employees[report.0].manager != Some(manager) {
            return Ok(false);
        }
        self.employees[report.0].manager = None;
        self.sync_employee(report);
        Ok(true)
    }

    /// Sets or clears `employee`'s manager without touching its department.
    pub fn set_manager(
        &mut self,
        employee: EmployeeKey,
        manager: Option<EmployeeKey>,
    ) -> GraphResult<()> {
        match manager {
            Some(manager) => self.link_manager(employee, manager)?,
            None => {
                self.ensure_employee(employee)?;
                self.employees[employee.0].manager = None;
            }
        }
        self.sync_employee(employee);
        Ok(())
    }

    pub fn manager_of(&self, employee: EmployeeKey) -> Option<EmployeeKey> {
        self.employees.get(employee.0).and_then(|node| node.manager)
    }

    /// Employees whose manager is `manager`, in node insertion order.
    pub fn direct_reports(&self, manager: EmployeeKey) -> Vec<EmployeeKey> {
        self.employees
            .iter()
            .enumerate()
            .filter(|(_, node)| node.manager == Some(manager))
            .map(|(index, _)| EmployeeKey(index))
            .collect()
    }

    /// Managers above `employee`, nearest first.
    pub fn reporting_chain(&self, employee: EmployeeKey) -> Vec<EmployeeKey> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([employee]);
        let mut cursor = self.manager_of(employee);
        while let Some(current) = cursor {
            if !visited.insert(current) {
                break;
            }
            chain.push(current);
            cursor = self.manager_of(current);
        }
        chain
    }

    /// Every transitive report of `manager`, breadth-first.
    pub fn all_reports(&self, manager: EmployeeKey) -> Vec<EmployeeKey> {
        let mut children: HashMap<EmployeeKey, Vec<EmployeeKey>> = HashMap::new();
        for (index, node) in self.employees.iter().enumerate() {
            if let Some(parent) = node.manager {
                children.entry(parent).or_default().push(EmployeeKey(index));
            }
        }

        let mut result = Vec::new();
        let mut visited = HashSet::from([manager]);
        let mut queue = VecDeque::from([manager]);
        while let Some(current) = queue.pop_front() {
            for child in children.get(&current).into_iter().flatten() {
                if visited.insert(*child) {
                    result.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        result
    }

    /// Checks every record plus graph-wide uniqueness of department names
    /// and employee emails.
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut violations = Violations::default();
        let mut names = HashSet::new();
        for node in &self.departments {
            if let Err(errors) = node.record.validate() {
                violations.extend(errors);
            }
            let name = node.record.name.trim();
            if !name.is_empty() && !names.insert(name) {
                violations.push(ValidationError::UniquenessViolation {
                    entity: EntityKind::Department,
                    field: "name",
                    value: name.to_string(),
                });
            }
        }

        let mut emails = HashSet::new();
        for node in &self.employees {
            if let Err(errors) = node.record.validate_at(today) {
                violations.extend(errors);
            }
            if let Some(email) = node.record.email.as_deref() {
                if !emails.insert(email) {
                    violations.push(ValidationError::UniquenessViolation {
                        entity: EntityKind::Employee,
                        field: "email",
                        value: email.to_string(),
                    });
                }
            }
        }
        violations.finish()
    }

    fn link_manager(&mut self, report: EmployeeKey, manager: EmployeeKey) -> GraphResult<()> {
        self.ensure_employee(manager)?;
        self.ensure_employee(report)?;
        if self.would_create_cycle(report, manager) {
            return Err(GraphError::CycleDetected { report, manager });
        }
        self.employees[report.0].manager = Some(manager);
        Ok(())
    }

    fn would_create_cycle(&self, report: EmployeeKey, candidate_manager: EmployeeKey) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_manager);
        while let Some(current) = cursor {
            if current == report || !visited.insert(current) {
                return true;
            }
            cursor = self.manager_of(current);
        }
        false
    }

    fn ensure_department(&self, key: DepartmentKey) -> GraphResult<()> {
        if key.0 < self.departments.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownDepartment(key))
        }
    }

    fn ensure_employee(&self, key: EmployeeKey) -> GraphResult<()> {
        if key.0 < self.employees.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownEmployee(key))
        }
    }

    fn sync_department(&mut self, key: DepartmentKey) {
        let manager_id = self.departments[key.0]
            .manager
            .and_then(|manager| self.employees[manager.0].record.id);
        self.departments[key.0].record.manager_id = manager_id;
    }

    fn sync_employee(&mut self, key: EmployeeKey) {
        let node = &self.employees[key.0];
        let department_id = node
            .department
            .and_then(|department| self.departments[department.0].record.id);
        let manager_id = node
            .manager
            .and_then(|manager| self.employees[manager.0].record.id);
        let record = &mut self.employees[key.0].record;
        record.department_id = department_id;
        record.manager_id = manager_id;
    }

    fn sync_all(&mut self) {
        for index in 0..self.departments.len() {
            self.sync_department(DepartmentKey(index));
        }
        for index in 0..self.employees.len() {
            self.sync_employee(EmployeeKey(index));
        }
    }
}
