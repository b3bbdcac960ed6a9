//! Core organization model: departments, employees and reporting lines.
//! This crate owns the data model, its validation rules and its SQLite store.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig, DatabaseConfig, HierarchyConfig, LoggingConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::department::Department;
pub use model::employee::Employee;
pub use model::graph::{
    DepartmentKey, EmployeeKey, GraphError, GraphResult, OrgGraph, ReportDepartmentPolicy,
};
pub use model::ids::{DepartmentId, EmployeeId};
pub use model::validation::{EntityKind, ValidationError, ValidationErrors};
pub use repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
pub use repo::employee_repo::{EmployeeListQuery, EmployeeRepository, SqliteEmployeeRepository};
pub use repo::{RepoError, RepoResult};
pub use service::org_service::{OrgService, OrgServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
