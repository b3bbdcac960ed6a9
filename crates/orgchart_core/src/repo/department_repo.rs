//! Department repository contract and SQLite implementation.
//!
//! # Invariants
//! - Department names are unique (`uk_department_name`).
//! - Deleting a department deletes its employees (`fk_employee_department`
//!   cascades); reports and department managers pointing at those employees
//!   are cleared by `ON DELETE SET NULL`.

use crate::model::department::Department;
use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::EntityKind;
use crate::repo::{ensure_connection_ready, map_write_error, RepoError, RepoResult};
use rusqlite::{params, Connection, Params, Row};

const DEPARTMENT_SELECT_SQL: &str = "SELECT id, name, manager_id FROM departments";
const DEPARTMENT_COLUMNS: &[&str] = &["id", "name", "manager_id"];

/// Repository interface for department persistence.
pub trait DepartmentRepository {
    /// Inserts an unsaved department and returns it with its assigned id.
    fn create_department(&self, department: &Department) -> RepoResult<Department>;
    fn update_department(&self, department: &Department) -> RepoResult<()>;
    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>>;
    fn find_department_by_name(&self, name: &str) -> RepoResult<Option<Department>>;
    /// Lists all departments ordered by id.
    fn list_departments(&self) -> RepoResult<Vec<Department>>;
    fn set_department_manager(
        &self,
        id: DepartmentId,
        manager_id: Option<EmployeeId>,
    ) -> RepoResult<()>;
    /// Deletes a department and, by cascade, its employees.
    fn delete_department(&self, id: DepartmentId) -> RepoResult<()>;
}

/// SQLite-backed department repository.
pub struct SqliteDepartmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDepartmentRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[("departments", DEPARTMENT_COLUMNS)])?;
        Ok(Self { conn })
    }

    fn query_one<P: Params>(&self, sql: &str, params: P) -> RepoResult<Option<Department>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_department_row(row)?));
        }
        Ok(None)
    }
}

impl DepartmentRepository for SqliteDepartmentRepository<'_> {
    fn create_department(&self, department: &Department) -> RepoResult<Department> {
        if let Some(id) = department.id {
            return Err(RepoError::AlreadyPersisted {
                entity: EntityKind::Department,
                id: id.0,
            });
        }

        self.conn
            .execute(
                "INSERT INTO departments (name, manager_id) VALUES (?1, ?2);",
                params![
                    department.name.as_str(),
                    department.manager_id.map(|id| id.0)
                ],
            )
            .map_err(|err| map_write_error(err, EntityKind::Department))?;

        let mut created = department.clone();
        created.id = Some(DepartmentId(self.conn.last_insert_rowid()));
        Ok(created)
    }

    fn update_department(&self, department: &Department) -> RepoResult<()> {
        let id = department
            .id
            .ok_or(RepoError::NotPersisted(EntityKind::Department))?;

        let changed = self
            .conn
            .execute(
                "UPDATE departments SET name = ?2, manager_id = ?3 WHERE id = ?1;",
                params![
                    id.0,
                    department.name.as_str(),
                    department.manager_id.map(|id| id.0)
                ],
            )
            .map_err(|err| map_write_error(err, EntityKind::Department))?;

        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>> {
        self.query_one(&format!("{DEPARTMENT_SELECT_SQL} WHERE id = ?1;"), [id.0])
    }

    fn find_department_by_name(&self, name: &str) -> RepoResult<Option<Department>> {
        self.query_one(&format!("{DEPARTMENT_SELECT_SQL} WHERE name = ?1;"), [name])
    }

    fn list_departments(&self) -> RepoResult<Vec<Department>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DEPARTMENT_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut departments = Vec::new();
        while let Some(row) = rows.next()? {
            departments.push(parse_department_row(row)?);
        }
        Ok(departments)
    }

    fn set_department_manager(
        &self,
        id: DepartmentId,
        manager_id: Option<EmployeeId>,
    ) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE departments SET manager_id = ?2 WHERE id = ?1;",
                params![id.0, manager_id.map(|id| id.0)],
            )
            .map_err(|err| map_write_error(err, EntityKind::Department))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn delete_department(&self, id: DepartmentId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM departments WHERE id = ?1;", [id.0])
            .map_err(|err| map_write_error(err, EntityKind::Department))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: DepartmentId) -> RepoError {
    RepoError::NotFound {
        entity: EntityKind::Department,
        id: id.0,
    }
}

fn parse_department_row(row: &Row<'_>) -> RepoResult<Department> {
    let name: String = row.get("name")?;
    if name.trim().is_empty() {
        return Err(RepoError::InvalidData(
            "blank value in departments.name".to_string(),
        ));
    }

    Ok(Department {
        id: Some(DepartmentId(row.get("id")?)),
        name,
        manager_id: row.get::<_, Option<i64>>("manager_id")?.map(EmployeeId),
    })
}
