//! Employee repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over `employees` plus single-column relationship updates.
//! - Answer inverse views (department members, direct reports) by query.
//!
//! # Invariants
//! - Emails are unique when present (`uk_employee_email`).
//! - Listing is deterministic: `id ASC`.
//! - `hire_date` is stored as `YYYY-MM-DD` text.

use crate::model::employee::Employee;
use crate::model::ids::{DepartmentId, EmployeeId};
use crate::model::validation::EntityKind;
use crate::repo::{ensure_connection_ready, map_write_error, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Params, Row};

const EMPLOYEE_SELECT_SQL: &str = "SELECT
    id,
    first_name,
    last_name,
    title,
    email,
    phone,
    hire_date,
    department_id,
    manager_id
FROM employees";

const EMPLOYEE_COLUMNS: &[&str] = &[
    "id",
    "first_name",
    "last_name",
    "title",
    "email",
    "phone",
    "hire_date",
    "department_id",
    "manager_id",
];

const HIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Filter and pagination options for listing employees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeListQuery {
    pub department_id: Option<DepartmentId>,
    pub manager_id: Option<EmployeeId>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl EmployeeListQuery {
    pub fn in_department(department_id: DepartmentId) -> Self {
        Self {
            department_id: Some(department_id),
            ..Self::default()
        }
    }

    pub fn reporting_to(manager_id: EmployeeId) -> Self {
        Self {
            manager_id: Some(manager_id),
            ..Self::default()
        }
    }
}

/// Repository interface for employee persistence.
pub trait EmployeeRepository {
    /// Inserts an unsaved employee and returns it with its assigned id.
    fn create_employee(&self, employee: &Employee) -> RepoResult<Employee>;
    fn update_employee(&self, employee: &Employee) -> RepoResult<()>;
    fn get_employee(&self, id: EmployeeId) -> RepoResult<Option<Employee>>;
    fn find_employee_by_email(&self, email: &str) -> RepoResult<Option<Employee>>;
    fn list_employees(&self, query: &EmployeeListQuery) -> RepoResult<Vec<Employee>>;
    fn set_employee_department(
        &self,
        id: EmployeeId,
        department_id: Option<DepartmentId>,
    ) -> RepoResult<()>;
    fn set_employee_manager(&self, id: EmployeeId, manager_id: Option<EmployeeId>)
        -> RepoResult<()>;
    /// Sets `manager_id` and, when `department_id` is given, the department
    /// in a single statement.
    fn place_under_manager(
        &self,
        id: EmployeeId,
        manager_id: EmployeeId,
        department_id: Option<DepartmentId>,
    ) -> RepoResult<()>;
    /// Every transitive report of `manager_id`, ordered by id.
    fn list_all_reports(&self, manager_id: EmployeeId) -> RepoResult<Vec<Employee>>;
    fn delete_employee(&self, id: EmployeeId) -> RepoResult<()>;
}

/// SQLite-backed employee repository.
pub struct SqliteEmployeeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEmployeeRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[("employees", EMPLOYEE_COLUMNS)])?;
        Ok(Self { conn })
    }

    fn query_many<P: Params>(&self, sql: &str, params: P) -> RepoResult<Vec<Employee>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut employees = Vec::new();
        while let Some(row) = rows.next()? {
            employees.push(parse_employee_row(row)?);
        }
        Ok(employees)
    }

    fn update_column(
        &self,
        id: EmployeeId,
        sql: &str,
        value: Option<i64>,
    ) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(sql, params![id.0, value])
            .map_err(|err| map_write_error(err, EntityKind::Employee))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

impl EmployeeRepository for SqliteEmployeeRepository<'_> {
    fn create_employee(&self, employee: &Employee) -> RepoResult<Employee> {
        if let Some(id) = employee.id {
            return Err(RepoError::AlreadyPersisted {
                entity: EntityKind::Employee,
                id: id.0,
            });
        }

        self.conn
            .execute(
                "INSERT INTO employees (
                    first_name,
                    last_name,
                    title,
                    email,
                    phone,
                    hire_date,
                    department_id,
                    manager_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    employee.first_name.as_str(),
                    employee.last_name.as_str(),
                    employee.title.as_deref(),
                    employee.email.as_deref(),
                    employee.phone.as_deref(),
                    employee.hire_date.map(format_hire_date),
                    employee.department_id.map(|id| id.0),
                    employee.manager_id.map(|id| id.0),
                ],
            )
            .map_err(|err| map_write_error(err, EntityKind::Employee))?;

        let mut created = employee.clone();
        created.id = Some(EmployeeId(self.conn.last_insert_rowid()));
        Ok(created)
    }

    fn update_employee(&self, employee: &Employee) -> RepoResult<()> {
        let id = employee
            .id
            .ok_or(RepoError::NotPersisted(EntityKind::Employee))?;

        let changed = self
            .conn
            .execute(
                "UPDATE employees
                 SET
                    first_name = ?2,
                    last_name = ?3,
                    title = ?4,
                    email = ?5,
                    phone = ?6,
                    hire_date = ?7,
                    department_id = ?8,
                    manager_id = ?9
                 WHERE id = ?1;",
                params![
                    id.0,
                    employee.first_name.as_str(),
                    employee.last_name.as_str(),
                    employee.title.as_deref(),
                    employee.email.as_deref(),
                    employee.phone.as_deref(),
                    employee.hire_date.map(format_hire_date),
                    employee.department_id.map(|id| id.0),
                    employee.manager_id.map(|id| id.0),
                ],
            )
            .map_err(|err| map_write_error(err, EntityKind::Employee))?;

        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn get_employee(&self, id: EmployeeId) -> RepoResult<Option<Employee>> {
        let mut found = self.query_many(&format!("{EMPLOYEE_SELECT_SQL} WHERE id = ?1;"), [id.0])?;
        Ok(found.pop())
    }

    fn find_employee_by_email(&self, email: &str) -> RepoResult<Option<Employee>> {
        let mut found =
            self.query_many(&format!("{EMPLOYEE_SELECT_SQL} WHERE email = ?1;"), [email])?;
        Ok(found.pop())
    }

    fn list_employees(&self, query: &EmployeeListQuery) -> RepoResult<Vec<Employee>> {
        let mut sql = format!("{EMPLOYEE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(department_id) = query.department_id {
            sql.push_str(" AND department_id = ?");
            bind_values.push(Value::Integer(department_id.0));
        }
        if let Some(manager_id) = query.manager_id {
            sql.push_str(" AND manager_id = ?");
            bind_values.push(Value::Integer(manager_id.0));
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        self.query_many(&sql, params_from_iter(bind_values))
    }

    fn set_employee_department(
        &self,
        id: EmployeeId,
        department_id: Option<DepartmentId>,
    ) -> RepoResult<()> {
        self.update_column(
            id,
            "UPDATE employees SET department_id = ?2 WHERE id = ?1;",
            department_id.map(|id| id.0),
        )
    }

    fn set_employee_manager(
        &self,
        id: EmployeeId,
        manager_id: Option<EmployeeId>,
    ) -> RepoResult<()> {
        self.update_column(
            id,
            "UPDATE employees SET manager_id = ?2 WHERE id = ?1;",
            manager_id.map(|id| id.0),
        )
    }

    fn place_under_manager(
        &self,
        id: EmployeeId,
        manager_id: EmployeeId,
        department_id: Option<DepartmentId>,
    ) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE employees
                 SET
                    manager_id = ?2,
                    department_id = COALESCE(?3, department_id)
                 WHERE id = ?1;",
                params![id.0, manager_id.0, department_id.map(|id| id.0)],
            )
            .map_err(|err| map_write_error(err, EntityKind::Employee))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn list_all_reports(&self, manager_id: EmployeeId) -> RepoResult<Vec<Employee>> {
        // UNION de-duplicates ids, so a looped chain written outside the
        // service still terminates.
        self.query_many(
            "WITH RECURSIVE reports(id) AS (
                SELECT id
                FROM employees
                WHERE manager_id = ?1
                UNION
                SELECT child.id
                FROM employees child
                INNER JOIN reports parent ON child.manager_id = parent.id
                WHERE child.id <> ?1
            )
            SELECT
                e.id AS id,
                e.first_name AS first_name,
                e.last_name AS last_name,
                e.title AS title,
                e.email AS email,
                e.phone AS phone,
                e.hire_date AS hire_date,
                e.department_id AS department_id,
                e.manager_id AS manager_id
            FROM employees e
            INNER JOIN reports r ON r.id = e.id
            ORDER BY e.id ASC;",
            [manager_id.0],
        )
    }

    fn delete_employee(&self, id: EmployeeId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM employees WHERE id = ?1;", [id.0])
            .map_err(|err| map_write_error(err, EntityKind::Employee))?;
        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: EmployeeId) -> RepoError {
    RepoError::NotFound {
        entity: EntityKind::Employee,
        id: id.0,
    }
}

fn format_hire_date(date: NaiveDate) -> String {
    date.format(HIRE_DATE_FORMAT).to_string()
}

fn parse_employee_row(row: &Row<'_>) -> RepoResult<Employee> {
    let hire_date = match row.get::<_, Option<String>>("hire_date")? {
        Some(value) => Some(NaiveDate::parse_from_str(&value, HIRE_DATE_FORMAT).map_err(
            |_| RepoError::InvalidData(format!("invalid date `{value}` in employees.hire_date")),
        )?),
        None => None,
    };

    Ok(Employee {
        id: Some(EmployeeId(row.get("id")?)),
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        title: row.get("title")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        hire_date,
        department_id: row
            .get::<_, Option<i64>>("department_id")?
            .map(DepartmentId),
        manager_id: row.get::<_, Option<i64>>("manager_id")?.map(EmployeeId),
    })
}
