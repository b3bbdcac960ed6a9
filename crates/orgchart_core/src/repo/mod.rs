//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define data access contracts for departments and employees.
//! - Keep SQL details out of service orchestration.
//! - Translate SQLite constraint failures into semantic errors.
//!
//! # Invariants
//! - Repositories only accept connections migrated to the latest version.
//! - Read paths reject malformed persisted values instead of masking them.
//! - Inverse collections are answered by queries on the foreign-key column.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::validation::EntityKind;
use rusqlite::{ffi, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod department_repo;
pub mod employee_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from department/employee persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist.
    NotFound { entity: EntityKind, id: i64 },
    /// Create was called for a record that already has an id.
    AlreadyPersisted { entity: EntityKind, id: i64 },
    /// Update was called for a record without an id.
    NotPersisted(EntityKind),
    /// A unique constraint rejected the write.
    UniqueViolation {
        entity: EntityKind,
        constraint: String,
    },
    /// A foreign key points at a missing row.
    ForeignKeyViolation { entity: EntityKind },
    /// A `NOT NULL`/`CHECK` constraint rejected the write.
    ConstraintViolation { entity: EntityKind, detail: String },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::AlreadyPersisted { entity, id } => {
                write!(f, "{entity} already persisted with id {id}")
            }
            Self::NotPersisted(entity) => write!(f, "{entity} has not been persisted yet"),
            Self::UniqueViolation { entity, constraint } => {
                write!(f, "{entity} unique constraint failed: {constraint}")
            }
            Self::ForeignKeyViolation { entity } => {
                write!(f, "{entity} references a missing row")
            }
            Self::ConstraintViolation { entity, detail } => {
                write!(f, "{entity} constraint failed: {detail}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps constraint failures of a write on `entity` to semantic variants.
pub(crate) fn map_write_error(err: rusqlite::Error, entity: EntityKind) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let detail = message.clone().unwrap_or_else(|| failure.to_string());
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => {
                return RepoError::UniqueViolation {
                    entity,
                    constraint: detail,
                };
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                return RepoError::ForeignKeyViolation { entity };
            }
            ffi::SQLITE_CONSTRAINT_CHECK | ffi::SQLITE_CONSTRAINT_NOTNULL => {
                return RepoError::ConstraintViolation { entity, detail };
            }
            _ => {}
        }
    }
    err.into()
}

/// Verifies schema version plus required tables and columns.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        let present = table_columns(conn, table)?;
        for column in *columns {
            if !present.iter().any(|current| current == column) {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
