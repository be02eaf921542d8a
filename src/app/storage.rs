// Task store seam and the SQLite backend behind it
// Philosophy of CRUD lives here, minus the D: tasks are never deleted from this program
// Based on https://github.com/rusqlite/rusqlite/blob/master/examples/persons/main.rs
use std::cmp::Ordering;
use std::path::Path;

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::app::models::{NewTask, Priority, Task};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no task with id {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// The document store the task view talks to.
///
/// Writes are partial: a create assigns id and timestamp, the updates touch a
/// single field. `update_order` is all-or-nothing across every listed task.
pub trait TaskStore {
    fn create_task(&mut self, task: &NewTask) -> Result<Task>;

    /// Every task, sorted by [`compare_position`].
    fn get_all_tasks(&self) -> Result<Vec<Task>>;

    fn update_priority(&mut self, task_id: &str, priority: Priority) -> Result<()>;

    fn update_order(&mut self, positions: &[(String, i64)]) -> Result<()>;
}

pub fn new_task_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Collection order: explicit positions first, then creation time, then id.
pub fn compare_position(a: &Task, b: &Task) -> Ordering {
    match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.created_at.cmp(&b.created_at))
    .then_with(|| a.id.cmp(&b.id))
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

pub struct SqliteStore {
    db_con: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("opening task database at {}", path.display());
        let store = SqliteStore {
            db_con: Connection::open(path)?,
        };
        store.create_table_if_not_exists()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let store = SqliteStore {
            db_con: Connection::open_in_memory()?,
        };
        store.create_table_if_not_exists()?;
        Ok(store)
    }

    fn create_table_if_not_exists(&self) -> Result<()> {
        self.db_con.execute(
            "CREATE TABLE IF NOT EXISTS task_item (
                Id TEXT PRIMARY KEY,
                Name TEXT NOT NULL,
                Title TEXT NOT NULL,
                Description TEXT NOT NULL,
                DueDate TEXT NOT NULL,
                Priority TEXT NOT NULL,
                UserId TEXT NOT NULL,
                CreatedAt DATETIME NOT NULL,
                SortOrder INTEGER
            );",
            (),
        )?;
        Ok(())
    }

    fn map_task(row: &Row<'_>) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            due_date: row.get(4)?,
            priority: row.get(5)?,
            user_id: row.get(6)?,
            created_at: row.get(7)?,
            order: row.get(8)?,
        })
    }
}

impl TaskStore for SqliteStore {
    // CREATE
    fn create_task(&mut self, task: &NewTask) -> Result<Task> {
        let created = Task {
            id: new_task_id(),
            name: task.name.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date.clone(),
            priority: task.priority,
            user_id: task.user_id.clone(),
            created_at: Utc::now(),
            order: None,
        };
        self.db_con.execute(
            "INSERT INTO task_item (Id, Name, Title, Description, DueDate, Priority, UserId, CreatedAt, SortOrder)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL);",
            params![
                created.id,
                created.name,
                created.title,
                created.description,
                created.due_date,
                created.priority,
                created.user_id,
                created.created_at,
            ],
        )?;
        Ok(created)
    }

    // READ
    fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self.db_con.prepare(
            "SELECT Id, Name, Title, Description, DueDate, Priority, UserId, CreatedAt, SortOrder
             FROM task_item
             ORDER BY SortOrder IS NULL, SortOrder, CreatedAt, Id",
        )?;
        let tasks = stmt
            .query_map([], Self::map_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;
        Ok(tasks)
    }

    // UPDATE
    fn update_priority(&mut self, task_id: &str, priority: Priority) -> Result<()> {
        let changed = self.db_con.execute(
            "UPDATE task_item SET Priority = ?1 WHERE Id = ?2;",
            params![priority, task_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        Ok(())
    }

    // UPDATE, several rows in one transaction. Dropping `tx` early rolls back.
    fn update_order(&mut self, positions: &[(String, i64)]) -> Result<()> {
        let tx = self.db_con.transaction()?;
        for (task_id, position) in positions {
            let changed = tx.execute(
                "UPDATE task_item SET SortOrder = ?1 WHERE Id = ?2;",
                params![position, task_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(task_id.clone()));
            }
        }
        tx.commit()?;
        Ok(())
    }
}
