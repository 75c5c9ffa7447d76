//! SQLite-backed repository
//!
//! The database normally sits in `.tasktree/tasktree.db`. A single
//! connection is shared behind a mutex, so every call is serialized.
//! Timestamps are stored as RFC 3339 strings with nanosecond precision,
//! which keeps `ORDER BY created_at` chronological.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};

use super::repository::{ProgressReport, Repository, StorageError, StorageResult};
use crate::domain::{
    AuditStamp, Complexity, Project, ProjectId, Task, TaskFilter, TaskId, TaskState,
};

const SELECTED_PROJECT_KEY: &str = "selected_project";

const PROJECT_COLUMNS: &str =
    "id, title, description, state, created_at, created_by, updated_at, updated_by";

const TASK_COLUMNS: &str = "id, project_id, parent_id, title, description, complexity, \
     priority, state, depth, created_at, created_by, updated_at, updated_by";

/// SQLite repository
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Schema version, bumped whenever the schema changes
    const SCHEMA_VERSION: i32 = 1;

    /// Opens or creates a database file
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.ensure_schema()?;
        Ok(repo)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|err| StorageError::LockPoisoned(err.to_string()))
    }

    fn ensure_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version == Self::SCHEMA_VERSION {
            return Ok(());
        }
        if version > Self::SCHEMA_VERSION {
            return Err(StorageError::Serialization(format!(
                "database schema version {version} is newer than supported version {}",
                Self::SCHEMA_VERSION
            )));
        }

        conn.execute_batch(&format!(
            "
            BEGIN;

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                parent_id TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                complexity INTEGER NOT NULL,
                priority TEXT NOT NULL,
                state TEXT NOT NULL,
                depth INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                depends_on_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                PRIMARY KEY (task_id, depends_on_id)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
            CREATE INDEX IF NOT EXISTS idx_deps_depends_on ON task_dependencies(depends_on_id);

            PRAGMA user_version = {version};

            COMMIT;
            ",
            version = Self::SCHEMA_VERSION
        ))?;

        Ok(())
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn corrupt(err: impl std::fmt::Display) -> StorageError {
    StorageError::Serialization(err.to_string())
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(corrupt)
}

/// Raw project columns, converted after the statement finishes
struct ProjectRow {
    id: String,
    title: String,
    description: String,
    state: String,
    created_at: String,
    created_by: String,
    updated_at: String,
    updated_by: String,
}

impl ProjectRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            state: row.get(3)?,
            created_at: row.get(4)?,
            created_by: row.get(5)?,
            updated_at: row.get(6)?,
            updated_by: row.get(7)?,
        })
    }
}

impl TryFrom<ProjectRow> for Project {
    type Error = StorageError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: row.id.parse().map_err(corrupt)?,
            title: row.title,
            description: row.description,
            state: row.state.parse().map_err(corrupt)?,
            created_at: parse_timestamp(&row.created_at)?,
            created_by: row.created_by,
            updated_at: parse_timestamp(&row.updated_at)?,
            updated_by: row.updated_by,
        })
    }
}

/// Raw task columns, converted after the statement finishes
struct TaskRow {
    id: String,
    project_id: String,
    parent_id: Option<String>,
    title: String,
    description: String,
    complexity: i64,
    priority: String,
    state: String,
    depth: i64,
    created_at: String,
    created_by: String,
    updated_at: String,
    updated_by: String,
}

impl TaskRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            parent_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            complexity: row.get(5)?,
            priority: row.get(6)?,
            state: row.get(7)?,
            depth: row.get(8)?,
            created_at: row.get(9)?,
            created_by: row.get(10)?,
            updated_at: row.get(11)?,
            updated_by: row.get(12)?,
        })
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = StorageError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let complexity = u8::try_from(row.complexity).map_err(corrupt)?;

        Ok(Task {
            id: row.id.parse().map_err(corrupt)?,
            project_id: row.project_id.parse().map_err(corrupt)?,
            parent_id: row
                .parent_id
                .map(|p| p.parse::<TaskId>())
                .transpose()
                .map_err(corrupt)?,
            title: row.title,
            description: row.description,
            complexity: Complexity::new(complexity).map_err(corrupt)?,
            priority: row.priority.parse().map_err(corrupt)?,
            state: row.state.parse().map_err(corrupt)?,
            depth: u32::try_from(row.depth).map_err(corrupt)?,
            dependencies: Vec::new(),
            created_at: parse_timestamp(&row.created_at)?,
            created_by: row.created_by,
            updated_at: parse_timestamp(&row.updated_at)?,
            updated_by: row.updated_by,
        })
    }
}

fn project_exists(conn: &Connection, id: &ProjectId) -> StorageResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM projects WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn require_project(conn: &Connection, id: &ProjectId) -> StorageResult<()> {
    if project_exists(conn, id)? {
        Ok(())
    } else {
        Err(StorageError::ProjectNotFound(id.clone()))
    }
}

fn task_exists(conn: &Connection, id: &TaskId) -> StorageResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM tasks WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

fn require_task(conn: &Connection, id: &TaskId) -> StorageResult<()> {
    if task_exists(conn, id)? {
        Ok(())
    } else {
        Err(StorageError::TaskNotFound(id.clone()))
    }
}

fn load_dependencies(conn: &Connection, id: &TaskId) -> StorageResult<Vec<TaskId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT depends_on_id FROM task_dependencies WHERE task_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map(params![id.to_string()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    ids.into_iter()
        .map(|s| s.parse().map_err(corrupt))
        .collect()
}

/// Runs a task query and attaches each task's dependencies
fn query_tasks(conn: &Connection, sql: &str, values: Vec<Value>) -> StorageResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), TaskRow::read)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let mut task = Task::try_from(row)?;
            task.dependencies = load_dependencies(conn, &task.id)?;
            Ok(task)
        })
        .collect()
}

fn touch_task(tx: &Transaction<'_>, id: &TaskId, stamp: &AuditStamp) -> StorageResult<()> {
    tx.execute(
        "UPDATE tasks SET updated_at = ?2, updated_by = ?3 WHERE id = ?1",
        params![id.to_string(), timestamp(&stamp.at), stamp.by],
    )?;
    Ok(())
}

impl Repository for SqliteRepository {
    fn create_project(&self, project: &Project) -> StorageResult<()> {
        let conn = self.conn()?;
        if project_exists(&conn, &project.id)? {
            return Err(StorageError::DuplicateProject(project.id.clone()));
        }

        conn.execute(
            &format!("INSERT INTO projects ({PROJECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                project.id.to_string(),
                project.title,
                project.description,
                project.state.as_str(),
                timestamp(&project.created_at),
                project.created_by,
                timestamp(&project.updated_at),
                project.updated_by,
            ],
        )?;
        Ok(())
    }

    fn get_project(&self, id: &ProjectId) -> StorageResult<Project> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id.to_string()],
                ProjectRow::read,
            )
            .optional()?
            .ok_or_else(|| StorageError::ProjectNotFound(id.clone()))?;

        Project::try_from(row)
    }

    fn update_project(&self, project: &Project) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects
             SET title = ?2, description = ?3, state = ?4, updated_at = ?5, updated_by = ?6
             WHERE id = ?1",
            params![
                project.id.to_string(),
                project.title,
                project.description,
                project.state.as_str(),
                timestamp(&project.updated_at),
                project.updated_by,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::ProjectNotFound(project.id.clone()));
        }
        Ok(())
    }

    fn delete_project(&self, id: &ProjectId) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        if changed == 0 {
            return Err(StorageError::ProjectNotFound(id.clone()));
        }
        tx.execute(
            "DELETE FROM settings WHERE key = ?1 AND value = ?2",
            params![SELECTED_PROJECT_KEY, id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn list_projects(&self) -> StorageResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, id"
        ))?;
        let rows = stmt
            .query_map([], ProjectRow::read)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Project::try_from).collect()
    }

    fn create_task(&self, task: &Task) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        require_project(&tx, &task.project_id)?;
        if task_exists(&tx, &task.id)? {
            return Err(StorageError::DuplicateTask(task.id.clone()));
        }

        tx.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                task.id.to_string(),
                task.project_id.to_string(),
                task.parent_id.as_ref().map(|p| p.to_string()),
                task.title,
                task.description,
                task.complexity.value(),
                task.priority.as_str(),
                task.state.as_str(),
                task.depth,
                timestamp(&task.created_at),
                task.created_by,
                timestamp(&task.updated_at),
                task.updated_by,
            ],
        )?;

        for (position, dep) in task.dependencies.iter().enumerate() {
            require_task(&tx, dep)?;
            tx.execute(
                "INSERT INTO task_dependencies (task_id, depends_on_id, position) VALUES (?1, ?2, ?3)",
                params![task.id.to_string(), dep.to_string(), position as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> StorageResult<Task> {
        let conn = self.conn()?;
        let mut tasks = query_tasks(
            &conn,
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            vec![Value::Text(id.to_string())],
        )?;

        tasks.pop().ok_or_else(|| StorageError::TaskNotFound(id.clone()))
    }

    fn update_task(&self, task: &Task) -> StorageResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tasks
             SET parent_id = ?2, title = ?3, description = ?4, complexity = ?5, priority = ?6,
                 state = ?7, depth = ?8, updated_at = ?9, updated_by = ?10
             WHERE id = ?1",
            params![
                task.id.to_string(),
                task.parent_id.as_ref().map(|p| p.to_string()),
                task.title,
                task.description,
                task.complexity.value(),
                task.priority.as_str(),
                task.state.as_str(),
                task.depth,
                timestamp(&task.updated_at),
                task.updated_by,
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::TaskNotFound(task.id.clone()));
        }
        Ok(())
    }

    fn delete_tasks(&self, ids: &[TaskId]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Edges go with the rows through ON DELETE CASCADE. Returning early
        // drops the transaction, which rolls it back.
        for id in ids {
            let changed = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
            if changed == 0 {
                return Err(StorageError::TaskNotFound(id.clone()));
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn list_tasks(&self, project: &ProjectId) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        require_project(&conn, project)?;
        query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY created_at, id"
            ),
            vec![Value::Text(project.to_string())],
        )
    }

    fn list_children(
        &self,
        project: &ProjectId,
        parent: Option<&TaskId>,
    ) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        require_project(&conn, project)?;

        match parent {
            Some(parent) => query_tasks(
                &conn,
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE project_id = ?1 AND parent_id = ?2
                     ORDER BY created_at, id"
                ),
                vec![
                    Value::Text(project.to_string()),
                    Value::Text(parent.to_string()),
                ],
            ),
            None => query_tasks(
                &conn,
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE project_id = ?1 AND parent_id IS NULL
                     ORDER BY created_at, id"
                ),
                vec![Value::Text(project.to_string())],
            ),
        }
    }

    fn find_tasks(&self, project: &ProjectId, filter: &TaskFilter) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        require_project(&conn, project)?;

        let mut clauses = vec!["project_id = ?".to_string()];
        let mut values = vec![Value::Text(project.to_string())];

        if !filter.states.is_empty() {
            let marks = vec!["?"; filter.states.len()].join(", ");
            clauses.push(format!("state IN ({marks})"));
            values.extend(filter.states.iter().map(|s| Value::Text(s.as_str().to_string())));
        }
        let ranges = [
            ("depth >= ?", filter.min_depth.map(i64::from)),
            ("depth <= ?", filter.max_depth.map(i64::from)),
            ("complexity >= ?", filter.min_complexity.map(i64::from)),
            ("complexity <= ?", filter.max_complexity.map(i64::from)),
        ];
        for (clause, bound) in ranges {
            if let Some(bound) = bound {
                clauses.push(clause.to_string());
                values.push(Value::Integer(bound));
            }
        }

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {} ORDER BY created_at, id",
            clauses.join(" AND ")
        );
        query_tasks(&conn, &sql, values)
    }

    fn add_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        require_task(&tx, task)?;
        require_task(&tx, depends_on)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id, position)
             SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0)
             FROM task_dependencies WHERE task_id = ?1",
            params![task.to_string(), depends_on.to_string()],
        )?;

        if inserted > 0 {
            touch_task(&tx, task, stamp)?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    fn remove_dependency(
        &self,
        task: &TaskId,
        depends_on: &TaskId,
        stamp: &AuditStamp,
    ) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        require_task(&tx, task)?;
        let removed = tx.execute(
            "DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on_id = ?2",
            params![task.to_string(), depends_on.to_string()],
        )?;

        if removed > 0 {
            touch_task(&tx, task, stamp)?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    fn dependencies_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>> {
        let conn = self.conn()?;
        require_task(&conn, task)?;
        load_dependencies(&conn, task)
    }

    fn dependents_of(&self, task: &TaskId) -> StorageResult<Vec<TaskId>> {
        let conn = self.conn()?;
        require_task(&conn, task)?;

        let mut stmt = conn.prepare(
            "SELECT d.task_id FROM task_dependencies d
             JOIN tasks t ON t.id = d.task_id
             WHERE d.depends_on_id = ?1
             ORDER BY t.created_at, t.id",
        )?;
        let ids = stmt
            .query_map(params![task.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|s| s.parse().map_err(corrupt))
            .collect()
    }

    fn progress(&self, project: &ProjectId) -> StorageResult<ProgressReport> {
        let conn = self.conn()?;
        require_project(&conn, project)?;

        let mut stmt = conn.prepare(
            "SELECT state, depth, COUNT(*) FROM tasks WHERE project_id = ?1 GROUP BY state, depth",
        )?;
        let rows = stmt
            .query_map(params![project.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = ProgressReport::new(project.clone());
        for (state, depth, count) in rows {
            let state: TaskState = state.parse().map_err(corrupt)?;
            let depth = u32::try_from(depth).map_err(corrupt)?;
            let count = usize::try_from(count).map_err(corrupt)?;
            report.record(state, depth, count);
        }
        Ok(report)
    }

    fn selected_project(&self) -> StorageResult<Option<ProjectId>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![SELECTED_PROJECT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        value.map(|v| v.parse().map_err(corrupt)).transpose()
    }

    fn set_selected_project(&self, id: &ProjectId) -> StorageResult<()> {
        let conn = self.conn()?;
        require_project(&conn, id)?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![SELECTED_PROJECT_KEY, id.to_string()],
        )?;
        Ok(())
    }

    fn clear_selected_project(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM settings WHERE key = ?1",
            params![SELECTED_PROJECT_KEY],
        )?;
        Ok(())
    }
}
