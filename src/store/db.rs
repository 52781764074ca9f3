use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};

use crate::models::{NewTask, Task, TaskId, TaskPatch, TaskStatus, User};

/// Async-safe handle to the task database.
///
/// Wraps `TaskDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TaskDb>>,
}

impl DbHandle {
    pub fn new(db: TaskDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TaskDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct TaskDb {
    conn: Connection,
}

impl TaskDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token_digest TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    expires_at TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    assigned_to TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'To Do',
                    position INTEGER NOT NULL DEFAULT 0,
                    created_by TEXT NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, position);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Users and sessions ────────────────────────────────────────────

    /// Returns `None` when the username or email is already taken.
    pub fn create_user(&self, username: &str, email: &str, password: &str) -> Result<Option<User>> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE username = ?1 OR email = ?2",
                params![username, email],
                |row| row.get(0),
            )
            .context("Failed to check for existing user")?;
        if exists {
            return Ok(None);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let hash = hash_password(password)?;
        self.conn
            .execute(
                "INSERT INTO users (id, username, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, email, hash],
            )
            .context("Failed to insert user")?;
        self.get_user(&id)
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, email, created_at FROM users WHERE id = ?1")
            .context("Failed to prepare get_user")?;
        let mut rows = stmt
            .query_map(params![id], |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .context("Failed to query user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    /// Returns the user when `password` matches the stored hash.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, password_hash FROM users WHERE email = ?1")
            .context("Failed to prepare verify_credentials")?;
        let mut rows = stmt
            .query_map(params![email], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("Failed to query credentials")?;
        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let (id, hash) = row.context("Failed to read credentials row")?;
        if !verify_password(password, &hash)? {
            return Ok(None);
        }
        self.get_user(&id)
    }

    /// Issue a bearer token for `user_id`, valid for `ttl`.
    /// Only the token's digest is stored.
    pub fn create_session(&self, user_id: &str, ttl: Duration) -> Result<String> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .context("Session expiry out of range")?
            .to_rfc3339();
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.conn
            .execute(
                "INSERT INTO sessions (token_digest, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_digest(&token), user_id, expires_at],
            )
            .context("Failed to insert session")?;
        Ok(token)
    }

    /// Resolve a token to its user. Expired sessions are removed.
    pub fn session_user(&self, token: &str) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, expires_at FROM sessions WHERE token_digest = ?1")
            .context("Failed to prepare session_user")?;
        let mut rows = stmt
            .query_map(params![token_digest(token)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("Failed to query session")?;
        let Some(row) = rows.next() else {
            return Ok(None);
        };
        let (user_id, expires_at) = row.context("Failed to read session row")?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .context("Failed to parse session expiry")?;
        if expires_at <= Utc::now() {
            self.delete_session(token)?;
            return Ok(None);
        }
        self.get_user(&user_id)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE token_digest = ?1",
                params![token_digest(token)],
            )
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    /// Insert a task at the end of the "To Do" lane.
    pub fn create_task(&self, created_by: &str, new: &NewTask) -> Result<Task> {
        let status = TaskStatus::ToDo;
        let max_pos: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(position), -1) FROM tasks WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to get max position")?;

        let id = TaskId::generate();
        self.conn
            .execute(
                "INSERT INTO tasks (id, title, description, assigned_to, status, position, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    new.title,
                    new.description,
                    new.assigned_to,
                    status.as_str(),
                    max_pos + 1,
                    created_by
                ],
            )
            .context("Failed to insert task")?;
        self.get_task(id.as_str())?
            .context("Task not found after insert")
    }

    /// All tasks, lane order first.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, description, assigned_to, status, created_by, position, created_at, updated_at
                 FROM tasks ORDER BY position, rowid",
            )
            .context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map([], TaskRow::from_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            let r = row.context("Failed to read task row")?;
            tasks.push(r.into_task()?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, description, assigned_to, status, created_by, position, created_at, updated_at
                 FROM tasks WHERE id = ?1",
            )
            .context("Failed to prepare get_task")?;
        let mut rows = stmt
            .query_map(params![id], TaskRow::from_row)
            .context("Failed to query task")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read task row")?;
                Ok(Some(r.into_task()?))
            }
            None => Ok(None),
        }
    }

    /// Apply `patch`. Returns `None` when the task does not exist.
    ///
    /// A status change or an explicit position re-ranks the affected lanes
    /// so positions stay contiguous from zero.
    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Option<Task>> {
        let Some(current) = self.get_task(id)? else {
            return Ok(None);
        };

        // Use unchecked_transaction so all updates are atomic.
        // DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let status = patch.status.unwrap_or(current.status);
        tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, assigned_to = ?3, status = ?4, updated_at = datetime('now')
             WHERE id = ?5",
            params![
                patch.title.as_deref().unwrap_or(&current.title),
                patch.description.as_deref().unwrap_or(&current.description),
                patch.assigned_to.as_deref().unwrap_or(&current.assigned_to),
                status.as_str(),
                id
            ],
        )
        .context("Failed to update task")?;

        let moved_lane = status != current.status;
        if moved_lane || patch.position.is_some() {
            if moved_lane {
                let old_lane = self.lane_ids(current.status, id)?;
                self.rerank(&old_lane)?;
            }
            let mut lane = self.lane_ids(status, id)?;
            let at = patch
                .position
                .and_then(|p| usize::try_from(p).ok())
                .unwrap_or(lane.len())
                .min(lane.len());
            lane.insert(at, id.to_string());
            self.rerank(&lane)?;
        }

        tx.commit().context("Failed to commit task update")?;
        self.get_task(id)
    }

    /// Returns `false` when no task had this id.
    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(count > 0)
    }

    /// Ids in `status`'s lane in rank order, without `excluding`.
    fn lane_ids(&self, status: TaskStatus, excluding: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tasks WHERE status = ?1 AND id != ?2 ORDER BY position, rowid")
            .context("Failed to prepare lane_ids")?;
        let rows = stmt
            .query_map(params![status.as_str(), excluding], |row| row.get::<_, String>(0))
            .context("Failed to query lane")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read lane row")?);
        }
        Ok(ids)
    }

    fn rerank(&self, ids: &[String]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE tasks SET position = ?1 WHERE id = ?2")
            .context("Failed to prepare rerank")?;
        for (position, id) in (0_i64..).zip(ids) {
            stmt.execute(params![position, id])
                .context("Failed to update task position")?;
        }
        Ok(())
    }
}

/// Argon2id PHC string with a random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Tokens are random, so a fast digest is enough to keep them out of the table.
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ── Row mapping ───────────────────────────────────────────────────────

struct TaskRow {
    id: String,
    title: String,
    description: String,
    assigned_to: String,
    status: String,
    created_by: String,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            assigned_to: row.get(3)?,
            status: row.get(4)?,
            created_by: row.get(5)?,
            position: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let status = TaskStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task status")?;
        Ok(Task {
            id: TaskId::new(self.id),
            title: self.title,
            description: self.description,
            assigned_to: self.assigned_to,
            status,
            created_by: self.created_by,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
