use crate::error::AppError;
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard};

/// Hard cap of stored messages per user. Older rows are pruned on append.
pub const MESSAGE_CAP: i64 = 20;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// SQLite-backed per-user message history. The owning binary constructs one
/// and injects it; rusqlite connections are not Sync, so the handle wraps
/// the connection in a mutex.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Open the store at `MESSAGES_DB_PATH`, defaulting to
    /// `~/.polaris/messages.db`. Falls back to an in-memory store when the
    /// file cannot be opened, so the API stays up without persistence.
    pub fn open_from_env() -> Result<Self, AppError> {
        let path = std::env::var("MESSAGES_DB_PATH").unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|home| home.join(".polaris").join("messages.db"))
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| "polaris_messages.db".to_string())
        });
        if let Some(parent) = std::path::Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match Self::open(&path) {
            Ok(store) => {
                println!("💾 Message store: {}", path);
                Ok(store)
            }
            Err(e) => {
                eprintln!("⚠️ Could not open {} ({}), using in-memory store", path, e);
                Self::open_in_memory()
            }
        }
    }

    fn from_connection(conn: Connection) -> Result<Self, AppError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_user_created ON messages(user_id, created_at)",
            [],
        )?;

        Ok(MessageStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                eprintln!("⚠️ Message store mutex was poisoned, recovering...");
                poisoned.into_inner()
            }
        }
    }

    /// Append one message, then prune the user's history beyond the cap,
    /// oldest first. Returns the stored row.
    pub fn append(&self, user_id: &str, role: &str, content: &str) -> Result<StoredMessage, AppError> {
        let conn = self.lock();
        let created_at = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO messages (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, role, content, created_at],
        )?;
        conn.execute(
            "DELETE FROM messages WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM messages WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC LIMIT ?2
            )",
            params![user_id, MESSAGE_CAP],
        )?;
        Ok(StoredMessage {
            role: role.to_string(),
            content: content.to_string(),
            created_at,
        })
    }

    /// Last `MESSAGE_CAP` messages for a user, chronological.
    pub fn history(&self, user_id: &str) -> Result<Vec<StoredMessage>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM messages WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, MESSAGE_CAP], |row| {
            Ok(StoredMessage {
                role: row.get(0)?,
                content: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse(); // newest-first query, chronological result
        Ok(messages)
    }

    /// Delete every message for a user. Returns the number removed.
    pub fn wipe(&self, user_id: &str) -> Result<usize, AppError> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM messages WHERE user_id = ?1", params![user_id])?;
        Ok(removed)
    }

    pub fn count(&self, user_id: &str) -> Result<i64, AppError> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
