use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

mod categories;
mod follows;
mod tiers;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("User {follower_id} already follows user {followed_id}")]
    DuplicateEdge {
        follower_id: String,
        followed_id: String,
    },
    #[error("Category name {name} is already used by author {author_id}")]
    DuplicateName { author_id: String, name: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store backing the follow graph, tiers and categories.
///
/// Users and freets live here too, but only as the minimal records the graph
/// logic reads.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Every mutation is one statement or one transaction, so a poisoned
    /// lock still guards a consistent connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS freets (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                followed_id TEXT NOT NULL,
                time_followed TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (followed_id) REFERENCES users(id),
                UNIQUE(follower_id, followed_id)
            );

            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                name TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id),
                UNIQUE(author_id, name)
            );

            CREATE TABLE IF NOT EXISTS category_items (
                category_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (category_id, user_id),
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            CREATE TABLE IF NOT EXISTS tiers (
                id TEXT PRIMARY KEY,
                owner_id TEXT UNIQUE NOT NULL,
                is_enabled INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (owner_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS tier_followers (
                owner_id TEXT NOT NULL,
                list TEXT NOT NULL,
                follower_id TEXT NOT NULL,
                PRIMARY KEY (owner_id, list, follower_id),
                FOREIGN KEY (owner_id) REFERENCES tiers(owner_id)
            );

            CREATE INDEX IF NOT EXISTS idx_freets_author_id ON freets(author_id);
            CREATE INDEX IF NOT EXISTS idx_follows_followed_id ON follows(followed_id);
            CREATE INDEX IF NOT EXISTS idx_categories_author_id ON categories(author_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn();
        user.id = Uuid::new_v4().to_string();
        user.created_at = Utc::now();

        conn.execute(
            "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
            params![&user.id, &user.username, user.created_at.to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidInput(format!("Username {} is already taken", user.username))
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("User {}", id)),
            _ => StoreError::Database(e),
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let conn = self.conn();
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("User {}", username))
            }
            _ => StoreError::Database(e),
        })
    }

    /// Remove the user row only. Follows, categories, the tier record and
    /// freets are removed by their own cascade operations.
    pub fn delete_user(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Map each known id to its username. Unknown ids are left out.
    pub fn get_usernames<'a, I>(&self, ids: I) -> StoreResult<HashMap<String, String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached("SELECT username FROM users WHERE id = ?1")?;
        let mut usernames = HashMap::new();
        for id in ids {
            if usernames.contains_key(id) {
                continue;
            }
            let username: Option<String> = stmt
                .query_row(params![id], |row| row.get(0))
                .optional()?;
            if let Some(username) = username {
                usernames.insert(id.clone(), username);
            }
        }
        Ok(usernames)
    }

    // ==================== Freet Operations ====================

    pub fn create_freet(&self, freet: &mut Freet) -> StoreResult<()> {
        let conn = self.conn();
        require_user(&conn, &freet.author_id)?;
        freet.id = Uuid::new_v4().to_string();
        freet.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO freets (id, author_id, content, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &freet.id,
                &freet.author_id,
                &freet.content,
                freet.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All freets by one author, oldest first
    pub fn list_freets_by_author(&self, author_id: &str) -> StoreResult<Vec<Freet>> {
        let conn = self.conn();
        freets_by_author(&conn, author_id)
    }

    pub fn delete_freets_by_author(&self, author_id: &str) -> StoreResult<usize> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM freets WHERE author_id = ?1", params![author_id])?;
        Ok(rows)
    }
}

fn freets_by_author(conn: &Connection, author_id: &str) -> StoreResult<Vec<Freet>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM freets WHERE author_id = ?1 ORDER BY rowid ASC",
    )?;
    let freets = stmt
        .query_map(params![author_id], |row| {
            Ok(Freet {
                id: row.get("id")?,
                author_id: row.get("author_id")?,
                content: row.get("content")?,
                created_at: parse_datetime(row.get::<_, String>("created_at")?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(freets)
}

/// NotFound unless a user with this id exists
pub(crate) fn require_user(conn: &Connection, id: &str) -> StoreResult<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("User {}", id))),
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

/// True when SQLite rejected the write on a UNIQUE or PRIMARY KEY constraint
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Unreadable stored timestamp {:?} ({}), using now", s, e);
            Utc::now()
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn create_user(store: &Store, username: &str) -> User {
        let mut user = User {
            id: String::new(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        store.create_user(&mut user).unwrap();
        user
    }

    pub fn create_freet(store: &Store, author_id: &str, content: &str) -> Freet {
        let mut freet = Freet {
            id: String::new(),
            author_id: author_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        store.create_freet(&mut freet).unwrap();
        freet
    }
}
