use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{is_unique_violation, require_user, Store, StoreError, StoreResult};
use crate::models::{validate_category_name, Category};

// ==================== Category Operations ====================

impl Store {
    /// Create an empty category. Names are unique per author.
    pub fn create_category(&self, author_id: &str, name: &str) -> StoreResult<Category> {
        validate_category_name(name)?;

        let conn = self.conn();
        require_user(&conn, author_id)?;

        let category = Category {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            name: name.to_string(),
            items: Vec::new(),
        };

        conn.execute(
            "INSERT INTO categories (id, author_id, name) VALUES (?1, ?2, ?3)",
            params![&category.id, &category.author_id, &category.name],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateName {
                    author_id: author_id.to_string(),
                    name: name.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        log::debug!("Created category {} for {}", name, author_id);
        Ok(category)
    }

    pub fn get_category(&self, category_id: &str) -> StoreResult<Category> {
        let conn = self.conn();
        existing_category(&conn, category_id)
    }

    /// All categories owned by one author, oldest first
    pub fn list_by_author(&self, author_id: &str) -> StoreResult<Vec<Category>> {
        let conn = self.conn();
        require_user(&conn, author_id)?;

        let mut stmt = conn.prepare(
            "SELECT id, author_id, name FROM categories WHERE author_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![author_id], |row| {
            Ok(Category {
                id: row.get("id")?,
                author_id: row.get("author_id")?,
                name: row.get("name")?,
                items: Vec::new(),
            })
        })?;

        let mut categories = Vec::new();
        for row in rows {
            let mut category = row?;
            category.items = category_items(&conn, &category.id)?;
            categories.push(category);
        }
        Ok(categories)
    }

    /// Add a user to the category (no-op if already a member)
    pub fn add_item(&self, category_id: &str, user_id: &str) -> StoreResult<Category> {
        let conn = self.conn();
        existing_category(&conn, category_id)?;
        require_user(&conn, user_id)?;

        conn.execute(
            "INSERT OR IGNORE INTO category_items (category_id, user_id) VALUES (?1, ?2)",
            params![category_id, user_id],
        )?;
        existing_category(&conn, category_id)
    }

    /// Remove a user from the category (no-op if not a member)
    pub fn remove_item(&self, category_id: &str, user_id: &str) -> StoreResult<Category> {
        let conn = self.conn();
        existing_category(&conn, category_id)?;

        conn.execute(
            "DELETE FROM category_items WHERE category_id = ?1 AND user_id = ?2",
            params![category_id, user_id],
        )?;
        existing_category(&conn, category_id)
    }

    /// Returns whether the category existed
    pub fn delete_category(&self, category_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM category_items WHERE category_id = ?1",
            params![category_id],
        )?;
        let rows = tx.execute("DELETE FROM categories WHERE id = ?1", params![category_id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Drop every category the author owns. Returns the number removed.
    pub fn delete_categories_by_author(&self, author_id: &str) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            r#"DELETE FROM category_items WHERE category_id IN
                   (SELECT id FROM categories WHERE author_id = ?1)"#,
            params![author_id],
        )?;
        let rows = tx.execute(
            "DELETE FROM categories WHERE author_id = ?1",
            params![author_id],
        )?;
        tx.commit()?;
        log::info!("Removed {} categories for user {}", rows, author_id);
        Ok(rows)
    }
}

fn existing_category(conn: &Connection, category_id: &str) -> StoreResult<Category> {
    let category = conn
        .query_row(
            "SELECT id, author_id, name FROM categories WHERE id = ?1",
            params![category_id],
            |row| {
                Ok(Category {
                    id: row.get("id")?,
                    author_id: row.get("author_id")?,
                    name: row.get("name")?,
                    items: Vec::new(),
                })
            },
        )
        .optional()?;

    let mut category =
        category.ok_or_else(|| StoreError::NotFound(format!("Category {}", category_id)))?;
    category.items = category_items(conn, category_id)?;
    Ok(category)
}

fn category_items(conn: &Connection, category_id: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id FROM category_items WHERE category_id = ?1 ORDER BY rowid ASC",
    )?;
    let items = stmt
        .query_map(params![category_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(items)
}
