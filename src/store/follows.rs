use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{is_unique_violation, parse_datetime, require_user, Store, StoreError, StoreResult};
use crate::models::Follow;

// ==================== Follow Graph Operations ====================

impl Store {
    /// Create the edge follower_id -> followed_id.
    ///
    /// A repeated pair is rejected by the UNIQUE(follower_id, followed_id)
    /// constraint and surfaces as `DuplicateEdge`.
    pub fn follow(&self, follower_id: &str, followed_id: &str) -> StoreResult<Follow> {
        if follower_id == followed_id {
            return Err(StoreError::InvalidInput(
                "Users cannot follow themselves".to_string(),
            ));
        }

        let conn = self.conn();
        require_user(&conn, follower_id)?;
        require_user(&conn, followed_id)?;

        let follow = Follow {
            id: Uuid::new_v4().to_string(),
            follower_id: follower_id.to_string(),
            followed_id: followed_id.to_string(),
            time_followed: Utc::now(),
        };

        conn.execute(
            r#"INSERT INTO follows (id, follower_id, followed_id, time_followed)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                &follow.id,
                &follow.follower_id,
                &follow.followed_id,
                follow.time_followed.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateEdge {
                    follower_id: follower_id.to_string(),
                    followed_id: followed_id.to_string(),
                }
            } else {
                StoreError::Database(e)
            }
        })?;

        log::debug!("{} now follows {}", follower_id, followed_id);
        Ok(follow)
    }

    pub fn follow_by_username(&self, follower: &str, followed: &str) -> StoreResult<Follow> {
        let follower_id = self.get_user_by_username(follower)?.id;
        let followed_id = self.get_user_by_username(followed)?.id;
        self.follow(&follower_id, &followed_id)
    }

    /// Remove one edge by id. Returns whether an edge was removed.
    pub fn unfollow(&self, follow_id: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM follows WHERE id = ?1", params![follow_id])?;
        if rows > 0 {
            log::debug!("Removed follow {}", follow_id);
        }
        Ok(rows > 0)
    }

    pub fn is_following(&self, follower_id: &str, followed_id: &str) -> StoreResult<Option<Follow>> {
        let conn = self.conn();
        let follow = conn
            .query_row(
                "SELECT * FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                params![follower_id, followed_id],
                row_to_follow,
            )
            .optional()?;
        Ok(follow)
    }

    pub fn is_following_by_username(
        &self,
        follower: &str,
        followed: &str,
    ) -> StoreResult<Option<Follow>> {
        let follower_id = self.get_user_by_username(follower)?.id;
        let followed_id = self.get_user_by_username(followed)?.id;
        self.is_following(&follower_id, &followed_id)
    }

    /// Edges where user_id is the follower, in the order they were created
    pub fn list_followed(&self, user_id: &str) -> StoreResult<Vec<Follow>> {
        let conn = self.conn();
        followed_by(&conn, user_id)
    }

    /// Edges where user_id is the one being followed
    pub fn list_followers(&self, user_id: &str) -> StoreResult<Vec<Follow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM follows WHERE followed_id = ?1 ORDER BY rowid ASC",
        )?;
        let follows = stmt
            .query_map(params![user_id], row_to_follow)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(follows)
    }

    /// Drop every edge the user takes part in, as follower or followed.
    /// Part of the account deletion workflow; returns the number removed.
    pub fn delete_follows_for_user(&self, user_id: &str) -> StoreResult<usize> {
        let conn = self.conn();
        let rows = conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 OR followed_id = ?1",
            params![user_id],
        )?;
        log::info!("Removed {} follows for user {}", rows, user_id);
        Ok(rows)
    }
}

fn followed_by(conn: &Connection, user_id: &str) -> StoreResult<Vec<Follow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM follows WHERE follower_id = ?1 ORDER BY rowid ASC",
    )?;
    let follows = stmt
        .query_map(params![user_id], row_to_follow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(follows)
}

fn row_to_follow(row: &rusqlite::Row) -> rusqlite::Result<Follow> {
    Ok(Follow {
        id: row.get("id")?,
        follower_id: row.get("follower_id")?,
        followed_id: row.get("followed_id")?,
        time_followed: parse_datetime(row.get::<_, String>("time_followed")?),
    })
}
