use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{require_user, Store, StoreError, StoreResult};
use crate::models::{Tier, TierList};

// ==================== Tier Operations ====================
//
// One tier row per owner (UNIQUE owner_id). List membership lives in
// tier_followers, one row per (owner, list, follower), so adding is an
// INSERT OR IGNORE and removing is a DELETE: set union and set difference
// in a single statement each.

impl Store {
    /// Fetch the owner's tier, creating a disabled one with empty lists if
    /// none exists. Safe to call repeatedly or concurrently.
    pub fn get_or_create_tier(&self, owner_id: &str) -> StoreResult<Tier> {
        let conn = self.conn();
        ensure_tier(&conn, owner_id)?;
        existing_tier(&conn, owner_id)
    }

    pub fn get_tier(&self, owner_id: &str) -> StoreResult<Tier> {
        let conn = self.conn();
        existing_tier(&conn, owner_id)
    }

    /// Flip is_enabled, creating the tier first if needed
    pub fn toggle_status(&self, owner_id: &str) -> StoreResult<Tier> {
        let conn = self.conn();
        ensure_tier(&conn, owner_id)?;
        conn.execute(
            "UPDATE tiers SET is_enabled = NOT is_enabled WHERE owner_id = ?1",
            params![owner_id],
        )?;
        let tier = existing_tier(&conn, owner_id)?;
        log::debug!(
            "Tier for {} is now {}",
            owner_id,
            if tier.is_enabled { "enabled" } else { "disabled" }
        );
        Ok(tier)
    }

    /// Add a follower to one of the owner's lists (no-op if already there)
    pub fn grant_access(
        &self,
        owner_id: &str,
        follower_id: &str,
        list: TierList,
    ) -> StoreResult<Tier> {
        let conn = self.conn();
        require_user(&conn, follower_id)?;
        ensure_tier(&conn, owner_id)?;
        conn.execute(
            r#"INSERT OR IGNORE INTO tier_followers (owner_id, list, follower_id)
               VALUES (?1, ?2, ?3)"#,
            params![owner_id, list.as_str(), follower_id],
        )?;
        log::debug!("Granted {} {} access to {}", follower_id, list.as_str(), owner_id);
        existing_tier(&conn, owner_id)
    }

    /// Remove a follower from one of the owner's lists (no-op if absent).
    /// Returns `None` when the owner has no tier.
    pub fn revoke_access(
        &self,
        owner_id: &str,
        follower_id: &str,
        list: TierList,
    ) -> StoreResult<Option<Tier>> {
        let conn = self.conn();
        let rows = conn.execute(
            "DELETE FROM tier_followers WHERE owner_id = ?1 AND list = ?2 AND follower_id = ?3",
            params![owner_id, list.as_str(), follower_id],
        )?;
        if rows > 0 {
            log::debug!("Revoked {} {} access to {}", follower_id, list.as_str(), owner_id);
        }
        load_tier(&conn, owner_id)
    }

    /// True if the follower is on either of the owner's lists.
    ///
    /// Does not look at is_enabled: callers that need "gate is on and the
    /// follower is allowed" check both.
    pub fn has_access(&self, owner_id: &str, follower_id: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let found: bool = conn.query_row(
            r#"SELECT EXISTS(
                   SELECT 1 FROM tier_followers WHERE owner_id = ?1 AND follower_id = ?2
               )"#,
            params![owner_id, follower_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Remove the owner's tier and both lists. Returns whether a tier existed.
    pub fn delete_tier(&self, owner_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM tier_followers WHERE owner_id = ?1",
            params![owner_id],
        )?;
        let rows = tx.execute("DELETE FROM tiers WHERE owner_id = ?1", params![owner_id])?;
        tx.commit()?;
        if rows > 0 {
            log::info!("Deleted tier for {}", owner_id);
        }
        Ok(rows > 0)
    }
}

fn ensure_tier(conn: &Connection, owner_id: &str) -> StoreResult<()> {
    require_user(conn, owner_id)?;
    let rows = conn.execute(
        "INSERT OR IGNORE INTO tiers (id, owner_id, is_enabled) VALUES (?1, ?2, 0)",
        params![Uuid::new_v4().to_string(), owner_id],
    )?;
    if rows > 0 {
        log::debug!("Created tier for {}", owner_id);
    }
    Ok(())
}

fn existing_tier(conn: &Connection, owner_id: &str) -> StoreResult<Tier> {
    load_tier(conn, owner_id)?
        .ok_or_else(|| StoreError::NotFound(format!("Tier for owner {}", owner_id)))
}

fn load_tier(conn: &Connection, owner_id: &str) -> StoreResult<Option<Tier>> {
    let row: Option<(String, bool)> = conn
        .query_row(
            "SELECT id, is_enabled FROM tiers WHERE owner_id = ?1",
            params![owner_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((id, is_enabled)) = row else {
        return Ok(None);
    };

    let mut tier = Tier {
        id,
        owner_id: owner_id.to_string(),
        is_enabled,
        timed_followers: Vec::new(),
        override_followers: Vec::new(),
    };

    let mut stmt = conn.prepare_cached(
        "SELECT list, follower_id FROM tier_followers WHERE owner_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (list, follower_id) = row?;
        match list.parse::<TierList>() {
            Ok(TierList::Timed) => tier.timed_followers.push(follower_id),
            Ok(TierList::Override) => tier.override_followers.push(follower_id),
            Err(_) => log::warn!("Ignoring unknown tier list {} for {}", list, owner_id),
        }
    }
    Ok(Some(tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");

        let first = store.get_or_create_tier(&dave.id).unwrap();
        assert!(!first.is_enabled);
        assert!(first.timed_followers.is_empty());
        assert!(first.override_followers.is_empty());

        let second = store.get_or_create_tier(&dave.id).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_get_tier_missing_is_not_found() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        assert!(matches!(store.get_tier(&dave.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_toggle_twice_restores_status() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");

        let tier = store.toggle_status(&dave.id).unwrap();
        assert!(tier.is_enabled);
        let tier = store.toggle_status(&dave.id).unwrap();
        assert!(!tier.is_enabled);
    }

    #[test]
    fn test_grant_is_set_union() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        let eve = create_user(&store, "eve");

        store.grant_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        let tier = store.grant_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        assert_eq!(tier.timed_followers, vec![eve.id.clone()]);
        assert!(tier.override_followers.is_empty());
    }

    #[test]
    fn test_access_ignores_enabled_flag() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        let eve = create_user(&store, "eve");

        // Tier is disabled throughout
        let tier = store.grant_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        assert!(!tier.is_enabled);
        assert!(store.has_access(&dave.id, &eve.id).unwrap());

        store.revoke_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        assert!(!store.has_access(&dave.id, &eve.id).unwrap());
    }

    #[test]
    fn test_access_from_either_list() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        let eve = create_user(&store, "eve");
        let frank = create_user(&store, "frank");

        store.grant_access(&dave.id, &eve.id, TierList::Override).unwrap();
        store.grant_access(&dave.id, &frank.id, TierList::Timed).unwrap();
        assert!(store.has_access(&dave.id, &eve.id).unwrap());
        assert!(store.has_access(&dave.id, &frank.id).unwrap());

        // Revoking from the other list leaves access in place
        store.revoke_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        assert!(store.has_access(&dave.id, &eve.id).unwrap());
    }

    #[test]
    fn test_revoke_without_tier_is_noop() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        let eve = create_user(&store, "eve");
        assert!(store
            .revoke_access(&dave.id, &eve.id, TierList::Override)
            .unwrap()
            .is_none());

        // Same after the tier has been deleted, and no tier is created
        store.grant_access(&dave.id, &eve.id, TierList::Timed).unwrap();
        store.delete_tier(&dave.id).unwrap();
        assert!(store
            .revoke_access(&dave.id, &eve.id, TierList::Timed)
            .unwrap()
            .is_none());
        assert!(matches!(store.get_tier(&dave.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_tier_clears_access() {
        let store = Store::in_memory().unwrap();
        let dave = create_user(&store, "dave");
        let eve = create_user(&store, "eve");

        store.grant_access(&dave.id, &eve.id, TierList::Override).unwrap();
        assert!(store.has_access(&dave.id, &eve.id).unwrap());

        assert!(store.delete_tier(&dave.id).unwrap());
        assert!(!store.delete_tier(&dave.id).unwrap());
        assert!(!store.has_access(&dave.id, &eve.id).unwrap());
        assert!(matches!(store.get_tier(&dave.id), Err(StoreError::NotFound(_))));

        // A fresh tier starts empty and disabled again
        let tier = store.get_or_create_tier(&dave.id).unwrap();
        assert!(!tier.is_enabled);
        assert!(tier.override_followers.is_empty());
    }

    #[test]
    fn test_tier_requires_existing_owner() {
        let store = Store::in_memory().unwrap();
        let ghost = Uuid::new_v4().to_string();
        assert!(matches!(
            store.toggle_status(&ghost),
            Err(StoreError::NotFound(_))
        ));
    }
}
