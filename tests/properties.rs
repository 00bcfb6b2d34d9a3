//! Idempotency and set properties of the graph store, checked over
//! generated inputs.

use chrono::Utc;
use proptest::prelude::*;

use fritter_social::models::{TierList, User};
use fritter_social::store::{Store, StoreError};

fn create_user(store: &Store, username: &str) -> User {
    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        created_at: Utc::now(),
    };
    store.create_user(&mut user).unwrap();
    user
}

fn create_users(store: &Store, count: usize) -> Vec<User> {
    (0..count)
        .map(|i| create_user(store, &format!("user{}", i)))
        .collect()
}

fn tier_list() -> impl Strategy<Value = TierList> {
    prop_oneof![Just(TierList::Timed), Just(TierList::Override)]
}

proptest! {
    #[test]
    fn prop_repeated_follow_is_duplicate_edge(
        edges in prop::collection::vec((0..5usize, 0..5usize), 1..20),
    ) {
        let store = Store::in_memory().unwrap();
        let users = create_users(&store, 5);
        let mut seen = std::collections::HashSet::new();

        for (a, b) in edges {
            let result = store.follow(&users[a].id, &users[b].id);
            if a == b {
                prop_assert!(matches!(result, Err(StoreError::InvalidInput(_))));
            } else if seen.insert((a, b)) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(StoreError::DuplicateEdge { .. })), "pair {:?} accepted twice", (a, b));
            }
        }

        let total: usize = users
            .iter()
            .map(|u| store.list_followed(&u.id).unwrap().len())
            .sum();
        prop_assert_eq!(total, seen.len());
    }

    #[test]
    fn prop_toggle_twice_restores_status(toggles in 0..6usize) {
        let store = Store::in_memory().unwrap();
        let owner = create_user(&store, "owner");
        let before = store.get_or_create_tier(&owner.id).unwrap().is_enabled;

        for _ in 0..toggles {
            store.toggle_status(&owner.id).unwrap();
        }
        let after = store.get_tier(&owner.id).unwrap().is_enabled;
        prop_assert_eq!(after, before ^ (toggles % 2 == 1));
    }

    #[test]
    fn prop_add_item_is_idempotent(adds in prop::collection::vec(0..4usize, 0..12)) {
        let store = Store::in_memory().unwrap();
        let author = create_user(&store, "author");
        let users = create_users(&store, 4);
        let category = store.create_category(&author.id, "bucket").unwrap();

        let mut expected: Vec<String> = Vec::new();
        for i in adds {
            // Adding twice in a row changes nothing the second time
            let once = store.add_item(&category.id, &users[i].id).unwrap();
            let twice = store.add_item(&category.id, &users[i].id).unwrap();
            prop_assert_eq!(&once.items, &twice.items);

            if !expected.contains(&users[i].id) {
                expected.push(users[i].id.clone());
            }
        }
        prop_assert_eq!(store.get_category(&category.id).unwrap().items, expected);
    }

    #[test]
    fn prop_grant_then_revoke(list in tier_list(), enabled in any::<bool>()) {
        let store = Store::in_memory().unwrap();
        let owner = create_user(&store, "owner");
        let follower = create_user(&store, "follower");
        if enabled {
            store.toggle_status(&owner.id).unwrap();
        }

        store.grant_access(&owner.id, &follower.id, list).unwrap();
        prop_assert!(store.has_access(&owner.id, &follower.id).unwrap());

        store.revoke_access(&owner.id, &follower.id, list).unwrap();
        prop_assert!(!store.has_access(&owner.id, &follower.id).unwrap());
    }
}
