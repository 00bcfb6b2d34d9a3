//! Feed composition
//!
//! A viewer's feed is every freet written by the users they follow, walked in
//! follow order and, within one author, in the order the freets were stored.
//! Authors are fetched one at a time as the iterator reaches them.
//!
//! A category narrows an already composed feed to the authors it contains.
//! Neither step checks who is asking; ownership of the category is the
//! caller's concern.

use std::collections::HashSet;

use crate::models::Freet;
use crate::store::{Store, StoreResult};

/// Lazy feed over the followed users of one viewer.
///
/// No deduplication is done: each followed user appears once (follow pairs
/// are unique) and each freet has exactly one author, so a freet cannot be
/// reached twice.
pub struct Feed<'a> {
    store: &'a Store,
    followed: std::vec::IntoIter<String>,
    current: std::vec::IntoIter<Freet>,
}

impl Feed<'_> {
    /// Number of followed authors not yet fetched
    pub fn remaining_authors(&self) -> usize {
        self.followed.len()
    }
}

impl Iterator for Feed<'_> {
    type Item = StoreResult<Freet>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(freet) = self.current.next() {
                return Some(Ok(freet));
            }
            let author_id = self.followed.next()?;
            match self.store.list_freets_by_author(&author_id) {
                Ok(freets) => self.current = freets.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Store {
    /// Freets from everyone the viewer follows. The viewer must exist.
    pub fn feed_for(&self, viewer_id: &str) -> StoreResult<Feed<'_>> {
        self.get_user(viewer_id)?;
        let followed: Vec<String> = self
            .list_followed(viewer_id)?
            .into_iter()
            .map(|follow| follow.followed_id)
            .collect();

        log::debug!("Composing feed for {} over {} authors", viewer_id, followed.len());
        Ok(Feed {
            store: self,
            followed: followed.into_iter(),
            current: Vec::new().into_iter(),
        })
    }

    pub fn feed_for_username(&self, username: &str) -> StoreResult<Feed<'_>> {
        let viewer = self.get_user_by_username(username)?;
        self.feed_for(&viewer.id)
    }

    /// Keep the candidates whose author is in the category, preserving order.
    /// The category's members are read once.
    pub fn filter_by_category<I>(&self, category_id: &str, candidates: I) -> StoreResult<Vec<Freet>>
    where
        I: IntoIterator<Item = Freet>,
    {
        let category = self.get_category(category_id)?;
        let members: HashSet<String> = category.items.into_iter().collect();

        Ok(candidates
            .into_iter()
            .filter(|freet| members.contains(&freet.author_id))
            .collect())
    }

    /// The viewer's feed narrowed to one category
    pub fn category_feed(&self, viewer_id: &str, category_id: &str) -> StoreResult<Vec<Freet>> {
        let freets = self.feed_for(viewer_id)?.collect::<StoreResult<Vec<_>>>()?;
        self.filter_by_category(category_id, freets)
    }
}
