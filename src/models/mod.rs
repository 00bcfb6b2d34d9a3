use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::store::StoreError;

/// Longest category name accepted, in characters
pub const MAX_CATEGORY_NAME_LEN: usize = 15;

/// User is the identity every other record references by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Freet is a short message authored by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Freet {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Follow is a directed edge: follower_id follows followed_id.
/// The (follower_id, followed_id) pair is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub id: String,
    pub follower_id: String,
    pub followed_id: String,
    pub time_followed: DateTime<Utc>,
}

/// Category is a named bucket of user ids owned by one author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub author_id: String,
    pub name: String,
    /// Member user ids, in the order they were first added
    pub items: Vec<String>,
}

/// Tier is an owner's gate: an enable flag and two follower allow-lists.
///
/// Membership is independent of `is_enabled`; an owner may fill the lists
/// before switching the gate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub id: String,
    pub owner_id: String,
    pub is_enabled: bool,
    pub timed_followers: Vec<String>,
    pub override_followers: Vec<String>,
}

/// Which of the two tier allow-lists an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierList {
    /// Followers qualified by how long they have followed the owner
    Timed,
    /// Followers the owner admitted by hand
    Override,
}

impl TierList {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierList::Timed => "timed",
            TierList::Override => "override",
        }
    }
}

impl FromStr for TierList {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timed" => Ok(TierList::Timed),
            "override" => Ok(TierList::Override),
            other => Err(StoreError::UnsupportedOperation(format!(
                "Tier list {} isn't recognized (\"timed\" or \"override\")",
                other
            ))),
        }
    }
}

/// Add/delete selector shared by the tier and category item routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOperation {
    Add,
    Delete,
}

impl ItemOperation {
    /// Parse the `operation` query value. Missing or blank is invalid input,
    /// anything other than "add"/"delete" is unsupported.
    pub fn parse(operation: Option<&str>) -> Result<Self, StoreError> {
        match operation.map(str::trim) {
            None | Some("") => Err(StoreError::InvalidInput(
                "Operation must be nonempty (\"add\" or \"delete\")".to_string(),
            )),
            Some("add") => Ok(ItemOperation::Add),
            Some("delete") => Ok(ItemOperation::Delete),
            Some(other) => Err(StoreError::UnsupportedOperation(format!(
                "Operation {} isn't recognized (\"add\" or \"delete\")",
                other
            ))),
        }
    }
}

/// Validate a category name: not blank, at most MAX_CATEGORY_NAME_LEN characters
pub fn validate_category_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "Category name must be at least one character long".to_string(),
        ));
    }
    if name.chars().count() > MAX_CATEGORY_NAME_LEN {
        return Err(StoreError::InvalidInput(format!(
            "Category name must be no more than {} characters",
            MAX_CATEGORY_NAME_LEN
        )));
    }
    Ok(())
}

/// Format a timestamp the way the frontend shows it, e.g. "October 19th 2026, 3:04:05 pm"
pub fn format_date(date: &DateTime<Utc>) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!(
        "{} {}{} {}",
        date.format("%B"),
        day,
        suffix,
        date.format("%Y, %-I:%M:%S %P")
    )
}

fn username_or_id(usernames: &HashMap<String, String>, id: &str) -> String {
    usernames.get(id).cloned().unwrap_or_else(|| id.to_string())
}

// Request/Response types for API
//
// Responses replace user ids with usernames. The `usernames` map is resolved
// by the caller; ids missing from it are passed through unchanged.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub id: String,
    pub follower_user: String,
    pub followed_user: String,
    pub time_followed: String,
}

impl FollowResponse {
    pub fn new(follow: &Follow, usernames: &HashMap<String, String>) -> Self {
        Self {
            id: follow.id.clone(),
            follower_user: username_or_id(usernames, &follow.follower_id),
            followed_user: username_or_id(usernames, &follow.followed_id),
            time_followed: format_date(&follow.time_followed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierResponse {
    pub id: String,
    pub owner: String,
    pub is_enabled: bool,
    pub timed_followers: Vec<String>,
    pub override_followers: Vec<String>,
}

impl TierResponse {
    pub fn new(tier: &Tier, usernames: &HashMap<String, String>) -> Self {
        Self {
            id: tier.id.clone(),
            owner: username_or_id(usernames, &tier.owner_id),
            is_enabled: tier.is_enabled,
            timed_followers: tier
                .timed_followers
                .iter()
                .map(|id| username_or_id(usernames, id))
                .collect(),
            override_followers: tier
                .override_followers
                .iter()
                .map(|id| username_or_id(usernames, id))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: String,
    pub author: String,
    pub name: String,
    pub items: Vec<String>,
}

impl CategoryResponse {
    pub fn new(category: &Category, usernames: &HashMap<String, String>) -> Self {
        Self {
            id: category.id.clone(),
            author: username_or_id(usernames, &category.author_id),
            name: category.name.clone(),
            items: category
                .items
                .iter()
                .map(|id| username_or_id(usernames, id))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreetResponse {
    pub id: String,
    pub author: String,
    pub content: String,
    pub date_created: String,
}

impl FreetResponse {
    pub fn new(freet: &Freet, usernames: &HashMap<String, String>) -> Self {
        Self {
            id: freet.id.clone(),
            author: username_or_id(usernames, &freet.author_id),
            content: freet.content.clone(),
            date_created: format_date(&freet.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OperationQuery {
    pub operation: Option<String>,
    pub list: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_date_ordinals() {
        let date = Utc.with_ymd_and_hms(2026, 10, 1, 15, 4, 5).unwrap();
        assert_eq!(format_date(&date), "October 1st 2026, 3:04:05 pm");

        let date = Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap();
        assert_eq!(format_date(&date), "March 12th 2026, 9:00:00 am");

        let date = Utc.with_ymd_and_hms(2026, 3, 23, 0, 30, 0).unwrap();
        assert_eq!(format_date(&date), "March 23rd 2026, 12:30:00 am");
    }

    #[test]
    fn test_category_name_validation() {
        assert!(validate_category_name("friends").is_ok());
        assert!(validate_category_name("exactly15chars!").is_ok());
        assert!(matches!(
            validate_category_name("   "),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_category_name(""),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_category_name("sixteen chars!!!"),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_item_operation_parse() {
        assert_eq!(ItemOperation::parse(Some("add")).unwrap(), ItemOperation::Add);
        assert_eq!(
            ItemOperation::parse(Some("delete")).unwrap(),
            ItemOperation::Delete
        );
        assert!(matches!(
            ItemOperation::parse(None),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            ItemOperation::parse(Some("toggle")),
            Err(StoreError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_tier_list_from_str() {
        assert_eq!("timed".parse::<TierList>().unwrap(), TierList::Timed);
        assert_eq!("override".parse::<TierList>().unwrap(), TierList::Override);
        assert!(matches!(
            "gold".parse::<TierList>(),
            Err(StoreError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_responses_use_usernames() {
        let mut usernames = HashMap::new();
        usernames.insert("u1".to_string(), "alice".to_string());
        usernames.insert("u2".to_string(), "bob".to_string());

        let category = Category {
            id: "c1".to_string(),
            author_id: "u1".to_string(),
            name: "friends".to_string(),
            items: vec!["u2".to_string(), "u3".to_string()],
        };
        let resp = CategoryResponse::new(&category, &usernames);
        assert_eq!(resp.author, "alice");
        // Unresolved ids pass through
        assert_eq!(resp.items, vec!["bob".to_string(), "u3".to_string()]);

        let tier = Tier {
            id: "t1".to_string(),
            owner_id: "u2".to_string(),
            is_enabled: false,
            timed_followers: vec![],
            override_followers: vec!["u1".to_string()],
        };
        let resp = TierResponse::new(&tier, &usernames);
        assert_eq!(resp.owner, "bob");
        assert_eq!(resp.override_followers, vec!["alice".to_string()]);
    }
}
