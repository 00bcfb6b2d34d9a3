use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::Actor;
use crate::models::*;
use crate::store::{Store, StoreError, StoreResult};

pub struct AppState {
    pub store: Arc<Store>,
}

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) | StoreError::UnsupportedOperation(_) => StatusCode::NOT_FOUND,
            StoreError::DuplicateEdge { .. } | StoreError::DuplicateName { .. } => {
                StatusCode::CONFLICT
            }
            StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        } else {
            log::warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        HttpResponse::build(status).json(ApiResponse::<()>::error(self.to_string()))
    }
}

type ApiResult = Result<HttpResponse, StoreError>;

fn precondition_failed(msg: impl Into<String>) -> HttpResponse {
    let msg = msg.into();
    log::warn!("Precondition failed: {}", msg);
    HttpResponse::PreconditionFailed().json(ApiResponse::<()>::error(msg))
}

/// Path ids must be UUIDs; anything else is rejected before touching the store
fn parse_id(raw: &str, what: &str) -> StoreResult<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| StoreError::InvalidInput(format!("Malformed {} id: {}", what, raw)))
}

// ==================== Response shaping ====================

fn follow_responses(store: &Store, follows: &[Follow]) -> StoreResult<Vec<FollowResponse>> {
    let usernames = store.get_usernames(
        follows
            .iter()
            .flat_map(|f| [&f.follower_id, &f.followed_id]),
    )?;
    Ok(follows
        .iter()
        .map(|f| FollowResponse::new(f, &usernames))
        .collect())
}

fn follow_response(store: &Store, follow: &Follow) -> StoreResult<FollowResponse> {
    let usernames = store.get_usernames([&follow.follower_id, &follow.followed_id])?;
    Ok(FollowResponse::new(follow, &usernames))
}

fn tier_response(store: &Store, tier: &Tier) -> StoreResult<TierResponse> {
    let usernames = store.get_usernames(
        std::iter::once(&tier.owner_id)
            .chain(tier.timed_followers.iter())
            .chain(tier.override_followers.iter()),
    )?;
    Ok(TierResponse::new(tier, &usernames))
}

fn category_responses(
    store: &Store,
    categories: &[Category],
) -> StoreResult<Vec<CategoryResponse>> {
    let usernames = store.get_usernames(
        categories
            .iter()
            .flat_map(|c| std::iter::once(&c.author_id).chain(c.items.iter())),
    )?;
    Ok(categories
        .iter()
        .map(|c| CategoryResponse::new(c, &usernames))
        .collect())
}

fn category_response(store: &Store, category: &Category) -> StoreResult<CategoryResponse> {
    let usernames =
        store.get_usernames(std::iter::once(&category.author_id).chain(category.items.iter()))?;
    Ok(CategoryResponse::new(category, &usernames))
}

fn freet_responses(store: &Store, freets: &[Freet]) -> StoreResult<Vec<FreetResponse>> {
    let usernames = store.get_usernames(freets.iter().map(|f| &f.author_id))?;
    Ok(freets
        .iter()
        .map(|f| FreetResponse::new(f, &usernames))
        .collect())
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Follow Endpoints ====================

pub async fn get_feed(state: web::Data<AppState>, actor: Actor) -> ApiResult {
    let freets = state
        .store
        .feed_for(&actor.user_id)?
        .collect::<StoreResult<Vec<_>>>()?;
    let body = freet_responses(&state.store, &freets)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

pub async fn list_followed(state: web::Data<AppState>, actor: Actor) -> ApiResult {
    let follows = state.store.list_followed(&actor.user_id)?;
    let body = follow_responses(&state.store, &follows)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

pub async fn get_follow(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult {
    let (follower_id, followed_id) = path.into_inner();
    let follower_id = parse_id(&follower_id, "follower")?;
    let followed_id = parse_id(&followed_id, "followed")?;
    state.store.get_user(&follower_id)?;
    state.store.get_user(&followed_id)?;

    match state.store.is_following(&follower_id, &followed_id)? {
        Some(follow) => {
            let body = follow_response(&state.store, &follow)?;
            Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
        }
        None => Ok(precondition_failed(format!(
            "User {} does not follow user {}",
            follower_id, followed_id
        ))),
    }
}

pub async fn create_follow(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> ApiResult {
    let followed_id = parse_id(&path.into_inner(), "followed")?;
    let follow = state.store.follow(&actor.user_id, &followed_id)?;
    let body = follow_response(&state.store, &follow)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(body)))
}

pub async fn delete_follow(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> ApiResult {
    let followed_id = parse_id(&path.into_inner(), "followed")?;
    state.store.get_user(&followed_id)?;

    let Some(follow) = state.store.is_following(&actor.user_id, &followed_id)? else {
        return Ok(precondition_failed(format!(
            "You do not follow user {}",
            followed_id
        )));
    };
    state.store.unfollow(&follow.id)?;
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Tier Endpoints ====================

pub async fn toggle_tier(state: web::Data<AppState>, actor: Actor) -> ApiResult {
    let tier = state.store.toggle_status(&actor.user_id)?;
    let body = tier_response(&state.store, &tier)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

/// Load the owner's tier, or the 412 response when it is missing or disabled
fn enabled_tier(store: &Store, owner_id: &str) -> StoreResult<Result<Tier, HttpResponse>> {
    match store.get_tier(owner_id) {
        Ok(tier) if tier.is_enabled => Ok(Ok(tier)),
        Ok(_) => Ok(Err(precondition_failed(format!(
            "User {} has not enabled their tier",
            owner_id
        )))),
        Err(StoreError::NotFound(_)) => Ok(Err(precondition_failed(format!(
            "User {} has no tier",
            owner_id
        )))),
        Err(e) => Err(e),
    }
}

pub async fn get_tier_status(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult {
    let (follower_id, owner_id) = path.into_inner();
    let follower_id = parse_id(&follower_id, "follower")?;
    let owner_id = parse_id(&owner_id, "followed")?;
    state.store.get_user(&follower_id)?;
    state.store.get_user(&owner_id)?;

    if let Err(resp) = enabled_tier(&state.store, &owner_id)? {
        return Ok(resp);
    }
    let status = state.store.has_access(&owner_id, &follower_id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "tierStatus": status
    }))))
}

pub async fn update_tier(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<(String, String)>,
    query: web::Query<OperationQuery>,
) -> ApiResult {
    let (follower_id, owner_id) = path.into_inner();
    let follower_id = parse_id(&follower_id, "follower")?;
    let owner_id = parse_id(&owner_id, "followed")?;
    state.store.get_user(&follower_id)?;
    state.store.get_user(&owner_id)?;

    if let Err(resp) = enabled_tier(&state.store, &owner_id)? {
        return Ok(resp);
    }
    actor.require_owner(&owner_id, "tiers")?;

    let operation = ItemOperation::parse(query.operation.as_deref())?;
    let list = match query.list.as_deref() {
        Some(raw) => raw.parse()?,
        None => TierList::Override,
    };

    let tier = match operation {
        ItemOperation::Add => state.store.grant_access(&owner_id, &follower_id, list)?,
        ItemOperation::Delete => {
            match state.store.revoke_access(&owner_id, &follower_id, list)? {
                Some(tier) => tier,
                None => return Ok(precondition_failed(format!("User {} has no tier", owner_id))),
            }
        }
    };
    let body = tier_response(&state.store, &tier)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

// ==================== Category Endpoints ====================

pub async fn create_category(
    state: web::Data<AppState>,
    actor: Actor,
    body: web::Json<CreateCategoryRequest>,
) -> ApiResult {
    let category = state.store.create_category(&actor.user_id, &body.name)?;
    let body = category_response(&state.store, &category)?;
    Ok(HttpResponse::Created().json(ApiResponse::success(body)))
}

pub async fn list_categories(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult {
    let author_id = parse_id(&path.into_inner(), "author")?;
    let categories = state.store.list_by_author(&author_id)?;
    let body = category_responses(&state.store, &categories)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

pub async fn delete_category(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> ApiResult {
    let category_id = parse_id(&path.into_inner(), "category")?;
    let category = state.store.get_category(&category_id)?;
    actor.require_owner(&category.author_id, "categories")?;

    state.store.delete_category(&category_id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn update_category(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<(String, String)>,
    query: web::Query<OperationQuery>,
) -> ApiResult {
    let (category_id, item_id) = path.into_inner();
    let category_id = parse_id(&category_id, "category")?;
    let category = state.store.get_category(&category_id)?;
    actor.require_owner(&category.author_id, "categories")?;

    let operation = ItemOperation::parse(query.operation.as_deref())?;
    let item_id = parse_id(&item_id, "user")?;

    let category = match operation {
        ItemOperation::Add => state.store.add_item(&category_id, &item_id)?,
        ItemOperation::Delete => state.store.remove_item(&category_id, &item_id)?,
    };
    let body = category_response(&state.store, &category)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

pub async fn category_freets(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> ApiResult {
    let category_id = parse_id(&path.into_inner(), "category")?;
    let category = state.store.get_category(&category_id)?;
    if category.author_id != actor.user_id {
        return Err(StoreError::Forbidden(
            "Cannot view other users' category feeds".to_string(),
        ));
    }

    let freets = state.store.category_feed(&actor.user_id, &category_id)?;
    let body = freet_responses(&state.store, &freets)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(body)))
}

// ==================== User Endpoints ====================

/// Remove an account and everything hanging off it.
///
/// Each step commits on its own; a failure part way leaves the earlier
/// steps applied and the request can simply be repeated.
pub async fn delete_user(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<String>,
) -> ApiResult {
    let user_id = parse_id(&path.into_inner(), "user")?;
    actor.require_owner(&user_id, "accounts")?;
    state.store.get_user(&user_id)?;

    let follows = state.store.delete_follows_for_user(&user_id)?;
    let categories = state.store.delete_categories_by_author(&user_id)?;
    state.store.delete_tier(&user_id)?;
    let freets = state.store.delete_freets_by_author(&user_id)?;
    state.store.delete_user(&user_id)?;

    log::info!(
        "Deleted user {} ({} follows, {} categories, {} freets)",
        user_id,
        follows,
        categories,
        freets
    );
    Ok(HttpResponse::NoContent().finish())
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Follows
        .route("/api/follows/freets", web::get().to(get_feed))
        .route("/api/follows/followed", web::get().to(list_followed))
        .route("/api/follows/{follower_id}/{followed_id}", web::get().to(get_follow))
        .route("/api/follows/{followed_id}", web::post().to(create_follow))
        .route("/api/follows/{followed_id}", web::delete().to(delete_follow))

        // Tiers
        .route("/api/tiers/status", web::put().to(toggle_tier))
        .route("/api/tiers/{follower_id}/{followed_id}", web::get().to(get_tier_status))
        .route("/api/tiers/{follower_id}/{followed_id}", web::put().to(update_tier))

        // Categories
        .route("/api/categories", web::post().to(create_category))
        .route("/api/categories/{category_id}/freets", web::get().to(category_freets))
        .route("/api/categories/{author_id}", web::get().to(list_categories))
        .route("/api/categories/{category_id}", web::delete().to(delete_category))
        .route("/api/categories/{category_id}/{item_id}", web::put().to(update_category))

        // Users
        .route("/api/users/{user_id}", web::delete().to(delete_user));
}
