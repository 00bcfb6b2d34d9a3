//! Acting user for a request.
//!
//! Authentication happens in front of this service. The fronting layer
//! passes the authenticated user's id in the `X-Actor-Id` header and every
//! handler receives it as an explicit `Actor`.

use actix_web::dev::Payload;
use actix_web::error::{ErrorBadRequest, ErrorUnauthorized};
use actix_web::{Error, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::store::StoreError;

pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// The user a request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
}

impl Actor {
    /// Forbidden unless the actor is the owner of the record being changed
    pub fn require_owner(&self, owner_id: &str, what: &str) -> Result<(), StoreError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(StoreError::Forbidden(format!(
                "Cannot modify other users' {}",
                what
            )))
        }
    }
}

/// Extract the actor from request headers
pub fn extract_actor(req: &HttpRequest) -> Result<Actor, Error> {
    let raw = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ErrorUnauthorized("Missing X-Actor-Id header"))?;

    let id = Uuid::parse_str(raw.trim()).map_err(|_| ErrorBadRequest("Malformed actor id"))?;

    Ok(Actor {
        user_id: id.to_string(),
    })
}

impl FromRequest for Actor {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_actor(req))
    }
}
