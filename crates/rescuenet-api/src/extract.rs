//! Caller identity extractors.
//!
//! Authentication happens upstream; the caller's user id arrives in the
//! `x-user-id` header and is resolved here, once per request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rescuenet_core::error::DomainError;
use rescuenet_core::identity::Actor;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| DomainError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Self)
            .ok_or_else(|| {
                ApiError(DomainError::Unauthorized(format!(
                    "{USER_ID_HEADER} is not a valid user id"
                )))
            })
    }
}

/// The caller resolved to an [`Actor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentActor(pub Actor);

impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CallerId(user_id) = CallerId::from_request_parts(parts, state).await?;
        let actor = state.identity.resolve(user_id).await?.ok_or_else(|| {
            DomainError::Unauthorized(format!("user {user_id} is not registered"))
        })?;
        Ok(Self(actor))
    }
}
