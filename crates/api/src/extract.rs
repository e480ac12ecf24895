//! Request extractors.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::UserId;

use crate::error::ApiError;

/// Header carrying the acting user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user a request acts on behalf of, taken from the `X-User-Id` header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Missing X-User-Id header".to_string()))?;
        let raw = value
            .to_str()
            .map_err(|_| ApiError::Unauthenticated("Invalid X-User-Id header".to_string()))?;
        let user_id = UserId::from_str(raw.trim())
            .map_err(|e| ApiError::Unauthenticated(format!("Invalid X-User-Id header: {e}")))?;
        Ok(CurrentUser(user_id))
    }
}

/// Parses a path segment into one of the UUID-backed ids.
pub fn parse_id<T>(id: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
