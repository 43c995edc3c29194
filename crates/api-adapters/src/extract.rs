//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use domains::FeedError;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::router::AppState;

/// The caller's user id, taken from a verified JWT.
///
/// The token is read from the configured cookie first, then from an
/// `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers, &state.cookie_name).ok_or_else(|| {
            debug!("request carries no auth token");
            FeedError::Unauthorized("missing auth token".to_string())
        })?;
        let user_id = state.tokens.verify(token)?;
        Ok(AuthUser(user_id))
    }
}

pub fn token_from_headers<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value);

    from_cookie
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
