use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::listing::Status;
use crate::state::AppState;
use crate::users::repo_types::User;

/// Identity resolved by [`require_auth`] and attached to the request.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub status: Status,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            status: user.status,
        }
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid Authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Invalid Authorization header"))?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AppError::unauthorized("Invalid Authorization header"));
    }
    Ok(token)
}

/// Route layer for every protected router.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?;
    let claims = state.keys.verify(token)?;
    let user_id = claims.user_id()?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(User::is_active)
        .ok_or_else(|| {
            warn!(user_id, "token subject missing or inactive");
            AppError::unauthorized("Account is inactive or no longer exists")
        })?;

    debug!(user_id, "request authenticated");
    req.extensions_mut().insert(CurrentUser::from(user));
    Ok(next.run(req).await)
}

/// Extractor for the identity attached by [`require_auth`].
pub struct AuthUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_any_scheme_case() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("BEARER abc")).unwrap(), "abc");
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let missing = bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(missing.to_string(), "Missing Authorization header");

        for bad in ["Basic abc", "Bearer", "Bearer   ", "abc"] {
            let err = bearer_token(&headers(bad)).unwrap_err();
            assert_eq!(err.to_string(), "Invalid Authorization header", "{bad}");
        }
    }
}
