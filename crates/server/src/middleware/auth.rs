use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{timestamp_now, AuthUser};
use crate::AppState;

pub const SESSION_COOKIE: &str = "rally.session_token";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .map(str::trim)
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .map(str::to_string)
}

/// Session token from the Authorization header, falling back to the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookie_token(headers))
        .filter(|t| !t.is_empty())
}

/// Resolve a session token to its user. Unknown and expired sessions are both `Unauthenticated`.
pub async fn verify_token(db: &SqlitePool, token: &str) -> AppResult<AuthUser> {
    let row = sqlx::query_as::<_, (String, String, String)>(
        r#"SELECT u.id, u.username, s.expires_at
           FROM "session" s
           JOIN "user" u ON u.id = s.user_id
           WHERE s.token = ?"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    let Some((id, username, expires_at)) = row else {
        return Err(AppError::Unauthenticated);
    };
    if expires_at < timestamp_now() {
        return Err(AppError::Unauthenticated);
    }

    Ok(AuthUser { id, username })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AppError::Unauthenticated)?;
        verify_token(&state.db, &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark; rally.session_token=from-cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-cookie"));

        headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn empty_token_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("rally.session_token="));
        assert!(token_from_headers(&headers).is_none());
    }
}
