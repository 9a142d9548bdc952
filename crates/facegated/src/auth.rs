//! Session tokens.
//!
//! Operators log in with e-mail and password and receive an HS256 JWT. The
//! token is accepted from the `Authorization: Bearer` header, the
//! `auth_token` cookie or the `x-auth-token` header, in that order.

use crate::api::AppState;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the session token.
pub const AUTH_COOKIE: &str = "auth_token";
const TOKEN_HEADER: &str = "x-auth-token";

/// Token claims. `sub` is the operator's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: String,
    pub exp: i64,
}

pub fn issue_token(secret: &str, sub: i64, email: &str, role: &str, ttl_hours: i64) -> Result<String, ApiError> {
    let claims = Claims {
        sub,
        email: email.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(ApiError::internal)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        ApiError::Unauthorized("invalid token")
    })
}

/// The raw token from the request, if any.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Reject requests without a valid token; pass the claims on as an extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = token_from_headers(req.headers())
        .ok_or(ApiError::Unauthorized("authentication token required"))?;
    let claims = verify_token(&state.config.jwt_secret, &token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// `Set-Cookie` value carrying a fresh token.
pub fn session_cookie(token: &str, ttl_hours: i64) -> String {
    format!(
        "{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ttl_hours * 3600
    )
}

/// `Set-Cookie` value that clears the session cookie.
pub fn clear_cookie() -> String {
    format!("{AUTH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_issue_and_verify() {
        let token = issue_token("secret", 7, "ana@example.com", "Administrador", 1).unwrap();
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.role, "Administrador");
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token("secret", 7, "ana@example.com", "Administrador", -1).unwrap();
        assert!(matches!(
            verify_token("secret", &token),
            Err(ApiError::Unauthorized("invalid token"))
        ));
    }

    #[test]
    fn test_token_sources() {
        let mut h = HeaderMap::new();
        assert_eq!(token_from_headers(&h), None);

        h.insert(TOKEN_HEADER, HeaderValue::from_static("hdr"));
        assert_eq!(token_from_headers(&h).as_deref(), Some("hdr"));

        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=cookie"));
        assert_eq!(token_from_headers(&h).as_deref(), Some("cookie"));

        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer bear"));
        assert_eq!(token_from_headers(&h).as_deref(), Some("bear"));
    }
}
