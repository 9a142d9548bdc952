use super::extract::Body;
use super::{ok_with, AppState};
use crate::auth::{self, clear_cookie, session_cookie, verify_token};
use crate::error::ApiError;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use facegate_core::password::verify_password;
use facegate_core::types::{AuditAction, User};
use facegate_core::validate::LoginRequest;
use facegate_store::audit::AuditRecord;
use serde::Serialize;
use std::sync::Arc;

const BAD_CREDENTIALS: &str = "invalid credentials";

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Body(form): Body<LoginRequest>,
) -> Result<Response, ApiError> {
    let form = form.normalize();
    form.validate()?;

    let creds = state
        .store
        .find_login_by_email(&form.email)
        .await?
        .ok_or(ApiError::Unauthorized(BAD_CREDENTIALS))?;
    let Some(hash) = creds.password_hash.clone() else {
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS));
    };
    let password = form.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(ApiError::internal)?;
    if !valid || !creds.user.active {
        tracing::warn!(email = %form.email, "login rejected");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS));
    }

    let user = creds.user;
    let ttl = state.config.token_ttl_hours;
    let token = auth::issue_token(&state.config.jwt_secret, user.id, &form.email, &user.role.name, ttl)?;
    let mut rec = AuditRecord::new(Some(user.id), AuditAction::Login, "users", Some(user.id));
    if let Some(ip) = client_ip(&headers) {
        rec = rec.value(ip);
    }
    state.store.append_audit(rec).await?;
    tracing::info!(user_id = user.id, "operator logged in");

    let cookie = session_cookie(&token, ttl);
    let body = ok_with(LoginResponse { token, user }, "login successful")?;
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// Always succeeds. A valid token gets a LOGOUT audit entry.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(claims) = auth::token_from_headers(&headers)
        .and_then(|t| verify_token(&state.config.jwt_secret, &t).ok())
    {
        let rec = AuditRecord::new(Some(claims.sub), AuditAction::Logout, "users", Some(claims.sub));
        if let Err(e) = state.store.append_audit(rec).await {
            tracing::error!(error = %e, "failed to audit logout");
        }
    }
    let body = super::done("logged out")?;
    Ok(([(header::SET_COOKIE, clear_cookie())], body).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::testutil::{self, ADMIN_EMAIL, ADMIN_PASSWORD};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_login_issues_token() {
        let app = testutil::app().await;
        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "  ADMIN@sistema.com ", "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user"]["email"], ADMIN_EMAIL);
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let (status, _) = app.send(Method::GET, "/api/roles", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let app = testutil::app().await;
        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": ADMIN_EMAIL, "password": "nope" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid credentials");
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let app = testutil::app().await;
        let (status, body) = app.send(Method::GET, "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication token required");

        let (status, body) = app.send(Method::GET, "/api/users", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid token");
    }

    #[tokio::test]
    async fn test_logout_always_succeeds_and_audits() {
        let app = testutil::app().await;
        let (status, _) = app.send(Method::POST, "/api/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let token = app.token.clone();
        let (status, _) = app.send(Method::POST, "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, log) = app.call(Method::GET, "/api/audit-log?action=LOGOUT", None).await;
        assert_eq!(log["data"].as_array().unwrap().len(), 1);
    }
}
