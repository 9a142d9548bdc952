//! REST API.
//!
//! Every response uses the `{ success, data?, message?, pagination? }`
//! envelope. `/health` and the `/api/auth/*` routes are public; the rest of
//! `/api` sits behind [`auth::require_auth`].

mod alerts;
mod catalog;
mod events;
pub mod extract;
mod points;
mod rules;
mod session;
mod system;
mod users;
mod zones;

use crate::auth;
use crate::config::Config;
use crate::dispatcher::DispatchHandle;
use crate::error::ApiError;
use crate::evidence::EvidenceDir;
use crate::face_client::FaceClient;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use facegate_core::secret::SecretBox;
use facegate_core::types::{Page, Pagination};
use facegate_store::Store;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// State shared by every handler.
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub face: FaceClient,
    pub dispatcher: DispatchHandle,
    pub evidence: EvidenceDir,
    /// Seals camera passwords at rest.
    pub secrets: SecretBox,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;
pub type Created<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        message: None,
        pagination: None,
    }))
}

pub fn ok_with<T>(data: T, message: impl Into<String>) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        message: Some(message.into()),
        pagination: None,
    }))
}

/// Success without data.
pub fn done(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(Envelope {
        success: true,
        data: None,
        message: Some(message.into()),
        pagination: None,
    }))
}

pub fn paged<T>(page: Page<T>) -> ApiResult<Vec<T>> {
    Ok(Json(Envelope {
        success: true,
        data: Some(page.items),
        message: None,
        pagination: Some(page.pagination),
    }))
}

pub fn created<T>(data: T, message: impl Into<String>) -> Created<T> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            pagination: None,
        }),
    ))
}

/// Log the outcome of every request.
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    let status = resp.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if resp.status().is_server_error() {
        tracing::error!(%method, %path, status, elapsed_ms, "request failed");
    } else if resp.status().is_client_error() {
        tracing::warn!(%method, %path, status, elapsed_ms, "request rejected");
    } else {
        tracing::info!(%method, %path, status, elapsed_ms, "request served");
    }
    resp
}

pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/auth/login", post(session::login))
        .route("/auth/logout", post(session::logout));

    let protected = Router::new()
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/{id}",
            get(users::detail).put(users::update).delete(users::remove),
        )
        .route("/users/{id}/faces", get(users::faces).post(users::enroll))
        .route("/faces/{id}", axum::routing::delete(users::remove_face))
        .route("/zones", get(zones::list).post(zones::create))
        .route(
            "/zones/{id}",
            get(zones::get_one).put(zones::update).delete(zones::remove),
        )
        .route("/zones/{id}/detail", get(zones::detail))
        .route(
            "/zones/{id}/settings",
            get(zones::settings).put(zones::put_settings),
        )
        .route("/control-points", get(points::list).post(points::create))
        .route(
            "/control-points/{id}",
            get(points::detail).put(points::update).delete(points::remove),
        )
        .route(
            "/control-points/{id}/camera",
            get(points::camera)
                .put(points::put_camera)
                .delete(points::clear_camera),
        )
        .route("/access-rules", get(rules::list).post(rules::create))
        .route(
            "/access-rules/{id}",
            get(rules::detail).put(rules::update).delete(rules::remove),
        )
        .route("/access-events", get(events::list).post(events::create))
        .route("/access/verify", post(events::verify))
        .route("/alerts", get(alerts::list).post(alerts::create))
        .route("/alerts/{id}", axum::routing::delete(alerts::remove))
        .route("/notifications", get(alerts::feed))
        .route("/notifications/read-all", post(alerts::read_all))
        .route("/notifications/{id}/read", post(alerts::read_one))
        .route("/roles", get(catalog::roles))
        .route("/point-types", get(catalog::point_types))
        .route("/alert-types", get(catalog::alert_types))
        .route("/dashboard/stats", get(system::dashboard))
        .route("/audit-log", get(system::audit_log))
        .route("/evidence/{id}/image", get(system::evidence_image))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(system::health))
        .nest("/api", public.merge(protected))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}
