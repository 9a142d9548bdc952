use super::extract::{Id, Params};
use super::{ok, paged, ApiResult, AppState};
use crate::error::ApiError;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::Local;
use facegate_core::types::{AuditAction, AuditEntry, DashboardStats, PageRequest};
use facegate_store::audit::AuditFilter;
use facegate_store::stats::Bounds;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    /// "up" when the face service answered its health check.
    pub face_service: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    page: Option<u32>,
    limit: Option<u32>,
    user_id: Option<i64>,
    action: Option<AuditAction>,
    table: Option<String>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Health> {
    let face_service = match state.face.health().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!(error = %e, "face service health check failed");
            "down"
        }
    };
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        face_service,
    })
}

pub async fn dashboard(State(state): State<Arc<AppState>>) -> ApiResult<DashboardStats> {
    ok(state.store.dashboard_stats(Bounds::at(Local::now())).await?)
}

pub async fn audit_log(State(state): State<Arc<AppState>>, Params(q): Params<AuditQuery>) -> ApiResult<Vec<AuditEntry>> {
    let filter = AuditFilter {
        user_id: q.user_id,
        action: q.action,
        table_name: q.table.filter(|t| !t.trim().is_empty()),
    };
    let page = state
        .store
        .list_audit(filter, PageRequest::new(q.page, q.limit, 50))
        .await?;
    paged(page)
}

/// Raw evidence bytes, served with their recorded MIME type.
pub async fn evidence_image(State(state): State<Arc<AppState>>, Id(id): Id) -> Result<Response, ApiError> {
    let evidence = state.store.get_evidence(id).await?;
    let bytes = state.evidence.read(&evidence.path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ApiError::NotFound("evidence file"),
        _ => ApiError::internal(e),
    })?;
    let mime = evidence
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use crate::api::testutil;
    use crate::evidence::{sample_png, Photo};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use facegate_core::EvidenceKind;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_is_public() {
        let app = testutil::app().await;
        let (status, body) = app.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["face_service"], "up");
        assert_eq!(body["data"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let app = testutil::app().await;
        testutil::user(&app, "Ana", "100").await;
        let (status, body) = app.call(Method::GET, "/api/dashboard/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["summary"]["total_users"], 2);
        assert_eq!(body["data"]["accesses_by_hour"].as_array().unwrap().len(), 24);
    }

    #[tokio::test]
    async fn test_audit_log_filters() {
        let app = testutil::app().await;
        testutil::zone(&app, "Lobby").await;
        let (status, body) = app
            .call(Method::GET, "/api/audit-log?action=INSERT&table=zones", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["data"][0]["new_value"], "Lobby");

        let (status, _) = app.call(Method::GET, "/api/audit-log?action=DROP", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_evidence_image() {
        let app = testutil::app().await;
        let photo = Photo::from_base64(&STANDARD.encode(sample_png())).await.unwrap();
        let new = app.state.evidence.save(EvidenceKind::AccessPhoto, &photo).await.unwrap();
        let evidence = app.state.store.insert_evidence(new).await.unwrap();

        let req = Request::builder()
            .uri(format!("/api/evidence/{}/image", evidence.id))
            .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
            .body(Body::empty())
            .unwrap();
        let resp = crate::api::router(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), sample_png().as_slice());

        let (status, _) = app.call(Method::GET, "/api/evidence/999/image", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
