use super::extract::{Body, Id, Params};
use super::{created, done, ok, ok_with, ApiResult, AppState, Created};
use crate::auth::Claims;
use axum::extract::State;
use axum::Extension;
use chrono::Local;
use facegate_core::types::{Zone, ZoneDetail, ZoneSummary};
use facegate_core::validate::{NewZone, ZoneUpdate};
use facegate_core::ZoneSettings;
use facegate_store::stats::Bounds;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    include_points: bool,
}

pub async fn list(State(state): State<Arc<AppState>>, Params(q): Params<ListQuery>) -> ApiResult<Vec<ZoneSummary>> {
    ok(state.store.list_zones(q.include_points).await?)
}

pub async fn get_one(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<Zone> {
    ok(state.store.get_zone(id).await?)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Body(form): Body<NewZone>,
) -> Created<Zone> {
    let form = form.normalize();
    let zone = state.store.create_zone(&form, Some(claims.sub)).await?;
    created(zone, "zone created")
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(form): Body<ZoneUpdate>,
) -> ApiResult<Zone> {
    let form = form.normalize();
    let zone = state.store.update_zone(id, &form, Some(claims.sub)).await?;
    ok_with(zone, "zone updated")
}

/// Deletes the zone with its control points, rules and events.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    state.store.delete_zone(id, Some(claims.sub)).await?;
    tracing::info!(zone_id = id, actor = claims.sub, "zone deleted");
    done("zone deleted")
}

pub async fn detail(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<ZoneDetail> {
    ok(state.store.zone_detail(id, Bounds::at(Local::now())).await?)
}

pub async fn settings(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<ZoneSettings> {
    ok(state.store.zone_settings(id).await?)
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(settings): Body<ZoneSettings>,
) -> ApiResult<ZoneSettings> {
    let saved = state
        .store
        .put_zone_settings(id, &settings, Some(claims.sub))
        .await?;
    ok_with(saved, "zone settings saved")
}

#[cfg(test)]
mod tests {
    use crate::api::testutil;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_zone_crud() {
        let app = testutil::app().await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/zones",
                Some(json!({ "name": "Servidores", "description": "Rack room" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, _) = app
            .call(Method::POST, "/api/zones", Some(json!({ "name": "Servidores" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        testutil::point(&app, id, "Door").await;
        let (_, body) = app.call(Method::GET, "/api/zones?include_points=true", None).await;
        assert_eq!(body["data"][0]["control_points"].as_array().unwrap().len(), 1);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/zones/{id}"),
                Some(json!({ "name": "Servidores B", "active": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["active"], false);

        let (status, body) = app.call(Method::GET, &format!("/api/zones/{id}/detail"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stats"]["accesses_today"], 0);

        let (status, _) = app.call(Method::DELETE, &format!("/api/zones/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &format!("/api/zones/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_roundtrip_and_validation() {
        let app = testutil::app().await;
        let id = testutil::zone(&app, "Lab").await;
        let (status, body) = app.call(Method::GET, &format!("/api/zones/{id}/settings"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["all_day"], true);

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/zones/{id}/settings"),
                Some(json!({ "all_day": false, "start": "07:00", "end": "19:00", "min_confidence": 90 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["start"], "07:00");

        let (status, _) = app
            .call(
                Method::PUT,
                &format!("/api/zones/{id}/settings"),
                Some(json!({ "min_confidence": 20 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
