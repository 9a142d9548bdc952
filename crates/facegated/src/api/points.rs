use super::extract::{Body, Id, Params};
use super::{created, done, ok, ok_with, ApiResult, AppState, Created};
use crate::auth::Claims;
use crate::error::ApiError;
use axum::extract::State;
use axum::Extension;
use facegate_core::types::{CameraInfo, ControlPoint, ControlPointDetail, ControlPointSummary};
use facegate_core::validate::{CameraConfig, ControlPointPatch, NewControlPoint};
use facegate_store::points::CameraUpdate;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    zone_id: Option<i64>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Params(q): Params<ListQuery>,
) -> ApiResult<Vec<ControlPointSummary>> {
    ok(state.store.list_points(q.zone_id).await?)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Body(form): Body<NewControlPoint>,
) -> Created<ControlPoint> {
    let point = state
        .store
        .create_point(&form.normalize(), Some(claims.sub))
        .await?;
    created(point, "control point created")
}

pub async fn detail(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<ControlPointDetail> {
    ok(state.store.point_detail(id).await?)
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(patch): Body<ControlPointPatch>,
) -> ApiResult<ControlPoint> {
    let point = state.store.update_point(id, &patch, Some(claims.sub)).await?;
    ok_with(point, "control point updated")
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    state.store.delete_point(id, Some(claims.sub)).await?;
    tracing::info!(point_id = id, actor = claims.sub, "control point deleted");
    done("control point deleted")
}

pub async fn camera(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<CameraInfo> {
    ok(state.store.camera(id).await?)
}

/// Store camera settings. The password is sealed before it reaches the
/// database and is kept as-is when the body omits it.
pub async fn put_camera(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(form): Body<CameraConfig>,
) -> ApiResult<CameraInfo> {
    let form = form.normalize();
    form.validate()?;
    let sealed_password = form
        .password
        .as_deref()
        .map(|p| state.secrets.seal(p.as_bytes()))
        .transpose()
        .map_err(ApiError::internal)?;
    let update = CameraUpdate {
        url: form.url,
        user: form.user,
        sealed_password,
        stream_type: form.stream_type,
    };
    let info = state.store.set_camera(id, update, Some(claims.sub)).await?;
    ok_with(info, "camera settings saved")
}

pub async fn clear_camera(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    state.store.clear_camera(id, Some(claims.sub)).await?;
    done("camera settings removed")
}
