use super::{ok, ApiResult, AppState};
use axum::extract::State;
use facegate_core::types::{NamedRef, RoleSummary};
use std::sync::Arc;

pub async fn roles(State(state): State<Arc<AppState>>) -> ApiResult<Vec<RoleSummary>> {
    ok(state.store.list_roles().await?)
}

pub async fn point_types(State(state): State<Arc<AppState>>) -> ApiResult<Vec<NamedRef>> {
    ok(state.store.list_point_types().await?)
}

pub async fn alert_types(State(state): State<Arc<AppState>>) -> ApiResult<Vec<NamedRef>> {
    ok(state.store.list_alert_types().await?)
}
