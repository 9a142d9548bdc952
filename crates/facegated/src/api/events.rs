use super::extract::{Body, Params};
use super::{created, ok, paged, ApiResult, AppState, Created};
use crate::access::{verify_access, VerifyOutcome, VerifyRequest};
use axum::extract::State;
use chrono::{DateTime, Local, Utc};
use facegate_core::types::{AccessEvent, Decision, PageRequest};
use facegate_core::validate::NewAccessEvent;
use facegate_store::events::{EventFilter, NewEvent};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    user_id: Option<i64>,
    point_id: Option<i64>,
    zone_id: Option<i64>,
    decision: Option<Decision>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

pub async fn list(State(state): State<Arc<AppState>>, Params(q): Params<ListQuery>) -> ApiResult<Vec<AccessEvent>> {
    let filter = EventFilter {
        user_id: q.user_id,
        point_id: q.point_id,
        zone_id: q.zone_id,
        decision: q.decision,
        from: q.from,
        to: q.to,
    };
    let page = state
        .store
        .list_events(filter, PageRequest::new(q.page, q.limit, 20))
        .await?;
    paged(page)
}

/// Record an access event reported by an external device.
pub async fn create(State(state): State<Arc<AppState>>, Body(form): Body<NewAccessEvent>) -> Created<AccessEvent> {
    form.validate()?;
    let event = state
        .store
        .record_event(NewEvent {
            user_id: form.user_id,
            point_id: form.point_id,
            decision: form.decision,
            score: form.score,
            liveness_ok: form.liveness_ok,
            evidence_id: form.evidence_id,
        })
        .await?;
    created(event, "access event recorded")
}

pub async fn verify(State(state): State<Arc<AppState>>, Body(req): Body<VerifyRequest>) -> ApiResult<VerifyOutcome> {
    ok(verify_access(&state, req, Utc::now(), Local::now().naive_local()).await?)
}
