use super::extract::{Body, Id, Params};
use super::{created, done, ok, ok_with, paged, ApiResult, AppState, Created};
use crate::auth::Claims;
use axum::extract::State;
use axum::Extension;
use chrono::{DateTime, Utc};
use facegate_core::types::{Alert, FeedItem, PageRequest};
use facegate_core::validate::NewAlert;
use facegate_store::alerts::AlertFilter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const FEED_DEFAULT: u32 = 10;
const FEED_MAX: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    type_id: Option<i64>,
    point_id: Option<i64>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedFilter {
    #[default]
    All,
    Unread,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    filter: FeedFilter,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
    pub unread: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadCount {
    pub updated: usize,
}

pub async fn list(State(state): State<Arc<AppState>>, Params(q): Params<ListQuery>) -> ApiResult<Vec<Alert>> {
    let filter = AlertFilter {
        type_id: q.type_id,
        point_id: q.point_id,
        from: q.from,
        to: q.to,
    };
    let page = state
        .store
        .list_alerts(filter, PageRequest::new(q.page, q.limit, 20))
        .await?;
    paged(page)
}

/// Raise an alert by hand and queue its notifications.
pub async fn create(State(state): State<Arc<AppState>>, Body(form): Body<NewAlert>) -> Created<Alert> {
    let alert = state.store.create_alert(&form).await?;
    state
        .store
        .fan_out(alert.id, &state.config.destinations(), false)
        .await?;
    state.dispatcher.wake(alert.id);
    let alert = state.store.get_alert(alert.id).await?;
    created(alert, "alert created")
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    state.store.delete_alert(id, Some(claims.sub)).await?;
    done("alert deleted")
}

pub async fn feed(State(state): State<Arc<AppState>>, Params(q): Params<FeedQuery>) -> ApiResult<FeedResponse> {
    let limit = q.limit.unwrap_or(FEED_DEFAULT).clamp(1, FEED_MAX);
    let feed = state.store.feed(q.filter == FeedFilter::Unread, limit).await?;
    ok(FeedResponse {
        items: feed.items,
        unread: feed.unread,
    })
}

pub async fn read_one(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<ReadCount> {
    let changed = state.store.mark_alert_read(id).await?;
    ok_with(
        ReadCount {
            updated: usize::from(changed),
        },
        "notification marked as read",
    )
}

pub async fn read_all(State(state): State<Arc<AppState>>) -> ApiResult<ReadCount> {
    let updated = state.store.mark_all_read().await?;
    ok_with(ReadCount { updated }, format!("{updated} notifications marked as read"))
}

#[cfg(test)]
mod tests {
    use crate::api::testutil;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_alert_fans_out() {
        let app = testutil::app().await;
        let zone = testutil::zone(&app, "Lobby").await;
        let point = testutil::point(&app, zone, "Door").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/alerts",
                Some(json!({ "type_id": 1, "detail": "Tailgating", "point_id": point })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["point"]["id"], point);
        let channels = body["data"]["notifications"].as_array().unwrap();
        assert!(channels.iter().any(|n| n["channel"] == "Sistema interno"));

        let (_, list) = app.call(Method::GET, &format!("/api/alerts?point_id={point}"), None).await;
        assert_eq!(list["pagination"]["total"], 1);

        let (status, body) = app
            .call(Method::POST, "/api/alerts", Some(json!({ "type_id": 42 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "alert type does not exist");
    }

    #[tokio::test]
    async fn test_feed_and_read_state() {
        let app = testutil::app().await;
        for kind in [1, 5, 6] {
            app.call(Method::POST, "/api/alerts", Some(json!({ "type_id": kind })))
                .await;
        }
        let (_, body) = app.call(Method::GET, "/api/notifications?limit=2", None).await;
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["unread"], 3);
        assert_eq!(body["data"]["items"][0]["read"], false);

        let first = body["data"]["items"][0]["id"].as_i64().unwrap();
        let (_, body) = app
            .call(Method::POST, &format!("/api/notifications/{first}/read"), None)
            .await;
        assert_eq!(body["data"]["updated"], 1);
        let (_, body) = app
            .call(Method::POST, &format!("/api/notifications/{first}/read"), None)
            .await;
        assert_eq!(body["data"]["updated"], 0);

        let (_, body) = app.call(Method::GET, "/api/notifications?filter=unread", None).await;
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

        let (_, body) = app.call(Method::POST, "/api/notifications/read-all", None).await;
        assert_eq!(body["data"]["updated"], 2);
        let (_, body) = app.call(Method::GET, "/api/notifications", None).await;
        assert_eq!(body["data"]["unread"], 0);

        let (status, _) = app.call(Method::POST, "/api/notifications/999/read", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_alert() {
        let app = testutil::app().await;
        let (_, body) = app
            .call(Method::POST, "/api/alerts", Some(json!({ "type_id": 2 })))
            .await;
        let id = body["data"]["id"].as_i64().unwrap();
        let (status, _) = app.call(Method::DELETE, &format!("/api/alerts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::DELETE, &format!("/api/alerts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
