use super::extract::{Body, Id, Params};
use super::{created, done, ok, ok_with, ApiResult, AppState, Created};
use crate::auth::Claims;
use axum::extract::State;
use axum::Extension;
use facegate_core::types::AccessRuleView;
use facegate_core::validate::{AccessRulePatch, NewAccessRule};
use facegate_store::rules::RuleFilter;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    user_id: Option<i64>,
    zone_id: Option<i64>,
    active: Option<bool>,
}

pub async fn list(State(state): State<Arc<AppState>>, Params(q): Params<ListQuery>) -> ApiResult<Vec<AccessRuleView>> {
    let filter = RuleFilter {
        user_id: q.user_id,
        zone_id: q.zone_id,
        active: q.active,
    };
    ok(state.store.list_rules(filter).await?)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Body(form): Body<NewAccessRule>,
) -> Created<AccessRuleView> {
    let spec = form.validate()?;
    let rule = state.store.create_rule(&spec, Some(claims.sub)).await?;
    created(rule, "access rule created")
}

pub async fn detail(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<AccessRuleView> {
    ok(state.store.get_rule(id).await?)
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(patch): Body<AccessRulePatch>,
) -> ApiResult<AccessRuleView> {
    let spec = patch.validate()?;
    let rule = state.store.update_rule(id, &spec, Some(claims.sub)).await?;
    ok_with(rule, "access rule updated")
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    state.store.delete_rule(id, Some(claims.sub)).await?;
    done("access rule deleted")
}

#[cfg(test)]
mod tests {
    use crate::api::testutil;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_rule_lifecycle() {
        let app = testutil::app().await;
        let user = testutil::user(&app, "Ana", "100").await;
        let zone = testutil::zone(&app, "Lobby").await;
        let body = json!({ "user_id": user, "zone_id": zone, "start": "08:00", "end": "17:30", "weekday": 1 });

        let (status, created) = app.call(Method::POST, "/api/access-rules", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["day_name"], "Lunes");
        assert_eq!(created["data"]["start"], "08:00");
        let id = created["data"]["id"].as_i64().unwrap();

        let (status, _) = app.call(Method::POST, "/api/access-rules", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = app
            .call(Method::GET, &format!("/api/access-rules?user_id={user}"), None)
            .await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);

        let (status, updated) = app
            .call(
                Method::PUT,
                &format!("/api/access-rules/{id}"),
                Some(json!({ "weekday": null, "end": "19:00" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["weekday"], serde_json::Value::Null);
        assert_eq!(updated["data"]["end"], "19:00");

        let (status, _) = app
            .call(Method::PUT, &format!("/api/access-rules/{id}"), Some(json!({ "end": "07:00" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(Method::DELETE, &format!("/api/access-rules/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call(Method::GET, &format!("/api/access-rules/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rule_window_must_be_ordered() {
        let app = testutil::app().await;
        let user = testutil::user(&app, "Ana", "100").await;
        let zone = testutil::zone(&app, "Lobby").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/api/access-rules",
                Some(json!({ "user_id": user, "zone_id": zone, "start": "18:00", "end": "08:00" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["field"], "end");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/access-rules",
                Some(json!({ "user_id": user, "zone_id": zone, "start": "25:00", "end": "26:00" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
