use super::extract::{Body, Id, Params};
use super::{created, done, ok, paged, ApiResult, AppState, Created};
use crate::auth::Claims;
use crate::error::ApiError;
use crate::evidence::Photo;
use axum::extract::State;
use axum::Extension;
use facegate_core::password::hash_password;
use facegate_core::types::{Face, PageRequest, User, UserDetail, UserSummary};
use facegate_core::validate::{NewUser, UserPatch};
use facegate_store::faces::NewFace;
use facegate_store::users::UserFilter;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    role_id: Option<i64>,
    active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollBody {
    /// Base64 image, optionally as a `data:` URL.
    image: String,
}

async fn hash(password: Option<String>) -> Result<Option<String>, ApiError> {
    let Some(password) = password else {
        return Ok(None);
    };
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)?;
    Ok(Some(hashed))
}

pub async fn list(State(state): State<Arc<AppState>>, Params(q): Params<ListQuery>) -> ApiResult<Vec<UserSummary>> {
    let filter = UserFilter {
        search: q.search.filter(|s| !s.trim().is_empty()),
        role_id: q.role_id,
        active: q.active,
    };
    let page = state
        .store
        .list_users(filter, PageRequest::new(q.page, q.limit, 10))
        .await?;
    paged(page)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Body(form): Body<NewUser>,
) -> Created<User> {
    let form = form.normalize();
    form.validate()?;
    let password_hash = hash(form.password.clone()).await?;
    let user = state
        .store
        .create_user(&form, password_hash, Some(claims.sub))
        .await?;
    created(user, "user created")
}

pub async fn detail(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<UserDetail> {
    ok(state.store.get_user(id).await?)
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(patch): Body<UserPatch>,
) -> ApiResult<User> {
    let patch = patch.normalize();
    patch.validate()?;
    let password_hash = hash(patch.password.clone()).await?;
    let user = state
        .store
        .update_user(id, &patch, password_hash, Some(claims.sub))
        .await?;
    super::ok_with(user, "user updated")
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    if id == claims.sub {
        return Err(ApiError::BadRequest("you cannot delete your own account".into()));
    }
    let user = state.store.delete_user(id, Some(claims.sub)).await?;
    tracing::info!(user_id = id, actor = claims.sub, "user deleted");
    done(format!("user {} deleted", user.display_name()))
}

pub async fn faces(State(state): State<Arc<AppState>>, Id(id): Id) -> ApiResult<Vec<Face>> {
    if state.store.find_user(id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }
    ok(state.store.list_faces(id).await?)
}

/// Enroll a face through the face service and record it.
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
    Body(body): Body<EnrollBody>,
) -> Created<Face> {
    if state.store.find_user(id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }
    let photo = Photo::from_base64(&body.image).await?;
    let registered = state.face.register_face(id, &photo.to_base64()).await?;
    let model_id = match &registered.model {
        Some(name) => {
            let version = registered.model_version.as_deref().unwrap_or("1.0.0");
            Some(state.store.ensure_face_model(name, version).await?.id)
        }
        None => None,
    };
    let external_ref = registered.external_ref.clone();
    let face = state
        .store
        .insert_face(
            NewFace {
                user_id: id,
                model_id,
                quality: registered.quality,
                external_ref: registered.external_ref,
            },
            Some(claims.sub),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(
                user_id = id,
                external_ref = ?external_ref,
                error = %e,
                "face registered with the face service but not stored"
            )
        })?;
    tracing::info!(user_id = id, face_id = face.id, "face enrolled");
    created(face, "face enrolled")
}

pub async fn remove_face(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Id(id): Id,
) -> ApiResult<()> {
    let face = state.store.delete_face(id, Some(claims.sub)).await?;
    tracing::info!(face_id = id, user_id = face.user_id, "face deleted");
    done("face deleted")
}
