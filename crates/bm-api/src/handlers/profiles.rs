use axum::{
    Json,
    extract::{Path, State},
};

use bm_common::UserProfile;
use bm_common::api::{FollowResponse, UpdateProfileRequest, UserViewResponse};
use bm_common::profile::{self, ProfileUpdate};

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

const MAX_NAME_CHARS: usize = 50;
const MAX_TEXT_CHARS: usize = 1000;

fn too_long(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(ApiError::BadRequest(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}

fn validate(request: UpdateProfileRequest) -> Result<ProfileUpdate, ApiError> {
    too_long("display_name", request.display_name.as_deref(), MAX_NAME_CHARS)?;
    too_long("bio", request.bio.as_deref(), MAX_TEXT_CHARS)?;
    too_long("career", request.career.as_deref(), MAX_TEXT_CHARS)?;
    too_long("education", request.education.as_deref(), MAX_TEXT_CHARS)?;
    too_long("avatar_ref", request.avatar_ref.as_deref(), MAX_TEXT_CHARS)?;
    Ok(request.into())
}

/// プロフィール保存（is_visible でマッチング対象に出るかを切り替える）
pub async fn update_profile(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let update = validate(request)?;
    let saved = profile::update_profile(state.store.as_ref(), &user_id, update).await?;
    Ok(Json(saved))
}

pub async fn view_user(
    State(state): State<SharedState>,
    Path((user_id, target_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<Json<UserViewResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let view = profile::view_user(state.store.as_ref(), &user_id, &target_id).await?;
    Ok(Json(view.into()))
}

pub async fn follow(
    State(state): State<SharedState>,
    Path((user_id, target_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<Json<FollowResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let follow_state = profile::follow(state.store.as_ref(), &user_id, &target_id).await?;
    Ok(Json(follow_state.into()))
}

pub async fn unfollow(
    State(state): State<SharedState>,
    Path((user_id, target_id)): Path<(String, String)>,
    auth: AuthUser,
) -> Result<Json<FollowResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let follow_state = profile::unfollow(state.store.as_ref(), &user_id, &target_id).await?;
    Ok(Json(follow_state.into()))
}
