use axum::{
    Json,
    extract::{Path, State},
};

use bm_common::api::MatchCandidateResponse;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// おすすめユーザー一覧（最大20件）
pub async fn list_matches(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Vec<MatchCandidateResponse>>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let ranked = state
        .engine
        .rank_matches(state.store.as_ref(), &user_id)
        .await?;

    Ok(Json(ranked.into_iter().map(Into::into).collect()))
}
