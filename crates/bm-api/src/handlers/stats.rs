use axum::{
    Json,
    extract::{Path, State},
};

use bm_common::api::StatsResponse;
use bm_common::stats::current_stats;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn stats(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    auth: AuthUser,
) -> Result<Json<StatsResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let summary = current_stats(state.store.as_ref(), &user_id).await?;
    Ok(Json(summary.into()))
}
