use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use bm_common::api::TagFrequencyResponse;
use bm_common::matching::tag_frequencies;
use bm_common::store::ProfileStore;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

const DEFAULT_TAG_LIMIT: usize = 10;
const MAX_TAG_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    pub limit: Option<usize>,
}

pub async fn top_tags(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(query): Query<TagQuery>,
    auth: AuthUser,
) -> Result<Json<TagFrequencyResponse>, ApiError> {
    auth.ensure_acts_for(&user_id)?;

    let limit = query.limit.unwrap_or(DEFAULT_TAG_LIMIT).clamp(1, MAX_TAG_LIMIT);
    let logs = state.store.get_activity_logs(&user_id).await?;

    Ok(Json(TagFrequencyResponse {
        tags: tag_frequencies(&logs, limit),
    }))
}
