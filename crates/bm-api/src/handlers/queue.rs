use axum::{Json, extract::State};

use bm_common::api::QueueStatusResponse;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

pub async fn status(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    Ok(Json(QueueStatusResponse {
        processing_count: state.queue.remaining(),
    }))
}
