//! Quota status endpoint: lets clients render "paused until X" banners
//! without consuming budget.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::services::error::ApiError;
use crate::services::quota::{self, QuotaState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/quota/status", get(get_quota_status))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaResponse {
    state: QuotaState,
    resume_at: String,
    count: i64,
    limit: i64,
}

async fn get_quota_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QuotaResponse>, ApiError> {
    let record = quota::current_status(&state.quota).await?;

    Ok(Json(QuotaResponse {
        state: record.state,
        resume_at: record.resume_at,
        count: record.count,
        limit: record.limit,
    }))
}
