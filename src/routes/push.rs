//! Push subscription registration

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::domain::push as domain_push;
use crate::services::auth::{self, MemberHeaders};
use crate::services::error::{ApiError, LogErr};
use crate::services::quota;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/push/subscribe", post(subscribe))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushSubscribeRequest {
    group_id: Uuid,
    member_id: Uuid,
    subscription: domain_push::PushSubscriptionData,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Json(body): Json<PushSubscribeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let subscription = &body.subscription;
    if subscription.endpoint.trim().is_empty()
        || subscription.keys.p256dh.trim().is_empty()
        || subscription.keys.auth.trim().is_empty()
    {
        return Err(ApiError::invalid_payload(json!({
            "field": "subscription",
            "message": "endpoint and keys must not be empty",
        })));
    }

    let member = auth::require_member(&state.db, &member_headers, body.group_id).await?;
    if member.id != body.member_id {
        return Err(ApiError::forbidden("MEMBER_MISMATCH"));
    }

    quota::check_daily_write_quota(&state.quota).await?;

    domain_push::upsert_subscription(&state.db, Uuid::new_v4(), body.member_id, subscription)
        .await
        .or_internal("Upsert push subscription")?;

    Ok(Json(OkResponse { ok: true }))
}
