//! Group creation and joining
//!
//! Both endpoints sit behind three gates: a per-IP burst limiter, the daily
//! per-IP create/join counter, and the process-wide write quota.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use uuid::Uuid;

use crate::AppState;
use crate::constants::INVITE_TOKEN_BYTES;
use crate::domain::groups;
use crate::models::Role;
use crate::routes::trimmed_field;
use crate::services::error::{ApiError, LogErr};
use crate::services::{auth, quota, rate_limit};

pub fn routes() -> Router<Arc<AppState>> {
    // Burst protection on top of the daily per-IP counter: invite token and
    // passphrase guessing should get slow long before the daily cap.
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    Router::new()
        .route("/api/groups/create", post(create_group))
        .route("/api/groups/join", post(join_group))
        .layer(rate_limit_layer)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupRequest {
    device_id: String,
    display_name: String,
    passphrase: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinGroupRequest {
    invite_token: String,
    device_id: String,
    display_name: String,
    passphrase: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupCreateResponse {
    group_id: Uuid,
    member_id: Uuid,
    role: Role,
    invite_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupJoinResponse {
    group_id: Uuid,
    member_id: Uuid,
    role: Role,
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupCreateResponse>), ApiError> {
    rate_limit::check_join_create_limit(&state.db, &headers).await?;
    quota::check_daily_write_quota(&state.quota).await?;

    let device_id = trimmed_field(&body.device_id, "deviceId", 8, 120)?;
    let display_name = trimmed_field(&body.display_name, "displayName", 1, 40)?;
    let passphrase = trimmed_field(&body.passphrase, "passphrase", 6, 64)?;

    let group_id = Uuid::new_v4();
    let member_id = Uuid::new_v4();
    let invite_token = auth::random_token(INVITE_TOKEN_BYTES);
    let invite_token_hash = auth::sha256_hex(&invite_token);

    // Key stretching is CPU-bound; keep it off the async workers.
    let passphrase_hash = tokio::task::spawn_blocking(move || auth::hash_passphrase(&passphrase))
        .await
        .or_internal("Passphrase hashing task failed")?;

    let mut tx = state.db.begin().await.or_internal("Begin create group tx")?;
    groups::insert_group(&mut *tx, group_id, &invite_token_hash, &passphrase_hash)
        .await
        .or_internal("Insert group")?;
    groups::insert_member(
        &mut *tx,
        member_id,
        group_id,
        &device_id,
        &display_name,
        Role::Admin.as_str(),
    )
    .await
    .or_internal("Insert founding member")?;
    tx.commit().await.or_internal("Commit create group tx")?;

    Ok((
        StatusCode::CREATED,
        Json(GroupCreateResponse {
            group_id,
            member_id,
            role: Role::Admin,
            invite_token,
        }),
    ))
}

async fn join_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<JoinGroupRequest>,
) -> Result<(StatusCode, Json<GroupJoinResponse>), ApiError> {
    rate_limit::check_join_create_limit(&state.db, &headers).await?;
    quota::check_daily_write_quota(&state.quota).await?;

    let invite_token = trimmed_field(&body.invite_token, "inviteToken", 8, 120)?;
    let device_id = trimmed_field(&body.device_id, "deviceId", 8, 120)?;
    let display_name = trimmed_field(&body.display_name, "displayName", 1, 40)?;
    let passphrase = trimmed_field(&body.passphrase, "passphrase", 6, 64)?;

    let invite_token_hash = auth::sha256_hex(&invite_token);
    let group = groups::find_group_by_invite_hash(&state.db, &invite_token_hash)
        .await
        .or_internal("Group lookup")?
        .ok_or_else(|| ApiError::not_found("GROUP_NOT_FOUND"))?;

    let stored_hash = group.passphrase_hash.clone();
    let matched =
        tokio::task::spawn_blocking(move || auth::verify_passphrase(&passphrase, &stored_hash))
            .await
            .or_internal("Passphrase verification task failed")?;
    if !matched {
        return Err(ApiError::forbidden("INVALID_PASSPHRASE"));
    }

    if let Some(existing) = groups::find_member_by_device(&state.db, group.id, &device_id)
        .await
        .or_internal("Member lookup")?
    {
        return Ok((
            StatusCode::OK,
            Json(GroupJoinResponse {
                group_id: group.id,
                member_id: existing.id,
                role: Role::from_db(&existing.role),
            }),
        ));
    }

    let member_id = Uuid::new_v4();
    groups::insert_member(
        &state.db,
        member_id,
        group.id,
        &device_id,
        &display_name,
        Role::Member.as_str(),
    )
    .await
    .or_internal("Insert member")?;

    Ok((
        StatusCode::CREATED,
        Json(GroupJoinResponse {
            group_id: group.id,
            member_id,
            role: Role::Member,
        }),
    ))
}
