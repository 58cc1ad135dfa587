//! Shopping request lifecycle: create, inbox, acknowledge, complete

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::constants::{INBOX_PAGE_SIZE, localize_system_item_name, localize_system_store_name};
use crate::domain::{catalog, groups, requests};
use crate::models::{CatalogLanguage, RequestStatus};
use crate::services::auth::{self, MemberHeaders};
use crate::services::error::{ApiError, LogErr};
use crate::services::{push, quota};

const MAX_REQUEST_ITEMS: usize = 50;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/requests", post(create_request))
        .route("/api/requests/inbox", get(get_inbox))
        .route("/api/requests/{request_id}/ack", post(ack_request))
        .route("/api/requests/{request_id}/complete", post(complete_request))
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestBody {
    group_id: Uuid,
    sender_member_id: Uuid,
    store_id: Option<String>,
    item_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestResponse {
    request_id: Uuid,
    push_message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboxQuery {
    group_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InboxItem {
    name: String,
    qty: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InboxEvent {
    event_id: Uuid,
    request_id: Uuid,
    status: RequestStatus,
    sender_member_id: Uuid,
    sender_name: String,
    store_name: Option<String>,
    items: Vec<InboxItem>,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestStatusResponse {
    request_id: Uuid,
    status: RequestStatus,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_request(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    headers: HeaderMap,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<CreateRequestResponse>), ApiError> {
    let language = CatalogLanguage::from_headers(&headers);
    quota::check_daily_write_quota(&state.quota).await?;

    if body.item_ids.is_empty()
        || body.item_ids.len() > MAX_REQUEST_ITEMS
        || body.item_ids.iter().any(|id| id.is_empty())
    {
        return Err(ApiError::invalid_payload(json!({
            "field": "itemIds",
            "message": format!("must contain 1 to {} item ids", MAX_REQUEST_ITEMS),
        })));
    }

    let member = auth::require_member(&state.db, &member_headers, body.group_id).await?;
    if member.id != body.sender_member_id {
        return Err(ApiError::forbidden("SENDER_MISMATCH"));
    }

    let store_name = match &body.store_id {
        Some(store_id) => {
            let store = catalog::find_group_store(&state.db, store_id, body.group_id)
                .await
                .or_internal("Store lookup")?
                .ok_or_else(|| ApiError::bad_request("INVALID_STORE_ID"))?;
            Some(localize_system_store_name(&store.id, &store.name, language))
        }
        None => None,
    };

    // Repeated ids collapse into quantities, keeping first-seen order for the
    // push message.
    let mut qty_by_item: Vec<(String, i64)> = Vec::new();
    for item_id in &body.item_ids {
        match qty_by_item.iter_mut().find(|(id, _)| id == item_id) {
            Some((_, qty)) => *qty += 1,
            None => qty_by_item.push((item_id.clone(), 1)),
        }
    }

    let unique_ids: Vec<String> = qty_by_item.iter().map(|(id, _)| id.clone()).collect();
    let available = catalog::fetch_accessible_items(&state.db, body.group_id, &unique_ids)
        .await
        .or_internal("Accessible items lookup")?;
    if available.len() != unique_ids.len() {
        return Err(ApiError::bad_request("INVALID_ITEM_ID"));
    }

    let member_ids = groups::list_member_ids(&state.db, body.group_id)
        .await
        .or_internal("List group members")?;

    let request_id = Uuid::new_v4();
    let mut tx = state.db.begin().await.or_internal("Begin request tx")?;
    requests::insert_request(
        &mut *tx,
        request_id,
        body.group_id,
        body.sender_member_id,
        body.store_id.as_deref(),
    )
    .await
    .or_internal("Insert request")?;
    for (item_id, qty) in &qty_by_item {
        requests::insert_request_item(&mut *tx, request_id, item_id, *qty)
            .await
            .or_internal("Insert request item")?;
    }
    for recipient in &member_ids {
        requests::insert_inbox_event(&mut *tx, Uuid::new_v4(), request_id, *recipient)
            .await
            .or_internal("Insert inbox event")?;
    }
    tx.commit().await.or_internal("Commit request tx")?;

    let readable_items: Vec<String> = qty_by_item
        .iter()
        .map(|(item_id, qty)| {
            let name = available
                .iter()
                .find(|item| &item.id == item_id)
                .map(|item| localize_system_item_name(&item.id, &item.name, language))
                .unwrap_or_else(|| unknown_item_label(language).to_string());
            if *qty > 1 {
                format!("{} x{}", name, qty)
            } else {
                name
            }
        })
        .collect();
    let push_message = build_push_message(
        &member.display_name,
        store_name.as_deref(),
        &readable_items,
        language,
    );

    let push_recipients: Vec<Uuid> = member_ids
        .into_iter()
        .filter(|id| *id != body.sender_member_id)
        .collect();
    if let Err(error) = push::notify_members(&state.db, &push_recipients, &push_message).await {
        eprintln!("[push] Fanout failed for request {}: {}", request_id, error);
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateRequestResponse {
            request_id,
            push_message,
        }),
    ))
}

fn unknown_item_label(language: CatalogLanguage) -> &'static str {
    match language {
        CatalogLanguage::Ja => "不明",
        CatalogLanguage::En => "Unknown",
    }
}

fn build_push_message(
    sender_name: &str,
    store_name: Option<&str>,
    readable_items: &[String],
    language: CatalogLanguage,
) -> String {
    match language {
        CatalogLanguage::Ja => format!(
            "{}さんが{}{}を買ってほしいと言っています",
            sender_name,
            store_name.map(|s| format!("{}で", s)).unwrap_or_default(),
            readable_items.join("、")
        ),
        CatalogLanguage::En => format!(
            "{} is asking to buy {}{}.",
            sender_name,
            readable_items.join(", "),
            store_name.map(|s| format!(" at {}", s)).unwrap_or_default()
        ),
    }
}

async fn get_inbox(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Query(query): Query<InboxQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<InboxEvent>>, ApiError> {
    let language = CatalogLanguage::from_headers(&headers);
    let group_id = query
        .group_id
        .ok_or_else(|| ApiError::bad_request("GROUP_ID_REQUIRED"))?;

    let member = auth::require_member(&state.db, &member_headers, group_id).await?;

    let rows = requests::list_inbox_events(&state.db, member.id, group_id, INBOX_PAGE_SIZE)
        .await
        .or_internal("List inbox events")?;
    if rows.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let request_ids: Vec<Uuid> = rows.iter().map(|row| row.request_id).collect();
    let item_rows = requests::list_request_items(&state.db, &request_ids)
        .await
        .or_internal("List request items")?;

    let events = rows
        .into_iter()
        .map(|row| {
            let items = item_rows
                .iter()
                .filter(|item| item.request_id == row.request_id)
                .map(|item| InboxItem {
                    name: localize_system_item_name(&item.item_id, &item.name, language),
                    qty: item.qty,
                })
                .collect();
            let store_name = match (&row.store_id, &row.store_name) {
                (Some(store_id), stored) => Some(localize_system_store_name(
                    store_id,
                    stored.as_deref().unwrap_or(""),
                    language,
                )),
                (None, stored) => stored.clone(),
            };
            InboxEvent {
                event_id: row.event_id,
                request_id: row.request_id,
                status: RequestStatus::from_db(&row.status),
                sender_member_id: row.sender_member_id,
                sender_name: row.sender_name,
                store_name,
                items,
                created_at: row.created_at,
                read_at: row.read_at,
            }
        })
        .collect();

    Ok(Json(events))
}

async fn ack_request(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestStatusResponse>, ApiError> {
    quota::check_daily_write_quota(&state.quota).await?;
    let member = auth::require_member_any_group(&state.db, &member_headers).await?;

    requests::find_recipient_request(&state.db, request_id, member.id)
        .await
        .or_internal("Recipient request lookup")?
        .ok_or_else(|| ApiError::not_found("REQUEST_NOT_FOUND"))?;

    let mut tx = state.db.begin().await.or_internal("Begin ack tx")?;
    requests::set_request_acknowledged(&mut *tx, request_id)
        .await
        .or_internal("Acknowledge request")?;
    requests::mark_inbox_event_read(&mut *tx, request_id, member.id)
        .await
        .or_internal("Mark inbox event read")?;
    tx.commit().await.or_internal("Commit ack tx")?;

    let status = requests::get_request_status(&state.db, request_id)
        .await
        .or_internal("Request status lookup")?
        .ok_or_else(|| ApiError::not_found("REQUEST_NOT_FOUND"))?;

    Ok(Json(RequestStatusResponse {
        request_id,
        status: RequestStatus::from_db(&status),
    }))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestStatusResponse>, ApiError> {
    quota::check_daily_write_quota(&state.quota).await?;
    let member = auth::require_member_any_group(&state.db, &member_headers).await?;

    requests::find_recipient_request(&state.db, request_id, member.id)
        .await
        .or_internal("Recipient request lookup")?
        .ok_or_else(|| ApiError::not_found("REQUEST_NOT_FOUND"))?;

    let mut tx = state.db.begin().await.or_internal("Begin complete tx")?;
    requests::set_request_completed(&mut *tx, request_id)
        .await
        .or_internal("Complete request")?;
    requests::mark_inbox_event_read(&mut *tx, request_id, member.id)
        .await
        .or_internal("Mark inbox event read")?;
    tx.commit().await.or_internal("Commit complete tx")?;

    let status = requests::get_request_status(&state.db, request_id)
        .await
        .or_internal("Request status lookup")?
        .ok_or_else(|| ApiError::not_found("REQUEST_NOT_FOUND"))?;

    Ok(Json(RequestStatusResponse {
        request_id,
        status: RequestStatus::from_db(&status),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_reads_naturally_in_japanese() {
        let items = vec!["ティッシュ".to_string(), "洗剤 x2".to_string()];
        assert_eq!(
            build_push_message("花子", Some("サミット"), &items, CatalogLanguage::Ja),
            "花子さんがサミットでティッシュ、洗剤 x2を買ってほしいと言っています"
        );
        assert_eq!(
            build_push_message("花子", None, &items, CatalogLanguage::Ja),
            "花子さんがティッシュ、洗剤 x2を買ってほしいと言っています"
        );
    }

    #[test]
    fn push_message_reads_naturally_in_english() {
        let items = vec!["Tissue".to_string(), "Detergent x2".to_string()];
        assert_eq!(
            build_push_message("Hanako", Some("Summit"), &items, CatalogLanguage::En),
            "Hanako is asking to buy Tissue, Detergent x2 at Summit."
        );
        assert_eq!(
            build_push_message("Hanako", None, &items, CatalogLanguage::En),
            "Hanako is asking to buy Tissue, Detergent x2."
        );
    }
}
