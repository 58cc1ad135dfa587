//! Catalog browsing and per-group customization
//!
//! The global catalog is public; everything group-scoped needs the member
//! headers. System rows are localized on the way out, custom rows keep the
//! name the group gave them.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::constants::{
    localize_system_item_name, localize_system_store_name, localize_system_tab_name,
};
use crate::domain::catalog;
use crate::models::{CatalogLanguage, Role};
use crate::routes::trimmed_field;
use crate::services::auth::{self, MemberHeaders};
use crate::services::error::{ApiError, LogErr};
use crate::services::quota;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/catalog", get(get_catalog))
        .route("/api/groups/{group_id}/layout", get(get_group_layout))
        .route("/api/groups/{group_id}/custom-tabs", post(create_custom_tab))
        .route(
            "/api/groups/{group_id}/custom-items",
            post(create_custom_item),
        )
        .route(
            "/api/groups/{group_id}/custom-tabs/{tab_id}/delete",
            post(delete_custom_tab),
        )
        .route(
            "/api/groups/{group_id}/custom-items/{item_id}/delete",
            post(delete_custom_item),
        )
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTab {
    pub id: String,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub tab_id: String,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreButton {
    pub id: String,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Serialize)]
struct LayoutResponse {
    tabs: Vec<CatalogTab>,
    items: Vec<CatalogItem>,
    stores: Vec<StoreButton>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct CreateTabRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateItemRequest {
    tab_id: String,
    name: String,
}

fn map_tab(row: catalog::TabRow, language: CatalogLanguage) -> CatalogTab {
    let name = if row.is_system {
        localize_system_tab_name(&row.id, &row.name, language)
    } else {
        row.name
    };
    CatalogTab {
        id: row.id,
        group_id: row.group_id,
        name,
        is_system: row.is_system,
        sort_order: row.sort_order,
    }
}

fn map_item(row: catalog::ItemRow, language: CatalogLanguage) -> CatalogItem {
    let name = if row.is_system {
        localize_system_item_name(&row.id, &row.name, language)
    } else {
        row.name
    };
    CatalogItem {
        id: row.id,
        tab_id: row.tab_id,
        name,
        is_system: row.is_system,
        sort_order: row.sort_order,
    }
}

fn map_store(row: catalog::StoreRow, language: CatalogLanguage) -> StoreButton {
    let name = if row.is_system {
        localize_system_store_name(&row.id, &row.name, language)
    } else {
        row.name
    };
    StoreButton {
        id: row.id,
        group_id: row.group_id,
        name,
        is_system: row.is_system,
        sort_order: row.sort_order,
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_catalog(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<LayoutResponse>, ApiError> {
    let language = CatalogLanguage::from_headers(&headers);

    let tabs = catalog::list_global_tabs(&state.db)
        .await
        .or_internal("List global tabs")?;
    let items = catalog::list_global_system_items(&state.db)
        .await
        .or_internal("List global items")?;
    let stores = catalog::list_global_stores(&state.db)
        .await
        .or_internal("List global stores")?;

    Ok(Json(LayoutResponse {
        tabs: tabs.into_iter().map(|row| map_tab(row, language)).collect(),
        items: items
            .into_iter()
            .map(|row| map_item(row, language))
            .collect(),
        stores: stores
            .into_iter()
            .map(|row| map_store(row, language))
            .collect(),
    }))
}

async fn get_group_layout(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path(group_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<LayoutResponse>, ApiError> {
    let language = CatalogLanguage::from_headers(&headers);
    auth::require_member(&state.db, &member_headers, group_id).await?;

    let tabs = catalog::list_tabs_for_group(&state.db, group_id)
        .await
        .or_internal("List group tabs")?;
    let items = catalog::list_items_for_group(&state.db, group_id)
        .await
        .or_internal("List group items")?;
    let stores = catalog::list_stores_for_group(&state.db, group_id)
        .await
        .or_internal("List group stores")?;

    Ok(Json(LayoutResponse {
        tabs: tabs.into_iter().map(|row| map_tab(row, language)).collect(),
        items: items
            .into_iter()
            .map(|row| map_item(row, language))
            .collect(),
        stores: stores
            .into_iter()
            .map(|row| map_store(row, language))
            .collect(),
    }))
}

async fn create_custom_tab(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path(group_id): Path<Uuid>,
    Json(body): Json<CreateTabRequest>,
) -> Result<(StatusCode, Json<CatalogTab>), ApiError> {
    let member = auth::require_member(&state.db, &member_headers, group_id).await?;
    if member.role != Role::Admin {
        return Err(ApiError::forbidden("ADMIN_ONLY"));
    }
    quota::check_daily_write_quota(&state.quota).await?;

    let name = trimmed_field(&body.name, "name", 1, 30)?;
    let sort_order = catalog::next_tab_sort_order(&state.db, group_id)
        .await
        .or_internal("Next tab sort order")?;

    let tab_id = Uuid::new_v4().to_string();
    catalog::insert_custom_tab(&state.db, &tab_id, group_id, &name, sort_order)
        .await
        .or_internal("Insert custom tab")?;

    Ok((
        StatusCode::CREATED,
        Json(CatalogTab {
            id: tab_id,
            group_id: Some(group_id),
            name,
            is_system: false,
            sort_order,
        }),
    ))
}

async fn create_custom_item(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path(group_id): Path<Uuid>,
    Json(body): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<CatalogItem>), ApiError> {
    let member = auth::require_member(&state.db, &member_headers, group_id).await?;
    if member.role != Role::Admin {
        return Err(ApiError::forbidden("ADMIN_ONLY"));
    }
    quota::check_daily_write_quota(&state.quota).await?;

    let name = trimmed_field(&body.name, "name", 1, 30)?;
    if body.tab_id.is_empty() {
        return Err(ApiError::invalid_payload(serde_json::json!({
            "field": "tabId",
            "message": "must not be empty",
        })));
    }

    let tab = catalog::get_tab_meta(&state.db, &body.tab_id)
        .await
        .or_internal("Tab lookup")?
        .ok_or_else(|| ApiError::not_found("TAB_NOT_FOUND"))?;

    if tab.group_id.is_some() && tab.group_id != Some(group_id) {
        return Err(ApiError::forbidden("TAB_NOT_ACCESSIBLE"));
    }
    if tab.archived_at.is_some() {
        return Err(ApiError::conflict("TAB_ARCHIVED"));
    }

    let sort_order = catalog::next_item_sort_order(&state.db, &body.tab_id)
        .await
        .or_internal("Next item sort order")?;

    let item_id = Uuid::new_v4().to_string();
    catalog::insert_custom_item(&state.db, &item_id, &body.tab_id, group_id, &name, sort_order)
        .await
        .or_internal("Insert custom item")?;

    Ok((
        StatusCode::CREATED,
        Json(CatalogItem {
            id: item_id,
            tab_id: body.tab_id,
            name,
            is_system: false,
            sort_order,
        }),
    ))
}

async fn delete_custom_tab(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path((group_id, tab_id)): Path<(Uuid, String)>,
) -> Result<Json<OkResponse>, ApiError> {
    let member = auth::require_member(&state.db, &member_headers, group_id).await?;
    if member.role != Role::Admin {
        return Err(ApiError::forbidden("ADMIN_ONLY"));
    }
    quota::check_daily_write_quota(&state.quota).await?;

    let tab = catalog::get_tab_meta(&state.db, &tab_id)
        .await
        .or_internal("Tab lookup")?
        .ok_or_else(|| ApiError::not_found("TAB_NOT_FOUND"))?;

    if tab.group_id != Some(group_id) || tab.is_system {
        return Err(ApiError::forbidden("TAB_NOT_DELETABLE"));
    }

    // Archiving twice is a no-op, not an error.
    if tab.archived_at.is_none() {
        catalog::archive_tab(&state.db, &tab_id)
            .await
            .or_internal("Archive tab")?;
    }

    Ok(Json(OkResponse { ok: true }))
}

async fn delete_custom_item(
    State(state): State<Arc<AppState>>,
    member_headers: MemberHeaders,
    Path((group_id, item_id)): Path<(Uuid, String)>,
) -> Result<Json<OkResponse>, ApiError> {
    let member = auth::require_member(&state.db, &member_headers, group_id).await?;
    if member.role != Role::Admin {
        return Err(ApiError::forbidden("ADMIN_ONLY"));
    }
    quota::check_daily_write_quota(&state.quota).await?;

    let item = catalog::get_item_meta(&state.db, &item_id)
        .await
        .or_internal("Item lookup")?
        .ok_or_else(|| ApiError::not_found("ITEM_NOT_FOUND"))?;

    let belongs_to_group = item.item_group_id == Some(group_id)
        || (item.item_group_id.is_none() && item.tab_group_id == Some(group_id));
    if !belongs_to_group || item.is_system {
        return Err(ApiError::forbidden("ITEM_NOT_DELETABLE"));
    }

    if item.archived_at.is_none() {
        catalog::archive_item(&state.db, &item_id)
            .await
            .or_internal("Archive item")?;
    }

    Ok(Json(OkResponse { ok: true }))
}
