//! Catalog domain - DB queries for tabs, items and stores
//!
//! Catalog ids are TEXT: system rows carry well-known `sys-*` ids, custom
//! rows get generated UUIDs rendered as text. Deletion is a soft archive so
//! old requests keep resolving their item names.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct TabRow {
    pub id: String,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ItemRow {
    pub id: String,
    pub tab_id: String,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StoreRow {
    pub id: String,
    pub group_id: Option<Uuid>,
    pub name: String,
    pub is_system: bool,
    pub sort_order: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct TabMetaRow {
    pub id: String,
    pub group_id: Option<Uuid>,
    pub is_system: bool,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ItemMetaRow {
    pub id: String,
    pub is_system: bool,
    pub item_group_id: Option<Uuid>,
    pub tab_group_id: Option<Uuid>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ItemNameRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct StoreNameRow {
    pub id: String,
    pub name: String,
}

pub async fn list_global_tabs<'e, E>(executor: E) -> Result<Vec<TabRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, name, is_system, sort_order
        FROM tabs
        WHERE group_id IS NULL
          AND archived_at IS NULL
        ORDER BY sort_order ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn list_global_system_items<'e, E>(executor: E) -> Result<Vec<ItemRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT i.id, i.tab_id, i.name, i.is_system, i.sort_order
        FROM items i
        JOIN tabs t ON t.id = i.tab_id
        WHERE t.group_id IS NULL
          AND t.archived_at IS NULL
          AND i.is_system = TRUE
          AND i.archived_at IS NULL
        ORDER BY t.sort_order ASC, i.sort_order ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn list_global_stores<'e, E>(executor: E) -> Result<Vec<StoreRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, name, is_system, sort_order
        FROM stores
        WHERE group_id IS NULL
        ORDER BY sort_order ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

pub async fn list_tabs_for_group<'e, E>(
    executor: E,
    group_id: Uuid,
) -> Result<Vec<TabRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, name, is_system, sort_order
        FROM tabs
        WHERE (group_id IS NULL OR group_id = $1)
          AND archived_at IS NULL
        ORDER BY sort_order ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}

pub async fn list_items_for_group<'e, E>(
    executor: E,
    group_id: Uuid,
) -> Result<Vec<ItemRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT i.id, i.tab_id, i.name, i.is_system, i.sort_order
        FROM items i
        JOIN tabs t ON t.id = i.tab_id
        WHERE (t.group_id IS NULL OR t.group_id = $1)
          AND t.archived_at IS NULL
          AND i.archived_at IS NULL
          AND (
              i.is_system = TRUE
              OR i.group_id = $1
              OR (i.group_id IS NULL AND t.group_id = $1)
          )
        ORDER BY t.sort_order ASC, i.sort_order ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}

pub async fn list_stores_for_group<'e, E>(
    executor: E,
    group_id: Uuid,
) -> Result<Vec<StoreRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, name, is_system, sort_order
        FROM stores
        WHERE group_id IS NULL OR group_id = $1
        ORDER BY sort_order ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}

pub async fn next_tab_sort_order<'e, E>(executor: E, group_id: Uuid) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(sort_order), 0) + 10
        FROM tabs
        WHERE group_id = $1 AND archived_at IS NULL
        "#,
    )
    .bind(group_id)
    .fetch_one(executor)
    .await
}

pub async fn next_item_sort_order<'e, E>(executor: E, tab_id: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(sort_order), 0) + 10
        FROM items
        WHERE tab_id = $1 AND archived_at IS NULL
        "#,
    )
    .bind(tab_id)
    .fetch_one(executor)
    .await
}

pub async fn insert_custom_tab<'e, E>(
    executor: E,
    id: &str,
    group_id: Uuid,
    name: &str,
    sort_order: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO tabs (id, group_id, name, is_system, sort_order)
        VALUES ($1, $2, $3, FALSE, $4)
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(name)
    .bind(sort_order)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_custom_item<'e, E>(
    executor: E,
    id: &str,
    tab_id: &str,
    group_id: Uuid,
    name: &str,
    sort_order: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO items (id, tab_id, group_id, name, is_system, sort_order)
        VALUES ($1, $2, $3, $4, FALSE, $5)
        "#,
    )
    .bind(id)
    .bind(tab_id)
    .bind(group_id)
    .bind(name)
    .bind(sort_order)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_tab_meta<'e, E>(
    executor: E,
    tab_id: &str,
) -> Result<Option<TabMetaRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, is_system, archived_at
        FROM tabs
        WHERE id = $1
        "#,
    )
    .bind(tab_id)
    .fetch_optional(executor)
    .await
}

pub async fn get_item_meta<'e, E>(
    executor: E,
    item_id: &str,
) -> Result<Option<ItemMetaRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT i.id, i.is_system, i.group_id AS item_group_id,
               t.group_id AS tab_group_id, i.archived_at
        FROM items i
        JOIN tabs t ON t.id = i.tab_id
        WHERE i.id = $1
        "#,
    )
    .bind(item_id)
    .fetch_optional(executor)
    .await
}

pub async fn archive_tab<'e, E>(executor: E, tab_id: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE tabs SET archived_at = NOW() WHERE id = $1")
        .bind(tab_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn archive_item<'e, E>(executor: E, item_id: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE items SET archived_at = NOW() WHERE id = $1")
        .bind(item_id)
        .execute(executor)
        .await?;

    Ok(())
}

/// A store visible to the group (global or group-owned)
pub async fn find_group_store<'e, E>(
    executor: E,
    store_id: &str,
    group_id: Uuid,
) -> Result<Option<StoreNameRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, name
        FROM stores
        WHERE id = $1
          AND (group_id IS NULL OR group_id = $2)
        "#,
    )
    .bind(store_id)
    .bind(group_id)
    .fetch_optional(executor)
    .await
}

/// The subset of `item_ids` the group is allowed to request
pub async fn fetch_accessible_items<'e, E>(
    executor: E,
    group_id: Uuid,
    item_ids: &[String],
) -> Result<Vec<ItemNameRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT i.id, i.name
        FROM items i
        JOIN tabs t ON t.id = i.tab_id
        WHERE i.id = ANY($1)
          AND (t.group_id IS NULL OR t.group_id = $2)
          AND t.archived_at IS NULL
          AND i.archived_at IS NULL
          AND (
              i.is_system = TRUE
              OR i.group_id = $2
              OR (i.group_id IS NULL AND t.group_id = $2)
          )
        "#,
    )
    .bind(item_ids)
    .bind(group_id)
    .fetch_all(executor)
    .await
}
