//! Request and inbox domain - DB queries
//!
//! Creating a request writes three kinds of rows in one transaction: the
//! request, its item quantities, and one inbox event per group member.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct InboxRow {
    pub event_id: Uuid,
    pub request_id: Uuid,
    pub status: String,
    pub sender_member_id: Uuid,
    pub sender_name: String,
    pub store_id: Option<String>,
    pub store_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RequestItemRow {
    pub request_id: Uuid,
    pub item_id: String,
    pub name: String,
    pub qty: i64,
}

pub async fn insert_request<'e, E>(
    executor: E,
    id: Uuid,
    group_id: Uuid,
    sender_member_id: Uuid,
    store_id: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO requests (id, group_id, sender_member_id, store_id, status)
        VALUES ($1, $2, $3, $4, 'requested')
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(sender_member_id)
    .bind(store_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_request_item<'e, E>(
    executor: E,
    request_id: Uuid,
    item_id: &str,
    qty: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO request_items (request_id, item_id, qty)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(request_id)
    .bind(item_id)
    .bind(qty)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_inbox_event<'e, E>(
    executor: E,
    id: Uuid,
    request_id: Uuid,
    recipient_member_id: Uuid,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO inbox_events (id, request_id, recipient_member_id)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(id)
    .bind(request_id)
    .bind(recipient_member_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_inbox_events<'e, E>(
    executor: E,
    member_id: Uuid,
    group_id: Uuid,
    limit: i64,
) -> Result<Vec<InboxRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT
            ie.id AS event_id,
            ie.request_id,
            r.status,
            r.sender_member_id,
            m.display_name AS sender_name,
            r.store_id,
            s.name AS store_name,
            r.created_at,
            ie.read_at
        FROM inbox_events ie
        JOIN requests r ON r.id = ie.request_id
        JOIN members m ON m.id = r.sender_member_id
        LEFT JOIN stores s ON s.id = r.store_id
        WHERE ie.recipient_member_id = $1
          AND r.group_id = $2
        ORDER BY r.created_at DESC
        LIMIT $3
        "#,
    )
    .bind(member_id)
    .bind(group_id)
    .bind(limit)
    .fetch_all(executor)
    .await
}

pub async fn list_request_items<'e, E>(
    executor: E,
    request_ids: &[Uuid],
) -> Result<Vec<RequestItemRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT ri.request_id, ri.item_id, i.name, ri.qty
        FROM request_items ri
        JOIN items i ON i.id = ri.item_id
        WHERE ri.request_id = ANY($1)
        ORDER BY i.sort_order ASC
        "#,
    )
    .bind(request_ids)
    .fetch_all(executor)
    .await
}

/// The request id, but only when the caller received it and did not send it.
pub async fn find_recipient_request<'e, E>(
    executor: E,
    request_id: Uuid,
    member_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT r.id
        FROM requests r
        JOIN inbox_events ie ON ie.request_id = r.id
        WHERE r.id = $1
          AND ie.recipient_member_id = $2
          AND r.sender_member_id <> $2
        "#,
    )
    .bind(request_id)
    .bind(member_id)
    .fetch_optional(executor)
    .await
}

/// First acknowledgement wins; later states are never demoted.
pub async fn set_request_acknowledged<'e, E>(
    executor: E,
    request_id: Uuid,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE requests
        SET status = CASE
            WHEN status = 'requested' THEN 'acknowledged'
            ELSE status
        END
        WHERE id = $1
        "#,
    )
    .bind(request_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn set_request_completed<'e, E>(executor: E, request_id: Uuid) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE requests
        SET status = 'completed'
        WHERE id = $1
        "#,
    )
    .bind(request_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn mark_inbox_event_read<'e, E>(
    executor: E,
    request_id: Uuid,
    member_id: Uuid,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE inbox_events
        SET read_at = COALESCE(read_at, NOW())
        WHERE request_id = $1 AND recipient_member_id = $2
        "#,
    )
    .bind(request_id)
    .bind(member_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_request_status<'e, E>(
    executor: E,
    request_id: Uuid,
) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar("SELECT status FROM requests WHERE id = $1")
        .bind(request_id)
        .fetch_optional(executor)
        .await
}
