//! Group and membership domain - DB queries
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MemberRow {
    pub id: Uuid,
    pub group_id: Uuid,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct GroupAuthRow {
    pub id: Uuid,
    pub passphrase_hash: String,
}

pub async fn insert_group<'e, E>(
    executor: E,
    id: Uuid,
    invite_token_hash: &str,
    passphrase_hash: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO groups (id, invite_token_hash, passphrase_hash)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(id)
    .bind(invite_token_hash)
    .bind(passphrase_hash)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_group_by_invite_hash<'e, E>(
    executor: E,
    invite_token_hash: &str,
) -> Result<Option<GroupAuthRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, passphrase_hash
        FROM groups
        WHERE invite_token_hash = $1
        "#,
    )
    .bind(invite_token_hash)
    .fetch_optional(executor)
    .await
}

pub async fn insert_member<'e, E>(
    executor: E,
    id: Uuid,
    group_id: Uuid,
    device_id: &str,
    display_name: &str,
    role: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO members (id, group_id, device_id, display_name, role)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(device_id)
    .bind(display_name)
    .bind(role)
    .execute(executor)
    .await?;

    Ok(())
}

/// Existing membership of a device in a group (idempotent re-join check)
pub async fn find_member_by_device<'e, E>(
    executor: E,
    group_id: Uuid,
    device_id: &str,
) -> Result<Option<MemberRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, display_name, role
        FROM members
        WHERE group_id = $1 AND device_id = $2
        "#,
    )
    .bind(group_id)
    .bind(device_id)
    .fetch_optional(executor)
    .await
}

/// Member row matching the full auth triple (member, group, device)
pub async fn get_member<'e, E>(
    executor: E,
    member_id: Uuid,
    group_id: Uuid,
    device_id: &str,
) -> Result<Option<MemberRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, display_name, role
        FROM members
        WHERE id = $1 AND group_id = $2 AND device_id = $3
        "#,
    )
    .bind(member_id)
    .bind(group_id)
    .bind(device_id)
    .fetch_optional(executor)
    .await
}

/// Member row by id and device alone, for endpoints with no group in the path
pub async fn get_member_any_group<'e, E>(
    executor: E,
    member_id: Uuid,
    device_id: &str,
) -> Result<Option<MemberRow>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, group_id, display_name, role
        FROM members
        WHERE id = $1 AND device_id = $2
        "#,
    )
    .bind(member_id)
    .bind(device_id)
    .fetch_optional(executor)
    .await
}

pub async fn list_member_ids<'e, E>(executor: E, group_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar(
        r#"
        SELECT id
        FROM members
        WHERE group_id = $1
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
}
