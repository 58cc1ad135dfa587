//! Push subscription domain - DB queries

use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscriptionData {
    pub endpoint: String,
    pub keys: PushSubscriptionKeys,
}

#[derive(sqlx::FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

/// Subscriptions are unique per endpoint; a re-subscribe moves the endpoint
/// to its latest member and keys.
pub async fn upsert_subscription<'e, E>(
    executor: E,
    id: Uuid,
    member_id: Uuid,
    payload: &PushSubscriptionData,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO push_subscriptions (id, member_id, endpoint, p256dh, auth, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (endpoint) DO UPDATE SET
            member_id = EXCLUDED.member_id,
            p256dh = EXCLUDED.p256dh,
            auth = EXCLUDED.auth,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(id)
    .bind(member_id)
    .bind(&payload.endpoint)
    .bind(&payload.keys.p256dh)
    .bind(&payload.keys.auth)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_subscriptions_for_members<'e, E>(
    executor: E,
    member_ids: &[Uuid],
) -> Result<Vec<PushSubscriptionData>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        r#"
        SELECT endpoint, p256dh, auth
        FROM push_subscriptions
        WHERE member_id = ANY($1)
        "#,
    )
    .bind(member_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PushSubscriptionData {
            endpoint: row.endpoint,
            keys: PushSubscriptionKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
        })
        .collect())
}

pub async fn delete_subscriptions_by_endpoints<'e, E>(
    executor: E,
    endpoints: &[String],
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ANY($1)")
        .bind(endpoints)
        .execute(executor)
        .await?;

    Ok(())
}
