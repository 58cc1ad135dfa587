//! Best-effort daily create/join limiter, keyed by caller IP.
//!
//! Unlike the quota gate this counter lives in the relational store and uses
//! a plain upsert-increment, so two concurrent first requests can both count
//! as one. That race is acceptable at this threshold; the quota gate is the
//! component with the exact-counting guarantee.

use axum::http::HeaderMap;
use chrono::Utc;
use sqlx::PgPool;
use std::env;

use crate::constants::DEFAULT_JOIN_CREATE_LIMIT_PER_ACTOR;
use crate::services::error::{ApiError, LogErr};
use crate::services::time;

/// First hop of the proxy-forwarded chain, or "unknown".
pub fn actor_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok());

    match forwarded {
        Some(value) => {
            let first = value.split(',').next().unwrap_or("").trim();
            if first.is_empty() {
                "unknown".to_string()
            } else {
                first.to_string()
            }
        }
        None => "unknown".to_string(),
    }
}

/// Daily create/join budget per IP, overridable via
/// DAILY_JOIN_CREATE_LIMIT_PER_ACTOR. Zero or negative disables the limiter.
fn daily_join_create_limit() -> i64 {
    env::var("DAILY_JOIN_CREATE_LIMIT_PER_ACTOR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_JOIN_CREATE_LIMIT_PER_ACTOR)
}

/// Count this create/join attempt against the caller's daily budget and
/// reject with 429 once it is exceeded.
pub async fn check_join_create_limit(db: &PgPool, headers: &HeaderMap) -> Result<(), ApiError> {
    let limit = daily_join_create_limit();
    if limit <= 0 {
        return Ok(());
    }

    let day_key = time::jst_day_key(Utc::now());
    let actor_key = format!("join-create:{}", actor_ip(headers));

    let (stored_day, count): (String, i64) = sqlx::query_as(
        r#"
        INSERT INTO daily_actor_limits (actor_key, day_key, count, updated_at)
        VALUES ($1, $2, 1, NOW())
        ON CONFLICT (actor_key) DO UPDATE SET
            count = CASE
                WHEN daily_actor_limits.day_key = EXCLUDED.day_key THEN daily_actor_limits.count + 1
                ELSE 1
            END,
            day_key = EXCLUDED.day_key,
            updated_at = EXCLUDED.updated_at
        RETURNING day_key, count
        "#,
    )
    .bind(&actor_key)
    .bind(&day_key)
    .fetch_one(db)
    .await
    .or_internal("Actor limit upsert failed")?;

    if stored_day == day_key && count > limit {
        return Err(ApiError::too_many_requests());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_chain_uses_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(actor_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn real_ip_is_the_fallback_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.23"));
        assert_eq!(actor_ip(&headers), "198.51.100.23");
    }

    #[test]
    fn missing_or_empty_headers_map_to_unknown() {
        assert_eq!(actor_ip(&HeaderMap::new()), "unknown");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        assert_eq!(actor_ip(&headers), "unknown");
    }
}
