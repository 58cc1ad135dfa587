//! Daily quota reset job using apalis
//!
//! Runs once per day at midnight JST and force-resets the global quota gate.
//! The gate also rolls over lazily inside consume, so this job only matters
//! for windows with no write traffic around the boundary; firing it again is
//! harmless because force-reset is idempotent.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;

use crate::services::quota::{self, QuotaGates};

/// 00:00 JST expressed in UTC (the cron scheduler runs in UTC).
const QUOTA_RESET_SCHEDULE: &str = "0 0 15 * * *";

/// Job input - marker for the scheduled reset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResetJob {
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

impl From<chrono::DateTime<chrono::Utc>> for QuotaResetJob {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        QuotaResetJob { scheduled_at: dt }
    }
}

#[derive(Clone)]
pub struct QuotaResetContext {
    pub quota: QuotaGates,
}

/// Job handler - always returns Ok; a failed reset is retried by the next
/// day's lazy rollover and cron tick rather than apalis retries.
async fn process_quota_reset(
    _job: QuotaResetJob,
    ctx: Data<QuotaResetContext>,
) -> Result<(), Error> {
    match quota::reset_daily_quota(&ctx.quota).await {
        Ok(record) => {
            println!(
                "[quota] Daily reset complete: window {} open with limit {}",
                record.day_key, record.limit
            );
        }
        Err(e) => {
            eprintln!("[quota] Daily reset failed: {}", e);
        }
    }
    Ok(())
}

/// Start the quota reset worker
pub async fn run_quota_reset_worker(pool: PgPool, quota: QuotaGates) {
    let ctx = QuotaResetContext { quota };

    // Run apalis migrations
    PostgresStorage::setup(&pool)
        .await
        .expect("Failed to set up apalis storage");

    let storage: PostgresStorage<QuotaResetJob> = PostgresStorage::new(pool);
    let schedule = Schedule::from_str(QUOTA_RESET_SCHEDULE).expect("Invalid quota reset schedule");
    let cron = CronStream::new(schedule);
    let backend = cron.pipe_to_storage(storage);

    println!("[quota] Reset worker starting (daily at 00:00 JST)");

    let worker = WorkerBuilder::new("quota-reset-worker")
        .data(ctx)
        .backend(backend)
        .build_fn(process_quota_reset);

    Monitor::new()
        .register(worker)
        .run()
        .await
        .expect("Quota reset worker monitor failed");
}
