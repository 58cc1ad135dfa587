//! Daily write-quota gate.
//!
//! A process-wide budget of mutating operations per JST day. All reads and
//! writes of the budget go through a single actor task per named gate
//! instance: commands are queued on an mpsc channel and processed one at a
//! time, storage round trip included, so concurrent request handlers can
//! never race on the counter. The record is persisted after every mutation
//! and reloaded on first access after a restart.
//!
//! Rollover is belt-and-suspenders: `consume` lazily starts a fresh window
//! whenever the caller's day key differs from the stored one, and a scheduled
//! job calls `force_reset` at midnight JST for the zero-traffic case (see
//! `quota_reset.rs`).

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use crate::constants::{DEFAULT_DAILY_WRITE_LIMIT, QUOTA_GATE_GLOBAL};
use crate::services::error::ApiError;
use crate::services::time;

const GATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaState {
    Open,
    Paused,
}

/// The single persisted record of one gate instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    pub day_key: String,
    pub count: i64,
    pub limit: i64,
    pub state: QuotaState,
    pub resume_at: String,
}

/// Caller-supplied window parameters, shared by consume and force-reset.
#[derive(Debug, Clone)]
pub struct ConsumeInput {
    pub day_key: String,
    pub limit: i64,
    pub resume_at: String,
}

impl ConsumeInput {
    /// Window parameters for the current instant and configured daily limit.
    pub fn current() -> ConsumeInput {
        let now = Utc::now();
        ConsumeInput {
            day_key: time::jst_day_key(now),
            limit: daily_write_limit(),
            resume_at: time::next_jst_midnight_iso(now),
        }
    }

    fn is_valid(&self) -> bool {
        !self.day_key.is_empty() && !self.resume_at.is_empty() && self.limit > 0
    }
}

#[derive(Debug)]
pub struct QuotaStoreError(pub String);

impl std::fmt::Display for QuotaStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub enum QuotaError {
    /// Consume called with an empty day key/resume-at or a non-positive limit
    InvalidConsume,
    /// Same validation failure on the force-reset path
    InvalidReset,
    /// Durable storage read or write failed
    Storage(String),
    /// The gate task is gone; treated like a storage failure by callers
    GateClosed,
}

impl QuotaError {
    pub fn code(&self) -> &'static str {
        match self {
            QuotaError::InvalidConsume => "INVALID_CONSUME_PAYLOAD",
            QuotaError::InvalidReset => "INVALID_RESET_PAYLOAD",
            QuotaError::Storage(_) => "QUOTA_STORAGE_ERROR",
            QuotaError::GateClosed => "QUOTA_GATE_CLOSED",
        }
    }
}

impl std::fmt::Display for QuotaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaError::InvalidConsume => write!(f, "invalid consume payload"),
            QuotaError::InvalidReset => write!(f, "invalid reset payload"),
            QuotaError::Storage(e) => write!(f, "quota storage failure: {}", e),
            QuotaError::GateClosed => write!(f, "quota gate is not running"),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(error: QuotaError) -> ApiError {
        match error {
            QuotaError::InvalidConsume | QuotaError::InvalidReset => {
                ApiError::bad_request(error.code())
            }
            // Fail closed: an unreachable gate rejects the write.
            other => {
                eprintln!("[quota] Gate failure: {}", other);
                ApiError::internal()
            }
        }
    }
}

/// Durable key-value seam backing one gate instance, keyed by its name.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<QuotaRecord>, QuotaStoreError>;
    async fn save(&self, name: &str, record: &QuotaRecord) -> Result<(), QuotaStoreError>;
}

/// Stores each gate record as a JSONB row in the `quota_gate` table.
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> PgQuotaStore {
        PgQuotaStore { pool }
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn load(&self, name: &str) -> Result<Option<QuotaRecord>, QuotaStoreError> {
        let row: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT record FROM quota_gate WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| QuotaStoreError(e.to_string()))?;

        match row {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| QuotaStoreError(format!("corrupt quota record: {}", e))),
            None => Ok(None),
        }
    }

    async fn save(&self, name: &str, record: &QuotaRecord) -> Result<(), QuotaStoreError> {
        let value = serde_json::to_value(record)
            .map_err(|e| QuotaStoreError(format!("unencodable quota record: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO quota_gate (name, record, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET
                record = EXCLUDED.record,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| QuotaStoreError(e.to_string()))?;

        Ok(())
    }
}

enum GateCommand {
    Consume(
        ConsumeInput,
        oneshot::Sender<Result<QuotaRecord, QuotaError>>,
    ),
    ForceReset(
        ConsumeInput,
        oneshot::Sender<Result<QuotaRecord, QuotaError>>,
    ),
    Status(oneshot::Sender<Result<Option<QuotaRecord>, QuotaError>>),
}

/// Handle to one serialized gate instance. Cheap to clone; all clones feed
/// the same actor task.
#[derive(Clone)]
pub struct QuotaGate {
    tx: mpsc::Sender<GateCommand>,
}

impl QuotaGate {
    /// Start the actor task for `name` on top of `store`.
    pub fn spawn<S>(name: impl Into<String>, store: S) -> QuotaGate
    where
        S: QuotaStore + 'static,
    {
        let (tx, rx) = mpsc::channel(GATE_CHANNEL_CAPACITY);
        tokio::spawn(run_gate(name.into(), store, rx));
        QuotaGate { tx }
    }

    /// Take one unit of today's budget, or learn that the gate is paused.
    pub async fn consume(&self, input: ConsumeInput) -> Result<QuotaRecord, QuotaError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(GateCommand::Consume(input, reply))
            .await
            .map_err(|_| QuotaError::GateClosed)?;
        response.await.map_err(|_| QuotaError::GateClosed)?
    }

    /// Unconditionally start a fresh open window. Idempotent.
    pub async fn force_reset(&self, input: ConsumeInput) -> Result<QuotaRecord, QuotaError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(GateCommand::ForceReset(input, reply))
            .await
            .map_err(|_| QuotaError::GateClosed)?;
        response.await.map_err(|_| QuotaError::GateClosed)?
    }

    /// Read the current record without consuming budget. `None` until the
    /// first consume or reset ever runs.
    pub async fn status(&self) -> Result<Option<QuotaRecord>, QuotaError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(GateCommand::Status(reply))
            .await
            .map_err(|_| QuotaError::GateClosed)?;
        response.await.map_err(|_| QuotaError::GateClosed)?
    }
}

struct GateActor<S> {
    name: String,
    store: S,
    record: Option<QuotaRecord>,
    loaded: bool,
}

async fn run_gate<S: QuotaStore>(name: String, store: S, mut rx: mpsc::Receiver<GateCommand>) {
    let mut actor = GateActor {
        name,
        store,
        record: None,
        loaded: false,
    };

    // One command at a time: the next command is not taken until the current
    // one's storage write has completed.
    while let Some(command) = rx.recv().await {
        match command {
            GateCommand::Consume(input, reply) => {
                let _ = reply.send(actor.consume(input).await);
            }
            GateCommand::ForceReset(input, reply) => {
                let _ = reply.send(actor.force_reset(input).await);
            }
            GateCommand::Status(reply) => {
                let _ = reply.send(actor.status().await);
            }
        }
    }
}

impl<S: QuotaStore> GateActor<S> {
    async fn load_once(&mut self) -> Result<(), QuotaError> {
        if !self.loaded {
            self.record = self
                .store
                .load(&self.name)
                .await
                .map_err(|e| QuotaError::Storage(e.to_string()))?;
            self.loaded = true;
        }
        Ok(())
    }

    async fn persist(&mut self, record: QuotaRecord) -> Result<QuotaRecord, QuotaError> {
        self.store
            .save(&self.name, &record)
            .await
            .map_err(|e| QuotaError::Storage(e.to_string()))?;
        self.record = Some(record.clone());
        self.loaded = true;
        Ok(record)
    }

    /// Fresh window on a day-key mismatch; otherwise keep count/state and
    /// adopt the latest limit and resume-at.
    fn ensure_window(&self, input: &ConsumeInput) -> QuotaRecord {
        match &self.record {
            Some(record) if record.day_key == input.day_key => {
                let mut record = record.clone();
                record.limit = input.limit;
                record.resume_at = input.resume_at.clone();
                record
            }
            _ => QuotaRecord {
                day_key: input.day_key.clone(),
                count: 0,
                limit: input.limit,
                state: QuotaState::Open,
                resume_at: input.resume_at.clone(),
            },
        }
    }

    async fn consume(&mut self, input: ConsumeInput) -> Result<QuotaRecord, QuotaError> {
        if !input.is_valid() {
            return Err(QuotaError::InvalidConsume);
        }
        self.load_once().await?;

        let mut record = self.ensure_window(&input);

        if record.state == QuotaState::Paused {
            // Persist anyway so limit/resumeAt stay current while paused.
            return self.persist(record).await;
        }

        if record.count + 1 > record.limit {
            record.state = QuotaState::Paused;
            return self.persist(record).await;
        }

        record.count += 1;
        self.persist(record).await
    }

    async fn force_reset(&mut self, input: ConsumeInput) -> Result<QuotaRecord, QuotaError> {
        if !input.is_valid() {
            return Err(QuotaError::InvalidReset);
        }
        self.persist(QuotaRecord {
            day_key: input.day_key,
            count: 0,
            limit: input.limit,
            state: QuotaState::Open,
            resume_at: input.resume_at,
        })
        .await
    }

    async fn status(&mut self) -> Result<Option<QuotaRecord>, QuotaError> {
        self.load_once().await?;
        Ok(self.record.clone())
    }
}

/// Registry of named gate instances. Gates are spawned on first lookup and
/// shared by every caller of the same name; the "global" instance serializes
/// all daily-write accounting for the deployment.
#[derive(Clone)]
pub struct QuotaGates {
    pool: PgPool,
    gates: Arc<Mutex<HashMap<String, QuotaGate>>>,
}

impl QuotaGates {
    pub fn new(pool: PgPool) -> QuotaGates {
        QuotaGates {
            pool,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn gate(&self, name: &str) -> QuotaGate {
        let mut gates = self.gates.lock().unwrap();
        gates
            .entry(name.to_string())
            .or_insert_with(|| QuotaGate::spawn(name, PgQuotaStore::new(self.pool.clone())))
            .clone()
    }
}

/// Daily write budget, overridable via DAILY_WRITE_LIMIT.
pub fn daily_write_limit() -> i64 {
    env::var("DAILY_WRITE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_DAILY_WRITE_LIMIT)
}

/// Gate check shared by every mutating endpoint. Fail-closed: a gate or
/// storage failure rejects the write with an internal error rather than
/// letting it through uncounted.
pub async fn check_daily_write_quota(quota: &QuotaGates) -> Result<(), ApiError> {
    let record = quota
        .gate(QUOTA_GATE_GLOBAL)
        .consume(ConsumeInput::current())
        .await?;

    if record.state == QuotaState::Paused {
        return Err(ApiError::service_paused(record.resume_at));
    }
    Ok(())
}

/// Current record for status displays; falls back to an open sentinel window
/// when the gate has never been written.
pub async fn current_status(quota: &QuotaGates) -> Result<QuotaRecord, QuotaError> {
    let stored = quota.gate(QUOTA_GATE_GLOBAL).status().await?;
    Ok(stored.unwrap_or_else(|| {
        let now = Utc::now();
        QuotaRecord {
            day_key: time::jst_day_key(now),
            count: 0,
            limit: daily_write_limit(),
            state: QuotaState::Open,
            resume_at: time::next_jst_midnight_iso(now),
        }
    }))
}

/// Scheduled daily reset, independent of the lazy rollover inside consume.
pub async fn reset_daily_quota(quota: &QuotaGates) -> Result<QuotaRecord, QuotaError> {
    quota
        .gate(QUOTA_GATE_GLOBAL)
        .force_reset(ConsumeInput::current())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinSet;

    #[derive(Clone, Default)]
    struct MemoryStore {
        records: Arc<Mutex<HashMap<String, QuotaRecord>>>,
    }

    #[async_trait]
    impl QuotaStore for MemoryStore {
        async fn load(&self, name: &str) -> Result<Option<QuotaRecord>, QuotaStoreError> {
            Ok(self.records.lock().unwrap().get(name).cloned())
        }

        async fn save(&self, name: &str, record: &QuotaRecord) -> Result<(), QuotaStoreError> {
            self.records
                .lock()
                .unwrap()
                .insert(name.to_string(), record.clone());
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl QuotaStore for FailingStore {
        async fn load(&self, _name: &str) -> Result<Option<QuotaRecord>, QuotaStoreError> {
            Err(QuotaStoreError("disk on fire".to_string()))
        }

        async fn save(&self, _name: &str, _record: &QuotaRecord) -> Result<(), QuotaStoreError> {
            Err(QuotaStoreError("disk on fire".to_string()))
        }
    }

    fn input(day_key: &str, limit: i64) -> ConsumeInput {
        ConsumeInput {
            day_key: day_key.to_string(),
            limit,
            resume_at: "2024-01-01T15:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn consume_counts_up_then_pauses() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());

        let expectations = [
            (1, QuotaState::Open),
            (2, QuotaState::Open),
            (3, QuotaState::Open),
            (3, QuotaState::Paused),
        ];
        for (count, state) in expectations {
            let record = gate.consume(input("2024-01-01", 3)).await.expect("consume");
            assert_eq!(record.count, count);
            assert_eq!(record.state, state);
        }
    }

    #[tokio::test]
    async fn paused_gate_stays_paused_without_incrementing() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        for _ in 0..5 {
            gate.consume(input("2024-01-01", 3)).await.expect("consume");
        }

        let record = gate.consume(input("2024-01-01", 3)).await.expect("consume");
        assert_eq!(record.count, 3);
        assert_eq!(record.state, QuotaState::Paused);
    }

    #[tokio::test]
    async fn day_key_mismatch_starts_a_fresh_window() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        for _ in 0..4 {
            gate.consume(input("2024-01-01", 3)).await.expect("consume");
        }

        let record = gate.consume(input("2024-01-02", 3)).await.expect("consume");
        assert_eq!(record.count, 1);
        assert_eq!(record.state, QuotaState::Open);
        assert_eq!(record.day_key, "2024-01-02");
    }

    #[tokio::test]
    async fn mid_day_limit_change_keeps_the_count() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        gate.consume(input("2024-01-01", 3)).await.expect("consume");
        gate.consume(input("2024-01-01", 3)).await.expect("consume");

        let record = gate.consume(input("2024-01-01", 10)).await.expect("consume");
        assert_eq!(record.count, 3);
        assert_eq!(record.limit, 10);
        assert_eq!(record.state, QuotaState::Open);
    }

    #[tokio::test]
    async fn paused_gate_still_adopts_new_limit_and_resume_at() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        for _ in 0..4 {
            gate.consume(input("2024-01-01", 3)).await.expect("consume");
        }

        let mut refreshed = input("2024-01-01", 5);
        refreshed.resume_at = "2024-01-02T15:00:00.000Z".to_string();
        let record = gate.consume(refreshed).await.expect("consume");

        // No paused -> open transition within the same day key.
        assert_eq!(record.state, QuotaState::Paused);
        assert_eq!(record.count, 3);
        assert_eq!(record.limit, 5);
        assert_eq!(record.resume_at, "2024-01-02T15:00:00.000Z");
    }

    #[tokio::test]
    async fn status_is_read_only() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        assert_eq!(gate.status().await.expect("status"), None);

        let mut last = None;
        for _ in 0..4 {
            last = Some(gate.consume(input("2024-01-01", 3)).await.expect("consume"));
        }
        let last = last.expect("at least one consume");

        // Status reflects exactly the last consume response, however often
        // it is asked.
        for _ in 0..3 {
            let record = gate.status().await.expect("status").expect("record");
            assert_eq!(record, last);
            assert_eq!(record.count, 3);
            assert_eq!(record.state, QuotaState::Paused);
        }

        // Status calls did not alter the outcome of the next consume.
        let record = gate.consume(input("2024-01-01", 3)).await.expect("consume");
        assert_eq!(record.count, 3);
        assert_eq!(record.state, QuotaState::Paused);
    }

    #[tokio::test]
    async fn force_reset_is_unconditional_and_idempotent() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        for _ in 0..4 {
            gate.consume(input("2024-01-01", 3)).await.expect("consume");
        }

        let first = gate.force_reset(input("2024-01-02", 3)).await.expect("reset");
        let second = gate.force_reset(input("2024-01-02", 3)).await.expect("reset");
        assert_eq!(first, second);
        assert_eq!(first.count, 0);
        assert_eq!(first.state, QuotaState::Open);

        let record = gate.consume(input("2024-01-02", 3)).await.expect("consume");
        assert_eq!(record.count, 1);
        assert_eq!(record.state, QuotaState::Open);
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected_without_touching_state() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());

        let zero_limit = gate.consume(input("2024-01-01", 0)).await;
        assert!(matches!(zero_limit, Err(QuotaError::InvalidConsume)));

        let empty_day = gate.consume(input("", 3)).await;
        assert!(matches!(empty_day, Err(QuotaError::InvalidConsume)));

        let bad_reset = gate.force_reset(input("2024-01-01", -1)).await;
        assert!(matches!(bad_reset, Err(QuotaError::InvalidReset)));

        assert_eq!(gate.status().await.expect("status"), None);
    }

    #[tokio::test]
    async fn concurrent_consumers_never_overshoot_the_limit() {
        let gate = QuotaGate::spawn("global", MemoryStore::default());
        let mut tasks = JoinSet::new();
        for _ in 0..50 {
            let gate = gate.clone();
            tasks.spawn(async move { gate.consume(input("2024-01-01", 10)).await });
        }

        let mut admitted = 0;
        while let Some(result) = tasks.join_next().await {
            let record = result.expect("task").expect("consume");
            if record.state == QuotaState::Open {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);

        let record = gate.status().await.expect("status").expect("record");
        assert_eq!(record.count, 10);
        assert_eq!(record.state, QuotaState::Paused);
    }

    #[tokio::test]
    async fn record_survives_an_actor_restart() {
        let store = MemoryStore::default();
        let gate = QuotaGate::spawn("global", store.clone());
        gate.consume(input("2024-01-01", 3)).await.expect("consume");
        gate.consume(input("2024-01-01", 3)).await.expect("consume");

        let restarted = QuotaGate::spawn("global", store);
        let record = restarted.status().await.expect("status").expect("record");
        assert_eq!(record.count, 2);
        assert_eq!(record.state, QuotaState::Open);

        let record = restarted
            .consume(input("2024-01-01", 3))
            .await
            .expect("consume");
        assert_eq!(record.count, 3);
    }

    #[tokio::test]
    async fn storage_failures_surface_instead_of_admitting_writes() {
        let gate = QuotaGate::spawn("global", FailingStore);
        let result = gate.consume(input("2024-01-01", 3)).await;
        assert!(matches!(result, Err(QuotaError::Storage(_))));
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let record = QuotaRecord {
            day_key: "2024-01-01".to_string(),
            count: 2,
            limit: 300,
            state: QuotaState::Open,
            resume_at: "2024-01-01T15:00:00.000Z".to_string(),
        };
        let json = serde_json::to_string(&record).expect("serialize record");
        assert!(json.contains("\"dayKey\":\"2024-01-01\""));
        assert!(json.contains("\"state\":\"open\""));
        assert!(json.contains("\"resumeAt\":\"2024-01-01T15:00:00.000Z\""));

        let parsed: QuotaRecord = serde_json::from_str(&json).expect("parse record");
        assert_eq!(parsed, record);
    }
}
