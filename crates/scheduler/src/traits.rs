//! Collaborator seams of the batch pipeline.
//!
//! The scheduler and pipeline only ever see these traits; the Postgres
//! implementations live in `envio-store`, and tests plug in in-memory fakes.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use {
    crate::Result,
    envio_dispatch::{SendStatus, SessionResult},
};

pub use envio_dispatch::EmployeeDirectory;

/// Customer identity fields carried on a job, used for remote customer
/// resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerIdentity {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub identification: Option<String>,
}

/// One pending session pulled from the upstream store. Immutable once
/// fetched; owned exclusively by the worker processing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub session_id: String,
    pub lote_id: Option<String>,
    pub lote_num: Option<i64>,
    pub customer: CustomerIdentity,
    pub agent_email: Option<String>,
    /// Job-carried fallback employee reference for unresolvable senders.
    pub fallback_agent_id: Option<String>,
    /// Remote customer id already resolved on a previous run, if any.
    pub customer_crm_id: Option<String>,
    /// Raw message blob in any of the accepted encodings.
    pub raw_messages: Value,
    pub first_msg_ts_ms: Option<i64>,
    pub last_msg_ts_ms: Option<i64>,
}

/// Per-session status upsert, keyed by `(lote_id, session_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusUpdate {
    pub lote_id: Option<String>,
    pub session_id: String,
    pub status: SendStatus,
    pub http_code_conv: u16,
    pub http_code_msgs: u16,
    pub error_message: Option<String>,
    pub sent_ts_ms: i64,
}

/// End-of-run rollup, persisted once per scheduler run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub lote_id: Option<String>,
    pub lote_num: Option<i64>,
    pub sent_ts_ms: i64,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub partial: usize,
    pub skipped: usize,
    pub per_session: Vec<SessionResult>,
}

/// Source of eligible jobs for a run.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Pending jobs, optionally filtered to one lote and capped, ordered by
    /// first message timestamp.
    async fn fetch_pending(&self, lote_id: Option<&str>, limit: Option<u32>) -> Result<Vec<Job>>;
}

/// Persistence of per-session and per-batch outcomes.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update_session(&self, update: &SessionStatusUpdate) -> Result<()>;
    async fn insert_batch_summary(&self, summary: &BatchSummary) -> Result<()>;
}

/// Resolution of a job's customer to a remote customer id.
#[async_trait]
pub trait CustomerResolver: Send + Sync {
    /// `None` means the customer could not be resolved; the session fails
    /// before any remote call.
    async fn ensure_customer(&self, job: &Job) -> Result<Option<String>>;
}
