//! Delivery outcome vocabulary.
//!
//! Statuses and reason tokens are persisted and consumed by downstream
//! reporting, so their spellings are load-bearing. Do not rename.

use serde::{Deserialize, Serialize};

/// Terminal delivery status of a segment or a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Sent,
    Partial,
    Failed,
    Skipped,
}

impl SendStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason tokens written to the status table.
pub mod reason {
    pub const NO_SEGMENTS: &str = "NO_SEGMENTS";
    pub const NO_VALID_MESSAGES: &str = "NO_VALID_MESSAGES";
    pub const CUSTOMER_RESOLUTION_FAILED: &str = "CUSTOMER_RESOLUTION_FAILED";
    pub const NO_EMPLOYEES_IN_SESSION: &str = "NO_EMPLOYEES_IN_SESSION";
    pub const NO_RESOLVED_EMPLOYEE_IDS: &str = "NO_RESOLVED_EMPLOYEE_IDS";
    pub const CONV_CREATE_FAILED: &str = "CONV_CREATE_FAILED";
    pub const CONV_CREATE_NO_ID: &str = "CONV_CREATE_NO_ID";
    pub const MESSAGES_FAILED: &str = "MESSAGES_FAILED";
    pub const MISSING_PROVIDER_CONFIG: &str = "missing provider configuration";

    // Prefixes; the concrete error text is appended after ": ".
    pub const EXCEPTION_TIMEOUT_CONV: &str = "EXCEPTION_TIMEOUT_CONV";
    pub const EXCEPTION_TIMEOUT_MSGS: &str = "EXCEPTION_TIMEOUT_MSGS";
    pub const EXCEPTION: &str = "EXCEPTION";
    pub const EXCEPTION_NO_UPDATE: &str = "EXCEPTION_NO_UPDATE";
}

/// Whether a failure reason marks a connection/timeout failure, for chunk
/// backpressure accounting.
#[must_use]
pub fn is_timeout_reason(reason: &str) -> bool {
    reason.to_uppercase().contains("TIMEOUT")
}

/// What was actually delivered for one dispatched segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDetail {
    pub conversation_id: String,
    pub main_participant_key: String,
    pub main_employee_id: String,
    pub message_count: usize,
}

/// Outcome of one dispatch attempt. The current path produces exactly one
/// per session; the aggregator accepts any number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentOutcome {
    pub status: SendStatus,
    pub reason: Option<String>,
    pub http_code_conv: u16,
    pub http_code_msgs: u16,
    pub detail: Option<SegmentDetail>,
}

impl SegmentOutcome {
    #[must_use]
    pub fn sent(http_code_conv: u16, http_code_msgs: u16, detail: SegmentDetail) -> Self {
        Self {
            status: SendStatus::Sent,
            reason: None,
            http_code_conv,
            http_code_msgs,
            detail: Some(detail),
        }
    }

    #[must_use]
    pub fn failed(reason: impl Into<String>, http_code_conv: u16, http_code_msgs: u16) -> Self {
        Self {
            status: SendStatus::Failed,
            reason: Some(reason.into()),
            http_code_conv,
            http_code_msgs,
            detail: None,
        }
    }

    #[must_use]
    pub fn skipped(reason: impl Into<String>, http_code_conv: u16) -> Self {
        Self {
            status: SendStatus::Skipped,
            reason: Some(reason.into()),
            http_code_conv,
            http_code_msgs: 0,
            detail: None,
        }
    }
}

/// One terminal result per session per run, persisted keyed by
/// `(lote_id, session_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub lote_id: Option<String>,
    pub status: SendStatus,
    pub reason: Option<String>,
    pub http_code_conv: u16,
    pub http_code_msgs: u16,
    pub segments: Vec<SegmentDetail>,
}

impl SessionResult {
    /// A result produced before any segment was dispatched.
    #[must_use]
    pub fn terminal(
        session_id: impl Into<String>,
        lote_id: Option<String>,
        status: SendStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            lote_id,
            status,
            reason: Some(reason.into()),
            http_code_conv: 0,
            http_code_msgs: 0,
            segments: Vec::new(),
        }
    }
}
