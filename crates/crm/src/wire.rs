//! Request payload types for the remote CRM API (camelCase on the wire).

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Body of `POST /v1/conversations`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub provider_id: String,
    pub employee_id: String,
    pub customer_id: String,
    /// Timestamp of the earliest message in the session, epoch millis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_date_time: Option<i64>,
}

/// Which side of the conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Customer,
    Employee,
}

/// One message in the `POST /v1/conversations/{id}/messages` batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub content: String,
    pub sender_role: SenderRole,
    pub sender_id: String,
    pub timestamp: i64,
    pub original_date_time: i64,
}

/// Extract the conversation identifier from a create response body.
///
/// The API returns the id either nested under `data` or at the top level,
/// as a string or a number.
pub fn conversation_id_from_body(body: &Value) -> Option<String> {
    let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    match data.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
