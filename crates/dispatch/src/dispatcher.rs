//! Per-session conversation dispatch: precondition checks, remote
//! conversation creation, and batch message transmission.

use tracing::{error, info, warn};

use {
    crate::{
        Result,
        outcome::{SegmentDetail, SegmentOutcome, reason},
        participants::{self, EmployeeDirectory, Participant},
    },
    envio_crm::{CallResult, CreateConversationRequest, CrmClient, OutboundMessage, SenderRole},
    envio_normalizer::{ActorType, NormalizedMessage},
    std::collections::BTreeMap,
};

/// Session identity and the job-carried fallback agent reference.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub lote_id: Option<String>,
    pub fallback_agent_id: Option<String>,
}

/// Drives one session through conversation creation and message send,
/// producing one segment outcome per dispatch attempt.
pub struct ConversationDispatcher<'a> {
    crm: &'a CrmClient,
    directory: &'a dyn EmployeeDirectory,
}

fn body_sample(text: &str) -> String {
    text.chars().take(400).collect()
}

/// Build the outbound batch for the whole session, in normalized order.
/// Messages of unresolved participants are dropped with a log.
fn build_message_batch(
    messages: &[NormalizedMessage],
    customer_id: &str,
    participants: &BTreeMap<String, Participant>,
) -> Vec<OutboundMessage> {
    let mut batch = Vec::with_capacity(messages.len());

    for message in messages {
        let (sender_role, sender_id) = match message.actor_type {
            ActorType::Customer => (SenderRole::Customer, customer_id.to_string()),
            ActorType::Bot | ActorType::Agent => {
                let key = participants::participant_key(
                    message.actor_type,
                    message.actor_email.as_deref(),
                );
                let employee_id = key
                    .as_deref()
                    .and_then(|k| participants.get(k))
                    .and_then(|p| p.employee_id.clone());
                match employee_id {
                    Some(id) => (SenderRole::Employee, id),
                    None => {
                        warn!(
                            key = key.as_deref().unwrap_or(""),
                            raw = %message.raw,
                            "dropping message of unresolved participant"
                        );
                        continue;
                    },
                }
            },
        };

        batch.push(OutboundMessage {
            content: message.content.clone(),
            sender_role,
            sender_id,
            timestamp: message.ts_ms,
            original_date_time: message.ts_ms,
        });
    }

    batch
}

impl<'a> ConversationDispatcher<'a> {
    pub fn new(crm: &'a CrmClient, directory: &'a dyn EmployeeDirectory) -> Self {
        Self { crm, directory }
    }

    /// Dispatch a session as one remote conversation carrying its full
    /// message batch. Currently yields exactly one outcome; callers fold
    /// the vector through the aggregator.
    pub async fn dispatch_session(
        &self,
        ctx: &SessionContext,
        customer_id: &str,
        messages: &[NormalizedMessage],
    ) -> Result<Vec<SegmentOutcome>> {
        let session_id = ctx.session_id.as_str();

        let Some(provider_id) = self.crm.provider_id() else {
            error!(session_id = %session_id, "{}", reason::MISSING_PROVIDER_CONFIG);
            return Ok(vec![SegmentOutcome::failed(
                reason::MISSING_PROVIDER_CONFIG,
                0,
                0,
            )]);
        };
        let provider_id = provider_id.to_string();

        let participants = participants::build_participants(
            messages,
            self.directory,
            self.crm.bot_employee_id(),
            ctx.fallback_agent_id.as_deref(),
            session_id,
        )
        .await?;

        if participants.is_empty() {
            warn!(session_id = %session_id, "SKIPPED: {}", reason::NO_EMPLOYEES_IN_SESSION);
            return Ok(vec![SegmentOutcome::skipped(
                reason::NO_EMPLOYEES_IN_SESSION,
                0,
            )]);
        }

        let Some(main) = participants::main_participant(&participants) else {
            warn!(session_id = %session_id, "SKIPPED: {}", reason::NO_RESOLVED_EMPLOYEE_IDS);
            return Ok(vec![SegmentOutcome::skipped(
                reason::NO_RESOLVED_EMPLOYEE_IDS,
                0,
            )]);
        };
        let main_key = main.key.clone();
        // Resolved by construction of `main_participant`.
        let main_employee_id = main.employee_id.clone().unwrap_or_default();

        info!(
            session_id = %session_id,
            key = %main_key,
            employee_id = %main_employee_id,
            count = main.message_count,
            "main participant selected"
        );

        let request = CreateConversationRequest {
            provider_id,
            employee_id: main_employee_id.clone(),
            customer_id: customer_id.to_string(),
            original_date_time: messages.iter().map(|m| m.ts_ms).min(),
        };

        let created = match self.crm.create_conversation(&request).await? {
            CallResult::TimedOut { detail } => {
                error!(session_id = %session_id, detail = %detail, "conversation create timed out");
                return Ok(vec![SegmentOutcome::failed(
                    format!("{}: {detail}", reason::EXCEPTION_TIMEOUT_CONV),
                    0,
                    0,
                )]);
            },
            CallResult::Http { status, body, text } => {
                if !(status == 200 || status == 201) {
                    error!(
                        session_id = %session_id,
                        status,
                        body = %body_sample(&text),
                        "{}", reason::CONV_CREATE_FAILED
                    );
                    return Ok(vec![SegmentOutcome::failed(
                        reason::CONV_CREATE_FAILED,
                        status,
                        0,
                    )]);
                }
                match envio_crm::conversation_id_from_body(&body) {
                    Some(id) => (status, id),
                    None => {
                        error!(
                            session_id = %session_id,
                            body = %body_sample(&text),
                            "{}", reason::CONV_CREATE_NO_ID
                        );
                        return Ok(vec![SegmentOutcome::failed(
                            reason::CONV_CREATE_NO_ID,
                            status,
                            0,
                        )]);
                    },
                }
            },
        };
        let (conv_status, conversation_id) = created;

        let batch = build_message_batch(messages, customer_id, &participants);
        if batch.is_empty() {
            info!(
                session_id = %session_id,
                conversation_id = %conversation_id,
                "SKIPPED: {}", reason::NO_VALID_MESSAGES
            );
            return Ok(vec![SegmentOutcome::skipped(
                reason::NO_VALID_MESSAGES,
                conv_status,
            )]);
        }
        let message_count = batch.len();

        match self.crm.send_messages(&conversation_id, &batch).await? {
            CallResult::TimedOut { detail } => {
                error!(
                    session_id = %session_id,
                    conversation_id = %conversation_id,
                    detail = %detail,
                    "message send timed out"
                );
                Ok(vec![SegmentOutcome::failed(
                    format!("{}: {detail}", reason::EXCEPTION_TIMEOUT_MSGS),
                    conv_status,
                    0,
                )])
            },
            CallResult::Http { status, text, .. } => {
                if !(status == 200 || status == 201) {
                    error!(
                        session_id = %session_id,
                        status,
                        body = %body_sample(&text),
                        "{}", reason::MESSAGES_FAILED
                    );
                    return Ok(vec![SegmentOutcome::failed(
                        reason::MESSAGES_FAILED,
                        conv_status,
                        status,
                    )]);
                }
                info!(
                    session_id = %session_id,
                    conversation_id = %conversation_id,
                    messages = message_count,
                    "SENT"
                );
                Ok(vec![SegmentOutcome::sent(conv_status, status, SegmentDetail {
                    conversation_id,
                    main_participant_key: main_key,
                    main_employee_id,
                    message_count,
                })])
            },
        }
    }
}
