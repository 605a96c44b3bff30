//! Full processing of one session: customer resolution, normalization,
//! dispatch, aggregation and status persistence.
//!
//! `process_job` never returns an error; whatever goes wrong folds into a
//! FAILED result so one misbehaving session can never abort the run.

use {
    std::sync::Arc,
    tracing::{error, info, warn},
};

use {
    crate::{
        Result,
        traits::{CustomerResolver, EmployeeDirectory, Job, SessionStatusUpdate, StatusSink},
    },
    envio_common::now_ms,
    envio_crm::CrmClient,
    envio_dispatch::{
        ConversationDispatcher, SendStatus, SessionContext, SessionResult, aggregate_session,
        reason,
    },
};

/// Shared collaborators for session processing; cheap to clone into worker
/// tasks.
#[derive(Clone)]
pub struct Pipeline {
    pub crm: Arc<CrmClient>,
    pub directory: Arc<dyn EmployeeDirectory>,
    pub customers: Arc<dyn CustomerResolver>,
    pub status: Arc<dyn StatusSink>,
}

impl Pipeline {
    /// Run one job to its terminal result, persisting the status on every
    /// path. Infallible at this boundary.
    pub async fn process_job(&self, job: &Job) -> SessionResult {
        match self.try_process(job).await {
            Ok(result) => result,
            Err(err) => {
                error!(
                    session_id = %job.session_id,
                    error = %err,
                    "session processing failed"
                );
                let result = SessionResult::terminal(
                    &job.session_id,
                    job.lote_id.clone(),
                    SendStatus::Failed,
                    format!("{}: {err}", reason::EXCEPTION),
                );
                match self.write_status(&result).await {
                    Ok(()) => result,
                    Err(write_err) => {
                        error!(
                            session_id = %job.session_id,
                            error = %write_err,
                            "status write failed after session error"
                        );
                        SessionResult::terminal(
                            &job.session_id,
                            job.lote_id.clone(),
                            SendStatus::Failed,
                            format!("{}: {err}", reason::EXCEPTION_NO_UPDATE),
                        )
                    },
                }
            },
        }
    }

    async fn try_process(&self, job: &Job) -> Result<SessionResult> {
        let session_id = job.session_id.as_str();
        info!(session_id = %session_id, lote_id = job.lote_id.as_deref().unwrap_or(""), "processing session");

        let Some(customer_id) = self.customers.ensure_customer(job).await? else {
            warn!(session_id = %session_id, "{}", reason::CUSTOMER_RESOLUTION_FAILED);
            let result = SessionResult::terminal(
                session_id,
                job.lote_id.clone(),
                SendStatus::Failed,
                reason::CUSTOMER_RESOLUTION_FAILED,
            );
            self.write_status(&result).await?;
            return Ok(result);
        };

        let normalized = envio_normalizer::normalize(&job.raw_messages);
        if normalized.is_empty() {
            info!(session_id = %session_id, "SKIPPED: {}", reason::NO_VALID_MESSAGES);
            let result = SessionResult::terminal(
                session_id,
                job.lote_id.clone(),
                SendStatus::Skipped,
                reason::NO_VALID_MESSAGES,
            );
            self.write_status(&result).await?;
            return Ok(result);
        }

        let ctx = SessionContext {
            session_id: job.session_id.clone(),
            lote_id: job.lote_id.clone(),
            fallback_agent_id: job.fallback_agent_id.clone(),
        };
        let dispatcher = ConversationDispatcher::new(&self.crm, self.directory.as_ref());
        let outcomes = dispatcher
            .dispatch_session(&ctx, &customer_id, &normalized)
            .await?;

        let result = aggregate_session(session_id, job.lote_id.as_deref(), outcomes);
        self.write_status(&result).await?;
        info!(session_id = %session_id, status = %result.status, "session done");
        Ok(result)
    }

    async fn write_status(&self, result: &SessionResult) -> Result<()> {
        self.status
            .update_session(&SessionStatusUpdate {
                lote_id: result.lote_id.clone(),
                session_id: result.session_id.clone(),
                status: result.status,
                http_code_conv: result.http_code_conv,
                http_code_msgs: result.http_code_msgs,
                error_message: result.reason.clone(),
                sent_ts_ms: now_ms(),
            })
            .await
    }
}
