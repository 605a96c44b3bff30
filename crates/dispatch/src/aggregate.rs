//! Reduction of per-segment outcomes into one session-level result.
//!
//! Pure over its inputs. Written for any number of segments even though the
//! current dispatch path yields at most one per session, so a future
//! multi-conversation mode needs no interface change.

use crate::outcome::{SegmentOutcome, SendStatus, SessionResult, reason};

/// Fold zero or more segment outcomes into the session result.
///
/// Status: any SENT and no FAILED is SENT; SENT and FAILED together is
/// PARTIAL; FAILED alone is FAILED; anything else is SKIPPED. HTTP codes
/// take the maximum observed per call type. Reasons come from FAILED
/// segments, deduplicated and joined; an all-skipped session keeps its skip
/// reason instead so the status table never loses the why.
#[must_use]
pub fn aggregate_session(
    session_id: &str,
    lote_id: Option<&str>,
    outcomes: Vec<SegmentOutcome>,
) -> SessionResult {
    if outcomes.is_empty() {
        return SessionResult::terminal(
            session_id,
            lote_id.map(str::to_string),
            SendStatus::Skipped,
            reason::NO_SEGMENTS,
        );
    }

    let has_sent = outcomes.iter().any(|o| o.status == SendStatus::Sent);
    let has_failed = outcomes.iter().any(|o| o.status == SendStatus::Failed);

    let status = match (has_sent, has_failed) {
        (true, false) => SendStatus::Sent,
        (true, true) => SendStatus::Partial,
        (false, true) => SendStatus::Failed,
        (false, false) => SendStatus::Skipped,
    };

    let http_code_conv = outcomes.iter().map(|o| o.http_code_conv).max().unwrap_or(0);
    let http_code_msgs = outcomes.iter().map(|o| o.http_code_msgs).max().unwrap_or(0);

    let mut failed_reasons: Vec<&str> = Vec::new();
    for outcome in &outcomes {
        if outcome.status == SendStatus::Failed
            && let Some(r) = outcome.reason.as_deref()
            && !r.is_empty()
            && !failed_reasons.contains(&r)
        {
            failed_reasons.push(r);
        }
    }

    let reason = if failed_reasons.is_empty() {
        if status == SendStatus::Skipped {
            outcomes.iter().find_map(|o| o.reason.clone())
        } else {
            None
        }
    } else {
        Some(failed_reasons.join("; "))
    };

    let segments = outcomes.into_iter().filter_map(|o| o.detail).collect();

    SessionResult {
        session_id: session_id.to_string(),
        lote_id: lote_id.map(str::to_string),
        status,
        reason,
        http_code_conv,
        http_code_msgs,
        segments,
    }
}
