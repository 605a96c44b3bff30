//! Session dispatch: participant resolution, conversation creation and
//! message transmission against the remote CRM, and reduction of segment
//! outcomes into one session result.

pub mod aggregate;
pub mod dispatcher;
pub mod error;
pub mod outcome;
pub mod participants;

pub use {
    aggregate::aggregate_session,
    dispatcher::{ConversationDispatcher, SessionContext},
    error::{Error, Result},
    outcome::{
        SegmentDetail, SegmentOutcome, SendStatus, SessionResult, is_timeout_reason, reason,
    },
    participants::{EmployeeDirectory, Participant},
};
