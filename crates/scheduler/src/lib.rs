//! Batch orchestration: pulls pending jobs, runs the per-session pipeline
//! under bounded parallelism, applies chunk-level backpressure, and rolls
//! up the batch summary.

pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod traits;

pub use {
    error::{Context, Error, Result},
    pipeline::Pipeline,
    scheduler::Scheduler,
    traits::{
        BatchSummary, CustomerIdentity, CustomerResolver, EmployeeDirectory, Job, JobSource,
        SessionStatusUpdate, StatusSink,
    },
};
