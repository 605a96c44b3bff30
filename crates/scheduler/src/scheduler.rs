//! Chunked, bounded-parallelism batch run over pending jobs.

use {
    std::{collections::HashMap, sync::Arc, time::Duration},
    tokio::{sync::Semaphore, task::JoinSet},
    tracing::{error, info, warn},
};

use {
    crate::{
        Result,
        pipeline::Pipeline,
        traits::{BatchSummary, Job, JobSource},
    },
    envio_common::now_ms,
    envio_config::SchedulerConfig,
    envio_dispatch::{SendStatus, SessionResult, is_timeout_reason, reason},
};

/// Fraction of a chunk's results that are timeout-flavored failures.
fn timeout_ratio(results: &[SessionResult], chunk_len: usize) -> f64 {
    if chunk_len == 0 {
        return 0.0;
    }
    let timeouts = results
        .iter()
        .filter(|r| {
            r.status == SendStatus::Failed
                && r.reason.as_deref().is_some_and(is_timeout_reason)
        })
        .count();
    timeouts as f64 / chunk_len as f64
}

/// Runs the whole batch: fetch, chunk, parallel per-session processing,
/// backpressure between chunks, final summary.
pub struct Scheduler {
    pipeline: Pipeline,
    jobs: Arc<dyn JobSource>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, jobs: Arc<dyn JobSource>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            jobs,
            config,
        }
    }

    /// Process every pending job. Returns `None` when there is nothing to
    /// do; otherwise the persisted batch summary.
    pub async fn run(
        &self,
        lote_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Option<BatchSummary>> {
        let jobs = self.jobs.fetch_pending(lote_id, limit).await?;
        if jobs.is_empty() {
            info!(lote_id = lote_id.unwrap_or(""), "no pending sessions");
            return Ok(None);
        }

        let total = jobs.len();
        let lote_num = jobs[0].lote_num;
        let chunk_size = self.config.chunk_size.max(1);
        info!(
            total,
            chunk_size,
            max_workers = self.config.max_workers,
            "starting batch run"
        );

        let mut all_results: Vec<SessionResult> = Vec::with_capacity(total);
        let mut chunks: Vec<Vec<Job>> = Vec::new();
        let mut current = Vec::with_capacity(chunk_size);
        for job in jobs {
            current.push(job);
            if current.len() == chunk_size {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk_len = chunk.len();
            info!(chunk = index, size = chunk_len, "processing chunk");
            let results = self.run_chunk(chunk).await;

            let ratio = timeout_ratio(&results, chunk_len);
            all_results.extend(results);

            if ratio >= self.config.timeout_error_threshold {
                warn!(
                    chunk = index,
                    ratio,
                    cooldown_secs = self.config.cooldown_secs,
                    "timeout ratio at threshold, cooling down"
                );
                tokio::time::sleep(Duration::from_secs(self.config.cooldown_secs)).await;
            }
        }

        let summary = BatchSummary {
            lote_id: lote_id.map(str::to_string),
            lote_num,
            sent_ts_ms: now_ms(),
            total: all_results.len(),
            sent: count(&all_results, SendStatus::Sent),
            failed: count(&all_results, SendStatus::Failed),
            partial: count(&all_results, SendStatus::Partial),
            skipped: count(&all_results, SendStatus::Skipped),
            per_session: all_results,
        };
        self.pipeline.status.insert_batch_summary(&summary).await?;
        info!(
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            partial = summary.partial,
            skipped = summary.skipped,
            "batch run finished"
        );
        Ok(Some(summary))
    }

    /// One chunk: a bounded worker pool, results collected in completion
    /// order. A panicked worker folds to a FAILED result for its session.
    async fn run_chunk(&self, chunk: Vec<Job>) -> Vec<SessionResult> {
        let workers = self.config.max_workers.min(chunk.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut set: JoinSet<SessionResult> = JoinSet::new();
        let mut identities: HashMap<tokio::task::Id, (String, Option<String>)> = HashMap::new();

        for job in chunk {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            let identity = (job.session_id.clone(), job.lote_id.clone());
            let handle = set.spawn(async move {
                // The semaphore is never closed while tasks run.
                let _permit = semaphore.acquire_owned().await;
                pipeline.process_job(&job).await
            });
            identities.insert(handle.id(), identity);
        }

        let mut results = Vec::with_capacity(identities.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(join_err) => {
                    let (session_id, lote_id) =
                        identities.get(&join_err.id()).cloned().unwrap_or_default();
                    error!(session_id = %session_id, error = %join_err, "worker task aborted");
                    results.push(SessionResult::terminal(
                        session_id,
                        lote_id,
                        SendStatus::Failed,
                        format!("{}: {join_err}", reason::EXCEPTION),
                    ));
                },
            }
        }
        results
    }
}

fn count(results: &[SessionResult], status: SendStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}
