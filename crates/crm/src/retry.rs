//! Bounded retry for outbound CRM calls.
//!
//! Only transient failures are retried: request timeouts, connection errors,
//! and 5xx responses. Everything else is returned to the caller on the first
//! attempt. Backoff is linear in the attempt number.

use {
    reqwest::{Client, Response, StatusCode},
    serde::Serialize,
    std::time::Duration,
    tracing::warn,
};

/// Header carrying the CRM API key on every request.
pub const API_KEY_HEADER: &str = "x-crm-audit-api-key";

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first, so `max_retries = 2` means at most
    /// three requests on the wire.
    pub max_retries: u32,
    /// Base delay; attempt `n` (zero-based) sleeps `backoff * (n + 1)`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
pub(crate) enum RetryError {
    /// All attempts timed out or failed to connect.
    Timeout { attempts: u32, source: reqwest::Error },
    /// Non-transient transport failure, not retried.
    Transport(reqwest::Error),
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn is_server_error(status: StatusCode) -> bool {
    status.is_server_error()
}

pub(crate) async fn post_with_retry<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &B,
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<Response, RetryError> {
    let mut attempt = 0;
    loop {
        let result = client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await;

        match result {
            Ok(response) if is_server_error(response.status()) && attempt < policy.max_retries => {
                warn!(
                    url,
                    status = response.status().as_u16(),
                    attempt,
                    "server error, retrying"
                );
            },
            Ok(response) => return Ok(response),
            Err(err) if is_transient(&err) && attempt < policy.max_retries => {
                warn!(url, error = %err, attempt, "transient failure, retrying");
            },
            Err(err) if is_transient(&err) => {
                return Err(RetryError::Timeout {
                    attempts: attempt + 1,
                    source: err,
                });
            },
            Err(err) => return Err(RetryError::Transport(err)),
        }

        tokio::time::sleep(policy.backoff * (attempt + 1)).await;
        attempt += 1;
    }
}
