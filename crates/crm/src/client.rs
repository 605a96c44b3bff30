use {
    serde_json::Value,
    std::{sync::Arc, time::Duration},
    tokio::sync::OnceCell,
    tracing::debug,
};

use {
    crate::{
        Error, Result,
        retry::{RetryError, RetryPolicy, post_with_retry},
        secret::SecretSource,
        wire::{CreateConversationRequest, OutboundMessage},
    },
    envio_config::CrmConfig,
};

/// Terminal outcome of one CRM call, after retries are exhausted.
///
/// Transport-level failures other than timeouts surface as [`Error`];
/// everything the server actually answered comes back here so the caller
/// can map status codes to delivery outcomes.
#[derive(Debug)]
pub enum CallResult {
    Http {
        status: u16,
        body: Value,
        text: String,
    },
    TimedOut {
        detail: String,
    },
}

impl CallResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (200..300).contains(status))
    }
}

/// Client for the remote conversation-audit CRM.
///
/// Holds one connection pool for the whole batch. The API key is resolved
/// lazily on first use, either from inline configuration or from the
/// configured [`SecretSource`], and cached for the life of the client.
pub struct CrmClient {
    http: reqwest::Client,
    config: CrmConfig,
    secrets: Arc<dyn SecretSource>,
    api_key: OnceCell<String>,
    retry: RetryPolicy,
}

impl CrmClient {
    pub fn new(config: CrmConfig, secrets: Arc<dyn SecretSource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.http_pool_max_idle)
            .build()?;
        Ok(Self {
            http,
            config,
            secrets,
            api_key: OnceCell::new(),
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        self.config.provider_id.as_deref()
    }

    #[must_use]
    pub fn bot_employee_id(&self) -> Option<&str> {
        self.config.bot_employee_id.as_deref()
    }

    async fn api_key(&self) -> Result<&str> {
        self.api_key
            .get_or_try_init(|| async {
                if let Some(key) = &self.config.api_key
                    && !key.trim().is_empty()
                {
                    return Ok(key.trim().to_string());
                }
                let name = &self.config.secret_name;
                if name.is_empty() {
                    return Err(Error::MissingApiKey);
                }
                let key = self
                    .secrets
                    .secret_text(name)
                    .await
                    .map_err(|source| Error::Secret {
                        name: name.clone(),
                        source,
                    })?;
                let key = key.trim().to_string();
                if key.is_empty() {
                    return Err(Error::MissingApiKey);
                }
                debug!(secret = %name, "CRM API key resolved");
                Ok(key)
            })
            .await
            .map(String::as_str)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// `POST /v1/conversations`.
    pub async fn create_conversation(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CallResult> {
        let url = self.endpoint("v1/conversations");
        let timeout = Duration::from_secs(self.config.conv_create_timeout_secs);
        self.post(&url, request, timeout).await
    }

    /// `POST /v1/conversations/{id}/messages` with the whole batch in one call.
    pub async fn send_messages(
        &self,
        conversation_id: &str,
        batch: &[OutboundMessage],
    ) -> Result<CallResult> {
        let url = self.endpoint(&format!("v1/conversations/{conversation_id}/messages"));
        let timeout = Duration::from_secs(self.config.messages_timeout_secs);
        self.post(&url, batch, timeout).await
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<CallResult> {
        let api_key = self.api_key().await?;
        match post_with_retry(&self.http, url, api_key, body, timeout, self.retry).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                let body = serde_json::from_str(&text).unwrap_or(Value::Null);
                Ok(CallResult::Http { status, body, text })
            },
            Err(RetryError::Timeout { attempts, source }) => Ok(CallResult::TimedOut {
                detail: format!("{source} after {attempts} attempts"),
            }),
            Err(RetryError::Transport(err)) => Err(err.into()),
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{secret::StaticSecretSource, wire},
        serde_json::json,
    };

    fn config(base_url: &str) -> CrmConfig {
        CrmConfig {
            provider_id: Some("prov-1".into()),
            base_url: base_url.to_string(),
            api_key: Some("test-key".into()),
            ..CrmConfig::default()
        }
    }

    fn client(base_url: &str) -> CrmClient {
        CrmClient::new(config(base_url), Arc::new(StaticSecretSource::new()))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 2,
                backoff: Duration::from_millis(1),
            })
    }

    fn create_request() -> CreateConversationRequest {
        CreateConversationRequest {
            provider_id: "prov-1".into(),
            employee_id: "emp-1".into(),
            customer_id: "cust-1".into(),
            original_date_time: Some(1_764_809_454_884),
        }
    }

    #[tokio::test]
    async fn create_conversation_sends_key_header_and_parses_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/conversations")
            .match_header(crate::API_KEY_HEADER, "test-key")
            .with_status(201)
            .with_body(json!({"data": {"id": "conv-9"}}).to_string())
            .create_async()
            .await;

        let result = client(&server.url())
            .create_conversation(&create_request())
            .await
            .unwrap();

        mock.assert_async().await;
        let CallResult::Http { status, body, .. } = result else {
            panic!("expected HTTP result");
        };
        assert_eq!(status, 201);
        assert_eq!(wire::conversation_id_from_body(&body).as_deref(), Some("conv-9"));
    }

    #[tokio::test]
    async fn api_key_falls_back_to_secret_source_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/conversations")
            .match_header(crate::API_KEY_HEADER, "from-secret")
            .with_status(201)
            .with_body(json!({"id": 1}).to_string())
            .expect(2)
            .create_async()
            .await;

        let mut cfg = config(&server.url());
        cfg.api_key = None;
        cfg.secret_name = "crm_api_token".into();
        let secrets = StaticSecretSource::new().with("crm_api_token", "  from-secret\n");
        let crm = CrmClient::new(cfg, Arc::new(secrets)).unwrap();

        for _ in 0..2 {
            let result = crm.create_conversation(&create_request()).await.unwrap();
            assert!(result.is_success());
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/conversations")
            .with_status(400)
            .with_body(json!({"error": "bad request"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let result = client(&server.url())
            .create_conversation(&create_request())
            .await
            .unwrap();

        mock.assert_async().await;
        let CallResult::Http { status, .. } = result else {
            panic!("expected HTTP result");
        };
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success() {
        let mut server = mockito::Server::new_async().await;
        // Mocks match newest-first, so the 503 absorbs the first attempt and
        // the retry lands on the 200.
        let ok = server
            .mock("POST", "/v1/conversations/conv-9/messages")
            .with_status(200)
            .with_body(json!({"ok": true}).to_string())
            .create_async()
            .await;
        let unavailable = server
            .mock("POST", "/v1/conversations/conv-9/messages")
            .with_status(503)
            .expect_at_most(1)
            .create_async()
            .await;

        let batch = vec![OutboundMessage {
            content: "hola".into(),
            sender_role: wire::SenderRole::Customer,
            sender_id: "cust-1".into(),
            timestamp: 1000,
            original_date_time: 1000,
        }];
        let result = client(&server.url())
            .send_messages("conv-9", &batch)
            .await
            .unwrap();

        unavailable.assert_async().await;
        ok.assert_async().await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn persistent_server_error_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/conversations")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let result = client(&server.url())
            .create_conversation(&create_request())
            .await
            .unwrap();

        mock.assert_async().await;
        let CallResult::Http { status, .. } = result else {
            panic!("expected HTTP result");
        };
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn unreachable_host_reports_timeout_after_retries() {
        // Reserved TEST-NET address; connections fail or hang until the
        // request timeout fires.
        let mut cfg = config("http://192.0.2.1:9");
        cfg.conv_create_timeout_secs = 1;
        let crm = CrmClient::new(cfg, Arc::new(StaticSecretSource::new()))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_retries: 1,
                backoff: Duration::from_millis(1),
            });

        let result = crm.create_conversation(&create_request()).await.unwrap();
        let CallResult::TimedOut { detail } = result else {
            panic!("expected timeout result");
        };
        assert!(detail.contains("attempts"));
    }

    #[tokio::test]
    async fn missing_key_everywhere_is_an_error() {
        let mut cfg = config("http://localhost:1");
        cfg.api_key = None;
        cfg.secret_name = String::new();
        let crm = CrmClient::new(cfg, Arc::new(StaticSecretSource::new())).unwrap();
        let err = crm.create_conversation(&create_request()).await.unwrap_err();
        assert!(matches!(err, Error::MissingApiKey));
    }
}
