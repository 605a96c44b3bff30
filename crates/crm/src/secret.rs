use async_trait::async_trait;

/// Source of secret material looked up by name, typically a cloud secret
/// manager. The CRM client falls back to this when no inline API key is
/// configured.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn secret_text(
        &self,
        name: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fixed in-memory secrets, for tests and for deployments that inject the
/// key through the environment.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretSource {
    entries: Vec<(String, String)>,
}

impl StaticSecretSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }
}

/// Resolves secrets from environment variables: the secret name is
/// uppercased and non-alphanumerics become underscores, so `crm_api_token`
/// reads `CRM_API_TOKEN`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecretSource;

fn env_var_name(secret_name: &str) -> String {
    secret_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    async fn secret_text(
        &self,
        name: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let var = env_var_name(name);
        std::env::var(&var).map_err(|_| format!("environment variable {var} not set").into())
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn secret_text(
        &self,
        name: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| format!("secret {name} not found").into())
    }
}
