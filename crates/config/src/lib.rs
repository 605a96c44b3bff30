//! Environment-driven configuration for the envio dispatch pipeline.
//!
//! Every knob has an explicit default and can be overridden through an
//! environment variable of the same name. Configuration is loaded once at
//! startup and passed down by value; nothing here re-reads the environment
//! after that.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("missing required environment variable: {key}")]
    Missing { key: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Remote CRM endpoint and credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// Provider identifier sent on every conversation create. Required at the
    /// business level; checked per session so one unconfigured deploy fails
    /// sessions instead of panicking at startup.
    pub provider_id: Option<String>,
    pub base_url: String,
    /// Static API key override. When unset the key is fetched from the
    /// secret source under `secret_name`.
    pub api_key: Option<String>,
    pub secret_name: String,
    /// Employee id representing the bot, when one is provisioned.
    pub bot_employee_id: Option<String>,
    pub conv_create_timeout_secs: u64,
    pub messages_timeout_secs: u64,
    pub http_pool_max_idle: usize,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            provider_id: None,
            base_url: "https://api.crm.example".into(),
            api_key: None,
            secret_name: "crm_api_token".into(),
            bot_employee_id: None,
            conv_create_timeout_secs: 30,
            messages_timeout_secs: 60,
            http_pool_max_idle: 100,
        }
    }
}

/// Chunking, parallelism and backpressure settings for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    pub chunk_size: usize,
    /// Timeout-failure ratio at or above which a cooldown pause is inserted
    /// between chunks.
    pub timeout_error_threshold: f64,
    pub cooldown_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 32,
            chunk_size: 200,
            timeout_error_threshold: 0.2,
            cooldown_secs: 2,
        }
    }
}

/// Postgres connection settings for the collaborator store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
    pub schema: String,
}

impl CrmConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            provider_id: env_opt("CRM_PROVIDER_ID"),
            base_url: env_opt("CRM_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env_opt("CRM_API_KEY"),
            secret_name: env_opt("CRM_SECRET_NAME").unwrap_or(defaults.secret_name),
            bot_employee_id: env_opt("CRM_BOT_EMPLOYEE_ID"),
            conv_create_timeout_secs: env_parse(
                "CONV_CREATE_TIMEOUT",
                defaults.conv_create_timeout_secs,
            )?,
            messages_timeout_secs: env_parse("MESSAGES_TIMEOUT", defaults.messages_timeout_secs)?,
            http_pool_max_idle: env_parse("HTTP_POOL_MAX_IDLE", defaults.http_pool_max_idle)?,
        })
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_workers: env_parse("MAX_WORKERS", defaults.max_workers)?,
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size)?,
            timeout_error_threshold: env_parse(
                "TIMEOUT_ERROR_THRESHOLD",
                defaults.timeout_error_threshold,
            )?,
            cooldown_secs: env_parse("COOLDOWN_SECS", defaults.cooldown_secs)?,
        })
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env_opt("DATABASE_URL").ok_or(Error::Missing {
                key: "DATABASE_URL",
            })?,
            schema: env_opt("PG_SCHEMA").unwrap_or_else(|| "envio".into()),
        })
    }
}

fn env_opt(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T> {
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
