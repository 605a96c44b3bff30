//! Postgres implementations of the pipeline's collaborator traits.
//!
//! Pending sessions, status upserts and batch summaries live in the
//! `envio_mensajes` / `envios_lote_resumen` tables; the agent directory in
//! `agentes`; customer lookups in `customers`. Table creation and schema
//! migration are owned elsewhere; this crate only reads and writes.

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    sqlx::{PgPool, Row, postgres::PgPoolOptions},
    tracing::{info, warn},
};

use {
    envio_config::StoreConfig,
    envio_scheduler::{
        BatchSummary, Context as _, CustomerIdentity, CustomerResolver, EmployeeDirectory, Job,
        JobSource, Result, SessionStatusUpdate, StatusSink,
    },
};

/// Identification used when a job carries no usable phone number.
const DEFAULT_IDENTIFICATION: &str = "00000000000";

/// Keep only the digits of a phone number.
fn normalize_phone(phone: Option<&str>) -> Option<String> {
    let digits: String = phone?.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

fn pending_jobs_sql(schema: &str, with_lote: bool, with_limit: bool) -> String {
    let mut sql = format!(
        "SELECT lote_id, lote_num, session_id, cedula, telefono, email_cliente, \
         nombre_cliente, nombre_completo, agent_email, agent_crm_id, customer_crm_id, \
         mensajes, first_msg_ts_ms, last_msg_ts_ms \
         FROM {schema}.envio_mensajes WHERE estado_envio = 'PENDING'"
    );
    let mut param = 0;
    if with_lote {
        param += 1;
        sql.push_str(&format!(" AND lote_id = ${param}"));
    }
    sql.push_str(" ORDER BY first_msg_ts_ms");
    if with_limit {
        param += 1;
        sql.push_str(&format!(" LIMIT ${param}"));
    }
    sql
}

/// Shared Postgres-backed store implementing every collaborator trait.
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    /// Connect with a small pool; workers share it for the whole run.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&config.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to Postgres: {e}"))?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    pub fn with_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{name}", self.schema)
    }

    async fn write_customer_id(
        &self,
        lote_id: Option<&str>,
        session_id: &str,
        customer_id: &str,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET customer_crm_id = $1, updated_at = NOW() \
             WHERE lote_id = $2 AND session_id = $3",
            self.table("envio_mensajes")
        );
        sqlx::query(&sql)
            .bind(customer_id)
            .bind(lote_id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("failed to write customer id onto session row")?;
        Ok(())
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Job {
    // `mensajes` may be stored as jsonb or as plain text holding any of the
    // accepted encodings; the normalizer deals with both.
    let raw_messages = row
        .try_get::<Value, _>("mensajes")
        .or_else(|_| row.try_get::<String, _>("mensajes").map(Value::String))
        .unwrap_or(Value::Null);

    Job {
        session_id: row.get("session_id"),
        lote_id: row.try_get("lote_id").ok(),
        lote_num: row.try_get("lote_num").ok(),
        customer: CustomerIdentity {
            phone: row.try_get("telefono").ok().flatten(),
            email: row.try_get("email_cliente").ok().flatten(),
            name: row.try_get("nombre_cliente").ok().flatten(),
            full_name: row.try_get("nombre_completo").ok().flatten(),
            identification: row.try_get("cedula").ok().flatten(),
        },
        agent_email: row.try_get("agent_email").ok().flatten(),
        fallback_agent_id: row.try_get("agent_crm_id").ok().flatten(),
        customer_crm_id: row.try_get("customer_crm_id").ok().flatten(),
        raw_messages,
        first_msg_ts_ms: row.try_get("first_msg_ts_ms").ok().flatten(),
        last_msg_ts_ms: row.try_get("last_msg_ts_ms").ok().flatten(),
    }
}

#[async_trait]
impl JobSource for PgStore {
    async fn fetch_pending(&self, lote_id: Option<&str>, limit: Option<u32>) -> Result<Vec<Job>> {
        let sql = pending_jobs_sql(&self.schema, lote_id.is_some(), limit.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(lote_id) = lote_id {
            query = query.bind(lote_id);
        }
        if let Some(limit) = limit {
            query = query.bind(i64::from(limit));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch pending sessions")?;
        let jobs: Vec<Job> = rows.iter().map(job_from_row).collect();
        info!(
            lote_id = lote_id.unwrap_or(""),
            pending = jobs.len(),
            "fetched pending sessions"
        );
        Ok(jobs)
    }
}

#[async_trait]
impl StatusSink for PgStore {
    async fn update_session(&self, update: &SessionStatusUpdate) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET estado_envio = $1, http_code_conv = $2, http_code_msgs = $3, \
             error_message = $4, sent_ts = NOW(), sent_ts_ms = $5, updated_at = NOW() \
             WHERE lote_id = $6 AND session_id = $7",
            self.table("envio_mensajes")
        );
        let result = sqlx::query(&sql)
            .bind(update.status.as_str())
            .bind(i32::from(update.http_code_conv))
            .bind(i32::from(update.http_code_msgs))
            .bind(update.error_message.as_deref())
            .bind(update.sent_ts_ms)
            .bind(update.lote_id.as_deref())
            .bind(update.session_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to update session status")?;
        if result.rows_affected() == 0 {
            warn!(
                session_id = %update.session_id,
                lote_id = update.lote_id.as_deref().unwrap_or(""),
                "status update matched no session row"
            );
        }
        Ok(())
    }

    async fn insert_batch_summary(&self, summary: &BatchSummary) -> Result<()> {
        let details = json!({ "per_session": summary.per_session });
        let sql = format!(
            "INSERT INTO {} (lote_id, lote_num, envio_ts, envio_ts_ms, \
             total_conversaciones, enviados_ok, enviados_error, detalles_json) \
             VALUES ($1, $2, NOW(), $3, $4, $5, $6, $7)",
            self.table("envios_lote_resumen")
        );
        sqlx::query(&sql)
            .bind(summary.lote_id.as_deref())
            .bind(summary.lote_num)
            .bind(summary.sent_ts_ms)
            .bind(summary.total as i64)
            .bind(summary.sent as i64)
            .bind(summary.failed as i64)
            .bind(details)
            .execute(&self.pool)
            .await
            .context("failed to insert batch summary")?;
        Ok(())
    }
}

#[async_trait]
impl EmployeeDirectory for PgStore {
    async fn agent_by_email(&self, email: &str) -> envio_common::Result<Option<String>> {
        let sql = format!(
            "SELECT crm_uuid FROM {} WHERE LOWER(email) = LOWER($1) LIMIT 1",
            self.table("agentes")
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| envio_common::Error::message(format!("agent lookup failed: {e}")))?;
        Ok(row.and_then(|r| r.try_get::<Option<String>, _>("crm_uuid").ok().flatten()))
    }
}

#[async_trait]
impl CustomerResolver for PgStore {
    /// Look up the remote customer id by normalized phone. Creation of
    /// missing customers is owned by the upstream identity service; an
    /// unmatched identification resolves to `None`.
    async fn ensure_customer(&self, job: &Job) -> Result<Option<String>> {
        let identification = normalize_phone(job.customer.phone.as_deref())
            .unwrap_or_else(|| DEFAULT_IDENTIFICATION.to_string());

        let sql = format!(
            "SELECT crm_id FROM {} WHERE identification_number = $1 \
             ORDER BY updated_on DESC NULLS LAST LIMIT 1",
            self.table("customers")
        );
        let row = sqlx::query(&sql)
            .bind(&identification)
            .fetch_optional(&self.pool)
            .await
            .context("failed to look up customer")?;

        let Some(customer_id) = row.and_then(|r| r.try_get::<Option<String>, _>("crm_id").ok().flatten())
        else {
            warn!(
                session_id = %job.session_id,
                identification = %identification,
                "no customer for identification"
            );
            return Ok(None);
        };

        self.write_customer_id(job.lote_id.as_deref(), &job.session_id, &customer_id)
            .await?;
        Ok(Some(customer_id))
    }
}
