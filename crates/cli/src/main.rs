//! Batch entrypoint: loads configuration, wires the Postgres store and CRM
//! client into the scheduler, runs one batch and prints the summary.
//!
//! Individual session failures are data, not process errors: the exit code
//! is non-zero only when setup itself fails.

use {
    clap::Parser,
    serde_json::json,
    std::sync::Arc,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    envio_config::{CrmConfig, SchedulerConfig, StoreConfig},
    envio_crm::{CrmClient, EnvSecretSource},
    envio_scheduler::{BatchSummary, Pipeline, Scheduler},
    envio_store::PgStore,
};

#[derive(Parser)]
#[command(name = "envio", about = "Dispatch pending conversation sessions to the CRM")]
struct Cli {
    /// Restrict the run to one lote.
    #[arg(long, env = "LOTE_ID")]
    lote_id: Option<String>,

    /// Cap the number of sessions processed this run.
    #[arg(long)]
    limit: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

fn summary_report(summary: &BatchSummary) -> serde_json::Value {
    json!({
        "status": "OK",
        "lote_id": summary.lote_id,
        "lote_num": summary.lote_num,
        "total_sesiones": summary.total,
        "enviadas_ok": summary.sent,
        "enviadas_error": summary.failed,
        "enviadas_parcial": summary.partial,
        "skipped": summary.skipped,
        "sample_sessions": summary.per_session.iter().take(5).collect::<Vec<_>>(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "envio starting");

    let crm_config = CrmConfig::from_env()?;
    let scheduler_config = SchedulerConfig::from_env()?;
    let store_config = StoreConfig::from_env()?;

    let store = Arc::new(PgStore::connect(&store_config).await?);
    let crm = Arc::new(CrmClient::new(crm_config, Arc::new(EnvSecretSource))?);

    let pipeline = Pipeline {
        crm,
        directory: store.clone(),
        customers: store.clone(),
        status: store.clone(),
    };
    let scheduler = Scheduler::new(pipeline, store, scheduler_config);

    let report = match scheduler.run(cli.lote_id.as_deref(), cli.limit).await? {
        Some(summary) => summary_report(&summary),
        None => json!({
            "status": "NO_DATA",
            "message": "no PENDING sessions in envio_mensajes",
            "lote_id": cli.lote_id,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
