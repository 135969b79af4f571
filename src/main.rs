//! Tracking Engine
//!
//! Pixel analytics collector:
//! - `/t.gif` records page views and points into per-day session lists
//! - the daily compiler turns yesterday's lists into durable days
//! - the monthly reducer folds days into bounded month records
//! - the retention sweep drops days whose month is reduced

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use api::{load_blacklist, router, AppState, BlacklistConfig, Recorder};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseStore, DurableStore};
use ephemeral_store::{EphemeralStore, RedisConfig, RedisStore};
use telemetry::init_tracing_from_env;
use tracking_core::window::{parse_day, yesterday};
use tracking_core::{MonthWindow, SessionCodec};
use worker::{check_health, JobsConfig, RunReport, WorkerScheduler};

const DEFAULT_SALT: &str = "change-me";

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Salt of the session token checksum. Rotating it resets every session.
    #[serde(default = "default_session_salt")]
    session_salt: String,

    #[serde(default)]
    redis: RedisConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,

    #[serde(default)]
    blacklist: BlacklistConfig,

    #[serde(default)]
    jobs: JobsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_salt() -> String {
    DEFAULT_SALT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_salt: default_session_salt(),
            redis: RedisConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            blacklist: BlacklistConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tracking-engine", version, about = "Pixel analytics collector")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the pixel and run the scheduled jobs (default)
    Serve,
    /// Compile one day of session lists into durable days
    Daily {
        /// Day as YYYYMMDD, defaults to yesterday (UTC)
        #[arg(long)]
        day: Option<String>,
    },
    /// Reduce one month of days, then run the retention sweep
    Monthly {
        /// Month as YYYYMM, defaults to the previous month (UTC)
        #[arg(long)]
        month: Option<String>,
    },
    /// Delete days older than the retention horizon whose month is reduced
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    let cli = Cli::parse();
    let config = load_config()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Daily { day } => {
            let day = match day {
                Some(raw) => parse_day(&raw).context("Invalid --day")?,
                None => yesterday(Utc::now().date_naive()),
            };
            let scheduler = scheduler(&config, true).await?;
            let report = scheduler.daily().compile_day(day).await?;
            finish(report)
        }
        Command::Monthly { month } => {
            let month = match month {
                Some(raw) => MonthWindow::parse(&raw).context("Invalid --month")?,
                None => MonthWindow::containing(Utc::now().date_naive()).previous(),
            };
            let scheduler = scheduler(&config, false).await?;
            let report = scheduler.monthly().reduce_month(month).await?;
            let sweep = scheduler.retention().sweep(Utc::now().date_naive()).await?;
            finish(sweep)?;
            finish(report)
        }
        Command::Sweep => {
            let scheduler = scheduler(&config, false).await?;
            let report = scheduler.retention().sweep(Utc::now().date_naive()).await?;
            finish(report)
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Tracking Engine v{}", env!("CARGO_PKG_VERSION"));

    if config.session_salt == DEFAULT_SALT {
        warn!("Using the default session salt; set TRACKING__SESSION_SALT in production");
    }

    let ephemeral = connect_ephemeral(&config).await?;

    // The pixel keeps serving while ClickHouse is down.
    let durable: Arc<dyn DurableStore> = match ClickHouseStore::connect(config.clickhouse.clone()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to initialize ClickHouse schema, continuing");
            Arc::new(ClickHouseStore::new(ClickHouseClient::new(
                config.clickhouse.clone(),
            )))
        }
    };

    check_health(ephemeral.as_ref(), durable.as_ref()).await;

    let blacklist = Arc::new(load_blacklist(&config.blacklist).await);
    let recorder = Recorder::new(
        ephemeral.clone(),
        SessionCodec::new(&config.session_salt),
        blacklist,
    );

    let scheduler = Arc::new(WorkerScheduler::new(
        config.jobs.clone(),
        ephemeral.clone(),
        durable,
    ));
    let worker_handles = scheduler.start();

    let app = router(AppState::new(recorder, ephemeral));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");
    // Jobs are idempotent, an interrupted run is redone on the next start.
    for handle in worker_handles {
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn connect_ephemeral(config: &Config) -> Result<Arc<dyn EphemeralStore>> {
    let store = RedisStore::connect(config.redis.clone())
        .await
        .context("Failed to connect to Redis")?;
    Ok(Arc::new(store))
}

/// Stores for a one-shot job. Only the daily compile needs Redis.
async fn scheduler(config: &Config, with_ephemeral: bool) -> Result<WorkerScheduler> {
    let durable = ClickHouseStore::connect(config.clickhouse.clone())
        .await
        .context("Failed to connect to ClickHouse")?;

    let ephemeral: Arc<dyn EphemeralStore> = if with_ephemeral {
        connect_ephemeral(config).await?
    } else {
        Arc::new(ephemeral_store::MemoryStore::new())
    };

    Ok(WorkerScheduler::new(
        config.jobs.clone(),
        ephemeral,
        Arc::new(durable),
    ))
}

/// Logs a job report and fails the process when any domain failed.
fn finish(report: RunReport) -> Result<()> {
    match serde_json::to_string(&report) {
        Ok(json) => info!(report = %json, "Job report"),
        Err(e) => warn!(error = %e, "Failed to serialize job report"),
    }

    if !report.is_clean() {
        bail!(
            "{} job for {} failed for {} domain(s)",
            report.job,
            report.window,
            report.failed()
        );
    }
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. TRACKING__REDIS__URL
        .add_source(
            config::Environment::with_prefix("TRACKING")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("blacklist.sources")
                .with_list_parse_key("blacklist.html_sources")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
