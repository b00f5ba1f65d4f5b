//! busgauged: the busgauge daemon.
//!
//! Single binary that assembles the exporter:
//! - Administrative API client (Service Bus REST, or in-memory for `--demo`)
//! - Collection pipeline + snapshot cache
//! - Metric registry + periodic refresh loop
//! - Health probe
//! - REST API + Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! busgauged run --config busgauge.toml --port 8080
//! ```

mod demo;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use busgauge_admin::{AdminClient, ServiceBusClient};
use busgauge_api::{ApiState, build_router};
use busgauge_collector::{CollectionPipeline, EntityFilter, SnapshotCache};
use busgauge_core::{ExporterConfig, Settings};
use busgauge_health::HealthProbe;
use busgauge_metrics::{GaugeSet, MetricRegistry};

const DEFAULT_CONFIG: &str = "busgauge.toml";

#[derive(Parser)]
#[command(name = "busgauged", about = "Azure Service Bus metrics exporter", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the exporter.
    Run {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,

        /// Serve an in-memory sample namespace instead of Service Bus.
        #[arg(long)]
        demo: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            log_format,
            demo,
        } => {
            init_tracing(log_format);
            run(config, port, demo).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,busgauged=debug,busgauge=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Load the config file, falling back to defaults when no file was named
/// and the default one is absent.
fn load_config(path: Option<&Path>) -> anyhow::Result<ExporterConfig> {
    let config = match path {
        Some(path) => ExporterConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ExporterConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load config from {DEFAULT_CONFIG}"))?
        }
        None => {
            info!("no config file found; using defaults");
            ExporterConfig::default()
        }
    };
    Ok(config.with_env_overrides())
}

async fn run(config_path: Option<PathBuf>, port: Option<u16>, demo: bool) -> anyhow::Result<()> {
    info!("busgauge exporter starting");

    let config = load_config(config_path.as_deref())?;
    let settings = if demo {
        config.validate_offline()
    } else {
        config.validate()
    }
    .context("invalid configuration")?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Administrative API client ──────────────────────────────

    let mut background = Vec::new();
    let client: Arc<dyn AdminClient> = match (&settings.connection, demo) {
        (_, true) => {
            let namespace = settings
                .connection
                .as_ref()
                .map_or("demo", |c| c.namespace.as_str());
            let client = demo::sample_client(namespace);
            background.push(tokio::spawn(demo::churn(
                client.clone(),
                settings.refresh_interval,
                shutdown_rx.clone(),
            )));
            warn!("demo mode: serving an in-memory namespace");
            client
        }
        (Some(connection), false) => {
            let client = ServiceBusClient::new(connection.clone(), settings.request_timeout)
                .context("failed to build Service Bus client")?;
            info!(namespace = %connection.namespace, host = %connection.host, "service bus client initialized");
            Arc::new(client)
        }
        (None, false) => anyhow::bail!("no Service Bus connection string configured"),
    };

    // ── Collection + metrics ───────────────────────────────────

    let exporter = Exporter::assemble(&settings, client)?;

    let (outcome, added) = exporter.registry.refresh().await;
    info!(?outcome, gauges = added, "initial collection finished");

    let registry = exporter.registry.clone();
    let interval = settings.refresh_interval;
    let loop_shutdown = shutdown_rx.clone();
    background.push(tokio::spawn(async move {
        registry.run(interval, loop_shutdown).await;
    }));

    // ── Start API server ───────────────────────────────────────

    let router = build_router(exporter.api_state());
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(settings.port)));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    for handle in background {
        let _ = handle.await;
    }

    info!("busgauge exporter stopped");
    Ok(())
}

/// Every long-lived service the exporter shares between tasks.
struct Exporter {
    cache: Arc<SnapshotCache>,
    gauges: Arc<GaugeSet>,
    registry: Arc<MetricRegistry>,
    health: Arc<HealthProbe>,
}

impl Exporter {
    fn assemble(settings: &Settings, client: Arc<dyn AdminClient>) -> anyhow::Result<Self> {
        let filter = EntityFilter::from_settings(settings).context("invalid entity filter")?;
        let pipeline = CollectionPipeline::new(client.clone(), filter, settings.include_namespace_metrics);
        let cache = Arc::new(SnapshotCache::new(Arc::new(pipeline), settings.cache_ttl));
        info!(ttl_secs = settings.cache_ttl.as_secs(), "snapshot cache initialized");

        let gauges = Arc::new(GaugeSet::new());
        let registry = Arc::new(MetricRegistry::new(
            cache.clone(),
            gauges.clone(),
            &settings.metric_prefix,
            settings.environment_tag(),
        ));
        let health = Arc::new(HealthProbe::new(client, cache.clone(), settings.request_timeout));

        Ok(Self {
            cache,
            gauges,
            registry,
            health,
        })
    }

    fn api_state(&self) -> ApiState {
        ApiState::new(self.cache.clone(), self.gauges.clone(), self.health.clone())
    }
}
