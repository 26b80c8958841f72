//! ---
//! ast_section: "01-core-functionality"
//! ast_subsection: "binary"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Binary entrypoint for the AST daemon."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use ast_api::{spawn_api_server, ApiServer, ApiState};
use ast_common::config::{AppConfig, Mode};
use ast_common::logging::init_tracing;
use ast_core::{
    AlertService, RouteService, StubDetectionModel, TruckService, UserService, VisionService,
};
use ast_metrics::{new_registry, spawn_http_server, DaemonMetrics, SessionMetrics};
use ast_sim::{RegistryOptions, SessionRegistry, StoreTelemetrySink, StubSimulator};
use ast_store::{MemoryObjectStore, MemoryRecordStore, ObjectStore, RecordStore};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "AST platform daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    init_tracing("astd", &config.logging)?;
    info!(config_path = %loaded.source.display(), mode = ?config.mode, "configuration loaded");

    run_daemon(config).await
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    daemon_metrics.inc_start();
    let session_metrics = SessionMetrics::new(metrics_registry.clone())?;

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(
            metrics_registry.clone(),
            config.metrics.listen,
        )?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    // Both modes currently run against in-memory backends; the storage
    // configuration names the tables the managed deployment will use.
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

    let tables = &config.storage.tables;
    let trucks = TruckService::new(records.clone(), tables.trucks.clone());
    let alerts = AlertService::new(records.clone(), tables.alerts.clone());
    let routes = RouteService::new(records.clone(), tables.routes.clone());
    let users = UserService::new(records.clone(), tables.users.clone());
    let vision = VisionService::new(
        records.clone(),
        tables.detections.clone(),
        objects.clone(),
        config.storage.bucket.clone(),
        Arc::new(StubDetectionModel::default()),
        alerts.clone(),
    );

    let endpoint = format!("{}:{}", config.simulator.host, config.simulator.port);
    let simulator = Arc::new(StubSimulator::new(endpoint));
    let sink = Arc::new(StoreTelemetrySink::new(
        records.clone(),
        tables.trucks.clone(),
    ));
    let options = RegistryOptions {
        telemetry_interval: config.session.telemetry_interval,
        stage_duration: config.session.stage_duration,
        log_tail: config.session.log_tail,
    };
    let registry = Arc::new(
        SessionRegistry::with_options(simulator, sink, options).with_metrics(session_metrics),
    );

    let mut api_server: Option<ApiServer> = None;
    if config.api.enabled {
        let static_dir = config.api.static_dir.clone().and_then(|dir| {
            if dir.is_dir() {
                Some(dir)
            } else {
                warn!(static_dir = %dir.display(), "api static_dir not found; serving API without assets");
                None
            }
        });
        let state = Arc::new(ApiState::new(
            trucks,
            alerts,
            routes,
            users,
            vision,
            registry.clone(),
            config.mode,
        ));
        match spawn_api_server(state, config.api.listen, static_dir) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!(mode = ?config.mode, "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    // Sessions first, so their final telemetry and log lines land before the
    // HTTP surfaces go away.
    registry.shutdown().await;

    if let Some(server) = api_server {
        server.shutdown().await?;
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}
