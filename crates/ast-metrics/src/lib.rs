//! ---
//! ast_section: "03-persistence-logging"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Metrics collection and export utilities."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> axum::response::Response {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_str(encoder.format_type())
                    .expect("prometheus format type is a valid header value"),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "astd_starts_total",
            "Total number of times the AST daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        Ok(Self {
            registry,
            starts_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }
}

/// Metrics describing the simulation session registry.
#[derive(Clone, Debug)]
pub struct SessionMetrics {
    registry: SharedRegistry,
    sessions_started: IntCounter,
    sessions_finished: IntCounterVec,
    sessions_active: IntGauge,
    telemetry_samples: IntCounter,
}

impl SessionMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let sessions_started = IntCounter::with_opts(Opts::new(
            "ast_sessions_started_total",
            "Simulation sessions launched since daemon start",
        ))?;
        registry.register(Box::new(sessions_started.clone()))?;

        let sessions_finished = IntCounterVec::new(
            Opts::new(
                "ast_sessions_finished_total",
                "Simulation sessions that reached a terminal state, by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(sessions_finished.clone()))?;

        let sessions_active = IntGauge::with_opts(Opts::new(
            "ast_sessions_active",
            "Simulation sessions currently in a non-terminal state",
        ))?;
        registry.register(Box::new(sessions_active.clone()))?;

        let telemetry_samples = IntCounter::with_opts(Opts::new(
            "ast_telemetry_samples_total",
            "Telemetry samples forwarded to the sink",
        ))?;
        registry.register(Box::new(telemetry_samples.clone()))?;

        Ok(Self {
            registry,
            sessions_started,
            sessions_finished,
            sessions_active,
            telemetry_samples,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_started(&self) {
        self.sessions_started.inc();
    }

    pub fn inc_finished(&self, outcome: &str) {
        self.sessions_finished.with_label_values(&[outcome]).inc();
    }

    pub fn inc_active(&self) {
        self.sessions_active.inc();
    }

    pub fn dec_active(&self) {
        self.sessions_active.dec();
    }

    pub fn inc_telemetry_samples(&self, count: u64) {
        self.telemetry_samples.inc_by(count);
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_metrics_register_and_count() {
        let registry = new_registry();
        let metrics = SessionMetrics::new(registry.clone()).expect("register");
        metrics.inc_started();
        metrics.inc_finished("completed");
        metrics.inc_active();
        metrics.dec_active();
        metrics.inc_telemetry_samples(16);

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"ast_sessions_started_total"));
        assert!(names.contains(&"ast_sessions_finished_total"));
        assert!(names.contains(&"ast_sessions_active"));
        assert!(names.contains(&"ast_telemetry_samples_total"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = new_registry();
        SessionMetrics::new(registry.clone()).expect("first registration");
        assert!(SessionMetrics::new(registry).is_err());
    }
}
