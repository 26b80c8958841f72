//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Axum HTTP facade for the AST platform dashboard."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! HTTP facade for the AST platform.
//!
//! Thin JSON layer over the fleet controllers and the simulation session
//! registry: handlers validate nothing themselves, they translate between
//! HTTP and the services and map service errors onto status codes.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, get_service, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod alerts;
mod auth;
pub mod error;
mod routes;
mod simulation;
pub mod state;
mod trucks;
mod vision;

pub use error::ApiError;
pub use state::ApiState;

/// Assemble the `/api` router over the shared state, optionally serving a
/// static dashboard directory at the root.
pub fn build_router(state: Arc<ApiState>, static_dir: Option<PathBuf>) -> Router {
    let api_routes = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/register", post(auth::register))
        .route("/api/trucks", get(trucks::list).post(trucks::create))
        .route("/api/trucks/stats", get(trucks::stats))
        .route(
            "/api/trucks/:truck_id",
            get(trucks::get).put(trucks::update).delete(trucks::delete),
        )
        .route("/api/trucks/:truck_id/location", get(trucks::location))
        .route("/api/trucks/:truck_id/status", get(trucks::status))
        .route("/api/trucks/:truck_id/telemetry", get(trucks::telemetry))
        .route("/api/alerts", get(alerts::list).post(alerts::create))
        .route("/api/alerts/stats", get(alerts::stats))
        .route("/api/alerts/recent", get(alerts::recent))
        .route(
            "/api/alerts/:alert_id",
            get(alerts::get).put(alerts::update).delete(alerts::delete),
        )
        .route("/api/alerts/:alert_id/resolve", post(alerts::resolve))
        .route("/api/routes", get(routes::list).post(routes::create))
        .route("/api/routes/stats", get(routes::stats))
        .route(
            "/api/routes/:route_id",
            get(routes::get).put(routes::update).delete(routes::delete),
        )
        .route("/api/routes/:route_id/start", post(routes::start))
        .route("/api/routes/:route_id/complete", post(routes::complete))
        .route("/api/simulation/start", post(simulation::start))
        .route("/api/simulation/status", get(simulation::status))
        .route("/api/simulation/stop", post(simulation::stop))
        .route("/api/simulation/:session_id/result", get(simulation::result))
        .route("/api/vision/process", post(vision::process))
        .route("/api/vision/detections", get(vision::detections))
        .route("/api/vision/stats", get(vision::stats))
        .with_state(state);

    if let Some(dir) = static_dir {
        let service = get_service(ServeDir::new(dir).append_index_html_on_directories(true));
        Router::new()
            .merge(api_routes)
            .fallback_service(service)
            .layer(TraceLayer::new_for_http())
    } else {
        api_routes.layer(TraceLayer::new_for_http())
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and wait for the server task.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the REST API with optional static dashboard hosting.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
) -> Result<ApiServer> {
    let router = build_router(state, static_dir);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    mode: ast_common::Mode,
    uptime_seconds: u64,
    session_count: usize,
    active_sessions: usize,
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        mode: state.mode,
        uptime_seconds: state.uptime_seconds(),
        session_count: state.registry.digest().len(),
        active_sessions: state.registry.active_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast_common::Mode;
    use ast_core::{
        AlertService, Detection, FixedDetectionModel, RouteService, TruckService, UserService,
        VisionService,
    };
    use ast_sim::{
        RegistryOptions, SessionRegistry, StoreTelemetrySink, StubSimulator,
    };
    use ast_store::{MemoryObjectStore, MemoryRecordStore};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use base64::prelude::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let records = Arc::new(MemoryRecordStore::new());
        let objects = Arc::new(MemoryObjectStore::new());

        let trucks = TruckService::new(records.clone(), "ast-trucks");
        let alerts = AlertService::new(records.clone(), "ast-alerts");
        let routes = RouteService::new(records.clone(), "ast-routes");
        let users = UserService::new(records.clone(), "ast-users");
        let model = Arc::new(FixedDetectionModel::new(vec![Detection {
            label: "fire_truck".to_owned(),
            confidence: 0.9,
            bbox: [10, 10, 90, 90],
        }]));
        let vision = VisionService::new(
            records.clone(),
            "ast-detections",
            objects,
            "ast-data-bucket",
            model,
            alerts.clone(),
        );

        let sink = Arc::new(StoreTelemetrySink::new(records.clone(), "ast-trucks"));
        let simulator = Arc::new(StubSimulator::default().with_seed(5));
        let registry = Arc::new(SessionRegistry::with_options(
            simulator,
            sink,
            RegistryOptions {
                telemetry_interval: Duration::from_millis(20),
                stage_duration: Duration::from_millis(100),
                log_tail: 50,
            },
        ));

        let state = Arc::new(ApiState::new(
            trucks,
            alerts,
            routes,
            users,
            vision,
            registry,
            Mode::Simulation,
        ));
        build_router(state, None)
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn register_login_and_reject_bad_credentials() {
        let router = test_router();
        let (status, _) = send(
            &router,
            Method::POST,
            "/api/auth/register",
            Some(json!({"username": "dispatch", "password": "hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "dispatch", "password": "hunter2"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"].as_str().unwrap().len(), 64);
        assert_eq!(body["user"]["username"], json!("dispatch"));
        assert!(body["user"].get("password").is_none());

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/auth/login",
            Some(json!({"username": "dispatch", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn truck_crud_maps_errors_to_status_codes() {
        let router = test_router();

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/trucks",
            Some(json!({"truck_name": "Hauler One"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("missing required fields"));

        let (status, truck) = send(
            &router,
            Method::POST,
            "/api/trucks",
            Some(json!({
                "truck_name": "Hauler One",
                "truck_model": "Tesla Semi",
                "manufacture_year": 2023
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = truck["truck_id"].as_str().unwrap().to_owned();

        let (status, listed) = send(&router, Method::GET, "/api/trucks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &router,
            Method::PUT,
            &format!("/api/trucks/{id}"),
            Some(json!({"status": "active"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], json!("active"));

        let (status, _) = send(&router, Method::GET, "/api/trucks/truck-missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, stats) = send(&router, Method::GET, "/api/trucks/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total"], json!(1));

        let (status, _) = send(&router, Method::DELETE, &format!("/api/trucks/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simulation_endpoints_follow_the_registry_contract() {
        let router = test_router();

        // Stop with nothing running is a conflict, not a 404.
        let (status, body) = send(&router, Method::POST, "/api/simulation/stop", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("no active sessions"));

        let (status, ack) = send(&router, Method::POST, "/api/simulation/start", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = ack["session_id"].as_str().unwrap().to_owned();
        assert_eq!(ack["state"], json!("starting"));

        let (status, snapshot) = send(
            &router,
            Method::GET,
            &format!("/api/simulation/status?id={id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["id"], json!(id));

        let (status, digest) = send(&router, Method::GET, "/api/simulation/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(digest.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &router,
            Method::GET,
            "/api/simulation/sim-missing/result",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, ack) = send(
            &router,
            Method::POST,
            "/api/simulation/stop",
            Some(json!({"session_id": id})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["state"], json!("stopping"));

        // The worker unwinds asynchronously; poll until the result is ready.
        let mut result_status = StatusCode::CONFLICT;
        for _ in 0..200 {
            let (status, _) = send(
                &router,
                Method::GET,
                &format!("/api/simulation/{id}/result"),
                None,
            )
            .await;
            result_status = status;
            if status == StatusCode::OK {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(result_status, StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn vision_process_escalates_to_an_alert() {
        let router = test_router();
        let frame = BASE64_STANDARD.encode(b"not-really-a-jpeg");

        let (status, outcome) = send(
            &router,
            Method::POST,
            "/api/vision/process",
            Some(json!({"image": frame, "truck_id": "truck-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["is_emergency"], json!(true));

        let (status, detections) =
            send(&router, Method::GET, "/api/vision/detections", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detections.as_array().unwrap().len(), 1);

        let (status, alerts) =
            send(&router, Method::GET, "/api/alerts?truck_id=truck-1", None).await;
        assert_eq!(status, StatusCode::OK);
        let alerts = alerts.as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["alert_type"], json!("vision_emergency"));

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/vision/process",
            Some(json!({"image": "%%%"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("base64"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn status_reports_mode_and_sessions() {
        let router = test_router();
        let (status, body) = send(&router, Method::GET, "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], json!("simulation"));
        assert_eq!(body["session_count"], json!(0));
    }
}
