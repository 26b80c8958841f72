//! ---
//! ast_section: "06-testing-qa"
//! ast_subsection: "integration-tests"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Cross-crate integration tests wiring the full platform in-process."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use ast_core::{
    AlertService, Detection, FixedDetectionModel, RouteService, TruckService, VisionService,
};
use ast_metrics::{new_registry, SessionMetrics};
use ast_sim::{
    RegistryOptions, SessionRegistry, SessionSnapshot, SessionSpec, SessionState,
    StoreTelemetrySink, StubSimulator,
};
use ast_store::{MemoryObjectStore, MemoryRecordStore, ObjectStore, Record, RecordStore};
use serde_json::json;

// "fake-jpeg-bytes"
const FRAME_BASE64: &str = "ZmFrZS1qcGVnLWJ5dGVz";

struct Platform {
    records: Arc<dyn RecordStore>,
    trucks: TruckService,
    alerts: AlertService,
    routes: RouteService,
    vision: VisionService,
    registry: Arc<SessionRegistry>,
    metrics: ast_metrics::SharedRegistry,
}

fn platform() -> Platform {
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

    let trucks = TruckService::new(records.clone(), "ast-trucks");
    let alerts = AlertService::new(records.clone(), "ast-alerts");
    let routes = RouteService::new(records.clone(), "ast-routes");
    let vision = VisionService::new(
        records.clone(),
        "ast-detections",
        objects,
        "ast-data-bucket",
        Arc::new(FixedDetectionModel::new(vec![Detection {
            label: "fire_truck".to_owned(),
            confidence: 0.93,
            bbox: [10, 10, 120, 90],
        }])),
        alerts.clone(),
    );

    let metrics = new_registry();
    let session_metrics = SessionMetrics::new(metrics.clone()).expect("metrics register");
    let simulator = Arc::new(StubSimulator::new("127.0.0.1:2000").with_seed(23));
    let sink = Arc::new(StoreTelemetrySink::new(records.clone(), "ast-trucks"));
    let options = RegistryOptions {
        telemetry_interval: Duration::from_millis(20),
        stage_duration: Duration::from_millis(25),
        log_tail: 50,
    };
    let registry = Arc::new(
        SessionRegistry::with_options(simulator, sink, options).with_metrics(session_metrics),
    );

    Platform {
        records,
        trucks,
        alerts,
        routes,
        vision,
        registry,
        metrics,
    }
}

fn truck_payload(name: &str) -> Record {
    let mut payload = Record::new();
    payload.insert("truck_name".to_owned(), json!(name));
    payload.insert("truck_model".to_owned(), json!("Tesla Semi"));
    payload.insert("manufacture_year".to_owned(), json!(2024));
    payload
}

async fn wait_for_terminal(registry: &SessionRegistry, id: &str) -> SessionSnapshot {
    for _ in 0..400 {
        let snapshot = registry.status(id).expect("session exists");
        if snapshot.state.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {id} did not reach a terminal state in time");
}

fn counter_value(registry: &ast_metrics::SharedRegistry, name: &str) -> f64 {
    registry
        .gather()
        .iter()
        .find(|family| family.get_name() == name)
        .map(|family| {
            family
                .get_metric()
                .iter()
                .map(|metric| metric.get_counter().get_value())
                .sum()
        })
        .unwrap_or(0.0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_telemetry_lands_on_the_truck_record() {
    let platform = platform();
    let truck = platform
        .trucks
        .create(truck_payload("Integration Hauler"))
        .await
        .expect("truck created");
    let truck_id = truck["truck_id"].as_str().expect("id assigned").to_owned();

    let ack = platform
        .registry
        .start(SessionSpec {
            truck_ids: vec![truck_id.clone()],
            ..Default::default()
        })
        .expect("session starts");

    let snapshot = wait_for_terminal(&platform.registry, &ack.session_id).await;
    assert_eq!(snapshot.state, SessionState::Completed);
    let result = snapshot.result.expect("completed sessions carry a result");
    assert_eq!(result.stages_completed, 8);
    assert!(result.telemetry_samples > 0);

    // The sink applies samples as partial updates, so the dashboard fields
    // appear on the same record the fleet controller created.
    let record = platform
        .records
        .get("ast-trucks", &truck_id)
        .await
        .expect("store reachable")
        .expect("truck still present");
    assert_eq!(record["truck_name"], json!("Integration Hauler"));
    assert!(record.contains_key("latitude"));
    assert!(record.contains_key("longitude"));
    assert!(record.contains_key("speed"));
    assert!(record["telemetry_seq"].as_u64().expect("seq is numeric") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completed_sessions_show_up_in_the_metrics_registry() {
    let platform = platform();

    let ack = platform
        .registry
        .start(SessionSpec::default())
        .expect("session starts");
    wait_for_terminal(&platform.registry, &ack.session_id).await;

    assert_eq!(
        counter_value(&platform.metrics, "ast_sessions_started_total"),
        1.0
    );
    assert_eq!(
        counter_value(&platform.metrics, "ast_sessions_finished_total"),
        1.0
    );
    assert!(counter_value(&platform.metrics, "ast_telemetry_samples_total") >= 1.0);

    let active = platform
        .metrics
        .gather()
        .iter()
        .find(|family| family.get_name() == "ast_sessions_active")
        .map(|family| family.get_metric()[0].get_gauge().get_value())
        .unwrap_or(-1.0);
    assert_eq!(active, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vision_emergency_raises_an_alert_for_the_truck() {
    let platform = platform();
    let truck = platform
        .trucks
        .create(truck_payload("Camera Truck"))
        .await
        .expect("truck created");
    let truck_id = truck["truck_id"].as_str().unwrap().to_owned();

    let outcome = platform
        .vision
        .process_image(FRAME_BASE64, Some(&truck_id))
        .await
        .expect("frame processed");
    assert!(outcome.is_emergency);

    let active = platform.alerts.active().await.expect("alerts listable");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["truck_id"], json!(truck_id));
    assert_eq!(active[0]["alert_type"], json!("vision_emergency"));

    // Resolving the alert drains the active view again.
    let alert_id = active[0]["alert_id"].as_str().unwrap().to_owned();
    platform
        .alerts
        .resolve(&alert_id, Default::default())
        .await
        .expect("alert resolvable");
    assert!(platform.alerts.active().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn route_lifecycle_tracks_assignment_to_completion() {
    let platform = platform();
    let truck = platform
        .trucks
        .create(truck_payload("Route Truck"))
        .await
        .expect("truck created");
    let truck_id = truck["truck_id"].as_str().unwrap().to_owned();

    let mut payload = Record::new();
    payload.insert("start_location".to_owned(), json!("Oakland Depot"));
    payload.insert("end_location".to_owned(), json!("Reno Hub"));
    payload.insert("truck_id".to_owned(), json!(truck_id.clone()));
    let route = platform.routes.create(payload).await.expect("route created");
    let route_id = route["route_id"].as_str().unwrap().to_owned();
    assert_eq!(route["status"], json!("scheduled"));

    let started = platform.routes.start(&route_id).await.expect("route starts");
    assert_eq!(started["status"], json!("in_progress"));
    assert!(started.contains_key("started_at"));

    let completed = platform
        .routes
        .complete(&route_id)
        .await
        .expect("route completes");
    assert_eq!(completed["status"], json!("completed"));
    assert!(completed.contains_key("completed_at"));

    let for_truck = platform
        .routes
        .by_truck(&truck_id)
        .await
        .expect("lookup by truck");
    assert_eq!(for_truck.len(), 1);
}
