//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Camera-feed emergency detection pipeline."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use ast_common::unix_timestamp;
use ast_store::{ObjectStore, Record, RecordStore};
use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::AlertService;
use crate::error::{ControllerError, Result};

/// Detection classes that count as emergencies at high confidence.
pub const EMERGENCY_CLASSES: [&str; 6] = [
    "ambulance",
    "police_car",
    "fire_truck",
    "accident",
    "fire",
    "smoke",
];

const EMERGENCY_CONFIDENCE: f64 = 0.75;

const DETECTION_CLASSES: [&str; 13] = [
    "vehicle",
    "pedestrian",
    "traffic_light",
    "traffic_sign",
    "ambulance",
    "police_car",
    "fire_truck",
    "maintenance_vehicle",
    "accident",
    "fire",
    "smoke",
    "construction",
    "road_closure",
];

/// One detected object in a camera frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Detected class name.
    #[serde(rename = "class")]
    pub label: String,
    /// Model confidence, 0..1.
    pub confidence: f64,
    /// Bounding box `[x1, y1, x2, y2]` in pixels.
    pub bbox: [i64; 4],
}

/// Black-box object detector: image bytes in, detections out.
pub trait DetectionModel: Send + Sync {
    /// Run detection on an encoded image.
    fn detect(&self, image: &[u8]) -> Vec<Detection>;
}

/// Seeded random stand-in for a real detection model.
pub struct StubDetectionModel {
    rng: Mutex<StdRng>,
}

impl StubDetectionModel {
    /// Stub with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StubDetectionModel {
    fn default() -> Self {
        Self::new(0x5EED)
    }
}

impl DetectionModel for StubDetectionModel {
    fn detect(&self, _image: &[u8]) -> Vec<Detection> {
        let mut rng = self.rng.lock();
        let count = rng.gen_range(0..5);
        (0..count)
            .map(|_| {
                let label = DETECTION_CLASSES[rng.gen_range(0..DETECTION_CLASSES.len())];
                let x1 = rng.gen_range(0..540);
                let y1 = rng.gen_range(0..380);
                let w = rng.gen_range(50..100);
                let h = rng.gen_range(50..100);
                Detection {
                    label: label.to_owned(),
                    confidence: rng.gen_range(0.6..0.95),
                    bbox: [x1, y1, x1 + w, y1 + h],
                }
            })
            .collect()
    }
}

/// Model returning a fixed detection list. Test hook.
#[derive(Debug, Clone, Default)]
pub struct FixedDetectionModel {
    detections: Vec<Detection>,
}

impl FixedDetectionModel {
    /// Model that always reports the given detections.
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectionModel for FixedDetectionModel {
    fn detect(&self, _image: &[u8]) -> Vec<Detection> {
        self.detections.clone()
    }
}

/// Outcome of one processed camera frame.
#[derive(Debug, Clone, Serialize)]
pub struct VisionOutcome {
    /// Id of the persisted detection record.
    pub detection_id: String,
    /// Whether an emergency class was detected above threshold.
    pub is_emergency: bool,
    /// All detections in the frame.
    pub detections: Vec<Detection>,
    /// URL of the stored frame.
    pub image_url: String,
}

/// Detection counts for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct VisionStats {
    /// Frames processed.
    pub total: usize,
    /// Frames flagged as emergencies.
    pub emergencies: usize,
}

/// Camera-feed processing: decode, detect, persist, and escalate.
#[derive(Clone)]
pub struct VisionService {
    store: Arc<dyn RecordStore>,
    table: String,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    model: Arc<dyn DetectionModel>,
    alerts: AlertService,
}

impl VisionService {
    /// Service wiring the detections table, image bucket, model, and the
    /// alert escalation path.
    pub fn new(
        store: Arc<dyn RecordStore>,
        table: impl Into<String>,
        objects: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        model: Arc<dyn DetectionModel>,
        alerts: AlertService,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            objects,
            bucket: bucket.into(),
            model,
            alerts,
        }
    }

    /// Process one base64-encoded camera frame: run detection, store the
    /// frame, persist a detection record, and raise a high-severity alert
    /// when an emergency class is seen above threshold.
    pub async fn process_image(
        &self,
        image_base64: &str,
        truck_id: Option<&str>,
    ) -> Result<VisionOutcome> {
        let image = BASE64_STANDARD
            .decode(image_base64.trim())
            .map_err(|err| ControllerError::Validation(format!("invalid base64 image: {err}")))?;
        if image.is_empty() {
            return Err(ControllerError::Validation(
                "image payload is empty".to_owned(),
            ));
        }

        let detections = self.model.detect(&image);
        let emergencies: Vec<&str> = detections
            .iter()
            .filter(|d| {
                EMERGENCY_CLASSES.contains(&d.label.as_str())
                    && d.confidence > EMERGENCY_CONFIDENCE
            })
            .map(|d| d.label.as_str())
            .collect();
        let is_emergency = !emergencies.is_empty();

        let image_id = format!("image-{}", Uuid::new_v4());
        let image_url = self
            .objects
            .upload(
                &self.bucket,
                &format!("vision/{image_id}.jpg"),
                Bytes::from(image),
                "image/jpeg",
            )
            .await?;

        let detection_id = format!("detection-{}", Uuid::new_v4());
        let mut record = Record::new();
        record.insert("detection_id".to_owned(), json!(detection_id.clone()));
        record.insert("timestamp".to_owned(), json!(unix_timestamp()));
        record.insert("truck_id".to_owned(), json!(truck_id));
        record.insert("image_url".to_owned(), json!(image_url.clone()));
        record.insert(
            "detections".to_owned(),
            serde_json::to_value(&detections).unwrap_or(Value::Null),
        );
        record.insert("is_emergency".to_owned(), json!(is_emergency));
        self.store.put(&self.table, &detection_id, record).await?;

        if is_emergency {
            if let Some(truck_id) = truck_id {
                let mut alert = Record::new();
                alert.insert("truck_id".to_owned(), json!(truck_id));
                alert.insert("alert_type".to_owned(), json!("vision_emergency"));
                alert.insert("severity".to_owned(), json!("high"));
                alert.insert(
                    "message".to_owned(),
                    json!(format!(
                        "Emergency detected in camera feed: {}",
                        emergencies.join(", ")
                    )),
                );
                alert.insert("detection_id".to_owned(), json!(detection_id.clone()));
                alert.insert("image_url".to_owned(), json!(image_url.clone()));
                self.alerts.create(alert).await?;
                info!(truck = %truck_id, detection = %detection_id, "vision emergency escalated");
            } else {
                warn!(detection = %detection_id, "vision emergency without a truck id, not escalated");
            }
        }

        Ok(VisionOutcome {
            detection_id,
            is_emergency,
            detections,
            image_url,
        })
    }

    /// The `limit` most recent detection records, newest first.
    pub async fn recent_detections(&self, limit: usize) -> Result<Vec<Record>> {
        let mut detections = self.store.scan(&self.table, None).await?;
        detections.sort_by_key(|d| {
            std::cmp::Reverse(d.get("timestamp").and_then(Value::as_i64).unwrap_or(0))
        });
        detections.truncate(limit);
        Ok(detections)
    }

    /// Frame and emergency counts.
    pub async fn stats(&self) -> Result<VisionStats> {
        let detections = self.store.scan(&self.table, None).await?;
        let emergencies = detections
            .iter()
            .filter(|d| d.get("is_emergency") == Some(&json!(true)))
            .count();
        Ok(VisionStats {
            total: detections.len(),
            emergencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast_store::{MemoryObjectStore, MemoryRecordStore};

    fn fire_truck(confidence: f64) -> Detection {
        Detection {
            label: "fire_truck".to_owned(),
            confidence,
            bbox: [10, 10, 90, 90],
        }
    }

    fn service_with(model: Arc<dyn DetectionModel>) -> (VisionService, AlertService) {
        let records = Arc::new(MemoryRecordStore::new());
        let alerts = AlertService::new(records.clone(), "ast-alerts");
        let service = VisionService::new(
            records,
            "ast-detections",
            Arc::new(MemoryObjectStore::new()),
            "ast-data-bucket",
            model,
            alerts.clone(),
        );
        (service, alerts)
    }

    fn frame() -> String {
        BASE64_STANDARD.encode(b"not-really-a-jpeg")
    }

    #[tokio::test]
    async fn emergency_above_threshold_raises_an_alert() {
        let model = Arc::new(FixedDetectionModel::new(vec![fire_truck(0.9)]));
        let (service, alerts) = service_with(model);

        let outcome = service.process_image(&frame(), Some("truck-1")).await.unwrap();
        assert!(outcome.is_emergency);
        assert!(outcome
            .image_url
            .starts_with("https://ast-data-bucket.s3.amazonaws.com/vision/"));

        let raised = alerts.by_truck("truck-1").await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0]["alert_type"], json!("vision_emergency"));
        assert_eq!(raised[0]["severity"], json!("high"));
    }

    #[tokio::test]
    async fn low_confidence_emergency_is_not_escalated() {
        let model = Arc::new(FixedDetectionModel::new(vec![fire_truck(0.6)]));
        let (service, alerts) = service_with(model);

        let outcome = service.process_image(&frame(), Some("truck-1")).await.unwrap();
        assert!(!outcome.is_emergency);
        assert!(alerts.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_base64_is_a_validation_error() {
        let model = Arc::new(FixedDetectionModel::default());
        let (service, _alerts) = service_with(model);
        assert!(matches!(
            service.process_image("%%% not base64 %%%", None).await,
            Err(ControllerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn recent_detections_and_stats() {
        let model = Arc::new(FixedDetectionModel::new(vec![fire_truck(0.9)]));
        let (service, _alerts) = service_with(model);
        for _ in 0..3 {
            service.process_image(&frame(), Some("truck-1")).await.unwrap();
        }

        let recent = service.recent_detections(2).await.unwrap();
        assert_eq!(recent.len(), 2);

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.emergencies, 3);
    }
}
