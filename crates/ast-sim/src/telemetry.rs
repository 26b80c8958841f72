//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Telemetry samples and persistence sinks."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ast_store::{Record, RecordStore};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

/// One position/speed/heading reading for a simulated vehicle.
///
/// `seq` increases monotonically within a session; a sink applying samples
/// last-write-wins can use it to discard stale deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySample {
    /// Truck the sample belongs to.
    pub truck_id: String,
    /// Latitude, decimal degrees.
    pub latitude: f64,
    /// Longitude, decimal degrees.
    pub longitude: f64,
    /// Ground speed, km/h.
    pub speed_kph: f64,
    /// Compass heading, degrees.
    pub heading_deg: f64,
    /// Per-session monotonic sequence number.
    pub seq: u64,
    /// Unix timestamp of the reading.
    pub timestamp: i64,
}

/// Receives telemetry samples and persists the latest reading per vehicle.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Record one sample. Failures are logged by the caller and never abort
    /// the session.
    async fn record(&self, sample: TelemetrySample) -> Result<()>;
}

/// Sink that applies samples as partial updates on the truck record, the
/// same fields the dashboard's monitoring views read back.
pub struct StoreTelemetrySink {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl StoreTelemetrySink {
    /// Sink writing into the given trucks table.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

#[async_trait]
impl TelemetrySink for StoreTelemetrySink {
    async fn record(&self, sample: TelemetrySample) -> Result<()> {
        let mut fields = Record::new();
        fields.insert("latitude".to_owned(), json!(sample.latitude));
        fields.insert("longitude".to_owned(), json!(sample.longitude));
        fields.insert("speed".to_owned(), json!(sample.speed_kph));
        fields.insert("heading".to_owned(), json!(sample.heading_deg));
        fields.insert("timestamp".to_owned(), json!(sample.timestamp));
        fields.insert("telemetry_seq".to_owned(), json!(sample.seq));
        self.store
            .update(&self.table, &sample.truck_id, fields)
            .await?;
        Ok(())
    }
}

/// Sink capturing samples in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    samples: Mutex<Vec<TelemetrySample>>,
}

impl MemoryTelemetrySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured samples, in delivery order.
    pub fn samples(&self) -> Vec<TelemetrySample> {
        self.samples.lock().clone()
    }

    /// Captured samples for one truck, in delivery order.
    pub fn samples_for(&self, truck_id: &str) -> Vec<TelemetrySample> {
        self.samples
            .lock()
            .iter()
            .filter(|sample| sample.truck_id == truck_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetrySink {
    async fn record(&self, sample: TelemetrySample) -> Result<()> {
        self.samples.lock().push(sample);
        Ok(())
    }
}

impl TelemetrySample {
    /// Build a sample stamped with the current time.
    pub fn now(
        truck_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        speed_kph: f64,
        heading_deg: f64,
        seq: u64,
    ) -> Self {
        Self {
            truck_id: truck_id.into(),
            latitude,
            longitude,
            speed_kph,
            heading_deg,
            seq,
            timestamp: Utc::now().timestamp(),
        }
    }
}
