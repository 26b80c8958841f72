//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Truck fleet CRUD and live telemetry views."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use ast_common::unix_timestamp;
use ast_store::{Record, RecordStore};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{ControllerError, Result};

const REQUIRED_FIELDS: [&str; 3] = ["truck_name", "truck_model", "manufacture_year"];

/// CRUD and monitoring views over the trucks table.
#[derive(Clone)]
pub struct TruckService {
    store: Arc<dyn RecordStore>,
    table: String,
}

/// Last known position of a truck, zeros when no telemetry has arrived yet.
#[derive(Debug, Clone, Serialize)]
pub struct TruckLocation {
    /// Truck id.
    pub truck_id: String,
    /// Latitude, decimal degrees.
    pub latitude: f64,
    /// Longitude, decimal degrees.
    pub longitude: f64,
    /// Ground speed, km/h.
    pub speed: f64,
    /// Compass heading, degrees.
    pub heading: f64,
    /// Unix timestamp of the view.
    pub timestamp: i64,
}

/// Operational health view of a truck.
#[derive(Debug, Clone, Serialize)]
pub struct TruckStatus {
    /// Truck id.
    pub truck_id: String,
    /// Operational status string, `unknown` when never set.
    pub status: String,
    /// Fuel level, percent.
    pub fuel_level: f64,
    /// Battery level, percent.
    pub battery_level: f64,
    /// Engine temperature, °C.
    pub engine_temperature: f64,
    /// Unix timestamp of the view.
    pub timestamp: i64,
}

/// Combined position and status view read by the dashboard's live map.
#[derive(Debug, Clone, Serialize)]
pub struct TruckTelemetry {
    /// Truck id.
    pub truck_id: String,
    /// Operational status string.
    pub status: String,
    /// Latitude, decimal degrees.
    pub latitude: f64,
    /// Longitude, decimal degrees.
    pub longitude: f64,
    /// Ground speed, km/h.
    pub speed: f64,
    /// Compass heading, degrees.
    pub heading: f64,
    /// Sequence number of the last applied telemetry sample.
    pub telemetry_seq: u64,
    /// Unix timestamp of the last applied telemetry sample.
    pub timestamp: i64,
}

/// Fleet-level counts for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct TruckStats {
    /// Trucks known to the platform.
    pub total: usize,
    /// Count per operational status string.
    pub by_status: BTreeMap<String, usize>,
}

impl TruckService {
    /// Service over the given trucks table.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Every truck in the fleet.
    pub async fn list(&self) -> Result<Vec<Record>> {
        Ok(self.store.scan(&self.table, None).await?)
    }

    /// One truck by id.
    pub async fn get(&self, truck_id: &str) -> Result<Record> {
        self.store
            .get(&self.table, truck_id)
            .await?
            .ok_or_else(|| ControllerError::not_found("truck", truck_id))
    }

    /// Register a truck. `truck_name`, `truck_model`, and `manufacture_year`
    /// are required; an id is generated unless the caller supplies one.
    pub async fn create(&self, mut payload: Record) -> Result<Record> {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|field| !payload.contains_key(**field))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ControllerError::Validation(format!(
                "missing required fields: {missing:?}"
            )));
        }
        validate_truck_fields(&payload)?;

        let truck_id = match payload.get("truck_id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => format!("truck-{}", Uuid::new_v4()),
        };
        payload.insert("truck_id".to_owned(), json!(truck_id.clone()));

        let now = unix_timestamp();
        payload.insert("created_at".to_owned(), json!(now));
        payload.insert("last_updated".to_owned(), json!(now));
        payload
            .entry("status".to_owned())
            .or_insert_with(|| json!("idle"));

        self.store.put(&self.table, &truck_id, payload.clone()).await?;
        info!(truck = %truck_id, "truck registered");
        Ok(payload)
    }

    /// Partial update; unlisted fields are untouched and the id is immutable.
    pub async fn update(&self, truck_id: &str, mut fields: Record) -> Result<Record> {
        self.get(truck_id).await?;
        validate_truck_fields(&fields)?;
        fields.remove("truck_id");
        fields.insert("last_updated".to_owned(), json!(unix_timestamp()));
        self.store.update(&self.table, truck_id, fields).await?;
        self.get(truck_id).await
    }

    /// Remove a truck from the fleet.
    pub async fn delete(&self, truck_id: &str) -> Result<()> {
        self.get(truck_id).await?;
        self.store.delete(&self.table, truck_id).await?;
        info!(truck = %truck_id, "truck deleted");
        Ok(())
    }

    /// Last known position, defaulting to zeros before any telemetry.
    pub async fn location(&self, truck_id: &str) -> Result<TruckLocation> {
        let record = self.get(truck_id).await?;
        Ok(TruckLocation {
            truck_id: truck_id.to_owned(),
            latitude: number(&record, "latitude"),
            longitude: number(&record, "longitude"),
            speed: number(&record, "speed"),
            heading: number(&record, "heading"),
            timestamp: unix_timestamp(),
        })
    }

    /// Operational health view.
    pub async fn status(&self, truck_id: &str) -> Result<TruckStatus> {
        let record = self.get(truck_id).await?;
        Ok(TruckStatus {
            truck_id: truck_id.to_owned(),
            status: string(&record, "status", "unknown"),
            fuel_level: number(&record, "fuel_level"),
            battery_level: number(&record, "battery_level"),
            engine_temperature: number(&record, "engine_temperature"),
            timestamp: unix_timestamp(),
        })
    }

    /// Position and status combined, the shape the live map polls.
    pub async fn telemetry(&self, truck_id: &str) -> Result<TruckTelemetry> {
        let record = self.get(truck_id).await?;
        Ok(TruckTelemetry {
            truck_id: truck_id.to_owned(),
            status: string(&record, "status", "unknown"),
            latitude: number(&record, "latitude"),
            longitude: number(&record, "longitude"),
            speed: number(&record, "speed"),
            heading: number(&record, "heading"),
            telemetry_seq: record
                .get("telemetry_seq")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            timestamp: record.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
        })
    }

    /// Fleet counts grouped by status.
    pub async fn stats(&self) -> Result<TruckStats> {
        let trucks = self.list().await?;
        let mut by_status = BTreeMap::new();
        for truck in &trucks {
            let status = string(truck, "status", "unknown");
            *by_status.entry(status).or_insert(0) += 1;
        }
        Ok(TruckStats {
            total: trucks.len(),
            by_status,
        })
    }
}

fn validate_truck_fields(record: &Record) -> Result<()> {
    for field in ["truck_name", "truck_model"] {
        if let Some(value) = record.get(field) {
            if !value.is_string() {
                return Err(ControllerError::Validation(format!(
                    "{field} must be a string"
                )));
            }
        }
    }
    if let Some(value) = record.get("manufacture_year") {
        if !value.is_i64() && !value.is_u64() {
            return Err(ControllerError::Validation(
                "manufacture_year must be an integer".to_owned(),
            ));
        }
    }
    Ok(())
}

fn number(record: &Record, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn string(record: &Record, field: &str, default: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_owned()
}
