//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Alert lifecycle: raise, update, resolve, and query."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use ast_common::unix_timestamp;
use ast_store::{Record, RecordStore, ScanFilter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{ControllerError, Result};

/// Alert lifecycle over the alerts table.
#[derive(Clone)]
pub struct AlertService {
    store: Arc<dyn RecordStore>,
    table: String,
}

/// Optional notes attached when an alert is resolved.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertResolution {
    /// Free-form operator notes.
    pub resolution_notes: Option<String>,
    /// Action taken, e.g. `dispatched_maintenance`.
    pub resolution_action: Option<String>,
}

/// Alert counts for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    /// All alerts ever raised.
    pub total: usize,
    /// Alerts still active.
    pub active: usize,
    /// Alerts resolved.
    pub resolved: usize,
    /// Count per severity string.
    pub by_severity: BTreeMap<String, usize>,
}

impl AlertService {
    /// Service over the given alerts table.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Every alert, regardless of status.
    pub async fn list(&self) -> Result<Vec<Record>> {
        Ok(self.store.scan(&self.table, None).await?)
    }

    /// One alert by id.
    pub async fn get(&self, alert_id: &str) -> Result<Record> {
        self.store
            .get(&self.table, alert_id)
            .await?
            .ok_or_else(|| ControllerError::not_found("alert", alert_id))
    }

    /// Raise an alert. Defaults: generated `alert-{uuid}` id, status
    /// `active`, creation timestamps.
    pub async fn create(&self, mut payload: Record) -> Result<Record> {
        let alert_id = match payload.get("alert_id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => format!("alert-{}", Uuid::new_v4()),
        };
        payload.insert("alert_id".to_owned(), json!(alert_id.clone()));

        let now = unix_timestamp();
        payload.insert("created_at".to_owned(), json!(now));
        payload.insert("updated_at".to_owned(), json!(now));
        payload
            .entry("status".to_owned())
            .or_insert_with(|| json!("active"));

        self.store.put(&self.table, &alert_id, payload.clone()).await?;
        info!(alert = %alert_id, "alert raised");
        Ok(payload)
    }

    /// Partial update; the id is immutable.
    pub async fn update(&self, alert_id: &str, mut fields: Record) -> Result<Record> {
        self.get(alert_id).await?;
        fields.remove("alert_id");
        fields.insert("updated_at".to_owned(), json!(unix_timestamp()));
        self.store.update(&self.table, alert_id, fields).await?;
        self.get(alert_id).await
    }

    /// Mark an alert resolved, stamping `resolved_at` and attaching any
    /// resolution notes.
    pub async fn resolve(&self, alert_id: &str, resolution: AlertResolution) -> Result<Record> {
        self.get(alert_id).await?;
        let now = unix_timestamp();
        let mut fields = Record::new();
        fields.insert("status".to_owned(), json!("resolved"));
        fields.insert("resolved_at".to_owned(), json!(now));
        fields.insert("updated_at".to_owned(), json!(now));
        if let Some(notes) = resolution.resolution_notes {
            fields.insert("resolution_notes".to_owned(), json!(notes));
        }
        if let Some(action) = resolution.resolution_action {
            fields.insert("resolution_action".to_owned(), json!(action));
        }
        self.store.update(&self.table, alert_id, fields).await?;
        info!(alert = %alert_id, "alert resolved");
        self.get(alert_id).await
    }

    /// Delete an alert.
    pub async fn delete(&self, alert_id: &str) -> Result<()> {
        self.get(alert_id).await?;
        self.store.delete(&self.table, alert_id).await?;
        Ok(())
    }

    /// Alerts whose status is still `active`.
    pub async fn active(&self) -> Result<Vec<Record>> {
        let filter = ScanFilter::equals("status", "active");
        Ok(self.store.scan(&self.table, Some(&filter)).await?)
    }

    /// Alerts raised against one truck.
    pub async fn by_truck(&self, truck_id: &str) -> Result<Vec<Record>> {
        let filter = ScanFilter::equals("truck_id", truck_id);
        Ok(self.store.scan(&self.table, Some(&filter)).await?)
    }

    /// Alerts at one severity level.
    pub async fn by_severity(&self, severity: &str) -> Result<Vec<Record>> {
        let filter = ScanFilter::equals("severity", severity);
        Ok(self.store.scan(&self.table, Some(&filter)).await?)
    }

    /// The `limit` most recently raised alerts, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Record>> {
        let mut alerts = self.list().await?;
        alerts.sort_by_key(|alert| {
            std::cmp::Reverse(alert.get("created_at").and_then(Value::as_i64).unwrap_or(0))
        });
        alerts.truncate(limit);
        Ok(alerts)
    }

    /// Alert counts grouped by status and severity.
    pub async fn stats(&self) -> Result<AlertStats> {
        let alerts = self.list().await?;
        let mut by_severity = BTreeMap::new();
        let mut active = 0;
        let mut resolved = 0;
        for alert in &alerts {
            match alert.get("status").and_then(Value::as_str) {
                Some("active") => active += 1,
                Some("resolved") => resolved += 1,
                _ => {}
            }
            let severity = alert
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned();
            *by_severity.entry(severity).or_insert(0) += 1;
        }
        Ok(AlertStats {
            total: alerts.len(),
            active,
            resolved,
            by_severity,
        })
    }
}
