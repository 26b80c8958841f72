//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Delivery route planning CRUD."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use ast_common::unix_timestamp;
use ast_store::{Record, RecordStore, ScanFilter};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{ControllerError, Result};

/// CRUD over the delivery routes table.
#[derive(Clone)]
pub struct RouteService {
    store: Arc<dyn RecordStore>,
    table: String,
}

/// Route counts for the dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct RouteStats {
    /// Routes known to the platform.
    pub total: usize,
    /// Count per status string.
    pub by_status: BTreeMap<String, usize>,
}

impl RouteService {
    /// Service over the given routes table.
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    /// Every route.
    pub async fn list(&self) -> Result<Vec<Record>> {
        Ok(self.store.scan(&self.table, None).await?)
    }

    /// One route by id.
    pub async fn get(&self, route_id: &str) -> Result<Record> {
        self.store
            .get(&self.table, route_id)
            .await?
            .ok_or_else(|| ControllerError::not_found("route", route_id))
    }

    /// Plan a route. `start_location`, `end_location`, and `truck_id` are
    /// required; status defaults to `scheduled`.
    pub async fn create(&self, mut payload: Record) -> Result<Record> {
        for field in ["start_location", "end_location", "truck_id"] {
            if !payload.contains_key(field) {
                return Err(ControllerError::Validation(format!(
                    "missing required field: {field}"
                )));
            }
        }

        let route_id = match payload.get("route_id").and_then(Value::as_str) {
            Some(id) => id.to_owned(),
            None => format!("route-{}", Uuid::new_v4()),
        };
        payload.insert("route_id".to_owned(), json!(route_id.clone()));

        let now = unix_timestamp();
        payload.insert("created_at".to_owned(), json!(now));
        payload.insert("updated_at".to_owned(), json!(now));
        payload
            .entry("status".to_owned())
            .or_insert_with(|| json!("scheduled"));

        self.store.put(&self.table, &route_id, payload.clone()).await?;
        info!(route = %route_id, "route planned");
        Ok(payload)
    }

    /// Partial update; the id is immutable.
    pub async fn update(&self, route_id: &str, mut fields: Record) -> Result<Record> {
        self.get(route_id).await?;
        fields.remove("route_id");
        fields.insert("updated_at".to_owned(), json!(unix_timestamp()));
        self.store.update(&self.table, route_id, fields).await?;
        self.get(route_id).await
    }

    /// Delete a route.
    pub async fn delete(&self, route_id: &str) -> Result<()> {
        self.get(route_id).await?;
        self.store.delete(&self.table, route_id).await?;
        Ok(())
    }

    /// Routes assigned to one truck.
    pub async fn by_truck(&self, truck_id: &str) -> Result<Vec<Record>> {
        let filter = ScanFilter::equals("truck_id", truck_id);
        Ok(self.store.scan(&self.table, Some(&filter)).await?)
    }

    /// Routes in one status.
    pub async fn by_status(&self, status: &str) -> Result<Vec<Record>> {
        let filter = ScanFilter::equals("status", status);
        Ok(self.store.scan(&self.table, Some(&filter)).await?)
    }

    /// Mark a route in progress, stamping `started_at`.
    pub async fn start(&self, route_id: &str) -> Result<Record> {
        let mut fields = Record::new();
        fields.insert("status".to_owned(), json!("in_progress"));
        fields.insert("started_at".to_owned(), json!(unix_timestamp()));
        self.update(route_id, fields).await
    }

    /// Mark a route completed, stamping `completed_at`.
    pub async fn complete(&self, route_id: &str) -> Result<Record> {
        let mut fields = Record::new();
        fields.insert("status".to_owned(), json!("completed"));
        fields.insert("completed_at".to_owned(), json!(unix_timestamp()));
        self.update(route_id, fields).await
    }

    /// Route counts grouped by status.
    pub async fn stats(&self) -> Result<RouteStats> {
        let routes = self.list().await?;
        let mut by_status = BTreeMap::new();
        for route in &routes {
            let status = route
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned();
            *by_status.entry(status).or_insert(0) += 1;
        }
        Ok(RouteStats {
            total: routes.len(),
            by_status,
        })
    }
}
