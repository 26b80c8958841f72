//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Fleet CRUD controllers over the storage collaborators."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Fleet controllers for the AST platform.
//!
//! Each service wraps one table of the [`RecordStore`](ast_store::RecordStore)
//! and applies the platform's validation and defaulting rules. Records stay
//! schemaless JSON maps: callers may attach extra fields and they round-trip
//! untouched.

pub mod alerts;
pub mod error;
pub mod routes;
pub mod trucks;
pub mod users;
pub mod vision;

pub use alerts::{AlertResolution, AlertService, AlertStats};
pub use error::{ControllerError, Result};
pub use routes::{RouteService, RouteStats};
pub use trucks::{TruckLocation, TruckService, TruckStats, TruckStatus, TruckTelemetry};
pub use users::{hash_password, issue_token, UserService};
pub use vision::{
    Detection, DetectionModel, FixedDetectionModel, StubDetectionModel, VisionOutcome,
    VisionService, VisionStats, EMERGENCY_CLASSES,
};
