//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Simulation session manager coordinating workers and telemetry."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Simulation session manager for the AST platform.
//!
//! One [`SessionRegistry`] owns every simulation session in the process.
//! Each started session gets a dedicated worker task that drives the external
//! driving simulator through a fixed stage sequence, streams log lines into
//! the session record, and forwards periodic vehicle telemetry to a
//! [`TelemetrySink`]. Cancellation is cooperative: `stop` flips a watch
//! channel that the worker observes at its check-points.

pub mod registry;
pub mod session;
pub mod simulator;
pub mod telemetry;
mod worker;

pub use registry::{RegistryError, RegistryOptions, SessionRegistry, StartAck, StopAck};
pub use session::{
    LogLine, SessionDigest, SessionRecord, SessionResult, SessionSnapshot, SessionSpec,
    SessionState,
};
pub use simulator::{
    SimulatorClient, SimulatorError, SimulatorWorld, StubSimulator, VehicleHandle, VehicleState,
};
pub use telemetry::{MemoryTelemetrySink, StoreTelemetrySink, TelemetrySample, TelemetrySink};
