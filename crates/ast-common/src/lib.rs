//! ---
//! ast_section: "01-core-functionality"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Shared primitives and utilities for the platform runtime."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
//! Core shared primitives for the AST platform workspace.
//! This crate exposes configuration loading, logging setup, and time
//! helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    ApiConfig, AppConfig, LoggingConfig, MetricsConfig, Mode, SessionConfig, SimulatorConfig,
    StorageConfig, TableNames,
};
pub use logging::{init_tracing, LogFormat};
pub use time::unix_timestamp;
