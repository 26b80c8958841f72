//! ---
//! ast_section: "01-core-functionality"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Shared primitives and utilities for the platform runtime."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use chrono::Utc;

/// Current unix timestamp in whole seconds, as stored on every record.
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}
