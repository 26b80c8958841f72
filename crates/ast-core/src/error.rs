//! ---
//! ast_section: "02-fleet-controllers"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Controller error taxonomy."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use ast_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the fleet controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Payload failed structural validation; nothing was written.
    #[error("{0}")]
    Validation(String),
    /// The referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `truck`.
        kind: &'static str,
        /// Primary key that was looked up.
        id: String,
    },
    /// The operation conflicts with existing state, e.g. a duplicate user.
    #[error("{0}")]
    Conflict(String),
    /// Credentials did not match.
    #[error("invalid username or password")]
    Unauthorized,
    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControllerError {
    /// `NotFound` for the given entity kind and key.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
