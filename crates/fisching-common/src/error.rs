//! Error types for Fisching.
//!
//! Scheduler operations never fail; these errors only surface at the outer
//! edges where catalogs, configs and snapshots are read from text.

use thiserror::Error;

/// Top-level error type for encounter operations.
#[derive(Debug, Error)]
pub enum EncounterError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration could not be parsed or written
    #[error("Config error: {0}")]
    Config(String),

    /// Snapshot could not be encoded or decoded
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Definition catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog text could not be parsed
    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    /// A definition has an empty name
    #[error("Definition has an empty name")]
    EmptyName,

    /// A hunt does not target any pool
    #[error("Hunt '{hunt_id}' has no target pool")]
    EmptyPool {
        /// Offending hunt id
        hunt_id: String,
    },
}

/// Result type alias for encounter operations.
pub type EncounterResult<T> = Result<T, EncounterError>;
