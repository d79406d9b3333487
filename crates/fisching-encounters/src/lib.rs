//! # Fisching Encounters
//!
//! Background encounter scheduling for Fisching.
//!
//! This crate decides, independently of the player's actions, when special
//! encounters start and end:
//! - World events (global, chance-triggered buffs)
//! - Pool hunts (disturbance-triggered spawns, one per pool)
//! - Shared loop lifecycle and notification buffering
//! - Dev-tool forced triggers
//! - Snapshots in remaining durations
//! - Catalog normalisation and scheduler configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod catalog;
pub mod config;
pub mod devtools;
pub mod events;
pub mod hunts;
pub mod lifecycle;
pub mod session;
pub mod snapshot;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::*;
    pub use crate::config::*;
    pub use crate::devtools::*;
    pub use crate::events::*;
    pub use crate::hunts::*;
    pub use crate::lifecycle::*;
    pub use crate::session::*;
    pub use crate::snapshot::*;
}

pub use prelude::*;
