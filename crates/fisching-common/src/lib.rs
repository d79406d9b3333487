//! # Fisching Common
//!
//! Common types and seams shared by the Fisching crates.
//!
//! This crate provides the foundations the encounter schedulers build on:
//! - Monotonic clock sources (real and manual)
//! - Uniform random sources (fastrand-backed and deterministic)
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod clock;
pub mod error;
pub mod random;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::error::*;
    pub use crate::random::*;
}

pub use prelude::*;
