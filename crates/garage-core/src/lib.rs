//! Shared vocabulary for the garage door controller.
//!
//! This crate holds the value types every other crate speaks in
//! ([`DoorId`], [`DoorStatus`]), the error taxonomy ([`Error`]) and the
//! default timings and pin assignments. It performs no I/O.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
