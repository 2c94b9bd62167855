//! Garage door controller.
//!
//! Ties the pin chip to per-door state:
//!
//! - [`config`]: wiring, polarity and timing
//! - [`state_machine`]: pure status transitions
//! - [`fanout`]: observer and broadcast notification
//! - [`controller`]: the [`GarageController`] handle
//!
//! The poller and the relay sequencer are internal.

pub mod config;
pub mod controller;
pub mod fanout;
mod poller;
mod sequencer;
pub mod state_machine;

pub use config::{BackendSelection, ControllerConfig, DoorConfig, Timing};
pub use controller::GarageController;
pub use fanout::{DoorEvent, ObserverError, StatusObserver};
pub use state_machine::{SensorPolarity, Travel};
