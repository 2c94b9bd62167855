//! Pin abstraction layer for the garage door controller.
//!
//! This crate gives the controller a uniform way to claim, read and drive
//! GPIO lines, whatever the board underneath:
//!
//! - **Character device** ([`backend::CdevChip`]): `/dev/gpiochipN`, required
//!   on the Raspberry Pi 5 and preferred on other modern boards.
//! - **Memory-mapped** ([`backend::MmapChip`]): `/dev/gpiomem`, the legacy
//!   path on Raspberry Pi 1-4.
//! - **Simulated** ([`backend::SimulatedChip`]): deterministic in-memory lines
//!   for development machines and tests.
//!
//! # Design Philosophy
//!
//! - **Async-first**: all pin operations are native `async fn` in traits.
//! - **Shared**: every method takes `&self`, so the poller and concurrent
//!   triggers can use one chip.
//! - **Backend-agnostic**: all backends share the claim/read/write semantics
//!   documented on [`PinChip`]. The controller holds an [`AnyPinChip`] and
//!   never branches on the backend.
//!
//! # Example
//!
//! ```
//! use garage_hardware::backend::SimulatedChip;
//! use garage_hardware::{AnyPinChip, Level, PinChip, Pull};
//!
//! #[tokio::main]
//! async fn main() -> garage_hardware::Result<()> {
//!     let (chip, handle) = SimulatedChip::new();
//!     let chip = AnyPinChip::from(chip);
//!
//!     chip.claim_output(9, Level::High).await?;
//!     chip.claim_input(11, Pull::Up).await?;
//!
//!     handle.set_input(11, Level::Low);
//!     assert!(chip.read(11).await?.is_low());
//!     Ok(())
//! }
//! ```
//!
//! # Backend Selection
//!
//! [`probe::detect_backend`] reads the host's device-tree model and picks a
//! backend; see the [`probe`] module for the rules.

pub mod backend;
pub mod chips;
pub mod error;
pub mod probe;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use chips::AnyPinChip;
pub use error::{HardwareError, Result};
pub use traits::PinChip;
pub use types::{BackendKind, ChipInfo, Direction, Level, Pull};
