//! Pin backend implementations.
//!
//! - [`SimulatedChip`]: always available, used in tests and on development
//!   machines.
//! - [`CdevChip`]: GPIO character device (feature `hardware-cdev`).
//! - [`MmapChip`]: memory-mapped registers (feature `hardware-mmap`).

#[cfg(feature = "hardware-cdev")]
pub mod cdev;
#[cfg(feature = "hardware-mmap")]
pub mod mmap;
pub mod simulated;

#[cfg(feature = "hardware-cdev")]
pub use cdev::CdevChip;
#[cfg(feature = "hardware-mmap")]
pub use mmap::MmapChip;
pub use simulated::{SimulatedChip, SimulatedChipHandle};
