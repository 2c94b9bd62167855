//! Enum wrapper for pin chip dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn PinChip>` is
//! not available. [`AnyPinChip`] provides concrete dispatch over every
//! backend compiled into this build; the controller holds one of these and
//! never needs to know which backend it is talking to.
//!
//! # Examples
//!
//! ```
//! use garage_hardware::backend::SimulatedChip;
//! use garage_hardware::chips::AnyPinChip;
//! use garage_hardware::traits::PinChip;
//! use garage_hardware::types::{BackendKind, Level};
//!
//! #[tokio::main]
//! async fn main() -> garage_hardware::Result<()> {
//!     let (chip, _handle) = SimulatedChip::new();
//!     let chip = AnyPinChip::Simulated(chip);
//!
//!     chip.claim_output(9, Level::High).await?;
//!     assert_eq!(chip.info().backend, BackendKind::Simulated);
//!     Ok(())
//! }
//! ```

#[cfg(feature = "hardware-cdev")]
use crate::backend::CdevChip;
#[cfg(feature = "hardware-mmap")]
use crate::backend::MmapChip;
use crate::backend::SimulatedChip;
use crate::traits::PinChip;
use crate::types::{BackendKind, ChipInfo, Level, Pull};
use crate::{HardwareError, Result};

/// Enum wrapper for pin chip dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyPinChip {
    /// GPIO character device.
    #[cfg(feature = "hardware-cdev")]
    Cdev(CdevChip),

    /// Memory-mapped GPIO.
    #[cfg(feature = "hardware-mmap")]
    Mmap(MmapChip),

    /// In-memory simulation.
    Simulated(SimulatedChip),
}

impl AnyPinChip {
    /// Open a chip with the given backend.
    ///
    /// A simulated chip opened this way has no external handle; use
    /// [`SimulatedChip::new`] directly when the environment must be driven.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unsupported` if the backend was not compiled
    /// in, or the backend's own error if the chip cannot be opened.
    pub async fn open(kind: BackendKind, chip_index: u32) -> Result<Self> {
        match kind {
            #[cfg(feature = "hardware-cdev")]
            BackendKind::Cdev => Ok(Self::Cdev(CdevChip::open(chip_index).await?)),
            #[cfg(feature = "hardware-mmap")]
            BackendKind::Mmap => Ok(Self::Mmap(MmapChip::open(chip_index)?)),
            BackendKind::Simulated => Ok(Self::Simulated(SimulatedChip::new().0)),
            #[allow(unreachable_patterns)]
            other => Err(HardwareError::unsupported(format!(
                "{other} backend is not enabled in this build (chip {chip_index})"
            ))),
        }
    }
}

impl From<SimulatedChip> for AnyPinChip {
    fn from(chip: SimulatedChip) -> Self {
        Self::Simulated(chip)
    }
}

impl PinChip for AnyPinChip {
    async fn claim_output(&self, pin: u32, initial: Level) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.claim_output(pin, initial).await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.claim_output(pin, initial).await,
            Self::Simulated(chip) => chip.claim_output(pin, initial).await,
        }
    }

    async fn claim_input(&self, pin: u32, pull: Pull) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.claim_input(pin, pull).await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.claim_input(pin, pull).await,
            Self::Simulated(chip) => chip.claim_input(pin, pull).await,
        }
    }

    async fn read(&self, pin: u32) -> Result<Level> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.read(pin).await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.read(pin).await,
            Self::Simulated(chip) => chip.read(pin).await,
        }
    }

    async fn write(&self, pin: u32, level: Level) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.write(pin, level).await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.write(pin, level).await,
            Self::Simulated(chip) => chip.write(pin, level).await,
        }
    }

    async fn release(&self, pin: u32) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.release(pin).await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.release(pin).await,
            Self::Simulated(chip) => chip.release(pin).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.close().await,
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.close().await,
            Self::Simulated(chip) => chip.close().await,
        }
    }

    fn info(&self) -> ChipInfo {
        match self {
            #[cfg(feature = "hardware-cdev")]
            Self::Cdev(chip) => chip.info(),
            #[cfg(feature = "hardware-mmap")]
            Self::Mmap(chip) => chip.info(),
            Self::Simulated(chip) => chip.info(),
        }
    }
}
