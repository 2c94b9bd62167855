//! Pin chip trait definition.
//!
//! [`PinChip`] is the contract between the door controller and a GPIO
//! backend. Every backend must behave identically from the caller's point of
//! view so the controller never branches on which one is in use:
//!
//! - reading or writing a pin that was never claimed fails with
//!   [`HardwareError::NotClaimed`](crate::HardwareError::NotClaimed)
//! - writing a pin claimed as input fails with
//!   [`HardwareError::WrongDirection`](crate::HardwareError::WrongDirection)
//! - claiming an input twice is a no-op, so two doors may share one sensor
//! - claiming a pin with the other direction fails with
//!   [`HardwareError::AlreadyClaimed`](crate::HardwareError::AlreadyClaimed)
//! - releasing an unclaimed pin is a no-op
//! - `close` releases everything, is idempotent, and every later operation
//!   fails with [`HardwareError::ChipClosed`](crate::HardwareError::ChipClosed)
//!
//! All methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT) and
//! take `&self`, so a single chip can be shared between the poller and
//! concurrent triggers.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{ChipInfo, Level, Pull};

/// GPIO chip abstraction.
///
/// # Object Safety and Dynamic Dispatch
///
/// This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic parameters, or the
/// [`AnyPinChip`](crate::chips::AnyPinChip) enum wrapper when the backend is
/// chosen at runtime.
///
/// # Examples
///
/// ```
/// use garage_hardware::traits::PinChip;
/// use garage_hardware::types::{Level, Pull};
/// use garage_hardware::Result;
///
/// async fn press<C: PinChip>(chip: &C, relay: u32) -> Result<()> {
///     chip.write(relay, Level::Low).await?;
///     chip.write(relay, Level::High).await
/// }
///
/// async fn is_closed<C: PinChip>(chip: &C, sensor: u32) -> Result<bool> {
///     chip.claim_input(sensor, Pull::Up).await?;
///     Ok(chip.read(sensor).await?.is_high())
/// }
/// ```
pub trait PinChip: Send + Sync {
    /// Claim a line as output, driving `initial` immediately.
    async fn claim_output(&self, pin: u32, initial: Level) -> Result<()>;

    /// Claim a line as input with the given bias.
    async fn claim_input(&self, pin: u32, pull: Pull) -> Result<()>;

    /// Read the current level of a claimed line.
    ///
    /// Output lines report the level last driven.
    async fn read(&self, pin: u32) -> Result<Level>;

    /// Drive a claimed output line.
    async fn write(&self, pin: u32, level: Level) -> Result<()>;

    /// Give a line back to the system.
    async fn release(&self, pin: u32) -> Result<()>;

    /// Release every claimed line and close the chip.
    async fn close(&self) -> Result<()>;

    /// Describe the chip.
    fn info(&self) -> ChipInfo;
}
