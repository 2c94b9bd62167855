//! Simulated pin chip for hosts without GPIO hardware.
//!
//! The simulation keeps an in-memory line table and behaves exactly like the
//! hardware backends from the caller's side. A [`SimulatedChipHandle`] plays
//! the role of the outside world: it drives input lines (reed switches),
//! inspects outputs (relays), and injects read or write faults.
//!
//! Everything is deterministic. Unless a test drives an input explicitly, it
//! reads the resting level of its pull resistor, so a pulled-up reed switch
//! sensor reads HIGH ("closed" with the usual wiring).

use crate::{
    HardwareError, Result,
    traits::PinChip,
    types::{BackendKind, ChipInfo, Direction, Level, Pull},
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct SimLine {
    direction: Direction,
    level: Level,
    pull: Pull,
}

/// Relay/sensor pair that moves like a real door when the relay is pressed.
#[derive(Debug, Clone, Copy)]
struct DoorLink {
    sensor: u32,
    active: Level,
}

#[derive(Debug, Default)]
struct SimState {
    lines: HashMap<u32, SimLine>,
    driven: HashMap<u32, Level>,
    writes: Vec<(u32, Level)>,
    failing_reads: HashSet<u32>,
    failing_writes: HashSet<u32>,
    links: HashMap<u32, DoorLink>,
    closed: bool,
}

impl SimState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(HardwareError::ChipClosed);
        }
        Ok(())
    }

    /// Level an input line currently presents.
    fn input_level(&self, pin: u32) -> Level {
        self.driven.get(&pin).copied().unwrap_or_else(|| {
            self.lines
                .get(&pin)
                .map_or(Level::High, |line| line.pull.resting_level())
        })
    }
}

fn injected(operation: &str, pin: u32) -> HardwareError {
    HardwareError::Io(std::io::Error::other(format!(
        "injected {operation} fault on pin {pin}"
    )))
}

/// In-memory pin chip.
///
/// # Examples
///
/// ```
/// use garage_hardware::backend::SimulatedChip;
/// use garage_hardware::traits::PinChip;
/// use garage_hardware::types::{Level, Pull};
///
/// #[tokio::main]
/// async fn main() -> garage_hardware::Result<()> {
///     let (chip, handle) = SimulatedChip::new();
///
///     chip.claim_input(11, Pull::Up).await?;
///     assert_eq!(chip.read(11).await?, Level::High);
///
///     // The reed switch opens
///     handle.set_input(11, Level::Low);
///     assert_eq!(chip.read(11).await?, Level::Low);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    state: Arc<Mutex<SimState>>,
    label: String,
}

impl SimulatedChip {
    /// Create a new simulated chip with the default label.
    ///
    /// Returns a tuple of (SimulatedChip, SimulatedChipHandle) where the
    /// handle controls the simulated environment.
    pub fn new() -> (Self, SimulatedChipHandle) {
        Self::with_label("simulated")
    }

    /// Create a new simulated chip with a custom label.
    pub fn with_label(label: impl Into<String>) -> (Self, SimulatedChipHandle) {
        let state = Arc::new(Mutex::new(SimState::default()));
        let chip = Self {
            state: Arc::clone(&state),
            label: label.into(),
        };
        (chip, SimulatedChipHandle { state })
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PinChip for SimulatedChip {
    async fn claim_output(&self, pin: u32, initial: Level) -> Result<()> {
        let mut state = self.state();
        state.ensure_open()?;

        if let Some(line) = state.lines.get(&pin) {
            return Err(HardwareError::AlreadyClaimed {
                pin,
                direction: line.direction,
            });
        }

        state.lines.insert(
            pin,
            SimLine {
                direction: Direction::Output,
                level: initial,
                pull: Pull::None,
            },
        );
        trace!(pin, level = %initial, "simulated output claimed");
        Ok(())
    }

    async fn claim_input(&self, pin: u32, pull: Pull) -> Result<()> {
        let mut state = self.state();
        state.ensure_open()?;

        match state.lines.get(&pin) {
            Some(line) if line.direction == Direction::Input => Ok(()),
            Some(line) => Err(HardwareError::AlreadyClaimed {
                pin,
                direction: line.direction,
            }),
            None => {
                state.lines.insert(
                    pin,
                    SimLine {
                        direction: Direction::Input,
                        level: pull.resting_level(),
                        pull,
                    },
                );
                trace!(pin, ?pull, "simulated input claimed");
                Ok(())
            }
        }
    }

    async fn read(&self, pin: u32) -> Result<Level> {
        let state = self.state();
        state.ensure_open()?;

        let line = state
            .lines
            .get(&pin)
            .ok_or(HardwareError::NotClaimed { pin })?;
        if state.failing_reads.contains(&pin) {
            return Err(injected("read", pin));
        }

        Ok(match line.direction {
            Direction::Input => state.input_level(pin),
            Direction::Output => line.level,
        })
    }

    async fn write(&self, pin: u32, level: Level) -> Result<()> {
        let mut state = self.state();
        state.ensure_open()?;

        let previous = match state.lines.get(&pin) {
            None => return Err(HardwareError::NotClaimed { pin }),
            Some(line) if line.direction == Direction::Input => {
                return Err(HardwareError::WrongDirection {
                    pin,
                    direction: Direction::Input,
                });
            }
            Some(line) => line.level,
        };
        if state.failing_writes.contains(&pin) {
            return Err(injected("write", pin));
        }

        if let Some(line) = state.lines.get_mut(&pin) {
            line.level = level;
        }
        state.writes.push((pin, level));

        // Button released: a linked door starts moving to the other end.
        if let Some(link) = state.links.get(&pin).copied()
            && previous == link.active
            && level != link.active
        {
            let current = state.input_level(link.sensor);
            state.driven.insert(link.sensor, !current);
            trace!(relay = pin, sensor = link.sensor, "simulated door moved");
        }

        Ok(())
    }

    async fn release(&self, pin: u32) -> Result<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.lines.remove(&pin);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state();
        state.lines.clear();
        state.closed = true;
        Ok(())
    }

    fn info(&self) -> ChipInfo {
        ChipInfo::new(BackendKind::Simulated, self.label.clone())
    }
}

/// Handle for controlling a simulated chip's environment.
///
/// Cloneable and shareable across tasks. All methods are synchronous.
#[derive(Debug, Clone)]
pub struct SimulatedChipHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedChipHandle {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive an input line from the outside (e.g., a reed switch changing).
    pub fn set_input(&self, pin: u32, level: Level) {
        self.state().driven.insert(pin, level);
    }

    /// Stop driving an input line so it falls back to its pull level.
    pub fn clear_input(&self, pin: u32) {
        self.state().driven.remove(&pin);
    }

    /// Current level of a claimed line, as the chip would report it.
    pub fn level(&self, pin: u32) -> Option<Level> {
        let state = self.state();
        let line = state.lines.get(&pin)?;
        Some(match line.direction {
            Direction::Input => state.input_level(pin),
            Direction::Output => line.level,
        })
    }

    /// Direction a line is claimed with, if claimed.
    pub fn direction(&self, pin: u32) -> Option<Direction> {
        self.state().lines.get(&pin).map(|line| line.direction)
    }

    /// Check if a line is currently claimed.
    pub fn is_claimed(&self, pin: u32) -> bool {
        self.state().lines.contains_key(&pin)
    }

    /// Check if the chip was closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(u32, Level)> {
        self.state().writes.clone()
    }

    /// Successful writes to one line, in order.
    pub fn writes_to(&self, pin: u32) -> Vec<Level> {
        self.state()
            .writes
            .iter()
            .filter(|(written, _)| *written == pin)
            .map(|(_, level)| *level)
            .collect()
    }

    /// Make reads of a line fail (or succeed again).
    pub fn fail_reads(&self, pin: u32, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_reads.insert(pin);
        } else {
            state.failing_reads.remove(&pin);
        }
    }

    /// Make writes to a line fail (or succeed again).
    pub fn fail_writes(&self, pin: u32, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing_writes.insert(pin);
        } else {
            state.failing_writes.remove(&pin);
        }
    }

    /// Link a relay to a sensor so releasing the relay toggles the sensor.
    ///
    /// `active` is the relay level that counts as "button pressed".
    pub fn link_door(&self, relay: u32, sensor: u32, active: Level) {
        self.state()
            .links
            .insert(relay, DoorLink { sensor, active });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_input_reads_pull_level_by_default() {
        let (chip, _handle) = SimulatedChip::new();
        chip.claim_input(11, Pull::Up).await.unwrap();
        chip.claim_input(12, Pull::Down).await.unwrap();

        assert_eq!(chip.read(11).await.unwrap(), Level::High);
        assert_eq!(chip.read(12).await.unwrap(), Level::Low);
    }

    #[tokio::test]
    async fn test_driven_input_overrides_pull() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_input(11, Pull::Up).await.unwrap();

        handle.set_input(11, Level::Low);
        assert_eq!(chip.read(11).await.unwrap(), Level::Low);

        handle.clear_input(11);
        assert_eq!(chip.read(11).await.unwrap(), Level::High);
    }

    #[tokio::test]
    async fn test_output_write_and_readback() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_output(9, Level::High).await.unwrap();

        chip.write(9, Level::Low).await.unwrap();
        assert_eq!(chip.read(9).await.unwrap(), Level::Low);
        assert_eq!(handle.level(9), Some(Level::Low));
        assert_eq!(handle.writes_to(9), vec![Level::Low]);
    }

    #[tokio::test]
    async fn test_unclaimed_pin_is_rejected() {
        let (chip, _handle) = SimulatedChip::new();

        assert!(matches!(
            chip.read(5).await,
            Err(HardwareError::NotClaimed { pin: 5 })
        ));
        assert!(matches!(
            chip.write(5, Level::High).await,
            Err(HardwareError::NotClaimed { pin: 5 })
        ));
    }

    #[tokio::test]
    async fn test_write_to_input_is_rejected() {
        let (chip, _handle) = SimulatedChip::new();
        chip.claim_input(4, Pull::Up).await.unwrap();

        assert!(matches!(
            chip.write(4, Level::Low).await,
            Err(HardwareError::WrongDirection { pin: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_shared_input_claim_is_idempotent() {
        let (chip, _handle) = SimulatedChip::new();
        chip.claim_input(11, Pull::Up).await.unwrap();
        chip.claim_input(11, Pull::Up).await.unwrap();
    }

    #[tokio::test]
    async fn test_conflicting_claim_is_rejected() {
        let (chip, _handle) = SimulatedChip::new();
        chip.claim_output(9, Level::High).await.unwrap();

        assert!(matches!(
            chip.claim_input(9, Pull::Up).await,
            Err(HardwareError::AlreadyClaimed { pin: 9, .. })
        ));
        assert!(matches!(
            chip.claim_output(9, Level::High).await,
            Err(HardwareError::AlreadyClaimed { pin: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_output(9, Level::High).await.unwrap();

        chip.release(9).await.unwrap();
        chip.release(9).await.unwrap();
        assert!(!handle.is_claimed(9));
    }

    #[tokio::test]
    async fn test_closed_chip_rejects_operations() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_output(9, Level::High).await.unwrap();

        chip.close().await.unwrap();
        chip.close().await.unwrap();

        assert!(handle.is_closed());
        assert!(!handle.is_claimed(9));
        assert!(matches!(
            chip.write(9, Level::Low).await,
            Err(HardwareError::ChipClosed)
        ));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_input(11, Pull::Up).await.unwrap();
        chip.claim_output(9, Level::High).await.unwrap();

        handle.fail_reads(11, true);
        handle.fail_writes(9, true);
        assert!(matches!(chip.read(11).await, Err(HardwareError::Io(_))));
        assert!(matches!(
            chip.write(9, Level::Low).await,
            Err(HardwareError::Io(_))
        ));
        assert!(handle.writes().is_empty());

        handle.fail_reads(11, false);
        assert_eq!(chip.read(11).await.unwrap(), Level::High);
    }

    #[tokio::test]
    async fn test_linked_door_toggles_on_release() {
        let (chip, handle) = SimulatedChip::new();
        chip.claim_output(9, Level::High).await.unwrap();
        chip.claim_input(11, Pull::Up).await.unwrap();
        handle.link_door(9, 11, Level::Low);

        // Press: nothing moves yet
        chip.write(9, Level::Low).await.unwrap();
        assert_eq!(chip.read(11).await.unwrap(), Level::High);

        // Release: the door travels
        chip.write(9, Level::High).await.unwrap();
        assert_eq!(chip.read(11).await.unwrap(), Level::Low);

        // Idle-to-idle write is not a press
        chip.write(9, Level::High).await.unwrap();
        assert_eq!(chip.read(11).await.unwrap(), Level::Low);

        chip.write(9, Level::Low).await.unwrap();
        chip.write(9, Level::High).await.unwrap();
        assert_eq!(chip.read(11).await.unwrap(), Level::High);
    }

    #[test]
    fn test_info() {
        let (chip, _handle) = SimulatedChip::with_label("bench");
        let info = chip.info();
        assert_eq!(info.backend, BackendKind::Simulated);
        assert_eq!(info.label, "bench");
    }
}
