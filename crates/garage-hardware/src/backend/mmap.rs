//! Memory-mapped GPIO backend (`/dev/gpiomem`).
//!
//! Uses `rppal`, which drives the BCM283x/BCM2711 GPIO registers directly.
//! This is the legacy access path for Raspberry Pi 1 through 4. Pin numbers
//! are BCM numbers.

use crate::{
    HardwareError, Result,
    traits::PinChip,
    types::{BackendKind, ChipInfo, Direction, Level, Pull},
};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

enum MmapLine {
    Input(InputPin),
    Output(OutputPin),
}

impl MmapLine {
    fn direction(&self) -> Direction {
        match self {
            MmapLine::Input(_) => Direction::Input,
            MmapLine::Output(_) => Direction::Output,
        }
    }
}

fn to_rppal(level: Level) -> rppal::gpio::Level {
    match level {
        Level::Low => rppal::gpio::Level::Low,
        Level::High => rppal::gpio::Level::High,
    }
}

fn from_rppal(level: rppal::gpio::Level) -> Level {
    match level {
        rppal::gpio::Level::Low => Level::Low,
        rppal::gpio::Level::High => Level::High,
    }
}

/// Memory-mapped chip.
pub struct MmapChip {
    gpio: Gpio,
    /// `None` once the chip is closed.
    lines: Mutex<Option<HashMap<u32, MmapLine>>>,
}

impl std::fmt::Debug for MmapChip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapChip").finish_non_exhaustive()
    }
}

impl MmapChip {
    /// Map the GPIO register block.
    ///
    /// The memory-mapped interface exposes a single bank, so only chip
    /// index 0 is accepted.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if `/dev/gpiomem` cannot
    /// be mapped (wrong SoC, missing permissions).
    pub fn open(index: u32) -> Result<Self> {
        if index != 0 {
            return Err(HardwareError::unsupported(format!(
                "memory-mapped GPIO has no chip {index}"
            )));
        }
        let gpio = Gpio::new().map_err(|e| {
            HardwareError::initialization_failed(format!("cannot map /dev/gpiomem: {e}"))
        })?;
        debug!("memory-mapped GPIO opened");

        Ok(Self {
            gpio,
            lines: Mutex::new(Some(HashMap::new())),
        })
    }

    fn lines(&self) -> MutexGuard<'_, Option<HashMap<u32, MmapLine>>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bcm(pin: u32) -> Result<u8> {
        u8::try_from(pin).map_err(|_| HardwareError::InvalidPin { pin })
    }
}

impl PinChip for MmapChip {
    async fn claim_output(&self, pin: u32, initial: Level) -> Result<()> {
        let mut guard = self.lines();
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        if let Some(line) = lines.get(&pin) {
            return Err(HardwareError::AlreadyClaimed {
                pin,
                direction: line.direction(),
            });
        }

        let raw = self
            .gpio
            .get(Self::bcm(pin)?)
            .map_err(|e| HardwareError::backend(format!("claim output {pin}: {e}")))?;
        let output = match initial {
            Level::High => raw.into_output_high(),
            Level::Low => raw.into_output_low(),
        };

        lines.insert(pin, MmapLine::Output(output));
        Ok(())
    }

    async fn claim_input(&self, pin: u32, pull: Pull) -> Result<()> {
        let mut guard = self.lines();
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        match lines.get(&pin) {
            Some(MmapLine::Input(_)) => return Ok(()),
            Some(line) => {
                return Err(HardwareError::AlreadyClaimed {
                    pin,
                    direction: line.direction(),
                });
            }
            None => {}
        }

        let raw = self
            .gpio
            .get(Self::bcm(pin)?)
            .map_err(|e| HardwareError::backend(format!("claim input {pin}: {e}")))?;
        let input = match pull {
            Pull::None => raw.into_input(),
            Pull::Up => raw.into_input_pullup(),
            Pull::Down => raw.into_input_pulldown(),
        };

        lines.insert(pin, MmapLine::Input(input));
        Ok(())
    }

    async fn read(&self, pin: u32) -> Result<Level> {
        let guard = self.lines();
        let lines = guard.as_ref().ok_or(HardwareError::ChipClosed)?;

        match lines.get(&pin) {
            None => Err(HardwareError::NotClaimed { pin }),
            Some(MmapLine::Input(input)) => Ok(from_rppal(input.read())),
            Some(MmapLine::Output(output)) => Ok(Level::from(output.is_set_high())),
        }
    }

    async fn write(&self, pin: u32, level: Level) -> Result<()> {
        let mut guard = self.lines();
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        match lines.get_mut(&pin) {
            None => Err(HardwareError::NotClaimed { pin }),
            Some(MmapLine::Input(_)) => Err(HardwareError::WrongDirection {
                pin,
                direction: Direction::Input,
            }),
            Some(MmapLine::Output(output)) => {
                output.write(to_rppal(level));
                Ok(())
            }
        }
    }

    async fn release(&self, pin: u32) -> Result<()> {
        let mut guard = self.lines();
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;
        // Dropping the pin resets its mode (reset-on-drop is rppal's default).
        lines.remove(&pin);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(lines) = self.lines().take() {
            debug!(released = lines.len(), "memory-mapped GPIO closed");
        }
        Ok(())
    }

    fn info(&self) -> ChipInfo {
        ChipInfo::new(BackendKind::Mmap, "/dev/gpiomem")
    }
}
