//! GPIO character device backend (`/dev/gpiochipN`).
//!
//! Uses the Linux GPIO v2 uAPI through `tokio-gpiod`. This is the mechanism
//! the Raspberry Pi 5 requires (its GPIO block sits behind the RP1 south
//! bridge and is not reachable through `/dev/gpiomem`) and the recommended
//! one on any other modern Linux board.
//!
//! Each claimed pin holds its own line request; dropping the request hands
//! the line back to the kernel.

use crate::{
    HardwareError, Result,
    traits::PinChip,
    types::{BackendKind, ChipInfo, Direction, Level, Pull},
};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio_gpiod::{Bias, Chip, Input, Lines, Options, Output};
use tracing::debug;

/// Consumer label shown by `gpioinfo` for claimed lines.
const CONSUMER: &str = "garage";

enum CdevLine {
    Input(Lines<Input>),
    Output { lines: Lines<Output>, level: Level },
}

impl CdevLine {
    fn direction(&self) -> Direction {
        match self {
            CdevLine::Input(_) => Direction::Input,
            CdevLine::Output { .. } => Direction::Output,
        }
    }
}

/// Character device chip.
pub struct CdevChip {
    chip: Chip,
    label: String,
    /// `None` once the chip is closed.
    lines: Mutex<Option<HashMap<u32, CdevLine>>>,
}

impl std::fmt::Debug for CdevChip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdevChip")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl CdevChip {
    /// Open `/dev/gpiochip{index}`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if the device node is
    /// missing or not accessible.
    pub async fn open(index: u32) -> Result<Self> {
        let label = format!("gpiochip{index}");
        let chip = Chip::new(format!("/dev/{label}")).await.map_err(|e| {
            HardwareError::initialization_failed(format!("cannot open {label}: {e}"))
        })?;
        debug!(chip = %label, "GPIO character device opened");

        Ok(Self {
            chip,
            label,
            lines: Mutex::new(Some(HashMap::new())),
        })
    }
}

fn bias(pull: Pull) -> Bias {
    match pull {
        Pull::None => Bias::Disable,
        Pull::Up => Bias::PullUp,
        Pull::Down => Bias::PullDown,
    }
}

impl PinChip for CdevChip {
    async fn claim_output(&self, pin: u32, initial: Level) -> Result<()> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        if let Some(line) = lines.get(&pin) {
            return Err(HardwareError::AlreadyClaimed {
                pin,
                direction: line.direction(),
            });
        }

        let options = Options::output([pin])
            .values([initial.is_high()])
            .consumer(CONSUMER);
        let request = self.chip.request_lines(options).await.map_err(|e| {
            HardwareError::backend(format!("request output line {pin} on {}: {e}", self.label))
        })?;

        lines.insert(
            pin,
            CdevLine::Output {
                lines: request,
                level: initial,
            },
        );
        Ok(())
    }

    async fn claim_input(&self, pin: u32, pull: Pull) -> Result<()> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        match lines.get(&pin) {
            Some(CdevLine::Input(_)) => return Ok(()),
            Some(line) => {
                return Err(HardwareError::AlreadyClaimed {
                    pin,
                    direction: line.direction(),
                });
            }
            None => {}
        }

        let options = Options::input([pin]).bias(bias(pull)).consumer(CONSUMER);
        let request = self.chip.request_lines(options).await.map_err(|e| {
            HardwareError::backend(format!("request input line {pin} on {}: {e}", self.label))
        })?;

        lines.insert(pin, CdevLine::Input(request));
        Ok(())
    }

    async fn read(&self, pin: u32) -> Result<Level> {
        let guard = self.lines.lock().await;
        let lines = guard.as_ref().ok_or(HardwareError::ChipClosed)?;

        match lines.get(&pin) {
            None => Err(HardwareError::NotClaimed { pin }),
            Some(CdevLine::Output { level, .. }) => Ok(*level),
            Some(CdevLine::Input(request)) => {
                let values = request.get_values([false]).await?;
                Ok(Level::from(values[0]))
            }
        }
    }

    async fn write(&self, pin: u32, level: Level) -> Result<()> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;

        match lines.get_mut(&pin) {
            None => Err(HardwareError::NotClaimed { pin }),
            Some(CdevLine::Input(_)) => Err(HardwareError::WrongDirection {
                pin,
                direction: Direction::Input,
            }),
            Some(CdevLine::Output {
                lines: request,
                level: current,
            }) => {
                request.set_values([level.is_high()]).await?;
                *current = level;
                Ok(())
            }
        }
    }

    async fn release(&self, pin: u32) -> Result<()> {
        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut().ok_or(HardwareError::ChipClosed)?;
        lines.remove(&pin);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(lines) = self.lines.lock().await.take() {
            debug!(chip = %self.label, released = lines.len(), "GPIO character device closed");
        }
        Ok(())
    }

    fn info(&self) -> ChipInfo {
        ChipInfo::new(BackendKind::Cdev, self.label.clone())
    }
}
