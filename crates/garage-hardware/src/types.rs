//! Common types shared across pin backends.
//!
//! This module defines the electrical vocabulary (levels, pull modes,
//! directions) and the metadata a backend reports about itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Not;

/// Electrical level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Logic 0.
    Low,

    /// Logic 1.
    High,
}

impl Level {
    /// Check if this level is logic 1.
    #[must_use]
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// Check if this level is logic 0.
    #[must_use]
    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

/// Internal bias resistor applied to an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    /// Floating input.
    None,

    /// Pull-up: an open switch reads HIGH.
    #[default]
    Up,

    /// Pull-down: an open switch reads LOW.
    Down,
}

impl Pull {
    /// Level an input settles to when nothing drives it.
    #[must_use]
    pub fn resting_level(self) -> Level {
        match self {
            Pull::Up => Level::High,
            Pull::None | Pull::Down => Level::Low,
        }
    }
}

/// Direction a line was claimed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Pin access mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPIO character device (`/dev/gpiochipN`).
    Cdev,

    /// Memory-mapped GPIO registers (`/dev/gpiomem`).
    Mmap,

    /// In-memory simulation, no hardware touched.
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cdev => write!(f, "cdev"),
            BackendKind::Mmap => write!(f, "mmap"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = crate::HardwareError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cdev" | "gpiod" | "chardev" => Ok(BackendKind::Cdev),
            "mmap" | "gpiomem" | "legacy" => Ok(BackendKind::Mmap),
            "simulated" | "mock" | "sim" => Ok(BackendKind::Simulated),
            other => Err(crate::HardwareError::unsupported(format!(
                "backend '{other}'"
            ))),
        }
    }
}

/// Metadata describing an opened chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipInfo {
    /// Backend serving the chip.
    pub backend: BackendKind,

    /// Chip label (e.g., "gpiochip0", "/dev/gpiomem", "simulated").
    pub label: String,
}

impl ChipInfo {
    /// Create a new ChipInfo.
    pub fn new(backend: BackendKind, label: impl Into<String>) -> Self {
        Self {
            backend,
            label: label.into(),
        }
    }
}
