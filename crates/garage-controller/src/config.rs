//! Controller configuration.
//!
//! Wiring differs between installations: relay and sensor pins, whether a
//! closed door pulls the reed switch line HIGH or LOW, and whether the relay
//! board is active-low. None of it is hard-coded; every field has a default
//! matching the reference wiring and can be overridden from the
//! `[controller]` table of the configuration file.
//!
//! # Example
//!
//! ```toml
//! [controller]
//! backend = "auto"
//! sensor_closed_level = "high"
//! relay_active_level = "low"
//!
//! [[controller.doors]]
//! id = 1
//! relay_pin = 9
//! sensor_pin = 11
//!
//! [[controller.doors]]
//! id = 2
//! relay_pin = 12
//! sensor_pin = 4
//! ```

use garage_core::constants::{
    DEFAULT_CLOSE_SETTLE_MS, DEFAULT_DOOR1_RELAY_PIN, DEFAULT_DOOR1_SENSOR_PIN,
    DEFAULT_DOOR2_RELAY_PIN, DEFAULT_DOOR2_SENSOR_PIN, DEFAULT_OPEN_SETTLE_MS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PULSE_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};
use garage_core::{DoorId, Error, Result};
use garage_hardware::probe::{HostProbe, detect_backend};
use garage_hardware::{BackendKind, Level, Pull};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// How the pin backend is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelection {
    /// Probe the host model at startup.
    #[default]
    Auto,
    Cdev,
    Mmap,
    Simulated,
}

impl BackendSelection {
    /// Turn the selection into a concrete backend, probing if needed.
    pub fn resolve(self, probe: &impl HostProbe) -> BackendKind {
        match self {
            BackendSelection::Auto => detect_backend(probe),
            BackendSelection::Cdev => BackendKind::Cdev,
            BackendSelection::Mmap => BackendKind::Mmap,
            BackendSelection::Simulated => BackendKind::Simulated,
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelection::Auto => write!(f, "auto"),
            BackendSelection::Cdev => write!(f, "cdev"),
            BackendSelection::Mmap => write!(f, "mmap"),
            BackendSelection::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for BackendSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(BackendSelection::Auto);
        }
        let kind: BackendKind = s
            .parse()
            .map_err(|e| Error::configuration(format!("{e}")))?;
        Ok(match kind {
            BackendKind::Cdev => BackendSelection::Cdev,
            BackendKind::Mmap => BackendSelection::Mmap,
            BackendKind::Simulated => BackendSelection::Simulated,
        })
    }
}

/// Wiring of one door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorConfig {
    /// Door identifier used by the API.
    pub id: DoorId,

    /// Output line driving the opener's push-button relay.
    pub relay_pin: u32,

    /// Input line wired to the reed switch. May be shared with another door.
    pub sensor_pin: u32,
}

impl DoorConfig {
    /// Create a door wiring entry.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorId` if `id` is out of range.
    pub fn new(id: u32, relay_pin: u32, sensor_pin: u32) -> Result<Self> {
        Ok(Self {
            id: DoorId::new(id)?,
            relay_pin,
            sensor_pin,
        })
    }
}

/// Everything the controller needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pin backend selection.
    pub backend: BackendSelection,

    /// GPIO chip index (`/dev/gpiochipN`).
    pub chip_index: u32,

    /// Sensor level that means "door closed".
    pub sensor_closed_level: Level,

    /// Bias applied to sensor inputs.
    pub sensor_pull: Pull,

    /// Relay level that means "button pressed". The idle level is its inverse.
    pub relay_active_level: Level,

    /// Sensor sampling cadence.
    pub poll_interval_ms: u64,

    /// Relay hold time for one trigger.
    pub pulse_ms: u64,

    /// Confirmation delay after a door starts opening.
    pub open_settle_ms: u64,

    /// Confirmation delay after a door starts closing.
    pub close_settle_ms: u64,

    /// Bound on waiting for background work at shutdown.
    pub shutdown_timeout_ms: u64,

    /// Door wiring.
    pub doors: Vec<DoorConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: BackendSelection::Auto,
            chip_index: 0,
            sensor_closed_level: Level::High,
            sensor_pull: Pull::Up,
            relay_active_level: Level::Low,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            pulse_ms: DEFAULT_PULSE_MS,
            open_settle_ms: DEFAULT_OPEN_SETTLE_MS,
            close_settle_ms: DEFAULT_CLOSE_SETTLE_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            doors: vec![
                DoorConfig {
                    id: DoorId::DOOR_1,
                    relay_pin: DEFAULT_DOOR1_RELAY_PIN,
                    sensor_pin: DEFAULT_DOOR1_SENSOR_PIN,
                },
                DoorConfig {
                    id: DoorId::DOOR_2,
                    relay_pin: DEFAULT_DOOR2_RELAY_PIN,
                    sensor_pin: DEFAULT_DOOR2_SENSOR_PIN,
                },
            ],
        }
    }
}

/// Durations derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    pub pulse: Duration,
    pub open_settle: Duration,
    pub close_settle: Duration,
    pub shutdown_timeout: Duration,
}

impl ControllerConfig {
    /// Durations view of the millisecond fields.
    #[must_use]
    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            pulse: Duration::from_millis(self.pulse_ms),
            open_settle: Duration::from_millis(self.open_settle_ms),
            close_settle: Duration::from_millis(self.close_settle_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }

    /// Reject wiring the controller cannot run with.
    ///
    /// # Errors
    /// Returns `Error::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.doors.is_empty() {
            return Err(Error::configuration("at least one door must be configured"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration("poll_interval_ms must be non-zero"));
        }
        if self.pulse_ms == 0 {
            return Err(Error::configuration("pulse_ms must be non-zero"));
        }

        let mut ids = HashSet::new();
        let mut relays = HashSet::new();
        for door in &self.doors {
            if !ids.insert(door.id) {
                return Err(Error::configuration(format!(
                    "door {} is configured twice",
                    door.id
                )));
            }
            if !relays.insert(door.relay_pin) {
                return Err(Error::configuration(format!(
                    "relay pin {} is used by more than one door",
                    door.relay_pin
                )));
            }
        }

        // Sensors may be shared between doors, but never double as a relay.
        if let Some(door) = self
            .doors
            .iter()
            .find(|door| relays.contains(&door.sensor_pin))
        {
            return Err(Error::configuration(format!(
                "sensor pin {} of door {} is also a relay pin",
                door.sensor_pin, door.id
            )));
        }

        Ok(())
    }
}
