use crate::{
    Result,
    constants::{MAX_DOOR_ID, MIN_DOOR_ID},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Door identifier (1-16).
///
/// Serialized as a plain number so it can key JSON objects and TOML tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct DoorId(u32);

impl DoorId {
    /// First door of the default wiring.
    pub const DOOR_1: DoorId = DoorId(1);

    /// Second door of the default wiring.
    pub const DOOR_2: DoorId = DoorId(2);

    /// Create a new door ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorId` if the ID is outside the valid range (1-16).
    pub fn new(id: u32) -> Result<Self> {
        if !(MIN_DOOR_ID..=MAX_DOOR_ID).contains(&id) {
            return Err(Error::InvalidDoorId(id));
        }
        Ok(DoorId(id))
    }

    /// Get the raw door ID.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for DoorId {
    type Error = Error;

    fn try_from(id: u32) -> Result<Self> {
        DoorId::new(id)
    }
}

impl From<DoorId> for u32 {
    fn from(id: DoorId) -> Self {
        id.0
    }
}

impl std::str::FromStr for DoorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u32 = s.trim().parse().map_err(|_| Error::InvalidDoorId(0))?;
        DoorId::new(id)
    }
}

/// Observable state of one garage door.
///
/// `Open` and `Closed` are terminal and come from the reed switch.
/// `Opening` and `Closing` are optimistic guesses made when the opener is
/// triggered; they only last until the confirmation re-poll.
/// `Unknown` is the state before the first sensor reading and after a failed
/// confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorStatus {
    Open,
    Closed,
    Opening,
    Closing,
    #[default]
    Unknown,
}

impl DoorStatus {
    /// Terminal status implied by the (already polarity-corrected) sensor.
    #[must_use]
    pub fn from_sensor(is_open: bool) -> Self {
        if is_open {
            DoorStatus::Open
        } else {
            DoorStatus::Closed
        }
    }

    /// Whether this is an optimistic in-motion state.
    #[must_use]
    pub fn is_transitional(&self) -> bool {
        matches!(self, DoorStatus::Opening | DoorStatus::Closing)
    }

    /// Whether the sensor has confirmed this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DoorStatus::Open | DoorStatus::Closed)
    }

    /// Lowercase name used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorStatus::Open => "open",
            DoorStatus::Closed => "closed",
            DoorStatus::Opening => "opening",
            DoorStatus::Closing => "closing",
            DoorStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
