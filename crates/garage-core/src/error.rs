use thiserror::Error;

/// Errors surfaced by the garage door core.
///
/// The variants follow how a caller is expected to react:
///
/// - [`Error::Configuration`] is fatal at startup; the process must not run
///   without its pins.
/// - [`Error::InvalidDoorId`] and [`Error::DoorBusy`] are caller errors and
///   are safe to retry with different input.
/// - [`Error::Io`] is a transient pin failure. The relay has already been
///   forced back to idle when this is returned from a trigger.
/// - [`Error::Observer`] is only ever logged. It never reaches a caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid door id: {0}")]
    InvalidDoorId(u32),

    #[error("Door {0} is already being triggered")]
    DoorBusy(u32),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Observer for door {door} failed: {message}")]
    Observer { door: u32, message: String },

    #[error("Controller has been shut down")]
    ShutDown,
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::DoorBusy(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
