//! Error types for pin operations.
//!
//! This module defines error types specific to GPIO line handling, covering
//! claim conflicts, direction misuse, closed chips and backend failures.

use crate::types::Direction;

/// Result type alias for pin operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during pin operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Pin has not been claimed on this chip.
    #[error("Pin {pin} is not claimed")]
    NotClaimed { pin: u32 },

    /// Pin is already claimed with another direction.
    #[error("Pin {pin} is already claimed as {direction}")]
    AlreadyClaimed { pin: u32, direction: Direction },

    /// Operation does not match the direction the pin was claimed with.
    #[error("Pin {pin} is claimed as {direction}")]
    WrongDirection { pin: u32, direction: Direction },

    /// Pin number is not addressable by the backend.
    #[error("Invalid pin: {pin}")]
    InvalidPin { pin: u32 },

    /// Chip has been closed.
    #[error("Chip is closed")]
    ChipClosed,

    /// Operation or backend is not supported in this build or on this host.
    #[error("Unsupported: {operation}")]
    Unsupported { operation: String },

    /// Chip could not be opened.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the underlying GPIO library.
    #[error("Backend error: {message}")]
    Backend { message: String },
}

impl HardwareError {
    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
