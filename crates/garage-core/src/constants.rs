//! Default timings and pin assignments for the garage door controller.
//!
//! Every value here is a default only. Pin numbers and sensor/relay polarity
//! differ between installations and are overridden through configuration.
//!
//! # Timing
//!
//! | Constant | Default | Purpose |
//! |----------|---------|---------|
//! | [`DEFAULT_POLL_INTERVAL_MS`] | 500 ms | Sensor sampling cadence |
//! | [`DEFAULT_PULSE_MS`] | 500 ms | Relay hold time (button press) |
//! | [`DEFAULT_OPEN_SETTLE_MS`] | 2 s | Re-poll delay after starting to open |
//! | [`DEFAULT_CLOSE_SETTLE_MS`] | 15 s | Re-poll delay after starting to close |
//! | [`DEFAULT_SHUTDOWN_TIMEOUT_MS`] | 1 s | Bound on joining background work |
//!
//! # Usage
//!
//! ```
//! use garage_core::constants::*;
//! use std::time::Duration;
//!
//! let cadence = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
//! assert_eq!(cadence, Duration::from_millis(500));
//!
//! fn valid_door(id: u32) -> bool {
//!     (MIN_DOOR_ID..=MAX_DOOR_ID).contains(&id)
//! }
//! assert!(valid_door(2));
//! ```

// ============================================================================
// Door Identification
// ============================================================================

/// Smallest door identifier.
pub const MIN_DOOR_ID: u32 = 1;

/// Largest door identifier a deployment may configure.
pub const MAX_DOOR_ID: u32 = 16;

// ============================================================================
// Timing
// ============================================================================

/// Interval between two sensor sampling rounds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How long the relay is held active for a single button press.
pub const DEFAULT_PULSE_MS: u64 = 500;

/// Delay before confirming the final state of a door that started opening.
pub const DEFAULT_OPEN_SETTLE_MS: u64 = 2_000;

/// Delay before confirming the final state of a door that started closing.
///
/// Closing takes much longer than opening on typical openers because of the
/// slow-down near the floor and the safety reversal window.
pub const DEFAULT_CLOSE_SETTLE_MS: u64 = 15_000;

/// Upper bound on waiting for the poller and in-flight pulses at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// Default Wiring (BCM numbering)
// ============================================================================

/// Relay line driving the opener of door 1.
pub const DEFAULT_DOOR1_RELAY_PIN: u32 = 9;

/// Reed switch line of door 1.
pub const DEFAULT_DOOR1_SENSOR_PIN: u32 = 11;

/// Relay line driving the opener of door 2.
pub const DEFAULT_DOOR2_RELAY_PIN: u32 = 12;

/// Reed switch line of door 2.
pub const DEFAULT_DOOR2_SENSOR_PIN: u32 = 4;

// ============================================================================
// Notification
// ============================================================================

/// Capacity of the door event broadcast channel.
///
/// Subscribers that fall further behind than this skip the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
