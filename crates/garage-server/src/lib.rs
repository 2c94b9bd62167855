//! HTTP and WebSocket transport for the garage door controller.
//!
//! Only the controller's public entry points are used: status reads,
//! triggers, observers for the HomeKit cache, and the event broadcast for
//! WebSocket push.

pub mod api;
pub mod auth;
pub mod bridge;
pub mod error;
pub mod router;
pub mod state;
pub mod ws;

pub use auth::{AuthConfig, UserRecord, hash_password, verify_password};
pub use bridge::HomeKitBridge;
pub use error::ApiError;
pub use router::build;
pub use state::AppState;
