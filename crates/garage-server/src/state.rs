//! Shared application state for axum handlers.

use crate::auth::{AuthConfig, Authenticator};
use crate::bridge::HomeKitBridge;
use garage_controller::GarageController;
use garage_core::Result;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: GarageController,
    pub auth: Arc<Authenticator>,
    pub homekit: Arc<HomeKitBridge>,
}

impl AppState {
    /// Validate `auth`, attach the HomeKit cache to `controller` and bundle
    /// everything for the router.
    ///
    /// # Errors
    /// Returns `Error::Configuration` for an invalid auth section.
    pub fn new(controller: GarageController, auth: AuthConfig) -> Result<Self> {
        auth.validate()?;
        let homekit = HomeKitBridge::attach(&controller)?;
        Ok(Self {
            controller,
            auth: Arc::new(Authenticator::new(auth)),
            homekit,
        })
    }
}
