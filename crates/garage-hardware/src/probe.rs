//! Host identification and backend selection.
//!
//! The backend is chosen once at startup from the board's device-tree model
//! string:
//!
//! | Model | Backend |
//! |-------|---------|
//! | contains "Raspberry Pi 5" | [`BackendKind::Cdev`] |
//! | contains "Raspberry Pi" | [`BackendKind::Mmap`] |
//! | any other model | [`BackendKind::Cdev`] |
//! | no model (not an SBC) | [`BackendKind::Simulated`] |
//!
//! The probe is a trait so the rule can be exercised without a board.

use crate::types::BackendKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where Linux exposes the board model on device-tree platforms.
pub const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

/// Source of the host's hardware model string.
pub trait HostProbe {
    /// Model string, or `None` when the host does not report one.
    fn model(&self) -> Option<String>;
}

/// Reads the model from a device-tree file.
#[derive(Debug, Clone)]
pub struct DeviceTreeProbe {
    path: PathBuf,
}

impl DeviceTreeProbe {
    /// Probe the standard device-tree location.
    #[must_use]
    pub fn new() -> Self {
        Self::at(DEVICE_TREE_MODEL)
    }

    /// Probe a custom path.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for DeviceTreeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for DeviceTreeProbe {
    fn model(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                // Device-tree strings are NUL-terminated.
                let model = raw.trim_end_matches('\0').trim().to_string();
                (!model.is_empty()).then_some(model)
            }
            Err(err) => {
                debug!(path = %self.path.display(), %err, "no device-tree model");
                None
            }
        }
    }
}

/// Fixed model, for tests and explicit overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub Option<String>);

impl HostProbe for StaticProbe {
    fn model(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Backend appropriate for a model string.
#[must_use]
pub fn backend_for_model(model: Option<&str>) -> BackendKind {
    match model {
        None => BackendKind::Simulated,
        Some(model) if model.contains("Raspberry Pi 5") => BackendKind::Cdev,
        Some(model) if model.contains("Raspberry Pi") => BackendKind::Mmap,
        Some(_) => BackendKind::Cdev,
    }
}

/// Probe the host and pick a backend.
pub fn detect_backend(probe: &impl HostProbe) -> BackendKind {
    let model = probe.model();
    let backend = backend_for_model(model.as_deref());
    info!(
        model = model.as_deref().unwrap_or("none"),
        %backend,
        "GPIO backend selected"
    );
    backend
}
