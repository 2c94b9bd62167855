//! HomeKit garage door accessory state.
//!
//! HomeKit models a garage door opener with two characteristics: the current
//! door state (0 open, 1 closed, 2 opening, 3 closing, 4 stopped) and the
//! target door state (0 open, 1 closed). This module keeps that pair per
//! door, fed by controller observers, and turns target changes into
//! triggers. It does not speak the accessory protocol itself.

use garage_controller::GarageController;
use garage_core::{DoorId, DoorStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// HomeKit `CurrentDoorState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "u8")]
pub enum CurrentDoorState {
    Open = 0,
    Closed = 1,
    Opening = 2,
    Closing = 3,
    Stopped = 4,
}

impl From<DoorStatus> for CurrentDoorState {
    fn from(status: DoorStatus) -> Self {
        match status {
            DoorStatus::Open => CurrentDoorState::Open,
            DoorStatus::Closed => CurrentDoorState::Closed,
            DoorStatus::Opening => CurrentDoorState::Opening,
            DoorStatus::Closing => CurrentDoorState::Closing,
            DoorStatus::Unknown => CurrentDoorState::Stopped,
        }
    }
}

impl From<CurrentDoorState> for u8 {
    fn from(state: CurrentDoorState) -> Self {
        state as u8
    }
}

/// HomeKit `TargetDoorState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TargetDoorState {
    Open = 0,
    Closed = 1,
}

impl TargetDoorState {
    /// Target implied by a door status; `Unknown` keeps `previous`.
    #[must_use]
    pub fn from_status(status: DoorStatus, previous: TargetDoorState) -> Self {
        match status {
            DoorStatus::Open | DoorStatus::Opening => TargetDoorState::Open,
            DoorStatus::Closed | DoorStatus::Closing => TargetDoorState::Closed,
            DoorStatus::Unknown => previous,
        }
    }
}

impl From<TargetDoorState> for u8 {
    fn from(state: TargetDoorState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for TargetDoorState {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(TargetDoorState::Open),
            1 => Ok(TargetDoorState::Closed),
            other => Err(format!("target door state must be 0 or 1, got {other}")),
        }
    }
}

/// Characteristic pair of one door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessoryState {
    pub current_door_state: CurrentDoorState,
    pub target_door_state: TargetDoorState,
}

impl AccessoryState {
    fn initial(status: DoorStatus) -> Self {
        Self {
            current_door_state: status.into(),
            target_door_state: TargetDoorState::from_status(status, TargetDoorState::Closed),
        }
    }

    fn apply(&mut self, status: DoorStatus) {
        self.current_door_state = status.into();
        self.target_door_state = TargetDoorState::from_status(status, self.target_door_state);
    }
}

/// Outcome of a HomeKit target request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    /// The door was triggered.
    Triggered,
    /// The door is already at or heading to the target.
    Unchanged,
}

/// Per-door accessory cache.
#[derive(Debug, Default)]
pub struct HomeKitBridge {
    accessories: Mutex<BTreeMap<DoorId, AccessoryState>>,
}

impl HomeKitBridge {
    fn accessories(&self) -> MutexGuard<'_, BTreeMap<DoorId, AccessoryState>> {
        self.accessories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for every door of `controller` and seed the cache.
    ///
    /// This replaces any observer previously registered on those doors.
    ///
    /// # Errors
    /// Propagates `register_observer` failures.
    pub fn attach(controller: &GarageController) -> Result<Arc<Self>> {
        let bridge = Arc::new(Self::default());

        for door_id in controller.door_ids() {
            let sink = Arc::clone(&bridge);
            controller.register_observer(door_id, move |event| {
                sink.apply(event.door_id, event.status);
                Ok(())
            })?;
        }

        // Observers are in place; an event racing with this seed wins.
        let mut accessories = bridge.accessories();
        for (door_id, status) in controller.get_all_status() {
            accessories
                .entry(door_id)
                .or_insert_with(|| AccessoryState::initial(status));
        }
        drop(accessories);

        debug!(doors = controller.door_ids().len(), "homekit bridge attached");
        Ok(bridge)
    }

    /// Fold one status change into the cache.
    pub fn apply(&self, door_id: DoorId, status: DoorStatus) -> AccessoryState {
        let mut accessories = self.accessories();
        let state = accessories
            .entry(door_id)
            .and_modify(|state| state.apply(status))
            .or_insert_with(|| AccessoryState::initial(status));
        *state
    }

    #[must_use]
    pub fn accessory(&self, door_id: DoorId) -> Option<AccessoryState> {
        self.accessories().get(&door_id).copied()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<DoorId, AccessoryState> {
        self.accessories().clone()
    }

    /// Move a door toward `target`, triggering it unless it is already there.
    ///
    /// # Errors
    /// Propagates trigger failures.
    pub async fn set_target(
        &self,
        controller: &GarageController,
        door_id: DoorId,
        target: TargetDoorState,
    ) -> Result<TargetOutcome> {
        let status = controller.get_status(door_id)?;
        let heading = TargetDoorState::from_status(status, opposite(target));
        if status != DoorStatus::Unknown && heading == target {
            debug!(door = %door_id, %status, "homekit target already satisfied");
            return Ok(TargetOutcome::Unchanged);
        }

        info!(door = %door_id, ?target, "homekit target requested");
        controller.trigger(door_id).await?;
        Ok(TargetOutcome::Triggered)
    }
}

fn opposite(target: TargetDoorState) -> TargetDoorState {
    match target {
        TargetDoorState::Open => TargetDoorState::Closed,
        TargetDoorState::Closed => TargetDoorState::Open,
    }
}
