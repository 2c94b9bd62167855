//! Relay pulses and confirmation re-polls.
//!
//! A trigger runs in three steps:
//!
//! 1. take the door's gate and publish the optimistic status
//! 2. pulse the relay (active, wait, idle) on a tracked task
//! 3. schedule a re-poll after the settle delay for the expected travel
//!
//! A later trigger of the same door supersedes the pending re-poll: it still
//! wakes up, but its sample no longer resolves the door.
//!
//! The pulse task owns the gate, so a caller that stops waiting does not
//! leave the door half-triggered: the relay still returns to idle and the
//! re-poll is still scheduled.

use crate::controller::{ControllerCore, DoorChannel};
use crate::state_machine::{Actuation, DoorState, SampleSource, Travel};
use garage_core::{DoorId, Error, Result};
use garage_hardware::PinChip;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

impl ControllerCore {
    pub(crate) async fn trigger(self: &Arc<Self>, door_id: DoorId, pulse: Duration) -> Result<()> {
        self.ensure_running()?;
        let door = self.door(door_id)?;
        let gate = Arc::clone(&door.gate)
            .try_lock_owned()
            .map_err(|_| Error::DoorBusy(door_id.get()))?;
        // Shutdown takes every gate before releasing the relays.
        self.ensure_running()?;

        let Actuation {
            status,
            travel,
            sequence,
        } = door.transition(
            &self.notifier,
            DoorState::begin_actuation,
            |actuation| Some(actuation.status),
        );
        info!(door = %door_id, %status, %travel, "door triggered");

        let core = Arc::clone(self);
        let pulse_task = self.pulses.spawn(async move {
            let _gate = gate;
            core.actuate(door_id, travel, sequence, pulse).await
        });

        pulse_task
            .await
            .map_err(|e| Error::io(format!("relay pulse of door {door_id} aborted: {e}")))?
    }

    async fn actuate(
        self: &Arc<Self>,
        door_id: DoorId,
        travel: Travel,
        sequence: u64,
        pulse: Duration,
    ) -> Result<()> {
        let door = self.door(door_id)?;
        if let Err(e) = self.press(door, pulse).await {
            door.update(&self.notifier, DoorState::mark_unknown);
            error!(door = %door_id, error = %e, "relay pulse failed");
            return Err(e);
        }

        let delay = travel.settle_delay(&self.timing);
        debug!(door = %door_id, ?delay, sequence, "scheduling confirmation re-poll");
        self.schedule_settle(door_id, sequence, delay);
        Ok(())
    }

    /// Drive the relay active for `pulse`, then idle.
    ///
    /// The idle write is attempted even when the active write failed.
    async fn press(&self, door: &DoorChannel, pulse: Duration) -> Result<()> {
        let pin = door.relay_pin;
        let pressed = self.chip.write(pin, self.relay_active).await;
        if pressed.is_ok() {
            tokio::time::sleep(pulse).await;
        }

        let released = self.chip.write(pin, !self.relay_active).await;
        if let Err(e) = &released {
            error!(door = %door.id, pin, error = %e, "relay could not be driven idle");
        }

        pressed
            .and(released)
            .map_err(|e| Error::io(format!("relay pin {pin} of door {}: {e}", door.id)))
    }

    fn schedule_settle(self: &Arc<Self>, door_id: DoorId, sequence: u64, delay: Duration) {
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();

        self.settles.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(door = %door_id, "confirmation re-poll cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    let Some(core) = weak.upgrade() else { return };
                    let Ok(door) = core.door(door_id) else { return };
                    match core.sample(door, SampleSource::Settle(sequence)).await {
                        Ok(Some(status)) => info!(door = %door_id, %status, "door settled"),
                        Ok(None) => debug!(door = %door_id, sequence, "re-poll left the door as it was"),
                        Err(error) => warn!(door = %door_id, %error, "confirmation re-poll failed"),
                    }
                }
            }
        });
    }
}
