//! The garage controller.
//!
//! [`GarageController`] owns the pin chip for its whole life. It claims every
//! relay and sensor line at startup, samples sensors on a background poller,
//! pulses relays on request, and releases everything on [`shutdown`].
//!
//! Handles are cheap to clone; all clones drive the same doors.
//!
//! [`shutdown`]: GarageController::shutdown

use crate::config::{ControllerConfig, Timing};
use crate::fanout::{DoorEvent, Notifier, ObserverError, StatusObserver};
use crate::poller;
use crate::state_machine::{DoorState, SampleSource, SensorPolarity};
use garage_core::constants::EVENT_CHANNEL_CAPACITY;
use garage_core::{DoorId, DoorStatus, Error, Result};
use garage_hardware::probe::DeviceTreeProbe;
use garage_hardware::{AnyPinChip, ChipInfo, Level, PinChip};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime state of one configured door.
pub(crate) struct DoorChannel {
    pub(crate) id: DoorId,
    pub(crate) relay_pin: u32,
    pub(crate) sensor_pin: u32,
    state: Mutex<DoorState>,
    /// Held from a state change until its notification is delivered, so
    /// observers see changes of one door in the order they happened.
    publish: Mutex<()>,
    /// Taken for the whole relay pulse.
    pub(crate) gate: Arc<tokio::sync::Mutex<()>>,
    sensor_fault: AtomicBool,
}

impl DoorChannel {
    fn new(id: DoorId, relay_pin: u32, sensor_pin: u32) -> Self {
        Self {
            id,
            relay_pin,
            sensor_pin,
            state: Mutex::new(DoorState::default()),
            publish: Mutex::new(()),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            sensor_fault: AtomicBool::new(false),
        }
    }

    pub(crate) fn status(&self) -> DoorStatus {
        lock(&self.state).status()
    }

    /// Apply `change` to the door state and publish the resulting status, if any.
    pub(crate) fn transition<R>(
        &self,
        notifier: &Notifier,
        change: impl FnOnce(&mut DoorState) -> R,
        published: impl FnOnce(&R) -> Option<DoorStatus>,
    ) -> R {
        let _publish = lock(&self.publish);
        let outcome = {
            let mut state = lock(&self.state);
            change(&mut *state)
        };
        if let Some(status) = published(&outcome) {
            notifier.emit(self.id, status);
        }
        outcome
    }

    pub(crate) fn update(
        &self,
        notifier: &Notifier,
        change: impl FnOnce(&mut DoorState) -> Option<DoorStatus>,
    ) -> Option<DoorStatus> {
        self.transition(notifier, change, |changed| *changed)
    }
}

pub(crate) struct ControllerCore {
    pub(crate) chip: AnyPinChip,
    pub(crate) doors: BTreeMap<DoorId, DoorChannel>,
    pub(crate) polarity: SensorPolarity,
    pub(crate) relay_active: Level,
    pub(crate) timing: Timing,
    pub(crate) notifier: Notifier,
    pub(crate) cancel: CancellationToken,
    pub(crate) pulses: TaskTracker,
    pub(crate) settles: TaskTracker,
    poller: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ControllerCore {
    pub(crate) fn door(&self, id: DoorId) -> Result<&DoorChannel> {
        self.doors.get(&id).ok_or(Error::InvalidDoorId(id.get()))
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }
        Ok(())
    }

    /// Read a door's sensor and feed the sample to its state machine.
    ///
    /// A failed settle or refresh sample drops the door to `Unknown`; a
    /// failed poll sample leaves its status alone.
    pub(crate) async fn sample(
        &self,
        door: &DoorChannel,
        source: SampleSource,
    ) -> Result<Option<DoorStatus>> {
        match self.chip.read(door.sensor_pin).await {
            Ok(raw) => {
                if door.sensor_fault.swap(false, Ordering::Relaxed) {
                    info!(door = %door.id, pin = door.sensor_pin, "sensor readable again");
                }
                Ok(door.update(&self.notifier, |state| {
                    state.apply_sample(raw, &self.polarity, source)
                }))
            }
            Err(e) => {
                door.update(&self.notifier, |state| state.sample_failed(source));
                Err(Error::io(format!(
                    "read sensor pin {} of door {}: {e}",
                    door.sensor_pin, door.id
                )))
            }
        }
    }

    /// One sampling round over every door.
    pub(crate) async fn poll_once(&self) {
        for door in self.doors.values() {
            if let Err(error) = self.sample(door, SampleSource::Poll).await {
                if door.sensor_fault.swap(true, Ordering::Relaxed) {
                    debug!(door = %door.id, %error, "sensor poll still failing");
                } else {
                    warn!(door = %door.id, %error, "sensor poll failed");
                }
            }
        }
    }

    /// Drive every relay idle, release every line and close the chip.
    ///
    /// Each door's gate is taken first so no pulse can start or end in
    /// between. A pulse that holds its gate past `limit` is overridden.
    async fn release_pins(&self, limit: Duration) -> Result<()> {
        let idle = !self.relay_active;
        let mut first_error = None;

        for door in self.doors.values() {
            let _gate = match tokio::time::timeout(limit, door.gate.lock()).await {
                Ok(guard) => Some(guard),
                Err(_) => {
                    warn!(door = %door.id, "relay pulse still running; forcing relay idle");
                    None
                }
            };
            if let Err(e) = self.chip.write(door.relay_pin, idle).await {
                error!(door = %door.id, pin = door.relay_pin, error = %e, "cannot drive relay idle");
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.chip.release(door.relay_pin).await {
                first_error.get_or_insert(e);
            }
        }

        let sensors: BTreeSet<u32> = self.doors.values().map(|door| door.sensor_pin).collect();
        for pin in sensors {
            if let Err(e) = self.chip.release(pin).await {
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.chip.close().await {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(Error::io(format!("releasing pins: {e}"))),
            None => Ok(()),
        }
    }
}

/// Handle to a running garage controller.
///
/// # Examples
///
/// ```
/// use garage_controller::{ControllerConfig, GarageController};
/// use garage_core::{DoorId, DoorStatus};
/// use garage_hardware::backend::SimulatedChip;
///
/// #[tokio::main]
/// async fn main() -> garage_core::Result<()> {
///     let (chip, _world) = SimulatedChip::new();
///     let controller = GarageController::start(ControllerConfig::default(), chip.into()).await?;
///
///     // Pulled-up reed switches read HIGH, which means closed by default.
///     assert_eq!(controller.get_status(DoorId::new(1)?)?, DoorStatus::Closed);
///
///     controller.shutdown().await
/// }
/// ```
#[derive(Clone)]
pub struct GarageController {
    core: Arc<ControllerCore>,
}

impl std::fmt::Debug for GarageController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarageController")
            .field("backend", &self.core.chip.info())
            .field("doors", &self.door_ids())
            .finish_non_exhaustive()
    }
}

impl GarageController {
    /// Open the configured backend and start the controller on it.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the configuration is invalid, the
    /// backend cannot be opened, or a line cannot be claimed.
    pub async fn from_config(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let kind = config.backend.resolve(&DeviceTreeProbe::new());
        let chip = AnyPinChip::open(kind, config.chip_index)
            .await
            .map_err(|e| Error::configuration(format!("cannot open {kind} backend: {e}")))?;
        Self::start(config, chip).await
    }

    /// Start the controller on an already opened chip.
    ///
    /// Relays are claimed driven idle, sensors are claimed once each even if
    /// shared, every door is sampled, and the poller starts.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the configuration is invalid or a
    /// line cannot be claimed. The chip is closed in that case.
    pub async fn start(config: ControllerConfig, chip: AnyPinChip) -> Result<Self> {
        config.validate()?;

        if let Err(e) = claim_lines(&config, &chip).await {
            if let Err(close) = chip.close().await {
                warn!(error = %close, "closing chip after failed startup");
            }
            return Err(e);
        }

        let info = chip.info();
        let core = Arc::new(ControllerCore {
            chip,
            doors: config
                .doors
                .iter()
                .map(|door| {
                    (
                        door.id,
                        DoorChannel::new(door.id, door.relay_pin, door.sensor_pin),
                    )
                })
                .collect(),
            polarity: SensorPolarity::new(config.sensor_closed_level),
            relay_active: config.relay_active_level,
            timing: config.timing(),
            notifier: Notifier::new(EVENT_CHANNEL_CAPACITY),
            cancel: CancellationToken::new(),
            pulses: TaskTracker::new(),
            settles: TaskTracker::new(),
            poller: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        core.poll_once().await;
        *lock(&core.poller) = Some(poller::spawn(&core));

        info!(
            backend = %info.backend,
            chip = %info.label,
            doors = core.doors.len(),
            "garage controller started"
        );
        Ok(Self { core })
    }

    /// Current status of a door.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorId` if the door is not configured.
    pub fn get_status(&self, door_id: DoorId) -> Result<DoorStatus> {
        Ok(self.core.door(door_id)?.status())
    }

    /// Current status of every configured door.
    #[must_use]
    pub fn get_all_status(&self) -> BTreeMap<DoorId, DoorStatus> {
        self.core
            .doors
            .iter()
            .map(|(id, door)| (*id, door.status()))
            .collect()
    }

    /// Press a door's opener button with the configured pulse length.
    ///
    /// Resolves once the relay is back to idle. The confirmation re-poll
    /// runs afterwards in the background.
    ///
    /// # Errors
    /// - `Error::InvalidDoorId` if the door is not configured
    /// - `Error::DoorBusy` if the door's relay is already being pulsed
    /// - `Error::Io` if a relay write failed
    /// - `Error::ShutDown` after [`shutdown`](Self::shutdown)
    pub async fn trigger(&self, door_id: DoorId) -> Result<()> {
        self.trigger_with_pulse(door_id, self.core.timing.pulse)
            .await
    }

    /// [`trigger`](Self::trigger) with an explicit pulse length.
    pub async fn trigger_with_pulse(&self, door_id: DoorId, pulse: Duration) -> Result<()> {
        self.core.trigger(door_id, pulse).await
    }

    /// Sample a door's sensor now, resolving any in-motion status.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorId` for an unconfigured door and
    /// `Error::Io` if the sensor cannot be read (the door becomes `Unknown`).
    pub async fn refresh(&self, door_id: DoorId) -> Result<DoorStatus> {
        self.core.ensure_running()?;
        let door = self.core.door(door_id)?;
        self.core.sample(door, SampleSource::Refresh).await?;
        Ok(door.status())
    }

    /// Install the status observer of a door, replacing any previous one.
    ///
    /// Returns `true` if an observer was replaced.
    ///
    /// # Errors
    /// Returns `Error::InvalidDoorId` if the door is not configured.
    pub fn register_observer<F>(&self, door_id: DoorId, observer: F) -> Result<bool>
    where
        F: Fn(&DoorEvent) -> std::result::Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.core.door(door_id)?;
        let observer: StatusObserver = Arc::new(observer);
        let replaced = self.core.notifier.register(door_id, observer);
        if replaced {
            debug!(door = %door_id, "status observer replaced");
        }
        Ok(replaced)
    }

    /// Receive every door event from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DoorEvent> {
        self.core.notifier.subscribe()
    }

    /// Configured doors in ascending order.
    #[must_use]
    pub fn door_ids(&self) -> Vec<DoorId> {
        self.core.doors.keys().copied().collect()
    }

    /// The pin backend in use.
    #[must_use]
    pub fn backend(&self) -> ChipInfo {
        self.core.chip.info()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.core.ensure_running().is_err()
    }

    /// Resolves once shutdown has begun.
    pub async fn stopped(&self) {
        self.core.cancel.cancelled().await;
    }

    /// Stop the poller, finish in-flight pulses, and release the hardware.
    ///
    /// Waits for background work at most the configured shutdown timeout per
    /// stage. Relays are driven idle even if a pulse did not finish in time.
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns `Error::Io` if a line could not be released. Every line is
    /// still attempted.
    pub async fn shutdown(&self) -> Result<()> {
        let core = &self.core;
        if core.shut_down.swap(true, Ordering::SeqCst) {
            debug!("garage controller already shut down");
            return Ok(());
        }
        info!("shutting down garage controller");

        core.cancel.cancel();
        let limit = core.timing.shutdown_timeout;

        let poller = lock(&core.poller).take();
        if let Some(mut handle) = poller
            && tokio::time::timeout(limit, &mut handle).await.is_err()
        {
            warn!("poller did not stop in time; aborting it");
            handle.abort();
        }

        core.pulses.close();
        if tokio::time::timeout(limit, core.pulses.wait()).await.is_err() {
            warn!("relay pulse still in flight; forcing relays idle");
        }

        core.settles.close();
        if tokio::time::timeout(limit, core.settles.wait()).await.is_err() {
            debug!("confirmation re-poll still running at shutdown");
        }

        let released = core.release_pins(limit).await;
        info!("garage controller stopped");
        released
    }
}

async fn claim_lines(config: &ControllerConfig, chip: &AnyPinChip) -> Result<()> {
    let idle = !config.relay_active_level;
    for door in &config.doors {
        chip.claim_output(door.relay_pin, idle).await.map_err(|e| {
            Error::configuration(format!(
                "cannot claim relay pin {} of door {}: {e}",
                door.relay_pin, door.id
            ))
        })?;
    }

    let mut sensors = BTreeSet::new();
    for door in &config.doors {
        if !sensors.insert(door.sensor_pin) {
            debug!(door = %door.id, pin = door.sensor_pin, "sensor pin shared");
            continue;
        }
        chip.claim_input(door.sensor_pin, config.sensor_pull)
            .await
            .map_err(|e| {
                Error::configuration(format!(
                    "cannot claim sensor pin {} of door {}: {e}",
                    door.sensor_pin, door.id
                ))
            })?;
    }
    Ok(())
}
