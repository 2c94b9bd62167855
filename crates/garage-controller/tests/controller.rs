//! End-to-end controller behavior on the simulated chip.
//!
//! All tests run on paused time, so multi-second settle delays finish
//! instantly while keeping their relative order.

use garage_controller::{ControllerConfig, DoorConfig, GarageController};
use garage_core::{DoorId, DoorStatus, Error};
use garage_hardware::backend::{SimulatedChip, SimulatedChipHandle};
use garage_hardware::{Level, PinChip, Pull};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

fn door(id: u32) -> DoorId {
    DoorId::new(id).unwrap()
}

fn simulated() -> ControllerConfig {
    ControllerConfig {
        backend: garage_controller::BackendSelection::Simulated,
        ..ControllerConfig::default()
    }
}

async fn start_with(config: ControllerConfig) -> (GarageController, SimulatedChipHandle) {
    let (chip, world) = SimulatedChip::new();
    let controller = GarageController::start(config, chip.into()).await.unwrap();
    (controller, world)
}

async fn start() -> (GarageController, SimulatedChipHandle) {
    start_with(simulated()).await
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<DoorStatus>>>);

impl Recorder {
    fn attach(controller: &GarageController, id: DoorId) -> Self {
        let recorder = Self::default();
        let seen = Arc::clone(&recorder.0);
        controller
            .register_observer(id, move |event| {
                seen.lock().unwrap().push(event.status);
                Ok(())
            })
            .unwrap();
        recorder
    }

    fn seen(&self) -> Vec<DoorStatus> {
        self.0.lock().unwrap().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_startup_resolves_every_door() {
    let (controller, world) = start().await;

    assert_eq!(controller.door_ids(), vec![door(1), door(2)]);
    let all = controller.get_all_status();
    assert_eq!(all.len(), 2);
    assert!(all.values().all(|status| *status == DoorStatus::Closed));

    // Relays idle (active-low board), sensors claimed as inputs.
    assert_eq!(world.level(9), Some(Level::High));
    assert_eq!(world.level(12), Some(Level::High));
    assert!(world.is_claimed(11));
    assert!(world.is_claimed(4));
    assert!(world.writes().is_empty());

    controller.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_inverted_sensor_polarity() {
    let config = ControllerConfig {
        sensor_closed_level: Level::Low,
        ..simulated()
    };
    let (controller, world) = start_with(config).await;

    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);

    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_poll_publishes_sensor_change() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));
    let door2 = Recorder::attach(&controller, door(2));

    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;

    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);
    assert_eq!(door1.seen(), vec![DoorStatus::Open]);
    assert!(door2.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_steady_sensor_is_silent() {
    let (controller, _world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));

    sleep(Duration::from_secs(5)).await;

    assert!(door1.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_trigger_closed_door_confirms_after_short_settle() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));

    controller.trigger(door(1)).await.unwrap();

    assert_eq!(door1.seen(), vec![DoorStatus::Opening]);
    assert_eq!(world.writes_to(9), vec![Level::Low, Level::High]);
    assert!(world.writes_to(12).is_empty());

    // The door leaves the closed position; the poller must not resolve it early.
    world.set_input(11, Level::Low);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Opening);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);
    assert_eq!(door1.seen(), vec![DoorStatus::Opening, DoorStatus::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_open_door_confirms_after_long_settle() {
    let (controller, world) = start().await;
    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;
    let door1 = Recorder::attach(&controller, door(1));

    controller.trigger(door(1)).await.unwrap();
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);

    world.set_input(11, Level::High);
    sleep(Duration::from_secs(14)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
    assert_eq!(door1.seen(), vec![DoorStatus::Closing, DoorStatus::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_opening_is_published_while_relay_is_pressed() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));
    let pressing = controller.clone();
    let pending = tokio::spawn(async move { pressing.trigger(door(1)).await });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(world.level(9), Some(Level::Low));
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Opening);
    assert_eq!(door1.seen(), vec![DoorStatus::Opening]);

    pending.await.unwrap().unwrap();
    assert_eq!(world.level(9), Some(Level::High));
}

#[tokio::test(start_paused = true)]
async fn test_new_trigger_supersedes_pending_settle() {
    let (controller, world) = start().await;
    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);

    // Close; its long re-poll is due 15 s from here.
    controller.trigger(door(1)).await.unwrap();
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);

    // Reverse mid-travel; the short re-poll finds the door still open.
    sleep(Duration::from_secs(1)).await;
    controller.trigger(door(1)).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);

    // Close again. The first close's re-poll fires during this travel and
    // must not resolve it.
    sleep(Duration::from_secs(1)).await;
    controller.trigger(door(1)).await.unwrap();
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);

    world.set_input(11, Level::High);
    sleep(Duration::from_secs(6)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_settle_reports_door_that_did_not_move() {
    let (controller, _world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));

    controller.trigger(door(1)).await.unwrap();
    sleep(Duration::from_secs(3)).await;

    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
    assert_eq!(door1.seen(), vec![DoorStatus::Opening, DoorStatus::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_linked_door_travels_both_ways() {
    let (controller, world) = start().await;
    world.link_door(9, 11, Level::Low);

    controller.trigger(door(1)).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Open);

    controller.trigger(door(1)).await.unwrap();
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closing);
    sleep(Duration::from_secs(16)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_active_high_relay() {
    let config = ControllerConfig {
        relay_active_level: Level::High,
        ..simulated()
    };
    let (controller, world) = start_with(config).await;
    assert_eq!(world.level(9), Some(Level::Low));

    controller.trigger(door(1)).await.unwrap();

    assert_eq!(world.writes_to(9), vec![Level::High, Level::Low]);
}

#[tokio::test(start_paused = true)]
async fn test_custom_pulse_length() {
    let (controller, world) = start().await;
    let started = tokio::time::Instant::now();

    controller
        .trigger_with_pulse(door(2), Duration::from_millis(1200))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1200));
    assert_eq!(world.writes_to(12), vec![Level::Low, Level::High]);
}

#[tokio::test(start_paused = true)]
async fn test_shared_sensor_pin() {
    let config = ControllerConfig {
        doors: vec![
            DoorConfig::new(1, 9, 11).unwrap(),
            DoorConfig::new(2, 12, 11).unwrap(),
        ],
        ..simulated()
    };
    let (controller, world) = start_with(config).await;
    let door2 = Recorder::attach(&controller, door(2));

    controller.trigger(door(1)).await.unwrap();
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Opening);
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Closed);

    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;

    // Door 2 follows the shared sensor while door 1 is still in motion.
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Open);
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Opening);
    assert_eq!(door2.seen(), vec![DoorStatus::Open]);

    controller.shutdown().await.unwrap();
    assert!(!world.is_claimed(11));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_door_is_rejected() {
    let (controller, world) = start().await;

    assert!(matches!(
        controller.get_status(door(3)),
        Err(Error::InvalidDoorId(3))
    ));
    assert!(matches!(
        controller.trigger(door(5)).await,
        Err(Error::InvalidDoorId(5))
    ));
    assert!(matches!(
        controller.register_observer(door(7), |_| Ok(())),
        Err(Error::InvalidDoorId(7))
    ));
    assert!(world.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_trigger_of_same_door_is_busy() {
    let (controller, world) = start().await;

    let (first, second) = tokio::join!(controller.trigger(door(1)), controller.trigger(door(1)));

    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::DoorBusy(1))));
    assert_eq!(world.writes_to(9), vec![Level::Low, Level::High]);

    // The gate is free again once the pulse ended.
    controller.trigger(door(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_different_doors_pulse_concurrently() {
    let (controller, world) = start().await;
    let started = tokio::time::Instant::now();

    let (first, second) = tokio::join!(controller.trigger(door(1)), controller.trigger(door(2)));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(world.writes_to(9).len(), 2);
    assert_eq!(world.writes_to(12).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_relay_fault_leaves_relay_idle_and_status_unknown() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));
    world.fail_writes(9, true);

    let result = controller.trigger(door(1)).await;

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(world.level(9), Some(Level::High));
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Unknown);
    assert_eq!(door1.seen(), vec![DoorStatus::Opening, DoorStatus::Unknown]);

    // Not in motion, so the next poll resolves it.
    world.fail_writes(9, false);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_settle_read_fault_marks_unknown() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));

    controller.trigger(door(1)).await.unwrap();
    world.fail_reads(11, true);
    sleep(Duration::from_secs(3)).await;

    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Unknown);
    assert_eq!(door1.seen(), vec![DoorStatus::Opening, DoorStatus::Unknown]);

    world.fail_reads(11, false);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_poll_read_fault_keeps_status() {
    let (controller, world) = start().await;
    world.fail_reads(4, true);
    world.set_input(4, Level::Low);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Closed);

    world.fail_reads(4, false);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_reads_sensor_immediately() {
    let (controller, world) = start().await;
    world.set_input(4, Level::Low);

    assert_eq!(controller.refresh(door(2)).await.unwrap(), DoorStatus::Open);

    world.fail_reads(4, true);
    assert!(matches!(controller.refresh(door(2)).await, Err(Error::Io(_))));
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_observer_failures_are_isolated() {
    let (controller, _world) = start().await;
    let mut events = controller.subscribe();
    controller
        .register_observer(door(1), |_| panic!("observer bug"))
        .unwrap();
    controller
        .register_observer(door(2), |_| Err("bridge offline".into()))
        .unwrap();

    controller.trigger(door(1)).await.unwrap();
    controller.trigger(door(2)).await.unwrap();

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!((first.door_id, first.status), (door(1), DoorStatus::Opening));
    assert_eq!((second.door_id, second.status), (door(2), DoorStatus::Opening));

    // The poller survives as well.
    sleep(Duration::from_secs(3)).await;
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_register_observer_replaces_previous() {
    let (controller, world) = start().await;
    let first = Recorder::attach(&controller, door(1));
    let second = Recorder::default();
    let seen = Arc::clone(&second.0);

    let replaced = controller
        .register_observer(door(1), move |event| {
            seen.lock().unwrap().push(event.status);
            Ok(())
        })
        .unwrap();
    assert!(replaced);

    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;

    assert!(first.seen().is_empty());
    assert_eq!(second.seen(), vec![DoorStatus::Open]);
}

#[tokio::test(start_paused = true)]
async fn test_observer_may_query_controller() {
    let (controller, world) = start().await;
    let handle = controller.clone();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);

    controller
        .register_observer(door(1), move |event| {
            let current = handle.get_status(event.door_id)?;
            sink.lock().unwrap().push((event.status, current));
            Ok(())
        })
        .unwrap();

    world.set_input(11, Level::Low);
    sleep(Duration::from_millis(600)).await;

    assert_eq!(
        *observed.lock().unwrap(),
        vec![(DoorStatus::Open, DoorStatus::Open)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_hardware_once() {
    let (controller, world) = start().await;

    controller.shutdown().await.unwrap();
    controller.shutdown().await.unwrap();

    assert!(controller.is_shut_down());
    assert!(world.is_closed());
    assert!(!world.is_claimed(9));
    assert!(!world.is_claimed(11));
    assert!(matches!(
        controller.trigger(door(1)).await,
        Err(Error::ShutDown)
    ));
    assert!(matches!(
        controller.refresh(door(1)).await,
        Err(Error::ShutDown)
    ));
    // Last known status stays readable.
    assert_eq!(controller.get_status(door(1)).unwrap(), DoorStatus::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_pulse_in_flight() {
    let (controller, world) = start().await;
    let pressing = controller.clone();
    let pending = tokio::spawn(async move { pressing.trigger(door(1)).await });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(world.level(9), Some(Level::Low));

    controller.shutdown().await.unwrap();

    assert!(pending.await.unwrap().is_ok());
    let writes = world.writes_to(9);
    assert_eq!(writes.first(), Some(&Level::Low));
    assert_eq!(writes.last(), Some(&Level::High));
    assert!(world.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_overrides_pulse_that_outlasts_timeout() {
    let (controller, world) = start().await;
    let pressing = controller.clone();
    let pending = tokio::spawn(async move {
        pressing
            .trigger_with_pulse(door(1), Duration::from_secs(5))
            .await
    });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(world.level(9), Some(Level::Low));

    let started = tokio::time::Instant::now();
    controller.shutdown().await.unwrap();

    // Bounded by the shutdown timeout, well before the pulse would end.
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(world.writes_to(9), vec![Level::Low, Level::High]);
    assert!(world.is_closed());

    // The pulse finds its line gone when it tries to release the button.
    assert!(matches!(pending.await.unwrap(), Err(Error::Io(_))));
    assert_eq!(world.writes_to(9), vec![Level::Low, Level::High]);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_racing_shutdown_never_leaves_relay_active() {
    let (controller, world) = start().await;

    let (triggered, stopped) = tokio::join!(controller.trigger(door(1)), controller.shutdown());

    assert!(triggered.is_ok());
    assert!(stopped.is_ok());
    assert_eq!(world.writes_to(9).last(), Some(&Level::High));
    assert!(world.is_closed());
    assert!(matches!(
        controller.trigger(door(1)).await,
        Err(Error::ShutDown)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_settle() {
    let (controller, world) = start().await;
    let door1 = Recorder::attach(&controller, door(1));

    controller.trigger(door(1)).await.unwrap();
    controller.shutdown().await.unwrap();
    world.set_input(11, Level::Low);
    sleep(Duration::from_secs(5)).await;

    assert_eq!(door1.seen(), vec![DoorStatus::Opening]);
}

#[tokio::test(start_paused = true)]
async fn test_startup_fails_on_unclaimable_pin() {
    let (chip, world) = SimulatedChip::new();
    chip.claim_input(9, Pull::Up).await.unwrap();

    let result = GarageController::start(simulated(), chip.into()).await;

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(world.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_startup_rejects_invalid_config() {
    let (chip, world) = SimulatedChip::new();
    let config = ControllerConfig {
        doors: Vec::new(),
        ..simulated()
    };

    let result = GarageController::start(config, chip.into()).await;

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(!world.is_claimed(9));
}

#[tokio::test]
async fn test_from_config_with_simulated_backend() {
    let controller = GarageController::from_config(simulated()).await.unwrap();

    assert_eq!(
        controller.backend().backend,
        garage_hardware::BackendKind::Simulated
    );
    assert_eq!(controller.get_status(door(2)).unwrap(), DoorStatus::Closed);
    controller.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stopped_resolves_on_shutdown() {
    let (controller, _world) = start().await;
    let watcher = controller.clone();
    let waiting = tokio::spawn(async move { watcher.stopped().await });

    sleep(Duration::from_secs(1)).await;
    assert!(!waiting.is_finished());

    controller.shutdown().await.unwrap();
    waiting.await.unwrap();
}
