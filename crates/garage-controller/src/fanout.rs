//! Status change notification.
//!
//! Every status change of a door produces one [`DoorEvent`], which goes to
//! two places:
//!
//! - the single observer registered for that door, called synchronously
//! - a broadcast channel any number of subscribers can listen on
//!
//! A failing or panicking observer is logged and otherwise ignored; it never
//! reaches the poller or the caller of `trigger`.

use chrono::{DateTime, Utc};
use garage_core::{DoorId, DoorStatus, Error};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Per-door status callback.
pub type StatusObserver =
    Arc<dyn Fn(&DoorEvent) -> Result<(), ObserverError> + Send + Sync + 'static>;

/// One status change of one door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorEvent {
    pub door_id: DoorId,
    pub status: DoorStatus,
    pub at: DateTime<Utc>,
}

impl DoorEvent {
    pub fn now(door_id: DoorId, status: DoorStatus) -> Self {
        Self {
            door_id,
            status,
            at: Utc::now(),
        }
    }
}

/// Observer registry plus broadcast sender.
pub(crate) struct Notifier {
    observers: Mutex<HashMap<DoorId, StatusObserver>>,
    events: broadcast::Sender<DoorEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            observers: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn observers(&self) -> MutexGuard<'_, HashMap<DoorId, StatusObserver>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the observer for a door. Returns `true` if one was replaced.
    pub(crate) fn register(&self, door_id: DoorId, observer: StatusObserver) -> bool {
        self.observers().insert(door_id, observer).is_some()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DoorEvent> {
        self.events.subscribe()
    }

    /// Deliver one status change.
    ///
    /// The registry lock is released before the observer runs, so an observer
    /// may read controller state or register observers itself.
    pub(crate) fn emit(&self, door_id: DoorId, status: DoorStatus) {
        let event = DoorEvent::now(door_id, status);
        let observer = self.observers().get(&door_id).cloned();

        if let Some(observer) = observer
            && let Err(error) = invoke(&observer, &event)
        {
            warn!(door = %door_id, %status, %error, "status observer failed");
        }

        // No subscribers is not an error.
        let receivers = self.events.send(event).unwrap_or(0);
        trace!(door = %door_id, %status, receivers, "door event published");
    }
}

fn invoke(observer: &StatusObserver, event: &DoorEvent) -> garage_core::Result<()> {
    let door = event.door_id.get();
    match catch_unwind(AssertUnwindSafe(|| observer(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::Observer {
            door,
            message: e.to_string(),
        }),
        Err(panic) => Err(Error::Observer {
            door,
            message: format!("panicked: {}", panic_message(panic.as_ref())),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
