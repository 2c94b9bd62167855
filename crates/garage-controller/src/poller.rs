//! Background sensor sampling.

use crate::controller::ControllerCore;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Spawn the poller for `core`.
///
/// The task holds only a weak reference so a controller dropped without
/// `shutdown` does not keep it alive. It stops on cancellation or once the
/// controller is gone.
pub(crate) fn spawn(core: &Arc<ControllerCore>) -> JoinHandle<()> {
    let weak = Arc::downgrade(core);
    let cancel = core.cancel.clone();
    let period = core.timing.poll_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Startup already sampled once.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(core) = Weak::upgrade(&weak) else { break };
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = core.poll_once() => {}
                    }
                }
            }
        }
        debug!("sensor poller stopped");
    })
}
