//! Per-door status transitions.
//!
//! This module is pure: no pins, no clocks, no locks. The controller feeds it
//! sensor samples and trigger requests and publishes whatever transition it
//! reports.
//!
//! ```text
//!   Unknown ──sample──▶ Open / Closed
//!
//!   Closed ──trigger──▶ Opening ──settle──▶ Open | Closed
//!   Open   ──trigger──▶ Closing ──settle──▶ Open | Closed
//!
//!   Opening / Closing ignore regular poll samples until their settle
//!   re-poll resolves them.
//! ```
//!
//! Every trigger bumps the door's actuation sequence. A settle re-poll only
//! applies if no later trigger happened in the meantime, so the delay that
//! resolves a door always belongs to the travel started last.

use crate::config::Timing;
use garage_core::DoorStatus;
use garage_hardware::Level;
use std::fmt;
use std::time::Duration;

/// Maps a raw sensor level onto open/closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPolarity {
    closed_level: Level,
}

impl SensorPolarity {
    pub fn new(closed_level: Level) -> Self {
        Self { closed_level }
    }

    #[must_use]
    pub fn closed_level(&self) -> Level {
        self.closed_level
    }

    /// Anything other than the closed level counts as open.
    #[must_use]
    pub fn is_open(&self, raw: Level) -> bool {
        raw != self.closed_level
    }

    #[must_use]
    pub fn status(&self, raw: Level) -> DoorStatus {
        DoorStatus::from_sensor(self.is_open(raw))
    }
}

/// Which way a trigger is expected to move the door.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Travel {
    Opening,
    Closing,
    /// The prior status did not say which way the door will go.
    Indeterminate,
}

impl Travel {
    /// Direction implied by the status before the trigger.
    #[must_use]
    pub fn from_status(before: DoorStatus) -> Self {
        match before {
            DoorStatus::Closed => Travel::Opening,
            DoorStatus::Open => Travel::Closing,
            _ => Travel::Indeterminate,
        }
    }

    /// Delay between the end of the relay pulse and the confirmation re-poll.
    ///
    /// Only a door known to be closing gets the long delay.
    #[must_use]
    pub fn settle_delay(&self, timing: &Timing) -> Duration {
        match self {
            Travel::Closing => timing.close_settle,
            Travel::Opening | Travel::Indeterminate => timing.open_settle,
        }
    }
}

impl fmt::Display for Travel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Travel::Opening => write!(f, "opening"),
            Travel::Closing => write!(f, "closing"),
            Travel::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Where a sensor sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    /// Periodic poller tick.
    Poll,
    /// Confirmation re-poll of the trigger with this actuation sequence.
    Settle(u64),
    /// Explicit on-demand read.
    Refresh,
}

/// Result of accepting a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actuation {
    /// Status to publish right away.
    pub status: DoorStatus,
    pub travel: Travel,
    /// Sequence number the confirmation re-poll must carry.
    pub sequence: u64,
}

/// Status of one door plus the last sensor level seen for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoorState {
    status: DoorStatus,
    last_sensor: Option<Level>,
    actuations: u64,
}

impl DoorState {
    #[must_use]
    pub fn status(&self) -> DoorStatus {
        self.status
    }

    #[must_use]
    pub fn last_sensor(&self) -> Option<Level> {
        self.last_sensor
    }

    /// Whether a sample from `source` may change the status.
    ///
    /// Poll samples never override an in-motion status. A settle sample
    /// counts only for the most recent trigger. Refreshes always apply.
    #[must_use]
    pub fn accepts(&self, source: SampleSource) -> bool {
        match source {
            SampleSource::Poll => !self.status.is_transitional(),
            SampleSource::Settle(sequence) => sequence == self.actuations,
            SampleSource::Refresh => true,
        }
    }

    /// Feed one sensor sample.
    ///
    /// Returns the new status if it changed.
    pub fn apply_sample(
        &mut self,
        raw: Level,
        polarity: &SensorPolarity,
        source: SampleSource,
    ) -> Option<DoorStatus> {
        self.last_sensor = Some(raw);
        if !self.accepts(source) {
            return None;
        }
        self.set(polarity.status(raw))
    }

    /// Enter the optimistic in-motion status for a trigger.
    ///
    /// A door whose position is not known keeps its status.
    pub fn begin_actuation(&mut self) -> Actuation {
        self.actuations = self.actuations.wrapping_add(1);
        let travel = Travel::from_status(self.status);
        self.status = match travel {
            Travel::Opening => DoorStatus::Opening,
            Travel::Closing => DoorStatus::Closing,
            Travel::Indeterminate => self.status,
        };
        Actuation {
            status: self.status,
            travel,
            sequence: self.actuations,
        }
    }

    /// Give up on knowing where the door is.
    pub fn mark_unknown(&mut self) -> Option<DoorStatus> {
        self.set(DoorStatus::Unknown)
    }

    /// [`mark_unknown`](Self::mark_unknown) for a failed sample, unless the
    /// sample no longer counts.
    pub fn sample_failed(&mut self, source: SampleSource) -> Option<DoorStatus> {
        match source {
            SampleSource::Poll => None,
            _ if !self.accepts(source) => None,
            _ => self.mark_unknown(),
        }
    }

    fn set(&mut self, status: DoorStatus) -> Option<DoorStatus> {
        if status == self.status {
            return None;
        }
        self.status = status;
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use proptest::prelude::*;
    use rstest::rstest;

    const HIGH_CLOSED: SensorPolarity = SensorPolarity {
        closed_level: Level::High,
    };

    fn state(status: DoorStatus) -> DoorState {
        DoorState {
            status,
            last_sensor: None,
            actuations: 0,
        }
    }

    #[test]
    fn test_first_sample_resolves_unknown() {
        let mut door = DoorState::default();
        assert_eq!(
            door.apply_sample(Level::High, &HIGH_CLOSED, SampleSource::Poll),
            Some(DoorStatus::Closed)
        );
        assert_eq!(door.last_sensor(), Some(Level::High));
    }

    #[test]
    fn test_unchanged_sample_reports_nothing() {
        let mut door = state(DoorStatus::Open);
        assert_eq!(
            door.apply_sample(Level::Low, &HIGH_CLOSED, SampleSource::Poll),
            None
        );
        assert_eq!(door.status(), DoorStatus::Open);
    }

    #[rstest]
    #[case(DoorStatus::Closed, DoorStatus::Opening, Travel::Opening)]
    #[case(DoorStatus::Open, DoorStatus::Closing, Travel::Closing)]
    #[case(DoorStatus::Unknown, DoorStatus::Unknown, Travel::Indeterminate)]
    #[case(DoorStatus::Opening, DoorStatus::Opening, Travel::Indeterminate)]
    #[case(DoorStatus::Closing, DoorStatus::Closing, Travel::Indeterminate)]
    fn test_begin_actuation(
        #[case] before: DoorStatus,
        #[case] after: DoorStatus,
        #[case] travel: Travel,
    ) {
        let mut door = state(before);
        let actuation = door.begin_actuation();
        assert_eq!(actuation.status, after);
        assert_eq!(actuation.travel, travel);
        assert_eq!(door.status(), after);
    }

    #[test]
    fn test_poll_does_not_override_motion() {
        let mut door = state(DoorStatus::Opening);
        assert_eq!(
            door.apply_sample(Level::Low, &HIGH_CLOSED, SampleSource::Poll),
            None
        );
        assert_eq!(door.status(), DoorStatus::Opening);
        assert_eq!(door.last_sensor(), Some(Level::Low));
    }

    #[rstest]
    #[case(DoorStatus::Opening, Level::Low, DoorStatus::Open)]
    #[case(DoorStatus::Opening, Level::High, DoorStatus::Closed)]
    #[case(DoorStatus::Closing, Level::High, DoorStatus::Closed)]
    #[case(DoorStatus::Closing, Level::Low, DoorStatus::Open)]
    fn test_refresh_resolves_motion(
        #[case] before: DoorStatus,
        #[case] raw: Level,
        #[case] expected: DoorStatus,
    ) {
        let mut door = state(before);
        assert_eq!(
            door.apply_sample(raw, &HIGH_CLOSED, SampleSource::Refresh),
            Some(expected)
        );
    }

    #[test]
    fn test_settle_of_latest_trigger_resolves_motion() {
        let mut door = state(DoorStatus::Open);
        let actuation = door.begin_actuation();
        assert_eq!(actuation.status, DoorStatus::Closing);

        assert_eq!(
            door.apply_sample(
                Level::High,
                &HIGH_CLOSED,
                SampleSource::Settle(actuation.sequence)
            ),
            Some(DoorStatus::Closed)
        );
    }

    #[test]
    fn test_superseded_settle_is_ignored() {
        let mut door = state(DoorStatus::Open);
        let first = door.begin_actuation();
        let second = door.begin_actuation();
        assert_ne!(first.sequence, second.sequence);

        assert_eq!(
            door.apply_sample(
                Level::Low,
                &HIGH_CLOSED,
                SampleSource::Settle(first.sequence)
            ),
            None
        );
        assert_eq!(door.status(), DoorStatus::Closing);
        assert_eq!(
            door.sample_failed(SampleSource::Settle(first.sequence)),
            None
        );

        assert_eq!(
            door.apply_sample(
                Level::Low,
                &HIGH_CLOSED,
                SampleSource::Settle(second.sequence)
            ),
            Some(DoorStatus::Open)
        );
    }

    #[rstest]
    #[case(SampleSource::Poll, None)]
    #[case(SampleSource::Refresh, Some(DoorStatus::Unknown))]
    #[case(SampleSource::Settle(0), Some(DoorStatus::Unknown))]
    fn test_sample_failed(#[case] source: SampleSource, #[case] expected: Option<DoorStatus>) {
        let mut door = state(DoorStatus::Opening);
        assert_eq!(door.sample_failed(source), expected);
    }

    #[test]
    fn test_mark_unknown_reports_once() {
        let mut door = state(DoorStatus::Opening);
        assert_eq!(door.mark_unknown(), Some(DoorStatus::Unknown));
        assert_eq!(door.mark_unknown(), None);
    }

    #[test]
    fn test_settle_delay_by_travel() {
        let timing = ControllerConfig::default().timing();
        assert_eq!(Travel::Closing.settle_delay(&timing), Duration::from_secs(15));
        assert_eq!(Travel::Opening.settle_delay(&timing), Duration::from_secs(2));
        assert_eq!(
            Travel::Indeterminate.settle_delay(&timing),
            Duration::from_secs(2)
        );
    }

    fn any_level() -> impl Strategy<Value = Level> {
        prop_oneof![Just(Level::Low), Just(Level::High)]
    }

    fn any_terminal_or_unknown() -> impl Strategy<Value = DoorStatus> {
        prop_oneof![
            Just(DoorStatus::Open),
            Just(DoorStatus::Closed),
            Just(DoorStatus::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn prop_polarity_law(
            closed in any_level(),
            raw in any_level(),
            before in any_terminal_or_unknown(),
        ) {
            let polarity = SensorPolarity::new(closed);
            let mut door = state(before);
            door.apply_sample(raw, &polarity, SampleSource::Poll);

            let expected = if raw == closed { DoorStatus::Closed } else { DoorStatus::Open };
            prop_assert_eq!(door.status(), expected);
        }

        #[test]
        fn prop_repeated_sample_is_silent(
            closed in any_level(),
            raw in any_level(),
            source in prop_oneof![Just(SampleSource::Poll), Just(SampleSource::Refresh)],
        ) {
            let polarity = SensorPolarity::new(closed);
            let mut door = DoorState::default();
            door.apply_sample(raw, &polarity, source);
            prop_assert_eq!(door.apply_sample(raw, &polarity, source), None);
        }
    }
}
