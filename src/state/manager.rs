//! One [`PersonStateMachine`] per live track

use std::collections::BTreeMap;

use super::indicators::Indicators;
use super::machine::{DwellThresholds, FallState, PersonStateMachine, StepOutcome};
use crate::config::DetectionConfig;
use crate::observation::Classification;
use crate::tracking::{Track, TrackId};

/// Owner of every state machine, keyed by track id
#[derive(Debug, Clone)]
pub struct StateMachineManager {
    config: DetectionConfig,
    dwell: DwellThresholds,
    machines: BTreeMap<TrackId, PersonStateMachine>,
}

impl StateMachineManager {
    /// Create an empty manager
    pub fn new(config: DetectionConfig) -> Self {
        let dwell = DwellThresholds::from(&config);
        Self {
            config,
            dwell,
            machines: BTreeMap::new(),
        }
    }

    /// Rebuild a manager from checkpointed machines
    pub(crate) fn from_parts(config: DetectionConfig, machines: Vec<PersonStateMachine>) -> Self {
        let mut manager = Self::new(config);
        manager.machines = machines.into_iter().map(|m| (m.track_id(), m)).collect();
        manager
    }

    /// Evaluate the indicators for a track's latest observation and step its
    /// machine, creating the machine on first sight.
    ///
    /// Time is the track's latest observation timestamp.
    pub fn update(
        &mut self,
        track: &Track,
        motion_energy: f64,
        classification: Option<&Classification>,
    ) -> StepOutcome {
        let indicators = Indicators::evaluate(track, motion_energy, classification, &self.config);
        self.apply(track.id(), &indicators, track.last_timestamp())
    }

    /// Step a machine with precomputed indicators
    pub fn apply(&mut self, track_id: TrackId, indicators: &Indicators, now: f64) -> StepOutcome {
        let machine = self
            .machines
            .entry(track_id)
            .or_insert_with(|| PersonStateMachine::new(track_id, now));
        let outcome = machine.update(indicators, now, &self.dwell);

        if outcome.transitioned() {
            log::debug!(
                "Track {}: {} -> {} at {:.2}",
                track_id,
                outcome.previous,
                outcome.state,
                now
            );
        }
        outcome
    }

    /// Current state of a track
    pub fn state(&self, track_id: TrackId) -> Option<FallState> {
        self.machines.get(&track_id).map(PersonStateMachine::state)
    }

    /// The machine of a track
    pub fn machine(&self, track_id: TrackId) -> Option<&PersonStateMachine> {
        self.machines.get(&track_id)
    }

    /// Drop the machine of a retired track
    pub fn remove(&mut self, track_id: TrackId) -> Option<PersonStateMachine> {
        self.machines.remove(&track_id)
    }

    /// Owned copies of every machine currently in `Alarm`
    pub fn alarms(&self) -> BTreeMap<TrackId, PersonStateMachine> {
        self.machines
            .iter()
            .filter(|(_, m)| m.state() == FallState::Alarm)
            .map(|(id, m)| (*id, m.clone()))
            .collect()
    }

    /// All machines in ascending track order
    pub fn machines(&self) -> impl Iterator<Item = &PersonStateMachine> {
        self.machines.values()
    }

    /// Number of machines
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Whether there are no machines
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Dwell thresholds applied to every machine
    pub fn dwell(&self) -> &DwellThresholds {
        &self.dwell
    }
}
