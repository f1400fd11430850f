//! Multi-target track management
//!
//! [`TrackManager`] owns every [`Track`] and runs one association cycle per
//! frame: predict each track, build the track × observation distance matrix,
//! solve it with the Hungarian algorithm, gate the pairs by distance, update
//! matched tracks, spawn tracks for leftover observations and evict tracks
//! that have been missing too long.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::track::{Track, TrackId};
use crate::common::hungarian::hungarian;
use crate::config::TrackerConfig;
use crate::errors::{ObservationError, PipelineError};
use crate::observation::Observation;

/// Hands out track identifiers in strictly increasing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIdAllocator {
    next: u64,
}

impl TrackIdAllocator {
    /// Allocator whose first identifier is 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identifier; never repeats for the allocator's lifetime
    pub fn allocate(&mut self) -> TrackId {
        let id = TrackId::new(self.next);
        self.next += 1;
        id
    }

    /// Identifier the next `allocate()` will return
    pub fn peek(&self) -> TrackId {
        TrackId::new(self.next)
    }
}

/// Outcome of one [`TrackManager::update`] call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerStep {
    /// Tracks exposed to callers after this frame, ascending by id
    pub confirmed: Vec<TrackId>,
    /// Accepted `(track, observation index)` pairs
    pub matched: Vec<(TrackId, usize)>,
    /// Tracks spawned this frame
    pub created: Vec<TrackId>,
    /// Tracks evicted this frame
    pub removed: Vec<TrackId>,
    /// Observations refused at the boundary, by input index
    pub rejected: Vec<(usize, ObservationError)>,
}

/// Owner of every live track
#[derive(Debug, Clone)]
pub struct TrackManager {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    allocator: TrackIdAllocator,
}

impl TrackManager {
    /// Create an empty manager
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            allocator: TrackIdAllocator::new(),
        }
    }

    /// Rebuild a manager from checkpointed tracks and allocator
    pub(crate) fn from_parts(
        config: TrackerConfig,
        tracks: Vec<Track>,
        allocator: TrackIdAllocator,
    ) -> Self {
        let tracks = tracks.into_iter().map(|t| (t.id(), t)).collect();
        Self {
            config,
            tracks,
            allocator,
        }
    }

    /// Run one association cycle over a frame's observations
    pub fn update(&mut self, observations: Vec<Observation>) -> TrackerStep {
        let mut step = TrackerStep::default();

        // Boundary validation
        let mut pending: Vec<(usize, Option<Observation>)> = Vec::with_capacity(observations.len());
        for (index, observation) in observations.into_iter().enumerate() {
            match observation.sanitize() {
                Ok(valid) => pending.push((index, Some(valid))),
                Err(e) => {
                    log::warn!("Rejected observation {}: {}", index, e);
                    step.rejected.push((index, e));
                }
            }
        }

        if self.tracks.is_empty() {
            for (_, observation) in pending.iter_mut() {
                if let Some(observation) = observation.take() {
                    let id = self.spawn(observation);
                    step.created.push(id);
                }
            }
        } else if pending.is_empty() {
            for track in self.tracks.values_mut() {
                track.mark_disappeared();
            }
        } else {
            self.associate(&mut pending, &mut step);
        }

        self.evict(&mut step);

        step.confirmed = self
            .tracks
            .values()
            .filter(|t| t.is_confirmed(self.config.min_hits))
            .map(Track::id)
            .collect();
        step
    }

    /// Predict, solve the assignment and apply it
    fn associate(&mut self, pending: &mut [(usize, Option<Observation>)], step: &mut TrackerStep) {
        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();

        let mut costs = Array2::zeros((ids.len(), pending.len()));
        for (i, track) in self.tracks.values_mut().enumerate() {
            let predicted = track.predict();
            for (j, (_, observation)) in pending.iter().enumerate() {
                if let Some(observation) = observation {
                    costs[(i, j)] = (observation.centroid - predicted).norm();
                }
            }
        }

        let assignment = hungarian(&costs);
        log::trace!(
            "Assignment over {} tracks x {} observations: {} pairs, cost {:.2}",
            ids.len(),
            pending.len(),
            assignment.pairs.len(),
            assignment.cost
        );

        let mut matched_rows = vec![false; ids.len()];
        for &(row, col) in &assignment.pairs {
            let distance = costs[(row, col)];
            if distance > self.config.max_distance {
                log::trace!(
                    "Track {} gated out observation {} at distance {:.1}",
                    ids[row],
                    pending[col].0,
                    distance
                );
                continue;
            }
            let (index, slot) = &mut pending[col];
            let Some(observation) = slot.take() else {
                continue;
            };
            let Some(track) = self.tracks.get_mut(&ids[row]) else {
                continue;
            };
            matched_rows[row] = true;

            match track.update(observation) {
                Ok(()) => step.matched.push((ids[row], *index)),
                Err(PipelineError::Observation(e)) => {
                    log::warn!("Track {} rejected observation {}: {}", ids[row], index, e);
                    track.mark_disappeared();
                    step.rejected.push((*index, e));
                }
                Err(e) => {
                    log::warn!("Track {}: {}", ids[row], e);
                    step.matched.push((ids[row], *index));
                }
            }
        }

        for (row, id) in ids.iter().enumerate() {
            if !matched_rows[row] {
                if let Some(track) = self.tracks.get_mut(id) {
                    track.mark_disappeared();
                }
            }
        }

        for (_, slot) in pending.iter_mut() {
            if let Some(observation) = slot.take() {
                let id = self.spawn(observation);
                step.created.push(id);
            }
        }
    }

    fn spawn(&mut self, observation: Observation) -> TrackId {
        let id = self.allocator.allocate();
        log::debug!(
            "Created track {} at ({:.1}, {:.1})",
            id,
            observation.centroid.x,
            observation.centroid.y
        );
        self.tracks
            .insert(id, Track::create(id, observation, &self.config));
        id
    }

    fn evict(&mut self, step: &mut TrackerStep) {
        let max_disappeared = self.config.max_disappeared;
        self.tracks.retain(|id, track| {
            let keep = track.disappeared() <= max_disappeared;
            if !keep {
                log::debug!(
                    "Removed track {} after {} missed frames",
                    id,
                    track.disappeared()
                );
                step.removed.push(*id);
            }
            keep
        });
    }

    /// A live track by id, confirmed or not
    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Live tracks in ascending id order, confirmed or not
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Owned copies of the confirmed tracks, ascending by id
    pub fn confirmed_tracks(&self) -> Vec<Track> {
        self.tracks
            .values()
            .filter(|t| t.is_confirmed(self.config.min_hits))
            .cloned()
            .collect()
    }

    /// Number of live tracks, confirmed or not
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether no track is live
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The identifier allocator
    pub fn allocator(&self) -> &TrackIdAllocator {
        &self.allocator
    }

    /// Tracking configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
