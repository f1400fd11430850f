//! Per-frame tracking-and-decision chain
//!
//! [`FallPipeline`] owns one of each component and drives them strictly in
//! sequence for every frame:
//!
//! 1. [`TrackManager`] associates the frame's observations with tracks
//! 2. retired tracks lose their state machine, immobility history and
//!    feature window in the same frame
//! 3. for every confirmed track updated this frame: motion energy is pulled
//!    from the [`MotionEnergySource`] (a non-finite value skips the track for
//!    this frame, finite values are clamped to 0-100), the [`ImmobilityEstimator`] and the
//!    [`FeatureWindow`] are fed, the optional [`FallClassifier`] is consulted,
//!    the state machine is stepped and the risk is scored
//!
//! Nothing here blocks or performs I/O. Snapshot accessors return owned
//! copies so a rendering or alerting thread never sees a half-updated map.

use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::features::{FeatureWindow, TemporalFeatures};
use crate::immobility::{sanitize_motion_energy, ImmobilityEstimator};
use crate::observation::{BoundingBox, Classification, Keypoints, Observation};
use crate::reporter::{NoOpReporter, PipelineReporter};
use crate::risk::{RiskLevel, RiskScorer};
use crate::state::{FallState, PersonStateMachine, StateMachineManager};
use crate::tracking::{Track, TrackId, TrackIdAllocator, TrackManager};

// ============================================================================
// Collaborator seams
// ============================================================================

/// Supplies the motion energy (percent of changed pixels, 0-100) inside a
/// track's current bounding box
pub trait MotionEnergySource {
    fn motion_energy(&mut self, track_id: TrackId, bbox: &BoundingBox) -> f64;
}

impl<F> MotionEnergySource for F
where
    F: FnMut(TrackId, &BoundingBox) -> f64,
{
    fn motion_energy(&mut self, track_id: TrackId, bbox: &BoundingBox) -> f64 {
        self(track_id, bbox)
    }
}

/// The same motion energy for every track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantMotion(pub f64);

impl MotionEnergySource for ConstantMotion {
    fn motion_energy(&mut self, _track_id: TrackId, _bbox: &BoundingBox) -> f64 {
        self.0
    }
}

/// Learned fall classifier consulted once per track per frame
pub trait FallClassifier {
    /// Classify a track's feature window; `None` abstains. A non-finite
    /// probability or confidence discards the result, other values are
    /// clamped to `[0, 1]`.
    fn classify(&mut self, track_id: TrackId, features: &TemporalFeatures) -> Option<Classification>;
}

/// Classifier that always abstains
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassifier;

impl FallClassifier for NoClassifier {
    fn classify(&mut self, _track_id: TrackId, _features: &TemporalFeatures) -> Option<Classification> {
        None
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Features of a track's latest observation, attached to alarms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationFeatures {
    pub bbox: BoundingBox,
    pub centroid: Point2<f64>,
    pub centroid_height_ratio: f64,
    pub aspect_ratio: f64,
    /// Posture angle in degrees
    pub angle: f64,
    pub floor_distance: Option<f64>,
    /// Normalized drop over the falling-fast window
    pub vertical_drop: f64,
    pub vertical_speed_normalized: f64,
}

impl ObservationFeatures {
    pub fn from_track(track: &Track, drop_window: f64) -> Self {
        let obs = track.last_observation();
        Self {
            bbox: obs.bbox,
            centroid: obs.centroid,
            centroid_height_ratio: obs.centroid_height_ratio,
            aspect_ratio: obs.aspect_ratio,
            angle: obs.posture_angle(),
            floor_distance: obs.floor_distance,
            vertical_drop: track.vertical_drop(drop_window),
            vertical_speed_normalized: track.vertical_speed_normalized(),
        }
    }
}

/// Raised once when a track enters `Alarm`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub track_id: TrackId,
    pub alarm_time: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub state: FallState,
    pub features: ObservationFeatures,
}

/// Per-track result of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub keypoints: Option<Keypoints>,
    pub state: FallState,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub motion_energy: f64,
    pub immobility_score: f64,
    pub classification: Option<Classification>,
    /// Falling with a warning-level risk
    pub warning: bool,
    /// Timestamp of the observation this report was computed from
    pub timestamp: f64,
}

/// Result of one [`FallPipeline::process_frame`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp: f64,
    /// Confirmed tracks updated this frame, ascending by id
    pub tracks: Vec<TrackReport>,
    /// Alarms raised this frame
    pub alarms: Vec<AlarmEvent>,
    /// Tracks retired this frame
    pub removed: Vec<TrackId>,
    /// Observations refused this frame
    pub rejected: usize,
    /// Confirmed tracks skipped this frame because their motion energy was
    /// not finite
    #[serde(default)]
    pub skipped: Vec<TrackId>,
}

impl FrameReport {
    /// Report for one track, if it was updated this frame
    pub fn track(&self, track_id: TrackId) -> Option<&TrackReport> {
        self.tracks.iter().find(|r| r.track_id == track_id)
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Everything needed to resume a pipeline with identical behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    pub allocator: TrackIdAllocator,
    pub tracks: Vec<Track>,
    pub machines: Vec<PersonStateMachine>,
    pub immobility: ImmobilityEstimator,
    pub features: FeatureWindow,
    pub live: Vec<TrackReport>,
}

impl PipelineCheckpoint {
    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// FallPipeline
// ============================================================================

/// The full per-frame chain for every person in view
#[derive(Debug)]
pub struct FallPipeline<C = NoClassifier, R = NoOpReporter> {
    config: PipelineConfig,
    tracker: TrackManager,
    immobility: ImmobilityEstimator,
    states: StateMachineManager,
    scorer: RiskScorer,
    features: FeatureWindow,
    live: BTreeMap<TrackId, TrackReport>,
    classifier: C,
    reporter: R,
}

impl FallPipeline {
    /// Validate the configuration and build an empty pipeline
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            tracker: TrackManager::new(config.tracking.clone()),
            immobility: ImmobilityEstimator::new(&config.detection),
            states: StateMachineManager::new(config.detection.clone()),
            scorer: RiskScorer::new(config.risk.clone()),
            features: FeatureWindow::new(&config.features),
            live: BTreeMap::new(),
            classifier: NoClassifier,
            reporter: NoOpReporter,
            config,
        })
    }

    /// Resume from a checkpoint
    pub fn restore(config: PipelineConfig, checkpoint: PipelineCheckpoint) -> Result<Self, PipelineError> {
        config.validate()?;
        let PipelineCheckpoint {
            allocator,
            tracks,
            machines,
            immobility,
            features,
            live,
        } = checkpoint;

        if let Some(empty) = tracks.iter().find(|t| t.history().is_empty()) {
            return Err(PipelineError::Checkpoint {
                description: format!("track {} has no observation history", empty.id()),
            });
        }
        if let Some(orphan) = machines
            .iter()
            .find(|m| !tracks.iter().any(|t| t.id() == m.track_id()))
        {
            return Err(PipelineError::Checkpoint {
                description: format!("state machine for unknown track {}", orphan.track_id()),
            });
        }

        Ok(Self {
            tracker: TrackManager::from_parts(config.tracking.clone(), tracks, allocator),
            immobility: ImmobilityEstimator::rebuild(&config.detection, immobility),
            states: StateMachineManager::from_parts(config.detection.clone(), machines),
            scorer: RiskScorer::new(config.risk.clone()),
            features: FeatureWindow::rebuild(&config.features, features),
            live: live.into_iter().map(|r| (r.track_id, r)).collect(),
            classifier: NoClassifier,
            reporter: NoOpReporter,
            config,
        })
    }
}

impl<C: FallClassifier, R: PipelineReporter> FallPipeline<C, R> {
    /// Replace the classifier
    pub fn with_classifier<C2: FallClassifier>(self, classifier: C2) -> FallPipeline<C2, R> {
        FallPipeline {
            config: self.config,
            tracker: self.tracker,
            immobility: self.immobility,
            states: self.states,
            scorer: self.scorer,
            features: self.features,
            live: self.live,
            classifier,
            reporter: self.reporter,
        }
    }

    /// Replace the reporter
    pub fn with_reporter<R2: PipelineReporter>(self, reporter: R2) -> FallPipeline<C, R2> {
        FallPipeline {
            config: self.config,
            tracker: self.tracker,
            immobility: self.immobility,
            states: self.states,
            scorer: self.scorer,
            features: self.features,
            live: self.live,
            classifier: self.classifier,
            reporter,
        }
    }

    /// Run the whole chain for one frame
    ///
    /// `timestamp` only labels the returned [`FrameReport`]. Every duration
    /// (falling, immobility, alarm time) is measured on the observations'
    /// own timestamps.
    pub fn process_frame<M: MotionEnergySource + ?Sized>(
        &mut self,
        timestamp: f64,
        observations: Vec<Observation>,
        motion: &mut M,
    ) -> FrameReport {
        let step = self.tracker.update(observations);
        self.reporter.on_tracks_updated(&step);
        for (index, error) in &step.rejected {
            self.reporter.on_observation_rejected(*index, error);
        }

        for &id in &step.removed {
            self.states.remove(id);
            self.immobility.reset(id);
            self.features.reset(id);
            self.live.remove(&id);
            self.reporter.on_track_removed(id);
        }

        let mut report = FrameReport {
            timestamp,
            rejected: step.rejected.len(),
            removed: step.removed.clone(),
            ..FrameReport::default()
        };

        for &id in &step.confirmed {
            let Some(track) = self.tracker.get(id) else {
                continue;
            };
            if track.disappeared() > 0 {
                continue;
            }
            let now = track.last_timestamp();
            let bbox = track.last_observation().bbox;

            let motion_energy = match sanitize_motion_energy(motion.motion_energy(id, &bbox)) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Track {} skipped at {:.2}s: {}", id, now, e);
                    self.reporter.on_signal_rejected(id, &e);
                    report.skipped.push(id);
                    continue;
                }
            };
            self.immobility.update(id, motion_energy);

            let classification = self
                .features
                .observe(track)
                .and_then(|features| self.classifier.classify(id, &features));
            let classification = match classification.map(Classification::sanitize) {
                Some(Err(e)) => {
                    log::warn!("Track {}: classification discarded: {}", id, e);
                    self.reporter.on_signal_rejected(id, &e);
                    None
                }
                Some(Ok(c)) => Some(c),
                None => None,
            };

            let outcome = self.states.update(track, motion_energy, classification.as_ref());
            if outcome.transitioned() {
                self.reporter
                    .on_transition(id, outcome.previous, outcome.state, now);
            }
            let Some(machine) = self.states.machine(id) else {
                continue;
            };

            let immobility_score = self.immobility.immobility_score(id);
            let risk_score =
                self.scorer
                    .calculate(track, machine, immobility_score, classification.as_ref());
            let risk_level = self.scorer.risk_level(risk_score);

            if outcome.alarm_raised {
                let event = AlarmEvent {
                    track_id: id,
                    alarm_time: machine.alarm_time().unwrap_or(now),
                    risk_score,
                    risk_level,
                    state: outcome.state,
                    features: ObservationFeatures::from_track(
                        track,
                        self.config.detection.falling.drop_window,
                    ),
                };
                log::info!(
                    "ALARM: track {} at {:.2}s, risk {:.1} ({})",
                    id,
                    event.alarm_time,
                    risk_score,
                    risk_level
                );
                self.reporter.on_alarm(&event);
                report.alarms.push(event);
            }

            let track_report = TrackReport {
                track_id: id,
                bbox,
                keypoints: track.last_observation().keypoints.clone(),
                state: outcome.state,
                risk_score,
                risk_level,
                motion_energy,
                immobility_score,
                classification,
                warning: outcome.state == FallState::Falling && risk_level == RiskLevel::Warning,
                timestamp: now,
            };
            self.live.insert(id, track_report.clone());
            report.tracks.push(track_report);
        }

        self.reporter.on_frame_complete(&report);
        report
    }

    /// Latest report of every live confirmed track
    pub fn live_tracks(&self) -> BTreeMap<TrackId, TrackReport> {
        self.live.clone()
    }

    /// Every state machine currently in `Alarm`
    pub fn alarm_set(&self) -> BTreeMap<TrackId, PersonStateMachine> {
        self.states.alarms()
    }

    /// Capture the full mutable state
    pub fn checkpoint(&self) -> PipelineCheckpoint {
        PipelineCheckpoint {
            allocator: self.tracker.allocator().clone(),
            tracks: self.tracker.tracks().cloned().collect(),
            machines: self.states.machines().cloned().collect(),
            immobility: self.immobility.clone(),
            features: self.features.clone(),
            live: self.live.values().cloned().collect(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &TrackManager {
        &self.tracker
    }

    pub fn states(&self) -> &StateMachineManager {
        &self.states
    }

    pub fn immobility(&self) -> &ImmobilityEstimator {
        &self.immobility
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn features(&self) -> &FeatureWindow {
        &self.features
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::FallClass;
    use crate::reporter::DebugReporter;

    fn standing(t: f64) -> Observation {
        Observation::from_bbox(BoundingBox::new(100.0, 150.0, 80.0, 200.0), 480.0, t)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.tracking.min_hits = 0;
        assert!(matches!(
            FallPipeline::new(config),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_confirmed_tracks_are_reported() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
        let mut motion = ConstantMotion(30.0);

        let first = pipeline.process_frame(0.0, vec![standing(0.0)], &mut motion);
        assert!(first.tracks.is_empty());

        let second = pipeline.process_frame(0.1, vec![standing(0.1)], &mut motion);
        assert_eq!(second.tracks.len(), 1);
        let report = &second.tracks[0];
        assert_eq!(report.state, FallState::Standing);
        assert!(report.risk_score <= 30.0);
        assert_eq!(pipeline.live_tracks().len(), 1);
        assert!(pipeline.alarm_set().is_empty());
    }

    #[test]
    fn test_removed_tracks_release_everything() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
        let mut motion = ConstantMotion(30.0);
        pipeline.process_frame(0.0, vec![standing(0.0)], &mut motion);
        pipeline.process_frame(0.1, vec![standing(0.1)], &mut motion);

        let mut removed = Vec::new();
        for i in 0..3 {
            let report = pipeline.process_frame(0.2 + 0.1 * i as f64, vec![], &mut motion);
            removed.extend(report.removed);
        }
        assert_eq!(removed, vec![TrackId::new(0)]);
        assert!(pipeline.states().is_empty());
        assert!(pipeline.immobility().is_empty());
        assert!(pipeline.live_tracks().is_empty());
        assert_eq!(pipeline.features().frames(TrackId::new(0)), 0);
    }

    struct AlwaysFall;

    impl FallClassifier for AlwaysFall {
        fn classify(&mut self, _: TrackId, _: &TemporalFeatures) -> Option<Classification> {
            Some(Classification::new(FallClass::Fall, 0.95, 0.9))
        }
    }

    #[test]
    fn test_classifier_consulted_once_window_fills() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_classifier(AlwaysFall);
        let mut motion = ConstantMotion(30.0);

        let mut classified = Vec::new();
        for i in 0..12 {
            let t = 0.1 * i as f64;
            let report = pipeline.process_frame(t, vec![standing(t)], &mut motion);
            classified.extend(report.tracks.iter().map(|r| r.classification.is_some()));
        }
        // confirmed from frame 2, window full after 10 confirmed frames
        assert_eq!(classified.len(), 11);
        assert!(!classified[8]);
        assert!(classified[9]);
    }

    #[test]
    fn test_closure_motion_source() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
        let mut calls = 0;
        let mut motion = |_: TrackId, bbox: &BoundingBox| {
            calls += 1;
            bbox.height / 10.0
        };
        pipeline.process_frame(0.0, vec![standing(0.0)], &mut motion);
        let report = pipeline.process_frame(0.1, vec![standing(0.1)], &mut motion);
        assert_eq!(report.tracks[0].motion_energy, 20.0);
        assert_eq!(calls, 1);
    }

    struct Scripted(Vec<Option<Classification>>);

    impl FallClassifier for Scripted {
        fn classify(&mut self, _: TrackId, _: &TemporalFeatures) -> Option<Classification> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    #[test]
    fn test_out_of_range_classifications_are_sanitized() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_classifier(Scripted(vec![
                Some(Classification::new(FallClass::Fall, f64::NAN, 0.9)),
                Some(Classification::new(FallClass::Fall, 3.0, -0.5)),
            ]))
            .with_reporter(DebugReporter::new());
        let mut motion = ConstantMotion(30.0);

        let mut classifications = Vec::new();
        for i in 0..12 {
            let t = 0.1 * i as f64;
            let report = pipeline.process_frame(t, vec![standing(t)], &mut motion);
            classifications.extend(report.tracks.iter().map(|r| r.classification.clone()));
        }

        assert_eq!(classifications[9], None);
        let clamped = classifications[10].clone().unwrap();
        assert_eq!(clamped.probability, 1.0);
        assert_eq!(clamped.confidence, 0.0);
        for report in pipeline.live_tracks().values() {
            assert!(report.risk_score.is_finite());
        }
        assert_eq!(pipeline.reporter().signal_rejections().len(), 1);
    }

    #[test]
    fn test_non_finite_motion_energy_skips_the_track() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_reporter(DebugReporter::new());
        pipeline.process_frame(0.0, vec![standing(0.0)], &mut ConstantMotion(30.0));
        pipeline.process_frame(0.1, vec![standing(0.1)], &mut ConstantMotion(30.0));

        let report = pipeline.process_frame(0.2, vec![standing(0.2)], &mut ConstantMotion(f64::NAN));
        let id = TrackId::new(0);
        assert!(report.tracks.is_empty());
        assert_eq!(report.skipped, vec![id]);
        assert_eq!(pipeline.reporter().signal_rejections().len(), 1);
        assert_eq!(pipeline.live_tracks()[&id].timestamp, 0.1);

        let report = pipeline.process_frame(0.3, vec![standing(0.3)], &mut ConstantMotion(250.0));
        let track = report.track(id).unwrap();
        assert_eq!(track.motion_energy, 100.0);
        assert!(track.immobility_score.is_finite());
        assert!(pipeline.immobility().smoothed(id).is_finite());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_frame_label_does_not_drive_durations() {
        let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
        let mut motion = ConstantMotion(30.0);
        for i in 0..3 {
            let t = 0.1 * i as f64;
            let report = pipeline.process_frame(1000.0 + i as f64, vec![standing(t)], &mut motion);
            assert_eq!(report.timestamp, 1000.0 + i as f64);
        }
        let live = pipeline.live_tracks();
        let report = &live[&TrackId::new(0)];
        assert_eq!(report.timestamp, 0.2);
        let machine = pipeline.states().machines().next().unwrap();
        assert!((machine.time_in_state(report.timestamp) - 0.1).abs() < 1e-9);
    }
}
