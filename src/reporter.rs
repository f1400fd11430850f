//! Observability for pipeline execution.
//!
//! This module provides the [`PipelineReporter`] trait. Reporters receive
//! callbacks at key points of each frame without polluting the tracking and
//! decision logic.
//!
//! # Zero-Cost Abstraction
//!
//! The default [`NoOpReporter`] compiles to zero overhead - all callback
//! methods are empty and will be optimized away by the compiler.
//!
//! # Example
//!
//! ```
//! use fallwatch::reporter::{DebugReporter, PipelineReporter};
//! use fallwatch::{ConstantMotion, FallPipeline, PipelineConfig};
//!
//! let mut pipeline = FallPipeline::new(PipelineConfig::default())
//!     .unwrap()
//!     .with_reporter(DebugReporter::new());
//!
//! pipeline.process_frame(0.0, vec![], &mut ConstantMotion(0.0));
//! assert_eq!(pipeline.reporter().frames().len(), 1);
//! ```

use std::collections::VecDeque;

use crate::errors::ObservationError;
use crate::pipeline::{AlarmEvent, FrameReport};
use crate::state::FallState;
use crate::tracking::{TrackId, TrackerStep};

// ============================================================================
// PipelineReporter Trait
// ============================================================================

/// Observability trait for per-frame execution.
///
/// All methods have default empty implementations, so you only need
/// to override the events you care about.
///
/// # Thread Safety
///
/// Reporters use `&mut self` for callbacks, so they are NOT required
/// to be `Send + Sync`.
pub trait PipelineReporter {
    /// Called after association, before any per-track work.
    fn on_tracks_updated(&mut self, _step: &TrackerStep) {}

    /// Called for every observation refused at the boundary or by its track.
    fn on_observation_rejected(&mut self, _index: usize, _error: &ObservationError) {}

    /// Called when a per-track input from a collaborator (motion energy or
    /// classification) is refused.
    fn on_signal_rejected(&mut self, _track_id: TrackId, _error: &ObservationError) {}

    /// Called once a retired track's per-track state has been released.
    fn on_track_removed(&mut self, _track_id: TrackId) {}

    /// Called when a track's fall state changes.
    fn on_transition(&mut self, _track_id: TrackId, _from: FallState, _to: FallState, _at: f64) {}

    /// Called once per `Alarm` entry.
    fn on_alarm(&mut self, _event: &AlarmEvent) {}

    /// Called with the complete frame result.
    fn on_frame_complete(&mut self, _report: &FrameReport) {}
}

// ============================================================================
// NoOpReporter
// ============================================================================

/// Zero-cost reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    /// Create a new no-op reporter.
    pub fn new() -> Self {
        Self
    }
}

impl PipelineReporter for NoOpReporter {}

// ============================================================================
// DebugReporter
// ============================================================================

/// A recorded state change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionRecord {
    pub track_id: TrackId,
    pub from: FallState,
    pub to: FallState,
    pub at: f64,
}

/// Frame reports kept by [`DebugReporter::new`]
pub const DEFAULT_FRAME_CAPACITY: usize = 1000;

/// Reporter that captures events for tests and post-hoc analysis.
///
/// # Memory Usage
///
/// Only the most recent `frame_capacity` frame reports are kept. The other
/// event lists are small and unbounded.
#[derive(Debug, Clone)]
pub struct DebugReporter {
    transitions: Vec<TransitionRecord>,
    alarms: Vec<AlarmEvent>,
    removed: Vec<TrackId>,
    rejected: Vec<(usize, ObservationError)>,
    signal_rejections: Vec<(TrackId, ObservationError)>,
    frames: VecDeque<FrameReport>,
    frame_capacity: usize,
}

impl Default for DebugReporter {
    fn default() -> Self {
        Self::with_frame_capacity(DEFAULT_FRAME_CAPACITY)
    }
}

impl DebugReporter {
    /// Create a new debug reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug reporter keeping at most `capacity` frame reports.
    pub fn with_frame_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::new(),
            alarms: Vec::new(),
            removed: Vec::new(),
            rejected: Vec::new(),
            signal_rejections: Vec::new(),
            frames: VecDeque::with_capacity(capacity.min(DEFAULT_FRAME_CAPACITY)),
            frame_capacity: capacity,
        }
    }

    /// Clear all captured events.
    pub fn clear(&mut self) {
        self.transitions.clear();
        self.alarms.clear();
        self.removed.clear();
        self.rejected.clear();
        self.signal_rejections.clear();
        self.frames.clear();
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Transitions of one track, in order
    pub fn transitions_for(&self, track_id: TrackId) -> Vec<TransitionRecord> {
        self.transitions
            .iter()
            .filter(|t| t.track_id == track_id)
            .copied()
            .collect()
    }

    pub fn alarms(&self) -> &[AlarmEvent] {
        &self.alarms
    }

    pub fn removed(&self) -> &[TrackId] {
        &self.removed
    }

    pub fn rejected(&self) -> &[(usize, ObservationError)] {
        &self.rejected
    }

    pub fn signal_rejections(&self) -> &[(TrackId, ObservationError)] {
        &self.signal_rejections
    }

    /// Most recent frame reports, oldest first
    pub fn frames(&self) -> &VecDeque<FrameReport> {
        &self.frames
    }

    /// Total number of captured events across all types.
    pub fn total_events(&self) -> usize {
        self.transitions.len()
            + self.alarms.len()
            + self.removed.len()
            + self.rejected.len()
            + self.signal_rejections.len()
            + self.frames.len()
    }
}

impl PipelineReporter for DebugReporter {
    fn on_observation_rejected(&mut self, index: usize, error: &ObservationError) {
        self.rejected.push((index, error.clone()));
    }

    fn on_signal_rejected(&mut self, track_id: TrackId, error: &ObservationError) {
        self.signal_rejections.push((track_id, error.clone()));
    }

    fn on_track_removed(&mut self, track_id: TrackId) {
        self.removed.push(track_id);
    }

    fn on_transition(&mut self, track_id: TrackId, from: FallState, to: FallState, at: f64) {
        self.transitions.push(TransitionRecord {
            track_id,
            from,
            to,
            at,
        });
    }

    fn on_alarm(&mut self, event: &AlarmEvent) {
        self.alarms.push(event.clone());
    }

    fn on_frame_complete(&mut self, report: &FrameReport) {
        if self.frame_capacity == 0 {
            return;
        }
        while self.frames.len() >= self.frame_capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(report.clone());
    }
}

// ============================================================================
// LoggingReporter
// ============================================================================

/// Reporter that forwards events to the `log` crate.
///
/// # Log Levels
///
/// - `on_alarm`: INFO
/// - `on_transition`, `on_track_removed`, `on_frame_complete` (verbose): DEBUG
/// - `on_tracks_updated`: TRACE
/// - `on_observation_rejected`, `on_signal_rejected`: WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter {
    /// Whether to log every track of every frame
    verbose: bool,
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Create a verbose logging reporter that includes per-track details.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl PipelineReporter for LoggingReporter {
    fn on_tracks_updated(&mut self, step: &TrackerStep) {
        log::trace!(
            "Tracks: {} confirmed, {} matched, {} created, {} removed",
            step.confirmed.len(),
            step.matched.len(),
            step.created.len(),
            step.removed.len()
        );
    }

    fn on_observation_rejected(&mut self, index: usize, error: &ObservationError) {
        log::warn!("Observation {} rejected: {}", index, error);
    }

    fn on_signal_rejected(&mut self, track_id: TrackId, error: &ObservationError) {
        log::warn!("Track {}: input rejected: {}", track_id, error);
    }

    fn on_track_removed(&mut self, track_id: TrackId) {
        log::debug!("Track {} released", track_id);
    }

    fn on_transition(&mut self, track_id: TrackId, from: FallState, to: FallState, at: f64) {
        log::debug!("Track {}: {} -> {} at {:.2}s", track_id, from, to, at);
    }

    fn on_alarm(&mut self, event: &AlarmEvent) {
        log::info!(
            "Alarm for track {} at {:.2}s: risk {:.1} ({})",
            event.track_id,
            event.alarm_time,
            event.risk_score,
            event.risk_level
        );
    }

    fn on_frame_complete(&mut self, report: &FrameReport) {
        if !self.verbose {
            return;
        }
        log::debug!(
            "Frame {:.2}s: {} tracks, {} alarms",
            report.timestamp,
            report.tracks.len(),
            report.alarms.len()
        );
        for t in &report.tracks {
            log::debug!(
                "  Track {}: state={}, risk={:.1} ({}), motion={:.1}",
                t.track_id,
                t.state,
                t.risk_score,
                t.risk_level,
                t.motion_energy
            );
        }
    }
}
