/*!
# fallwatch - Multi-person fall detection pipeline

Per-frame tracking and decision core for unattended fall monitoring. A
perception front end turns video into per-person observations; this crate
keeps identities across frames, decides whether each person has fallen and
fuses the evidence into an urgency score.

## Features

- Constant-velocity Kalman tracking with Hungarian assignment and distance gating
- Hysteresis fall state machine (standing, falling, fallen, alarm)
- Motion-energy immobility smoothing
- Risk fusion with state-dependent bounds and an optional classifier boost
- Temporal feature windows for an external fall classifier
- Serializable checkpoints for crash recovery

## Modules

- [`tracking`] - Kalman estimator, tracks and the track manager
- [`state`] - Indicator votes, fall state machine and its manager
- [`immobility`] - Motion-energy smoothing
- [`risk`] - Risk fusion
- [`pipeline`] - The per-frame chain
- [`common`] - Low-level algorithms

## Example

```rust
use fallwatch::scenario::ScenarioGenerator;
use fallwatch::{ConstantMotion, FallPipeline, FallState, PipelineConfig};

let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
let mut generator = ScenarioGenerator::new(10.0, 42);

for frame in generator.hold(fallwatch::scenario::Pose::upright(), 20, 30.0) {
    let report = pipeline.process_frame(
        frame.timestamp,
        frame.observations,
        &mut ConstantMotion(frame.motion_energy),
    );
    for track in &report.tracks {
        assert_eq!(track.state, FallState::Standing);
    }
}
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Observations handed over by the perception front end
pub mod observation;

/// Error types
pub mod errors;

/// Configuration
pub mod config;

/// Low-level algorithms (optimal assignment)
pub mod common;

/// Multi-target tracking
///
/// - `KalmanEstimator`: per-track motion model
/// - `Track`: identity, history and kinematic queries
/// - `TrackManager`: association and lifecycle
pub mod tracking;

/// Motion-energy smoothing
pub mod immobility;

/// Fall state machine
pub mod state;

/// Risk fusion
pub mod risk;

/// Classifier feature windows
pub mod features;

/// Per-frame orchestration
pub mod pipeline;

/// Pipeline observability hooks
pub mod reporter;

/// Synthetic scenarios
pub mod scenario;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Core types
pub use observation::{
    BoundingBox, Classification, FallClass, Keypoint, Keypoints, Observation, MIN_DIMENSION,
};

// Configuration
pub use config::{
    DetectionConfig, FallingThresholds, FeatureWindowConfig, KalmanConfig, LyingThresholds,
    PerceptionMode, PipelineConfig, RiskConfig, RiskThresholds, RiskWeights, TrackerConfig,
};

// Errors
pub use errors::{ObservationError, PipelineError};

// Tracking
pub use tracking::{KalmanEstimator, Track, TrackId, TrackIdAllocator, TrackManager, TrackerStep};

// Decision components
pub use immobility::ImmobilityEstimator;
pub use risk::{RiskBreakdown, RiskComponents, RiskLevel, RiskScorer};
pub use state::{
    next_state, DwellThresholds, FallState, Indicators, LyingVote, PersonStateMachine,
    StateMachineManager, StepOutcome,
};

// Features
pub use features::{FeatureWindow, InstantFeatures, TemporalFeatures, FEATURE_NAMES};

// Pipeline
pub use pipeline::{
    AlarmEvent, ConstantMotion, FallClassifier, FallPipeline, FrameReport, MotionEnergySource,
    NoClassifier, ObservationFeatures, PipelineCheckpoint, TrackReport,
};

// Reporters
pub use reporter::{DebugReporter, LoggingReporter, NoOpReporter, PipelineReporter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
