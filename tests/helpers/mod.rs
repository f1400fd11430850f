//! Shared fixtures for the integration tests
#![allow(dead_code)]

use fallwatch::scenario::{Pose, ScenarioFrame};
use fallwatch::{
    BoundingBox, ConstantMotion, FallClassifier, FallPipeline, FrameReport, PipelineConfig,
    PipelineReporter,
};

/// Dwell times short enough for a 10 fps scripted fall to reach every state
pub fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_fall_duration_threshold(0.15)
        .with_immobility_threshold(1.0)
}

/// Upright subject whose centroid sits at 30% of the frame height
pub fn standing_pose() -> Pose {
    Pose::new(BoundingBox::new(100.0, 44.0, 80.0, 200.0), 0.0)
}

/// Half-risen subject within the assignment gate of [`Pose::lying`]
pub fn recovering_pose() -> Pose {
    Pose::new(BoundingBox::new(110.0, 190.0, 80.0, 190.0), 10.0)
}

/// Feed scripted frames through a pipeline
pub fn run<C: FallClassifier, R: PipelineReporter>(
    pipeline: &mut FallPipeline<C, R>,
    frames: &[ScenarioFrame],
) -> Vec<FrameReport> {
    frames
        .iter()
        .map(|frame| {
            pipeline.process_frame(
                frame.timestamp,
                frame.observations.clone(),
                &mut ConstantMotion(frame.motion_energy),
            )
        })
        .collect()
}

/// Assert two floats are within `tol`
pub fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{}: expected {}, got {} (tolerance {})",
        what,
        expected,
        actual,
        tol
    );
}
