//! Configuration types for the pipeline
//!
//! The tunables are split into focused, purpose-specific sections instead of
//! one monolithic parameter bag. Every section is `Serialize + Deserialize`
//! with `#[serde(default)]`, so a JSON document only needs to name the values
//! it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

/// Floor applied to the measurement noise variance so the innovation
/// covariance stays invertible whatever is configured.
pub const MEASUREMENT_NOISE_FLOOR: f64 = 1e-3;

/// Kalman estimator parameters, shared by every track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    /// Diagonal of the process noise covariance (Q)
    pub process_noise: f64,
    /// Diagonal of the measurement noise covariance (R)
    pub measurement_noise: f64,
    /// Diagonal of the initial state covariance (P₀)
    pub initial_uncertainty: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            measurement_noise: 10.0,
            initial_uncertainty: 1000.0,
        }
    }
}

impl KalmanConfig {
    /// Measurement noise after applying [`MEASUREMENT_NOISE_FLOOR`]
    #[inline]
    pub fn effective_measurement_noise(&self) -> f64 {
        self.measurement_noise.max(MEASUREMENT_NOISE_FLOOR)
    }
}

/// Track management parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Motion estimator parameters
    pub kalman: KalmanConfig,
    /// Maximum prediction-to-centroid distance (pixels) for an accepted match
    pub max_distance: f64,
    /// Frames a track may go unmatched before it is removed
    pub max_disappeared: u32,
    /// Observations needed before a track is exposed to callers
    pub min_hits: u64,
    /// Bounded observation history per track
    pub history_capacity: usize,
    /// Number of recent history entries used by the kinematic queries
    pub kinematic_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            kalman: KalmanConfig::default(),
            max_distance: 100.0,
            max_disappeared: 2,
            min_hits: 2,
            history_capacity: 60,
            kinematic_window: 10,
        }
    }
}

/// Which perception front end feeds the pipeline, selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionMode {
    /// Pose estimation: torso angle, floor distance and keypoints may be present
    #[default]
    Pose,
    /// Contour extraction only: degraded geometry-based posture votes
    Contour,
}

/// Thresholds of the lying-posture vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyingThresholds {
    /// Posture angle above which the body counts as horizontal (degrees)
    pub angle: f64,
    /// Centroid height fraction above which the body counts as low in frame
    pub centroid_height_ratio: f64,
    /// Normalized floor distance below which the body counts as near the floor
    pub floor_distance: f64,
    /// Bounding-box aspect ratio (w/h) counted as horizontal in contour mode
    pub aspect_ratio: f64,
}

impl Default for LyingThresholds {
    fn default() -> Self {
        Self {
            angle: 55.0,
            centroid_height_ratio: 0.60,
            floor_distance: 0.25,
            aspect_ratio: 1.5,
        }
    }
}

/// Thresholds of the falling-fast vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallingThresholds {
    /// Normalized vertical drop that counts as a fall onset
    pub drop: f64,
    /// Look-back window for the vertical drop, in seconds
    pub drop_window: f64,
    /// Normalized vertical speed that counts as a fall onset
    pub speed: f64,
}

impl Default for FallingThresholds {
    fn default() -> Self {
        Self {
            drop: 0.12,
            drop_window: 0.4,
            speed: 0.70,
        }
    }
}

/// Fall state machine and immobility parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Perception capability set
    pub perception: PerceptionMode,
    /// Motion energy (percent of changed pixels) below which a subject is immobile
    pub motion_threshold: f64,
    /// Motion energy samples averaged by the immobility estimator
    pub immobility_window: usize,
    /// Seconds a subject must stay lying in FALLING before FALLEN
    pub fall_duration_threshold: f64,
    /// Seconds a subject must stay immobile in FALLEN before ALARM
    pub immobility_threshold: f64,
    /// Lying-posture vote thresholds
    pub lying: LyingThresholds,
    /// Falling-fast vote thresholds
    pub falling: FallingThresholds,
    /// Classifier probability above which a fall label forces the lying vote
    pub classifier_override_probability: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            perception: PerceptionMode::default(),
            motion_threshold: 5.0,
            immobility_window: 10,
            fall_duration_threshold: 2.0,
            immobility_threshold: 5.0,
            lying: LyingThresholds::default(),
            falling: FallingThresholds::default(),
            classifier_override_probability: 0.8,
        }
    }
}

/// Weights of the risk components; independent tunables, need not sum to 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Weight of the fall-speed component
    pub fall_speed: f64,
    /// Weight of the immobility component
    pub immobility: f64,
    /// Weight of the lying-duration component
    pub lying_duration: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            fall_speed: 0.4,
            immobility: 0.3,
            lying_duration: 0.3,
        }
    }
}

/// Score thresholds separating the risk levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Lower bound of the warning level
    pub warning: f64,
    /// Lower bound of the alarm level (also the alert trigger)
    pub alarm: f64,
    /// Lower bound of the emergency level
    pub emergency: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            warning: 40.0,
            alarm: 65.0,
            emergency: 85.0,
        }
    }
}

/// Risk fusion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// When false every score is 0
    pub enabled: bool,
    /// Component weights
    pub weights: RiskWeights,
    /// Level thresholds
    pub thresholds: RiskThresholds,
    /// Vertical speed that saturates the fall-speed component
    pub max_fall_speed: f64,
    /// Seconds in FALLEN/ALARM that saturate the lying-duration component
    pub max_lying_duration: f64,
    /// Points added per unit of classifier fall probability
    pub classifier_boost: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: RiskWeights::default(),
            thresholds: RiskThresholds::default(),
            max_fall_speed: 10.0,
            max_lying_duration: 30.0,
            classifier_boost: 20.0,
        }
    }
}

/// Temporal feature window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWindowConfig {
    /// Frames kept per track
    pub capacity: usize,
    /// Frames required before temporal features are produced
    pub min_frames: usize,
}

impl Default for FeatureWindowConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            min_frames: 10,
        }
    }
}

/// Complete pipeline configuration
///
/// # Example
///
/// ```
/// use fallwatch::config::PipelineConfig;
///
/// let config = PipelineConfig::from_json(r#"{"detection": {"immobility_threshold": 3.0}}"#).unwrap();
/// assert_eq!(config.detection.immobility_threshold, 3.0);
/// assert_eq!(config.tracking.max_disappeared, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Track management
    pub tracking: TrackerConfig,
    /// State machine and immobility
    pub detection: DetectionConfig,
    /// Risk fusion
    pub risk: RiskConfig,
    /// Classifier feature window
    pub features: FeatureWindowConfig,
}

impl PipelineConfig {
    /// Set the assignment distance gate
    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.tracking.max_distance = max_distance;
        self
    }

    /// Set how many unmatched frames a track survives
    pub fn with_max_disappeared(mut self, frames: u32) -> Self {
        self.tracking.max_disappeared = frames;
        self
    }

    /// Set the perception capability set
    pub fn with_perception(mut self, mode: PerceptionMode) -> Self {
        self.detection.perception = mode;
        self
    }

    /// Set the FALLING -> FALLEN dwell time
    pub fn with_fall_duration_threshold(mut self, seconds: f64) -> Self {
        self.detection.fall_duration_threshold = seconds;
        self
    }

    /// Set the FALLEN -> ALARM dwell time
    pub fn with_immobility_threshold(mut self, seconds: f64) -> Self {
        self.detection.immobility_threshold = seconds;
        self
    }

    /// Set the immobility motion threshold
    pub fn with_motion_threshold(mut self, threshold: f64) -> Self {
        self.detection.motion_threshold = threshold;
        self
    }

    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Serialize to pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Check every parameter for finiteness and range
    pub fn validate(&self) -> Result<(), PipelineError> {
        let t = &self.tracking;
        let k = &t.kalman;
        non_negative("tracking.kalman.process_noise", k.process_noise)?;
        non_negative("tracking.kalman.measurement_noise", k.measurement_noise)?;
        positive("tracking.kalman.initial_uncertainty", k.initial_uncertainty)?;
        positive("tracking.max_distance", t.max_distance)?;
        if t.min_hits == 0 {
            return Err(PipelineError::configuration("tracking.min_hits must be at least 1"));
        }
        if t.history_capacity < 2 || t.kinematic_window < 2 {
            return Err(PipelineError::configuration(
                "tracking.history_capacity and tracking.kinematic_window must be at least 2",
            ));
        }

        let d = &self.detection;
        non_negative("detection.motion_threshold", d.motion_threshold)?;
        non_negative("detection.fall_duration_threshold", d.fall_duration_threshold)?;
        non_negative("detection.immobility_threshold", d.immobility_threshold)?;
        if d.immobility_window == 0 {
            return Err(PipelineError::configuration(
                "detection.immobility_window must be at least 1",
            ));
        }
        finite("detection.lying.angle", d.lying.angle)?;
        finite("detection.lying.centroid_height_ratio", d.lying.centroid_height_ratio)?;
        finite("detection.lying.floor_distance", d.lying.floor_distance)?;
        positive("detection.lying.aspect_ratio", d.lying.aspect_ratio)?;
        positive("detection.falling.drop_window", d.falling.drop_window)?;
        finite("detection.falling.drop", d.falling.drop)?;
        finite("detection.falling.speed", d.falling.speed)?;
        finite(
            "detection.classifier_override_probability",
            d.classifier_override_probability,
        )?;

        let r = &self.risk;
        non_negative("risk.weights.fall_speed", r.weights.fall_speed)?;
        non_negative("risk.weights.immobility", r.weights.immobility)?;
        non_negative("risk.weights.lying_duration", r.weights.lying_duration)?;
        positive("risk.max_fall_speed", r.max_fall_speed)?;
        positive("risk.max_lying_duration", r.max_lying_duration)?;
        non_negative("risk.classifier_boost", r.classifier_boost)?;
        let th = &r.thresholds;
        finite("risk.thresholds.warning", th.warning)?;
        if !(th.warning < th.alarm && th.alarm < th.emergency) || !th.emergency.is_finite() {
            return Err(PipelineError::configuration(format!(
                "risk thresholds must be strictly increasing, got {} / {} / {}",
                th.warning, th.alarm, th.emergency
            )));
        }

        let f = &self.features;
        if f.capacity == 0 || f.min_frames == 0 || f.min_frames > f.capacity {
            return Err(PipelineError::configuration(format!(
                "features.min_frames ({}) must be in 1..=capacity ({})",
                f.min_frames, f.capacity
            )));
        }

        Ok(())
    }
}

fn finite(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::configuration(format!("{} must be finite", name)))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), PipelineError> {
    finite(name, value)?;
    if value < 0.0 {
        return Err(PipelineError::configuration(format!(
            "{} must be non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

fn positive(name: &str, value: f64) -> Result<(), PipelineError> {
    finite(name, value)?;
    if value <= 0.0 {
        return Err(PipelineError::configuration(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking.min_hits, 2);
        assert_eq!(config.detection.lying.angle, 55.0);
        assert_eq!(config.risk.thresholds.emergency, 85.0);
    }

    #[test]
    fn test_measurement_noise_floor() {
        let kalman = KalmanConfig {
            measurement_noise: 0.0,
            ..KalmanConfig::default()
        };
        assert_eq!(kalman.effective_measurement_noise(), MEASUREMENT_NOISE_FLOOR);
    }

    #[test]
    fn test_json_roundtrip_and_partial_documents() {
        let config = PipelineConfig::default()
            .with_perception(PerceptionMode::Contour)
            .with_max_distance(42.0);
        let restored = PipelineConfig::from_json(&config.to_json_pretty()).unwrap();
        assert_eq!(restored, config);

        let partial = PipelineConfig::from_json(r#"{"risk": {"weights": {"immobility": 0.5}}}"#)
            .unwrap();
        assert_eq!(partial.risk.weights.immobility, 0.5);
        assert_eq!(partial.risk.weights.fall_speed, 0.4);
        assert_eq!(partial.detection.perception, PerceptionMode::Pose);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.risk.thresholds.alarm = 30.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration { .. })
        ));

        let mut config = PipelineConfig::default();
        config.tracking.kalman.process_noise = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tracking.min_hits = 0;
        assert!(config.validate().is_err());

        assert!(PipelineConfig::from_json("{not json").is_err());
    }
}
