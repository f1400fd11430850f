//! Error types for the tracking-and-decision pipeline
//!
//! Nothing inside the core is fatal. Structural violations coming from the
//! perception collaborator are rejected at the boundary with an
//! [`ObservationError`]; everything else surfaces as a [`PipelineError`].

use std::fmt;

/// Errors that can occur while running the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// An observation was rejected at the boundary
    Observation(ObservationError),

    /// Innovation covariance could not be inverted
    SingularMatrix {
        /// Description of which matrix failed
        context: String,
    },

    /// Configuration error
    Configuration {
        /// Description of the configuration issue
        description: String,
    },

    /// A checkpoint or configuration document could not be (de)serialized
    Checkpoint {
        /// Description of the failure
        description: String,
    },
}

impl PipelineError {
    /// Shorthand for a configuration error
    pub fn configuration(description: impl Into<String>) -> Self {
        PipelineError::Configuration {
            description: description.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Observation(e) => write!(f, "Observation rejected: {}", e),
            PipelineError::SingularMatrix { context } => {
                write!(f, "Matrix inversion failed: {}", context)
            }
            PipelineError::Configuration { description } => {
                write!(f, "Configuration error: {}", description)
            }
            PipelineError::Checkpoint { description } => {
                write!(f, "Checkpoint error: {}", description)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Observation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ObservationError> for PipelineError {
    fn from(e: ObservationError) -> Self {
        PipelineError::Observation(e)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Checkpoint {
            description: e.to_string(),
        }
    }
}

/// Structural violations in an observation handed over by perception
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationError {
    /// A coordinate, size, angle or ratio is NaN or infinite
    NonFinite {
        /// Name of the offending field
        field: &'static str,
    },

    /// Width or height is negative
    NegativeDimension {
        /// Name of the offending field
        field: &'static str,
        /// The value received
        value: f64,
    },

    /// Capture timestamp is NaN or infinite
    NonFiniteTimestamp,

    /// Capture timestamp is older than the last one absorbed by the track
    TimestampRegression {
        /// Timestamp of the last absorbed observation
        previous: f64,
        /// Timestamp of the rejected observation
        current: f64,
    },
}

impl fmt::Display for ObservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationError::NonFinite { field } => {
                write!(f, "non-finite value in field '{}'", field)
            }
            ObservationError::NegativeDimension { field, value } => {
                write!(f, "negative dimension '{}' = {}", field, value)
            }
            ObservationError::NonFiniteTimestamp => write!(f, "non-finite capture timestamp"),
            ObservationError::TimestampRegression { previous, current } => {
                write!(
                    f,
                    "capture timestamp went backwards ({:.3}s -> {:.3}s)",
                    previous, current
                )
            }
        }
    }
}

impl std::error::Error for ObservationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::SingularMatrix {
            context: "innovation covariance".to_string(),
        };
        assert!(err.to_string().contains("innovation covariance"));

        let err = ObservationError::NegativeDimension {
            field: "width",
            value: -3.0,
        };
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn test_error_conversion() {
        let obs_err = ObservationError::NonFiniteTimestamp;
        let err: PipelineError = obs_err.clone().into();
        assert_eq!(err, PipelineError::Observation(obs_err));
        assert!(std::error::Error::source(&err).is_some());
    }
}
