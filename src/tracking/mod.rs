//! Multi-target tracking: motion estimation, track identity and association.

pub mod kalman;
pub mod manager;
pub mod track;

pub use kalman::KalmanEstimator;
pub use manager::{TrackIdAllocator, TrackManager, TrackerStep};
pub use track::{Track, TrackId};
