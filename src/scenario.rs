//! Synthetic observation sequences
//!
//! Deterministic scripted subjects (standing, falling, lying, walking) for
//! tests, benchmarks and the replay demo. Positions can be perturbed with
//! seeded Gaussian jitter so runs are reproducible.

use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::observation::{BoundingBox, Observation};

/// Frame height assumed by the generated centroid height fractions
pub const FRAME_HEIGHT: f64 = 480.0;

/// Geometry of one subject in one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub bbox: BoundingBox,
    /// Body orientation in degrees
    pub orientation: f64,
}

impl Pose {
    pub fn new(bbox: BoundingBox, orientation: f64) -> Self {
        Self { bbox, orientation }
    }

    /// Upright adult, 80×200 box
    pub fn upright() -> Self {
        Self::new(BoundingBox::new(100.0, 150.0, 80.0, 200.0), 0.0)
    }

    /// Lying on the floor, 168×90 box
    pub fn lying() -> Self {
        Self::new(BoundingBox::new(100.0, 300.0, 168.0, 90.0), 90.0)
    }

    /// Same pose shifted by `(dx, dy)` pixels
    pub fn shifted(mut self, dx: f64, dy: f64) -> Self {
        self.bbox.x += dx;
        self.bbox.y += dy;
        self
    }

    /// Box interpolated linearly; the orientation finishes at half way, so
    /// the body tilts before the box settles
    fn toward(&self, target: &Pose, s: f64) -> Pose {
        let lerp = |a: f64, b: f64, s: f64| a + (b - a) * s;
        let (a, b) = (&self.bbox, &target.bbox);
        Pose {
            bbox: BoundingBox::new(
                lerp(a.x, b.x, s),
                lerp(a.y, b.y, s),
                lerp(a.width, b.width, s),
                lerp(a.height, b.height, s),
            ),
            orientation: lerp(self.orientation, target.orientation, (2.0 * s).min(1.0)),
        }
    }
}

/// Observations and motion energy for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFrame {
    pub timestamp: f64,
    pub observations: Vec<Observation>,
    /// Motion energy reported for every subject in the frame
    pub motion_energy: f64,
}

/// Scripted sequence generator with a running frame clock
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    fps: f64,
    frame: u64,
    rng: StdRng,
    jitter: Option<Normal<f64>>,
}

impl ScenarioGenerator {
    /// Jitter-free generator at `fps` frames per second
    pub fn new(fps: f64, seed: u64) -> Self {
        Self {
            fps,
            frame: 0,
            rng: StdRng::seed_from_u64(seed),
            jitter: None,
        }
    }

    /// Add zero-mean Gaussian noise (pixels) to every box position
    pub fn with_jitter(mut self, std_dev: f64) -> Self {
        self.jitter = Normal::new(0.0, std_dev).ok().filter(|_| std_dev > 0.0);
        self
    }

    /// Timestamp of the next generated frame
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.fps
    }

    fn tick(&mut self) -> f64 {
        let t = self.now();
        self.frame += 1;
        t
    }

    fn observe(&mut self, pose: &Pose, timestamp: f64) -> Observation {
        let mut bbox = pose.bbox;
        if let Some(noise) = &self.jitter {
            bbox.x += noise.sample(&mut self.rng);
            bbox.y += noise.sample(&mut self.rng);
        }
        Observation::from_bbox(bbox, FRAME_HEIGHT, timestamp).with_orientation(pose.orientation)
    }

    fn frame_of(&mut self, poses: &[Pose], motion_energy: f64) -> ScenarioFrame {
        let timestamp = self.tick();
        let observations = poses.iter().map(|p| self.observe(p, timestamp)).collect();
        ScenarioFrame {
            timestamp,
            observations,
            motion_energy,
        }
    }

    /// One subject holding `pose`
    pub fn hold(&mut self, pose: Pose, frames: usize, motion_energy: f64) -> Vec<ScenarioFrame> {
        (0..frames)
            .map(|_| self.frame_of(&[pose], motion_energy))
            .collect()
    }

    /// One subject moving from `from` to `to`, both endpoints included, with
    /// motion energy ramping linearly
    pub fn transition(
        &mut self,
        from: Pose,
        to: Pose,
        frames: usize,
        motion: (f64, f64),
    ) -> Vec<ScenarioFrame> {
        let last = frames.saturating_sub(1).max(1) as f64;
        (0..frames)
            .map(|i| {
                let s = i as f64 / last;
                let pose = from.toward(&to, s);
                self.frame_of(&[pose], motion.0 + (motion.1 - motion.0) * s)
            })
            .collect()
    }

    /// Upright to lying over `frames` frames, motion energy fading from 20 to 2
    pub fn fall(&mut self, frames: usize) -> Vec<ScenarioFrame> {
        self.transition(Pose::upright(), Pose::lying(), frames, (20.0, 2.0))
    }

    /// One subject translating at `velocity` pixels/second
    pub fn walk(
        &mut self,
        start: Pose,
        velocity: Vector2<f64>,
        frames: usize,
        motion_energy: f64,
    ) -> Vec<ScenarioFrame> {
        (0..frames)
            .map(|_| {
                let elapsed = self.now();
                let pose = start.shifted(velocity.x * elapsed, velocity.y * elapsed);
                self.frame_of(&[pose], motion_energy)
            })
            .collect()
    }

    /// `subjects` upright people spaced 200 px apart, each drifting right at
    /// 20 pixels/second
    pub fn crowd(&mut self, subjects: usize, frames: usize, motion_energy: f64) -> Vec<ScenarioFrame> {
        (0..frames)
            .map(|_| {
                let drift = 20.0 * self.now();
                let poses: Vec<Pose> = (0..subjects)
                    .map(|k| Pose::upright().shifted(200.0 * k as f64 + drift, 0.0))
                    .collect();
                self.frame_of(&poses, motion_energy)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_runs_across_calls() {
        let mut generator = ScenarioGenerator::new(10.0, 1);
        let a = generator.hold(Pose::upright(), 3, 30.0);
        let b = generator.hold(Pose::upright(), 2, 30.0);
        assert_eq!(a[2].timestamp, 0.2);
        assert_eq!(b[0].timestamp, 0.3);
        assert_eq!(generator.now(), 0.5);
    }

    #[test]
    fn test_fall_endpoints() {
        let mut generator = ScenarioGenerator::new(10.0, 1);
        let frames = generator.fall(10);
        let first = &frames[0].observations[0];
        let last = &frames[9].observations[0];

        assert_eq!(first.bbox, Pose::upright().bbox);
        assert_eq!(last.bbox, Pose::lying().bbox);
        assert_eq!(last.orientation, 90.0);
        assert!((last.centroid_height_ratio - 345.0 / 480.0).abs() < 1e-12);
        assert_eq!(frames[0].motion_energy, 20.0);
        assert!((frames[9].motion_energy - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_jitter_is_seeded() {
        let a = ScenarioGenerator::new(10.0, 7)
            .with_jitter(2.0)
            .hold(Pose::upright(), 5, 30.0);
        let b = ScenarioGenerator::new(10.0, 7)
            .with_jitter(2.0)
            .hold(Pose::upright(), 5, 30.0);
        assert_eq!(a, b);
        assert_ne!(a[0].observations[0].bbox, Pose::upright().bbox);
    }

    #[test]
    fn test_crowd_spacing() {
        let frames = ScenarioGenerator::new(10.0, 1).crowd(3, 2, 30.0);
        let xs: Vec<f64> = frames[1].observations.iter().map(|o| o.bbox.x).collect();
        assert!((xs[1] - xs[0] - 200.0).abs() < 1e-9);
        assert!((xs[2] - xs[1] - 200.0).abs() < 1e-9);
    }
}
