//! End-to-end fall scenarios
//!
//! A subject is scripted at 10 fps through standing, falling, lying still
//! and recovering, and the pipeline's states, alarms and risk are checked
//! after every phase.

mod helpers;

use fallwatch::scenario::{Pose, ScenarioGenerator};
use fallwatch::{
    DebugReporter, FallPipeline, FallState, PerceptionMode, PipelineConfig, RiskLevel, TrackId,
};
use nalgebra::Vector2;

use helpers::{fast_config, recovering_pose, run, standing_pose};

const SUBJECT: TrackId = TrackId::new(0);

#[test]
fn test_scenario_a_stationary_subject_stays_standing() {
    let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
    let frames = ScenarioGenerator::new(10.0, 1).hold(standing_pose(), 30, 30.0);

    let reports = run(&mut pipeline, &frames);

    for report in &reports[1..] {
        assert_eq!(report.tracks.len(), 1);
        let track = &report.tracks[0];
        assert_eq!(track.state, FallState::Standing);
        assert!(track.risk_score <= 30.0, "risk {}", track.risk_score);
        assert_eq!(track.risk_level, RiskLevel::Safe);
    }
    assert!(reports.iter().all(|r| r.alarms.is_empty()));
}

#[test]
fn test_scenario_b_fall_reaches_fallen() {
    let mut pipeline = FallPipeline::new(fast_config())
        .unwrap()
        .with_reporter(DebugReporter::new());
    let frames = ScenarioGenerator::new(10.0, 1).fall(10);

    run(&mut pipeline, &frames);

    let path: Vec<FallState> = pipeline
        .reporter()
        .transitions_for(SUBJECT)
        .iter()
        .map(|t| t.to)
        .collect();
    let falling = path.iter().position(|s| *s == FallState::Falling);
    let fallen = path.iter().position(|s| *s == FallState::Fallen);
    assert!(falling.is_some(), "path {:?}", path);
    assert!(fallen.is_some(), "path {:?}", path);
    assert!(falling < fallen);

    assert_eq!(pipeline.states().state(SUBJECT), Some(FallState::Fallen));
    assert!(pipeline.reporter().alarms().is_empty());
}

#[test]
fn test_scenario_c_immobile_after_fall_raises_alarm_once() {
    let config = fast_config();
    let immobility_frames = (config.detection.immobility_threshold * 10.0) as usize + 5;
    let mut pipeline = FallPipeline::new(config)
        .unwrap()
        .with_reporter(DebugReporter::new());
    let mut generator = ScenarioGenerator::new(10.0, 1);

    run(&mut pipeline, &generator.fall(10));
    let reports = run(&mut pipeline, &generator.hold(Pose::lying(), immobility_frames, 1.0));

    let alarms: Vec<_> = reports.iter().flat_map(|r| r.alarms.iter()).collect();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].track_id, SUBJECT);
    assert_eq!(alarms[0].state, FallState::Alarm);
    assert!(alarms[0].risk_score >= 80.0);
    assert_eq!(pipeline.reporter().alarms().len(), 1);

    let machine = pipeline.states().machine(SUBJECT).unwrap();
    assert_eq!(machine.state(), FallState::Alarm);
    assert!(machine.alarm_triggered());
    assert_eq!(machine.alarm_time(), Some(alarms[0].alarm_time));

    let last = reports.last().unwrap().track(SUBJECT).unwrap();
    assert!(last.risk_score >= 80.0);
    assert!(pipeline.alarm_set().contains_key(&SUBJECT));
}

#[test]
fn test_scenario_d_recovery_clears_alarm() {
    let mut pipeline = FallPipeline::new(fast_config()).unwrap();
    let mut generator = ScenarioGenerator::new(10.0, 1);

    run(&mut pipeline, &generator.fall(10));
    run(&mut pipeline, &generator.hold(Pose::lying(), 20, 1.0));
    assert_eq!(pipeline.states().state(SUBJECT), Some(FallState::Alarm));

    let reports = run(&mut pipeline, &generator.hold(recovering_pose(), 1, 15.0));

    let report = reports[0].track(SUBJECT).unwrap();
    assert_eq!(report.state, FallState::Standing);
    assert!(report.risk_score <= 30.0);
    let machine = pipeline.states().machine(SUBJECT).unwrap();
    assert!(!machine.alarm_triggered());
    assert_eq!(machine.alarm_time(), None);
    assert!(pipeline.alarm_set().is_empty());
}

#[test]
fn test_alarm_can_fire_again_after_recovery() {
    let mut pipeline = FallPipeline::new(fast_config()).unwrap();
    let mut generator = ScenarioGenerator::new(10.0, 1);

    run(&mut pipeline, &generator.fall(10));
    let first: usize = run(&mut pipeline, &generator.hold(Pose::lying(), 20, 1.0))
        .iter()
        .map(|r| r.alarms.len())
        .sum();
    run(&mut pipeline, &generator.hold(recovering_pose(), 1, 15.0));

    // Straight back down and still again
    let second_fall = generator.transition(recovering_pose(), Pose::lying(), 5, (10.0, 1.0));
    run(&mut pipeline, &second_fall);
    let second: usize = run(&mut pipeline, &generator.hold(Pose::lying(), 30, 1.0))
        .iter()
        .map(|r| r.alarms.len())
        .sum();

    assert_eq!(first, 1);
    assert_eq!(second, 1);
}

#[test]
fn test_contour_mode_detects_fall() {
    let config = fast_config().with_perception(PerceptionMode::Contour);
    let mut pipeline = FallPipeline::new(config).unwrap();
    let mut generator = ScenarioGenerator::new(10.0, 1);

    run(&mut pipeline, &generator.fall(10));
    run(&mut pipeline, &generator.hold(Pose::lying(), 20, 1.0));

    assert_eq!(pipeline.states().state(SUBJECT), Some(FallState::Alarm));
}

#[test]
fn test_walking_subject_never_falls() {
    let mut pipeline = FallPipeline::new(PipelineConfig::default()).unwrap();
    let frames = ScenarioGenerator::new(10.0, 3)
        .with_jitter(1.5)
        .walk(standing_pose(), Vector2::new(60.0, 0.0), 60, 25.0);

    let reports = run(&mut pipeline, &frames);

    for report in &reports[1..] {
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].state, FallState::Standing);
    }
}

#[test]
fn test_warning_flag_while_falling() {
    let mut pipeline = FallPipeline::new(fast_config()).unwrap();
    let reports = run(&mut pipeline, &ScenarioGenerator::new(10.0, 1).fall(10));

    for track in reports.iter().flat_map(|r| r.tracks.iter()) {
        let expected = track.state == FallState::Falling && track.risk_level == RiskLevel::Warning;
        assert_eq!(track.warning, expected);
        if track.state == FallState::Falling {
            assert!(track.risk_score >= 50.0);
        }
    }
}
