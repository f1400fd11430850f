//! Properties of the risk fusion over randomized components

use fallwatch::{
    Classification, FallClass, FallState, RiskComponents, RiskConfig, RiskLevel, RiskScorer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STATES: [FallState; 5] = [
    FallState::Standing,
    FallState::Falling,
    FallState::Fallen,
    FallState::Alarm,
    FallState::Bending,
];

fn random_components(rng: &mut StdRng) -> RiskComponents {
    RiskComponents {
        fall_speed: rng.gen_range(0.0..=1.0),
        immobility: rng.gen_range(0.0..=100.0),
        lying_duration: rng.gen_range(0.0..=1.0),
    }
}

#[test]
fn test_score_is_monotone_in_every_component() {
    let scorer = RiskScorer::new(RiskConfig::default());
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..500 {
        let base = random_components(&mut rng);
        let bumps = [
            RiskComponents {
                fall_speed: (base.fall_speed + rng.gen_range(0.0..0.5)).min(1.0),
                ..base
            },
            RiskComponents {
                immobility: (base.immobility + rng.gen_range(0.0..50.0)).min(100.0),
                ..base
            },
            RiskComponents {
                lying_duration: (base.lying_duration + rng.gen_range(0.0..0.5)).min(1.0),
                ..base
            },
        ];

        for state in STATES {
            let before = scorer.fuse(&base, state, None).score;
            for bumped in &bumps {
                let after = scorer.fuse(bumped, state, None).score;
                assert!(
                    after >= before,
                    "{:?}: {:?} -> {:?} lowered {} to {}",
                    state,
                    base,
                    bumped,
                    before,
                    after
                );
            }
        }
    }
}

#[test]
fn test_score_respects_state_bounds_and_range() {
    let scorer = RiskScorer::new(RiskConfig::default());
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..500 {
        let components = random_components(&mut rng);
        let classification = rng
            .gen_bool(0.5)
            .then(|| Classification::new(FallClass::Fall, rng.gen_range(0.0..=1.0), 1.0));

        for state in STATES {
            let score = scorer.fuse(&components, state, classification.as_ref()).score;
            assert!((0.0..=100.0).contains(&score), "{:?}: {}", state, score);
            match state {
                FallState::Standing => assert!(score <= 30.0),
                FallState::Falling => assert!(score >= 50.0),
                FallState::Fallen => assert!(score >= 60.0),
                FallState::Alarm => assert!(score >= 80.0),
                FallState::Bending => {}
            }
        }
    }
}

#[test]
fn test_fall_classification_never_lowers_score() {
    let scorer = RiskScorer::new(RiskConfig::default());
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..200 {
        let components = RiskComponents {
            immobility: 0.0,
            ..random_components(&mut rng)
        };
        let fall = Classification::new(FallClass::Fall, rng.gen_range(0.0..=1.0), 1.0);
        let not_fall = Classification::new(FallClass::NotFall, fall.probability, 1.0);

        for state in STATES {
            let plain = scorer.fuse(&components, state, None);
            let boosted = scorer.fuse(&components, state, Some(&fall));
            let ignored = scorer.fuse(&components, state, Some(&not_fall));
            assert!(boosted.score >= plain.score);
            assert_eq!(ignored.score, plain.score);
            assert_eq!(ignored.classifier_boost, 0.0);
        }
    }
}

#[test]
fn test_disabled_scorer_is_always_zero() {
    let scorer = RiskScorer::new(RiskConfig {
        enabled: false,
        ..RiskConfig::default()
    });
    let mut rng = StdRng::seed_from_u64(9);

    for _ in 0..100 {
        let components = random_components(&mut rng);
        for state in STATES {
            assert_eq!(scorer.fuse(&components, state, None).score, 0.0);
        }
    }
}

#[test]
fn test_levels_are_ordered_by_score() {
    let scorer = RiskScorer::new(RiskConfig::default());
    let mut previous = RiskLevel::Safe;
    for step in 0..=1000 {
        let score = step as f64 / 10.0;
        let level = scorer.risk_level(score);
        assert!(level >= previous, "level dropped at {}", score);
        assert_eq!(scorer.should_trigger_alert(score), level >= RiskLevel::Alarm);
        previous = level;
    }
    assert_eq!(previous, RiskLevel::Emergency);
}
