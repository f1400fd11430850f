//! Fall state machine: indicator votes, transitions and per-track ownership.

pub mod indicators;
pub mod machine;
pub mod manager;

pub use indicators::{Indicators, LyingVote};
pub use machine::{next_state, DwellThresholds, FallState, PersonStateMachine, StepOutcome};
pub use manager::StateMachineManager;
