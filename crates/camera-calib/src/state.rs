//! Process-wide calibration state machine.
//!
//! ```text
//! Idle -> Accumulating -> Solving -> Rectifying
//! Idle -> Rectifying          (parameters loaded from a store)
//! Rectifying -> Idle          (reset)
//! any -> Idle                 (abort / cancel / failure)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Accumulating,
    Solving,
    Rectifying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Accumulating => "accumulating",
            Phase::Solving => "solving",
            Phase::Rectifying => "rectifying",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid state transition {from} -> {to}")]
pub struct StateError {
    pub from: Phase,
    pub to: Phase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationState {
    phase: Phase,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationState {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_rectifying(&self) -> bool {
        self.phase == Phase::Rectifying
    }

    /// Whether `self.phase -> to` is a forward transition (aborts excluded).
    pub fn can_transition(&self, to: Phase) -> bool {
        matches!(
            (self.phase, to),
            (Phase::Idle, Phase::Accumulating)
                | (Phase::Accumulating, Phase::Solving)
                | (Phase::Solving, Phase::Rectifying)
                | (Phase::Idle, Phase::Rectifying)
                | (Phase::Rectifying, Phase::Idle)
        )
    }

    pub fn transition(&mut self, to: Phase) -> Result<(), StateError> {
        if !self.can_transition(to) {
            return Err(StateError {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    pub fn start_accumulating(&mut self) -> Result<(), StateError> {
        self.transition(Phase::Accumulating)
    }

    pub fn begin_solving(&mut self) -> Result<(), StateError> {
        self.transition(Phase::Solving)
    }

    /// Enter rectification, either after a solve or from loaded parameters.
    pub fn begin_rectifying(&mut self) -> Result<(), StateError> {
        self.transition(Phase::Rectifying)
    }

    /// Leave rectification.
    pub fn reset(&mut self) -> Result<(), StateError> {
        if self.phase != Phase::Rectifying {
            return Err(StateError {
                from: self.phase,
                to: Phase::Idle,
            });
        }
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Return to `Idle` from anywhere.
    pub fn abort(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_calibration_path() {
        let mut s = CalibrationState::new();
        s.start_accumulating().expect("idle -> accumulating");
        s.begin_solving().expect("accumulating -> solving");
        s.begin_rectifying().expect("solving -> rectifying");
        s.reset().expect("rectifying -> idle");
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn loaded_parameters_skip_to_rectifying() {
        let mut s = CalibrationState::new();
        s.begin_rectifying().expect("idle -> rectifying");
        assert!(s.is_rectifying());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut s = CalibrationState::new();
        assert_eq!(
            s.begin_solving(),
            Err(StateError {
                from: Phase::Idle,
                to: Phase::Solving
            })
        );
        assert!(s.reset().is_err());

        s.start_accumulating().expect("start");
        assert!(s.start_accumulating().is_err());
        assert!(s.begin_rectifying().is_err());
        assert!(s.reset().is_err());
        assert_eq!(s.phase(), Phase::Accumulating);
    }

    #[test]
    fn abort_from_any_phase() {
        for path in [
            vec![],
            vec![Phase::Accumulating],
            vec![Phase::Accumulating, Phase::Solving],
            vec![Phase::Rectifying],
        ] {
            let mut s = CalibrationState::new();
            for p in path {
                s.transition(p).expect("valid");
            }
            s.abort();
            assert_eq!(s.phase(), Phase::Idle);
        }
    }
}
