//! Launch phase transitions and the fixed transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::launch::{CountdownStatus, PreFlightStatus};

/// A phase transition requested by an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    PreFlightPassed,
    PreFlightFailed,
    StartCountdown,
    AbortCountdown,
    CompleteCountdown,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::PreFlightPassed => "pre_flight_passed",
            Transition::PreFlightFailed => "pre_flight_failed",
            Transition::StartCountdown => "start_countdown",
            Transition::AbortCountdown => "abort_countdown",
            Transition::CompleteCountdown => "complete_countdown",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-status pair a transition is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub pre_flight: PreFlightStatus,
    pub countdown: CountdownStatus,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pre_flight={:?}, countdown={:?}", self.pre_flight, self.countdown)
    }
}

/// Result of looking a transition up in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Legal transition to a new phase.
    Advance(Phase),
    /// The launch is already where the transition would take it.
    AlreadyThere,
    /// Not allowed from the current phase.
    Rejected,
}

/// Evaluate `transition` against `current`.
///
/// Countdown only starts after pre-flight PASSED, and ABORTED / COMPLETED
/// never move again.
pub fn evaluate(current: Phase, transition: Transition) -> Step {
    use CountdownStatus as C;
    use PreFlightStatus as P;

    let Phase {
        pre_flight,
        countdown,
    } = current;

    match transition {
        Transition::PreFlightPassed => match (pre_flight, countdown) {
            (P::Passed, _) => Step::AlreadyThere,
            (P::Pending, C::NotStarted) => Step::Advance(Phase {
                pre_flight: P::Passed,
                countdown,
            }),
            _ => Step::Rejected,
        },
        Transition::PreFlightFailed => match (pre_flight, countdown) {
            (P::Failed, _) => Step::AlreadyThere,
            (P::Pending, C::NotStarted) => Step::Advance(Phase {
                pre_flight: P::Failed,
                countdown,
            }),
            _ => Step::Rejected,
        },
        Transition::StartCountdown => match (pre_flight, countdown) {
            (_, C::InProgress) => Step::AlreadyThere,
            (P::Passed, C::NotStarted) => Step::Advance(Phase {
                pre_flight,
                countdown: C::InProgress,
            }),
            _ => Step::Rejected,
        },
        Transition::AbortCountdown => match (pre_flight, countdown) {
            (_, C::Aborted) => Step::AlreadyThere,
            (P::Pending | P::Passed, c) if !c.is_terminal() => Step::Advance(Phase {
                pre_flight,
                countdown: C::Aborted,
            }),
            _ => Step::Rejected,
        },
        Transition::CompleteCountdown => match countdown {
            C::Completed => Step::AlreadyThere,
            C::InProgress => Step::Advance(Phase {
                pre_flight,
                countdown: C::Completed,
            }),
            _ => Step::Rejected,
        },
    }
}
