//! Verifies that matches advance the way the schedule expects.
//!
//! The polling loop samples the competition clock coarsely and irregularly, so
//! the verifier only asserts two things: time moves forward within one
//! identified match, and a match disappears from the clock only after the last
//! scheduled action. Anything else is reported as an anomaly.

use crate::common::{MatchId, TimeSample};
use std::fmt;
use tracing::{debug, warn};

/// The kind of timing anomaly observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyKind {
    /// The clock stopped reporting a match before the schedule finished.
    UnexpectedEnd { match_id: MatchId },
    /// A different match appeared while one was still in progress.
    MatchChanged { expected: MatchId, observed: MatchId },
    /// Game time went backwards within the same match.
    TimeRegressed { last: f64, observed: f64 },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::UnexpectedEnd { match_id } => {
                write!(f, "match {match_id} finished unexpectedly")
            }
            AnomalyKind::MatchChanged { expected, observed } => {
                write!(f, "match number changed mid-match ({expected} -> {observed})")
            }
            AnomalyKind::TimeRegressed { last, observed } => {
                write!(f, "match time decreased mid-match ({last:.3} -> {observed:.3})")
            }
        }
    }
}

/// The outcome of validating one time sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingVerdict {
    /// No match is running, and none was expected.
    Idle,
    /// A new match was observed.
    Started { match_id: MatchId },
    /// The current match advanced normally.
    InProgress,
    /// The current match ran past the final scheduled action.
    Completed { match_id: MatchId },
    /// Timing deviated from what the schedule expects.
    Anomaly(AnomalyKind),
}

impl TimingVerdict {
    /// Whether this verdict should be treated as normal operation.
    pub fn is_valid(&self) -> bool {
        !matches!(self, TimingVerdict::Anomaly(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum VerifierState {
    Idle,
    InMatch { current_match: MatchId, last_time: f64 },
}

/// A small state machine fed one time sample per poll.
#[derive(Debug, Clone)]
pub struct MatchVerifier {
    final_action_time: f64,
    state: VerifierState,
}

impl MatchVerifier {
    /// Creates a verifier for a schedule whose last action fires at `final_action_time`.
    pub fn new(final_action_time: f64) -> Self {
        Self {
            final_action_time,
            state: VerifierState::Idle,
        }
    }

    pub fn final_action_time(&self) -> f64 {
        self.final_action_time
    }

    /// Whether the verifier currently believes a match is in progress.
    pub fn in_match(&self) -> bool {
        matches!(self.state, VerifierState::InMatch { .. })
    }

    /// The match currently being tracked, if any.
    pub fn current_match(&self) -> Option<MatchId> {
        match self.state {
            VerifierState::InMatch { current_match, .. } => Some(current_match),
            VerifierState::Idle => None,
        }
    }

    /// Consumes one sample and reports whether timing is still as expected.
    pub fn validate(&mut self, sample: Option<&TimeSample>) -> TimingVerdict {
        let Some(sample) = sample else {
            return match std::mem::replace(&mut self.state, VerifierState::Idle) {
                VerifierState::Idle => TimingVerdict::Idle,
                VerifierState::InMatch { current_match, .. } => self.anomaly(AnomalyKind::UnexpectedEnd {
                    match_id: current_match,
                }),
            };
        };

        if sample.game_time > self.final_action_time {
            return match std::mem::replace(&mut self.state, VerifierState::Idle) {
                VerifierState::InMatch { current_match, .. } => {
                    debug!(match_id = %current_match, "Match passed the final scheduled action");
                    TimingVerdict::Completed {
                        match_id: current_match,
                    }
                }
                VerifierState::Idle => TimingVerdict::Idle,
            };
        }

        match self.state {
            VerifierState::Idle => {
                self.state = VerifierState::InMatch {
                    current_match: sample.match_id,
                    last_time: sample.game_time,
                };
                debug!(match_id = %sample.match_id, game_time = sample.game_time, "Entered match");
                TimingVerdict::Started {
                    match_id: sample.match_id,
                }
            }
            VerifierState::InMatch { current_match, .. } if current_match != sample.match_id => {
                self.state = VerifierState::Idle;
                self.anomaly(AnomalyKind::MatchChanged {
                    expected: current_match,
                    observed: sample.match_id,
                })
            }
            VerifierState::InMatch { last_time, .. } if sample.game_time < last_time => {
                self.state = VerifierState::Idle;
                self.anomaly(AnomalyKind::TimeRegressed {
                    last: last_time,
                    observed: sample.game_time,
                })
            }
            VerifierState::InMatch { current_match, .. } => {
                self.state = VerifierState::InMatch {
                    current_match,
                    last_time: sample.game_time,
                };
                TimingVerdict::InProgress
            }
        }
    }

    fn anomaly(&self, kind: AnomalyKind) -> TimingVerdict {
        warn!("{}", capitalize(&kind.to_string()));
        TimingVerdict::Anomaly(kind)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
