//! Defines the events broadcast by the cue engine.
//!
//! Subscribing is optional. The engine never waits on subscribers, and a slow
//! subscriber only loses events, it never delays a cue.

use crate::common::MatchId;
use crate::components::verifier::AnomalyKind;
use tokio::time::Instant;

/// Everything observable about a running engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CueEvent {
    /// Fired once when the run loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the run loop is about to exit.
    EngineShutdown,
    /// The clock started reporting a new match.
    MatchStarted { match_id: MatchId },
    /// The match ran past the last scheduled action.
    MatchCompleted { match_id: MatchId },
    /// Timing deviated from the schedule; the abort sequence follows.
    TimingAnomaly { kind: AnomalyKind },
    /// The abort sequence was run.
    AbortSequence { actions: usize },
    /// The engine has committed to a precise sleep before a cue.
    CueScheduled {
        index: usize,
        time: f64,
        delay_secs: f64,
    },
    /// A scheduled action was handed to the dispatcher.
    CueDispatched {
        index: usize,
        time: f64,
        match_id: MatchId,
    },
}
