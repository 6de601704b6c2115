//! Contains common, primitive types shared across the livecue engine.
//!
//! `MatchId` identifies a match as reported by the competition clock, and
//! `TimeSample` is the unit of information a time source produces on each
//! poll. Keeping them as distinct types stops a match number from being
//! confused with an action index or a device name.

use std::fmt;

/// Uniquely identifies a match within a competition.
///
/// Match numbers come straight from the timing API. `MatchId::NONE` is used
/// when a message is delivered outside of any match context, such as during
/// the abort sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchId(pub u32);

impl MatchId {
    /// The tag used for deliveries that have no active match.
    pub const NONE: MatchId = MatchId(0);
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single observation of the competition clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Seconds elapsed since the start of the match. May be negative during
    /// the pre-match period.
    pub game_time: f64,
    /// The match the clock is currently reporting.
    pub match_id: MatchId,
}

impl TimeSample {
    pub fn new(game_time: f64, match_id: MatchId) -> Self {
        Self {
            game_time,
            match_id,
        }
    }
}
