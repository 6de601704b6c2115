//! The timed action model: cues, their OSC payloads, and the sorted schedule.

use crate::common::MatchId;
use serde::Deserialize;
use std::fmt;
use std::ops::Range;

/// Placeholder substituted with the current match number in string arguments.
pub const MATCH_PLACEHOLDER: &str = "{match}";

/// A single OSC argument value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OscArg {
    Bool(bool),
    Int(i32),
    /// Integers that do not fit in 32 bits, sent with the OSC `h` tag.
    Long(i64),
    Float(f32),
    Str(String),
}

impl OscArg {
    /// Returns this argument with the match placeholder filled in.
    ///
    /// Only string arguments are templated; every other value is returned as-is.
    pub fn render(&self, match_id: MatchId) -> OscArg {
        match self {
            OscArg::Str(s) if s.contains(MATCH_PLACEHOLDER) => {
                OscArg::Str(s.replace(MATCH_PLACEHOLDER, &match_id.to_string()))
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Bool(b) => write!(f, "{b}"),
            OscArg::Int(i) => write!(f, "{i}"),
            OscArg::Long(i) => write!(f, "{i}"),
            OscArg::Float(x) => write!(f, "{x}"),
            OscArg::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// A message addressed to one named device.
#[derive(Debug, Clone, PartialEq)]
pub struct CueMessage {
    /// The name of the device, as registered in the device list.
    pub target: String,
    /// The OSC address to send to on that device.
    pub address: String,
    pub args: Vec<OscArg>,
}

impl CueMessage {
    /// The argument list with match templating applied.
    pub fn render_args(&self, match_id: MatchId) -> Vec<OscArg> {
        self.args.iter().map(|arg| arg.render(match_id)).collect()
    }
}

/// A message to be delivered at a specific game time.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Seconds after the start of the match. Zero for abort actions.
    pub time: f64,
    pub message: CueMessage,
    /// Display-only text used in log lines.
    pub description: String,
}

impl Action {
    /// A short label for logging: the description, or the target and address.
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            format!("{} {}", self.message.target, self.message.address)
        } else {
            self.description.clone()
        }
    }
}

/// An immutable list of actions sorted ascending by time.
///
/// Sorting is stable, so actions configured with the same time keep their
/// relative order. Such actions form a coincident group and are always
/// dispatched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    actions: Vec<Action>,
}

impl Schedule {
    /// Creates a schedule, sorting the given actions by time.
    pub fn new(mut actions: Vec<Action>) -> Self {
        actions.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// The time of the last scheduled action, if there is one.
    pub fn final_time(&self) -> Option<f64> {
        self.actions.last().map(|a| a.time)
    }

    /// Finds the index of the first action with `time >= game_time`.
    ///
    /// Returns `None` when every action lies in the past.
    pub fn locate(&self, game_time: f64) -> Option<usize> {
        self.locate_from(game_time, 0)
    }

    /// Like [`Schedule::locate`], but never returns an index below `floor`.
    ///
    /// The scheduler uses the floor to skip actions it has already fired in
    /// the current match.
    pub fn locate_from(&self, game_time: f64, floor: usize) -> Option<usize> {
        let index = self
            .actions
            .partition_point(|a| a.time < game_time)
            .max(floor);
        (index < self.actions.len()).then_some(index)
    }

    /// The range of indices sharing the exact time of the action at `index`.
    ///
    /// The range starts at `index`; an out-of-bounds index yields an empty range.
    #[allow(clippy::float_cmp)]
    pub fn coincident_group(&self, index: usize) -> Range<usize> {
        let Some(first) = self.actions.get(index) else {
            return index..index;
        };
        let len = self.actions[index..]
            .iter()
            .take_while(|a| a.time == first.time)
            .count();
        index..index + len
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

#[cfg(test)]
pub(crate) fn action(time: f64, target: &str, address: &str) -> Action {
    Action {
        time,
        message: CueMessage {
            target: target.to_string(),
            address: address.to_string(),
            args: Vec::new(),
        },
        description: String::new(),
    }
}
