//! Time source abstraction for livecue.
//!
//! A time source answers one question per poll: how far into the current
//! match is the competition, and which match is it? Each supported timing API
//! gets its own implementation, selected once from configuration through
//! [`TimeSourceKind`].
//!
//! # Example
//!
//! ```ignore
//! let source = TimeSourceKind::Srcomp.build()?;
//! match source.fetch("http://compbox.local/comp-api/current").await? {
//!     Some(sample) => println!("match {} at {:.1}s", sample.match_id, sample.game_time),
//!     None => println!("no match running"),
//! }
//! ```

mod srcomp;

pub use srcomp::SrcompTimeSource;

use crate::common::TimeSample;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while fetching a time sample.
///
/// The scheduler treats every variant as "no match running" for that poll.
#[derive(Debug, Clone, Error)]
pub enum TimingFetchError {
    /// The request did not complete within the source's timeout.
    #[error("API request timed out")]
    Timeout,

    /// The timing API could not be reached.
    #[error("failed to connect to API: {0}")]
    Connect(String),

    /// The timing API answered with a non-success status.
    #[error("API request failed with status {0}")]
    Status(u16),

    /// Any other transport failure.
    #[error("API request failed: {0}")]
    Request(String),

    /// The response body was not valid JSON.
    #[error("failed to decode JSON: {0}")]
    Decode(String),

    /// A timestamp in the response could not be parsed.
    #[error("failed to decode timestamp: {0:?}")]
    Timestamp(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TimingFetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TimingFetchError::Timeout
        } else if e.is_connect() {
            TimingFetchError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TimingFetchError::Status(status.as_u16())
        } else if e.is_decode() {
            TimingFetchError::Decode(e.to_string())
        } else {
            TimingFetchError::Request(e.to_string())
        }
    }
}

/// A pluggable source of competition time.
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Fetches the current game time from `endpoint`.
    ///
    /// Returns `Ok(None)` when no match is currently running. Implementations
    /// must bound the call with their own timeout.
    async fn fetch(&self, endpoint: &str) -> Result<Option<TimeSample>, TimingFetchError>;

    /// A short name used in log lines.
    fn name(&self) -> &'static str;
}

/// The supported timing APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    /// The SRComp competition API (`/current` endpoint).
    #[default]
    Srcomp,
}

impl TimeSourceKind {
    /// Constructs the time source for this API.
    pub fn build(self) -> Result<Box<dyn TimeSource>, TimingFetchError> {
        match self {
            TimeSourceKind::Srcomp => Ok(Box::new(SrcompTimeSource::new()?)),
        }
    }
}
