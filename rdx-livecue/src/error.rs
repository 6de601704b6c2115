//! Error types for livecue.

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::time_source::TimingFetchError;

/// Main error type for livecue operations.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dispatcher setup error.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The time source could not be constructed.
    #[error("time source error: {0}")]
    TimeSource(#[from] TimingFetchError),

    /// There is nothing to schedule.
    #[error("no actions are scheduled")]
    EmptySchedule,
}
