//! # livecue
//!
//! A match-synchronised cue engine for live events.
//!
//! livecue polls a competition's timing API, works out how far into the
//! current match the event is, and fires time-coded device messages ("cues")
//! as close as possible to their scheduled offset, each exactly once. When
//! the observed timeline stops making sense (a match vanishes early, the
//! match number changes mid-match, or the clock runs backwards) it runs a
//! configured abort sequence and keeps watching.
//!
//! ## Core Concepts
//!
//! - **Schedule**: the configured actions, sorted by match time. Actions with
//!   the same time form a coincident group and are always fired together.
//! - **Time source**: one implementation per supported timing API, chosen
//!   from configuration. Each poll yields a game time and a match number, or
//!   nothing when no match is running.
//! - **Match verifier**: a small state machine that checks every sample for
//!   forward progress within a single match.
//! - **Engine**: the poll / sleep / dispatch loop. It polls coarsely until a
//!   cue is within the lock-in window, then sleeps precisely up to it.
//! - **Dispatcher**: delivers one message to one device, fire-and-forget.
//!   OSC over UDP is provided.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use livecue::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load and validate the configuration.
//!     let config = LiveConfig::load("cues.json")?;
//!
//!     // 2. Connect to the devices the cues are sent to.
//!     let dispatcher = OscDispatcher::connect(&config.devices).await?;
//!
//!     // 3. Create the engine.
//!     let engine = CueEngine::from_config(config.into_runner()?, Arc::new(dispatcher))?;
//!
//!     // 4. Optionally watch what it does.
//!     let mut events = engine.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     // 5. Run until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "livecue";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod simulation;
pub mod time_source;

/// A prelude module for easy importing of the most common livecue types.
pub mod prelude {
    pub use crate::common::{MatchId, TimeSample};
    pub use crate::components::action::{Action, CueMessage, OscArg, Schedule};
    pub use crate::components::verifier::{AnomalyKind, MatchVerifier, TimingVerdict};
    pub use crate::config::{LiveConfig, RunnerConfig};
    pub use crate::dispatch::{Dispatcher, OscDispatcher, RecordingDispatcher};
    pub use crate::engine::CueEngine;
    pub use crate::error::LiveError;
    pub use crate::events::CueEvent;
    pub use crate::simulation::SimConfig;
    pub use crate::time_source::{TimeSource, TimeSourceKind, TimingFetchError};
}
