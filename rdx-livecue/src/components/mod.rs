//! Contains the building blocks the cue engine is assembled from.
//!
//! `action` holds the timed action model and the sorted schedule the engine
//! walks through; `verifier` holds the state machine that checks each clock
//! sample against what the schedule expects.

pub mod action;
pub mod verifier;
