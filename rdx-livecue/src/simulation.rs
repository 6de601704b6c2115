//! A simulated competition timing server.
//!
//! Runs an endless sequence of match slots starting at a configured instant
//! and answers `/current` requests in the same shape as the SRComp API, so
//! the engine can be exercised end to end without a real competition.
//!
//! Each slot is a pre-match period, the match itself, and a post-match
//! period. The match number increases by one per slot. The server reports a
//! match from the start of its slot until the start of the next one.
//!
//! All server state lives in one [`SimConfig`] value shared with the request
//! handlers; two servers in the same process never see each other.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// Lengths, in seconds, of the periods making up one match slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotTimings {
    pub pre: f64,
    pub game: f64,
    pub post: f64,
}

impl Default for SlotTimings {
    fn default() -> Self {
        Self {
            pre: 60.0,
            game: 150.0,
            post: 90.0,
        }
    }
}

impl SlotTimings {
    pub fn total(&self) -> f64 {
        self.pre + self.game + self.post
    }
}

/// Configuration of one simulated competition.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// When the first slot begins.
    pub start_time: DateTime<Utc>,
    /// The number of the first match.
    pub start_num: u32,
    /// The last match to run; no match is reported after it.
    pub end_num: Option<u32>,
    pub slot: SlotTimings,
}

/// The match a simulated clock is reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimMatch {
    pub num: u32,
    pub game_start: DateTime<Utc>,
}

impl SimConfig {
    /// A competition whose first slot starts at `start_time`, numbered from zero.
    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            start_num: 0,
            end_num: None,
            slot: SlotTimings::default(),
        }
    }

    /// A competition whose first slot starts `delay` from now.
    pub fn starting_in(delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        Self::starting_at(Utc::now() + delay)
    }

    /// A copy running matches `start_num` through `end_num`.
    pub fn with_matches(&self, start_num: u32, end_num: Option<u32>) -> Self {
        Self {
            start_num,
            end_num,
            ..self.clone()
        }
    }

    /// A copy with different slot timings.
    pub fn with_slot(&self, slot: SlotTimings) -> Self {
        Self {
            slot,
            ..self.clone()
        }
    }

    /// The match whose slot contains `now`, if any.
    pub fn current_match(&self, now: DateTime<Utc>) -> Option<SimMatch> {
        let elapsed = seconds(now - self.start_time);
        if elapsed < 0.0 {
            return None;
        }

        let slot_len = self.slot.total();
        let index = (elapsed / slot_len).floor();
        let num = u32::try_from(index as u64)
            .ok()
            .and_then(|i| self.start_num.checked_add(i))?;
        if self.end_num.is_some_and(|end| num > end) {
            return None;
        }

        let offset = index * slot_len + self.slot.pre;
        let game_start = self.start_time + chrono::Duration::microseconds((offset * 1e6).round() as i64);
        Some(SimMatch { num, game_start })
    }

    /// The `/current` payload as seen at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Value {
        let time = now.to_rfc3339_opts(SecondsFormat::Micros, false);
        let Some(current) = self.current_match(now) else {
            return json!({ "matches": [], "time": time });
        };

        let game_time = seconds(now - current.game_start);
        let phase = if game_time < 0.0 {
            "pre"
        } else if game_time < self.slot.game {
            "match"
        } else {
            "post"
        };

        json!({
            "matches": [{
                "num": current.num,
                "times": {
                    "game": {
                        "start": current.game_start.to_rfc3339_opts(SecondsFormat::Micros, false),
                    },
                },
            }],
            "time": time,
            "_debug": {
                "game_time": game_time,
                "slot_time": game_time + self.slot.pre,
                "match_phase": phase,
            },
        })
    }
}

fn seconds(delta: chrono::Duration) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Builds the HTTP router. Every path answers with the current snapshot.
pub fn build_router(config: Arc<SimConfig>) -> Router {
    Router::new()
        .route("/current", get(current_handler))
        .fallback(current_handler)
        .with_state(config)
}

async fn current_handler(State(config): State<Arc<SimConfig>>) -> Json<Value> {
    Json(config.snapshot(Utc::now()))
}

/// Binds `addr` and serves the simulated competition in a background task.
///
/// Returns the bound address, which differs from `addr` when port 0 was
/// requested, and the server task.
pub async fn spawn_server(
    addr: SocketAddr,
    config: SimConfig,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        "Simulated competition on http://{} (first match {} at {})",
        local_addr, config.start_num, config.start_time
    );
    let router = build_router(Arc::new(config));
    let handle = tokio::spawn(async move { axum::serve(listener, router).await });
    Ok((local_addr, handle))
}
