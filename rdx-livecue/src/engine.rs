//! The core engine that polls the competition clock and fires cues.
//!
//! Each pass of the loop takes one time sample, checks it with the
//! [`MatchVerifier`], and then decides between three things: wait a coarse
//! `sleep_increment` and poll again, sleep precisely up to the next cue and
//! fire it, or do nothing because the schedule is exhausted. Cues within
//! `lock_in_time` of the current game time are slept to directly, which keeps
//! dispatch jitter near one timer tick without busy-polling the API.

use crate::common::{MatchId, TimeSample};
use crate::components::verifier::{MatchVerifier, TimingVerdict};
use crate::config::RunnerConfig;
use crate::dispatch::{self, Dispatcher};
use crate::error::LiveError;
use crate::events::CueEvent;
use crate::time_source::TimeSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the event channel. Lagging subscribers lose the oldest events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The main livecue engine.
///
/// Holds the run configuration together with the two collaborators it drives:
/// the time source it polls and the dispatcher it fires cues through. The
/// engine is cheap to clone; clones share the collaborators and the event
/// channel.
#[derive(Clone)]
pub struct CueEngine {
    config: Arc<RunnerConfig>,
    time_source: Arc<dyn TimeSource>,
    dispatcher: Arc<dyn Dispatcher>,
    event_sender: broadcast::Sender<CueEvent>,
}

/// State owned by one run of the loop.
struct LoopState {
    verifier: MatchVerifier,
    cursor: Option<DispatchCursor>,
}

/// How far through the schedule the current match has been dispatched.
///
/// Tracked by index so that a poll landing exactly on an already-fired cue's
/// time never fires it twice. Cleared on any anomaly and once a match is
/// over (no match reported, or the clock is past the final cue), so a match
/// that is reset or run again fires its cues again from wherever the clock
/// now stands.
#[derive(Debug, Clone, Copy)]
struct DispatchCursor {
    match_id: MatchId,
    next_index: usize,
}

impl LoopState {
    fn new(final_action_time: f64) -> Self {
        Self {
            verifier: MatchVerifier::new(final_action_time),
            cursor: None,
        }
    }

    /// Forgets dispatch progress once `sample` shows the match is over.
    fn settle(&mut self, sample: Option<&TimeSample>) {
        let final_action_time = self.verifier.final_action_time();
        if sample.map_or(true, |s| s.game_time > final_action_time) {
            self.cursor = None;
        }
    }

    /// The lowest schedule index still eligible to fire in `match_id`.
    fn floor_for(&self, match_id: MatchId) -> usize {
        match self.cursor {
            Some(cursor) if cursor.match_id == match_id => cursor.next_index,
            _ => 0,
        }
    }
}

impl CueEngine {
    /// Creates a new `CueEngine` from explicit collaborators.
    pub fn new(
        config: RunnerConfig,
        time_source: Arc<dyn TimeSource>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: Arc::new(config),
            time_source,
            dispatcher,
            event_sender,
        }
    }

    /// Creates a new `CueEngine`, building the time source the configuration selects.
    pub fn from_config(
        config: RunnerConfig,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, LiveError> {
        let time_source = config.time_source().build()?;
        Ok(Self::new(config, Arc::from(time_source), dispatcher))
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Subscribes to the `CueEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CueEvent> {
        self.event_sender.subscribe()
    }

    /// Runs the loop until Ctrl+C is received.
    pub async fn run(&self) -> Result<(), LiveError> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received."),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}. Running until killed.", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
    }

    /// Runs the loop until `shutdown` completes.
    ///
    /// Shutdown is observed at the loop's suspension points: while waiting on
    /// the time source and while sleeping. A shutdown during a precise sleep
    /// drops the pending cue.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), LiveError>
    where
        F: Future<Output = ()>,
    {
        let final_action_time = self
            .config
            .schedule()
            .final_time()
            .ok_or(LiveError::EmptySchedule)?;

        info!(
            "Cue engine starting: {} cues, {} abort actions, polling {} via {}.",
            self.config.schedule().len(),
            self.config.abort_actions().len(),
            self.config.endpoint(),
            self.time_source.name(),
        );
        self.emit(CueEvent::EngineStarted {
            timestamp: tokio::time::Instant::now(),
        });

        let mut state = LoopState::new(final_action_time);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.poll_once(&mut state) => {}
            }
        }

        self.emit(CueEvent::EngineShutdown);
        info!("Cue engine has shut down.");
        Ok(())
    }

    /// Runs every abort action once.
    pub fn run_abort(&self) {
        self.emit(CueEvent::AbortSequence {
            actions: self.config.abort_actions().len(),
        });
        dispatch::run_abort(self.config.abort_actions(), self.dispatcher.as_ref());
    }

    async fn poll_once(&self, state: &mut LoopState) {
        let sample = self.fetch_sample().await;

        let verdict = state.verifier.validate(sample.as_ref());
        self.observe(verdict, state);
        state.settle(sample.as_ref());

        let Some(sample) = sample else {
            self.idle().await;
            return;
        };

        let schedule = self.config.schedule();
        let floor = state.floor_for(sample.match_id);
        let Some(index) = schedule.locate_from(sample.game_time, floor) else {
            trace!(game_time = sample.game_time, "No cues remaining");
            self.idle().await;
            return;
        };
        let Some(action) = schedule.get(index) else {
            self.idle().await;
            return;
        };

        let remaining = action.time - sample.game_time;
        if remaining > self.config.lock_in_time() {
            trace!(index, remaining, "Next cue outside lock-in window");
            self.idle().await;
            return;
        }

        info!(
            "Scheduling action for {:.1} (in {:.3} secs): {}",
            action.time,
            remaining,
            action.label()
        );
        self.emit(CueEvent::CueScheduled {
            index,
            time: action.time,
            delay_secs: remaining,
        });
        tokio::time::sleep(Duration::try_from_secs_f64(remaining).unwrap_or_default()).await;

        let next_index = self.dispatch_group(index, sample.match_id);
        state.cursor = Some(DispatchCursor {
            match_id: sample.match_id,
            next_index,
        });
    }

    /// Polls the time source, folding failures into "no match running".
    async fn fetch_sample(&self) -> Option<TimeSample> {
        match self.time_source.fetch(self.config.endpoint()).await {
            Ok(sample) => {
                if let Some(sample) = &sample {
                    debug!(match_id = %sample.match_id, game_time = sample.game_time, "Sampled");
                }
                sample
            }
            Err(e) => {
                warn!("Failed to fetch game time: {}", e);
                None
            }
        }
    }

    fn observe(&self, verdict: TimingVerdict, state: &mut LoopState) {
        match verdict {
            TimingVerdict::Idle | TimingVerdict::InProgress => {}
            TimingVerdict::Started { match_id } => {
                info!("Match {} started.", match_id);
                self.emit(CueEvent::MatchStarted { match_id });
            }
            TimingVerdict::Completed { match_id } => {
                info!("Match {} completed.", match_id);
                self.emit(CueEvent::MatchCompleted { match_id });
            }
            TimingVerdict::Anomaly(kind) => {
                state.cursor = None;
                self.emit(CueEvent::TimingAnomaly { kind });
                self.run_abort();
            }
        }
    }

    /// Dispatches the coincident group starting at `index` and returns the
    /// index just past it.
    fn dispatch_group(&self, index: usize, match_id: MatchId) -> usize {
        let schedule = self.config.schedule();
        let group = schedule.coincident_group(index);
        let end = group.end;
        for i in group {
            let Some(action) = schedule.get(i) else {
                break;
            };
            info!("Performing action at {:.1}: {}", action.time, action.label());
            self.dispatcher.deliver(&action.message, match_id);
            self.emit(CueEvent::CueDispatched {
                index: i,
                time: action.time,
                match_id,
            });
        }
        debug!(match_id = %match_id, next_index = end, "Cue group dispatched");
        end
    }

    async fn idle(&self) {
        tokio::time::sleep(self.config.sleep_increment()).await;
    }

    fn emit(&self, event: CueEvent) {
        self.event_sender.send(event).ok();
    }
}
