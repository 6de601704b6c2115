//! Runs the engine against a steadily advancing clock on tokio's paused time.

use async_trait::async_trait;
use livecue::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Reports one match whose game time is the tokio time elapsed since creation.
struct SteadyClock {
    start: Instant,
    match_id: MatchId,
    ends_after: Option<f64>,
}

impl SteadyClock {
    fn new(match_id: MatchId) -> Self {
        Self {
            start: Instant::now(),
            match_id,
            ends_after: None,
        }
    }

    fn ending_after(mut self, secs: f64) -> Self {
        self.ends_after = Some(secs);
        self
    }
}

#[async_trait]
impl TimeSource for SteadyClock {
    async fn fetch(&self, _endpoint: &str) -> Result<Option<TimeSample>, TimingFetchError> {
        let game_time = self.start.elapsed().as_secs_f64();
        if self.ends_after.is_some_and(|end| game_time > end) {
            return Ok(None);
        }
        Ok(Some(TimeSample::new(game_time, self.match_id)))
    }

    fn name(&self) -> &'static str {
        "steady"
    }
}

fn cue(time: f64, target: &str, address: &str) -> Action {
    Action {
        time,
        message: CueMessage {
            target: target.to_string(),
            address: address.to_string(),
            args: vec![OscArg::Str("{match}".to_string())],
        },
        description: String::new(),
    }
}

fn runner_config() -> RunnerConfig {
    RunnerConfig::new(
        "http://timing.test/current",
        Schedule::new(vec![
            cue(20.0, "lights", "/finale"),
            cue(5.0, "lights", "/start"),
            cue(5.0, "sound", "/horn"),
        ]),
        vec![cue(0.0, "lights", "/house")],
    )
    .with_timing(Duration::from_secs(2), 10.0)
}

fn elapsed_secs(delivery: &livecue::dispatch::Delivery, start: Instant) -> f64 {
    delivery.at.duration_since(start).as_secs_f64()
}

#[tokio::test(start_paused = true)]
async fn coincident_cues_fire_together_and_nothing_fires_twice() {
    let start = Instant::now();
    let dispatcher = RecordingDispatcher::new();
    let engine = CueEngine::new(
        runner_config(),
        Arc::new(SteadyClock::new(MatchId(3))),
        Arc::new(dispatcher.clone()),
    );

    engine
        .run_until(tokio::time::sleep(Duration::from_secs(40)))
        .await
        .unwrap();

    let sent = dispatcher.deliveries();
    let addresses: Vec<_> = sent.iter().map(|d| d.message.address.as_str()).collect();
    assert_eq!(addresses, ["/start", "/horn", "/finale"]);
    assert!(sent.iter().all(|d| d.match_id == MatchId(3)));

    let times: Vec<f64> = sent.iter().map(|d| elapsed_secs(d, start)).collect();
    assert!((times[0] - 5.0).abs() < 0.01);
    assert_eq!(sent[0].at, sent[1].at);
    assert!((times[2] - 20.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn match_ending_after_the_schedule_is_not_an_anomaly() {
    let dispatcher = RecordingDispatcher::new();
    let engine = CueEngine::new(
        runner_config(),
        Arc::new(SteadyClock::new(MatchId(1)).ending_after(25.0)),
        Arc::new(dispatcher.clone()),
    );
    let mut events = engine.subscribe_events();

    engine
        .run_until(tokio::time::sleep(Duration::from_secs(40)))
        .await
        .unwrap();

    let addresses: Vec<_> = dispatcher
        .deliveries()
        .into_iter()
        .map(|d| d.message.address)
        .collect();
    assert_eq!(addresses, ["/start", "/horn", "/finale"]);

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, CueEvent::TimingAnomaly { .. }), "{event:?}");
        completed |= event == CueEvent::MatchCompleted { match_id: MatchId(1) };
    }
    assert!(completed);
}

#[tokio::test(start_paused = true)]
async fn match_vanishing_early_triggers_the_abort_sequence() {
    let dispatcher = RecordingDispatcher::new();
    let engine = CueEngine::new(
        runner_config(),
        Arc::new(SteadyClock::new(MatchId(2)).ending_after(10.0)),
        Arc::new(dispatcher.clone()),
    );

    engine
        .run_until(tokio::time::sleep(Duration::from_secs(30)))
        .await
        .unwrap();

    let sent = dispatcher.deliveries();
    let addresses: Vec<_> = sent.iter().map(|d| d.message.address.as_str()).collect();
    assert_eq!(addresses, ["/start", "/horn", "/house"]);
    assert_eq!(sent[2].match_id, MatchId::NONE);
}
