//! Time source backed by the SRComp competition API.

use super::{TimeSource, TimingFetchError};
use crate::common::{MatchId, TimeSample};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// How long a single request to the API may take.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Reads game time from an SRComp `/current` endpoint.
#[derive(Debug, Clone)]
pub struct SrcompTimeSource {
    client: reqwest::Client,
}

impl SrcompTimeSource {
    pub fn new() -> Result<Self, TimingFetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TimingFetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TimeSource for SrcompTimeSource {
    async fn fetch(&self, endpoint: &str) -> Result<Option<TimeSample>, TimingFetchError> {
        let body = self
            .client
            .get(endpoint)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_current(&body, Utc::now())
    }

    fn name(&self) -> &'static str {
        "srcomp"
    }
}

/// Interprets the body of a `/current` response received at `now`.
pub(crate) fn parse_current(
    body: &str,
    now: DateTime<Utc>,
) -> Result<Option<TimeSample>, TimingFetchError> {
    let data: Value =
        serde_json::from_str(body).map_err(|e| TimingFetchError::Decode(e.to_string()))?;

    let start = data
        .pointer("/matches/0/times/game/start")
        .and_then(Value::as_str);
    let current = data.get("time").and_then(Value::as_str);
    let match_num = data
        .pointer("/matches/0/num")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    let (Some(start), Some(current), Some(match_num)) = (start, current, match_num) else {
        debug!("Not in a match");
        return Ok(None);
    };

    let current = load_timestamp(current)?;
    let start = load_timestamp(start)?;

    let game_time = seconds_between(start, current);
    let clock_diff_ms = seconds_between(current, now) * 1000.0;

    debug!(
        "Received game time {:.3} for match {}, clock diff: {:.2} ms",
        game_time, match_num, clock_diff_ms
    );
    Ok(Some(TimeSample::new(game_time, MatchId(match_num))))
}

fn load_timestamp(timestamp: &str) -> Result<DateTime<Utc>, TimingFetchError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // Timestamps without an offset are taken to be UTC.
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| TimingFetchError::Timestamp(timestamp.to_string()))
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-04-12T10:02:30.500+00:00".parse().unwrap()
    }

    #[test]
    fn parses_running_match() {
        let body = r#"{
            "time": "2025-04-12T10:02:30.250+00:00",
            "matches": [{"num": 12, "times": {"game": {"start": "2025-04-12T10:01:00+00:00"}}}]
        }"#;
        let sample = parse_current(body, now()).unwrap().unwrap();
        assert_eq!(sample.match_id, MatchId(12));
        assert!((sample.game_time - 90.25).abs() < 1e-9);
    }

    #[test]
    fn pre_match_game_time_is_negative() {
        let body = r#"{
            "time": "2025-04-12T10:00:30+00:00",
            "matches": [{"num": 0, "times": {"game": {"start": "2025-04-12T10:01:00+00:00"}}}]
        }"#;
        let sample = parse_current(body, now()).unwrap().unwrap();
        assert_eq!(sample.game_time, -30.0);
    }

    #[test]
    fn empty_match_list_means_no_match() {
        let body = r#"{"time": "2025-04-12T10:02:30+00:00", "matches": []}"#;
        assert_eq!(parse_current(body, now()).unwrap(), None);
    }

    #[test]
    fn missing_time_key_means_no_match() {
        let body = r#"{"matches": [{"num": 1, "times": {"game": {"start": "2025-04-12T10:01:00+00:00"}}}]}"#;
        assert_eq!(parse_current(body, now()).unwrap(), None);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let body = r#"{
            "time": "2025-04-12T10:01:05",
            "matches": [{"num": 2, "times": {"game": {"start": "2025-04-12T10:01:00"}}}]
        }"#;
        let sample = parse_current(body, now()).unwrap().unwrap();
        assert_eq!(sample.game_time, 5.0);
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = parse_current("<html>", now()).unwrap_err();
        assert!(matches!(err, TimingFetchError::Decode(_)));
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let body = r#"{
            "time": "yesterday",
            "matches": [{"num": 2, "times": {"game": {"start": "2025-04-12T10:01:00+00:00"}}}]
        }"#;
        let err = parse_current(body, now()).unwrap_err();
        assert!(matches!(err, TimingFetchError::Timestamp(ref t) if t == "yesterday"));
    }
}
