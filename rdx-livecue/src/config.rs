//! Defines the configuration structures for the livecue engine.
//!
//! A configuration file names the timing API to poll, the devices cues are
//! sent to, the scheduled actions, and the abort actions. Files are loaded
//! with the `config` crate; JSON files may carry whole-line `//` comments.
//! Any top-level key can be overridden from the environment with the
//! `LIVECUE_` prefix (for example `LIVECUE_API_URL`).
//!
//! The file-facing [`LiveConfig`] is validated and turned into the immutable
//! [`RunnerConfig`] the engine runs from.

use crate::components::action::{Action, CueMessage, OscArg, Schedule};
use crate::dispatch::DeviceConfig;
use crate::time_source::TimeSourceKind;
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default seconds between coarse polls.
pub const DEFAULT_SLEEP_INCREMENT: f64 = 2.0;
/// Default window, in seconds before a cue, in which the engine commits to a precise sleep.
pub const DEFAULT_LOCK_IN_TIME: f64 = 10.0;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not one we know how to parse.
    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The `config` crate rejected the file.
    #[error(transparent)]
    Load(#[from] ::config::ConfigError),

    /// An action refers to a device that is not registered.
    #[error("unknown device {device:?} in action {action:?}")]
    UnknownDevice { device: String, action: String },

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// The top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// The endpoint polled for the current game time.
    pub api_url: String,

    /// Which timing API `api_url` speaks.
    #[serde(default)]
    pub time_source: TimeSourceKind,

    /// Seconds to wait between polls while no cue is close.
    #[serde(default = "default_sleep_increment")]
    pub sleep_increment: f64,

    /// How close, in seconds, a cue must be before the engine sleeps straight to it.
    #[serde(default = "default_lock_in_time")]
    pub lock_in_time: f64,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,

    /// Actions run when timing goes wrong. Their `time` is ignored.
    #[serde(default)]
    pub abort_actions: Vec<ActionConfig>,
}

/// One action as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub time: f64,
    pub device: String,
    /// The OSC address to send.
    pub message: String,
    #[serde(default)]
    pub args: ArgsConfig,
    #[serde(default)]
    pub description: String,
}

/// Arguments may be written as a list or as a single value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArgsConfig {
    Many(Vec<OscArg>),
    One(OscArg),
}

impl Default for ArgsConfig {
    fn default() -> Self {
        ArgsConfig::Many(Vec::new())
    }
}

impl ArgsConfig {
    fn into_vec(self) -> Vec<OscArg> {
        match self {
            ArgsConfig::Many(args) => args,
            ArgsConfig::One(arg) => vec![arg],
        }
    }
}

impl ActionConfig {
    fn into_action(self, time: f64) -> Action {
        Action {
            time,
            message: CueMessage {
                target: self.device,
                address: self.message,
                args: self.args.into_vec(),
            },
            description: self.description,
        }
    }

    fn label(&self) -> String {
        if self.description.is_empty() {
            format!("{} {}", self.device, self.message)
        } else {
            self.description.clone()
        }
    }
}

// --- Default value functions for serde ---

fn default_sleep_increment() -> f64 {
    DEFAULT_SLEEP_INCREMENT
}

fn default_lock_in_time() -> f64 {
    DEFAULT_LOCK_IN_TIME
}

impl LiveConfig {
    /// Loads and validates a configuration file.
    ///
    /// The format is chosen from the extension: `.json`, `.json5` or `.toml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => FileFormat::Json,
            Some("json5") => FileFormat::Json5,
            Some("toml") => FileFormat::Toml,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_text(&text, format)
    }

    /// Parses and validates configuration text.
    pub fn from_text(text: &str, format: FileFormat) -> Result<Self, ConfigError> {
        let text = match format {
            FileFormat::Json => strip_comments(text),
            _ => text.to_string(),
        };
        let loaded: LiveConfig = Config::builder()
            .add_source(File::from_str(&text, format))
            .add_source(Environment::with_prefix("LIVECUE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks ranges and that every action names a registered device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sleep_increment.is_finite() && self.sleep_increment > 0.0) {
            return Err(invalid("sleep_increment", "must be a positive number of seconds"));
        }
        if !(self.lock_in_time.is_finite() && self.lock_in_time >= 0.0) {
            return Err(invalid("lock_in_time", "must be zero or more seconds"));
        }
        for (index, action) in self.actions.iter().enumerate() {
            if !(action.time.is_finite() && action.time >= 0.0) {
                return Err(invalid(
                    &format!("actions[{index}].time"),
                    "must be zero or more seconds",
                ));
            }
        }

        let devices: HashSet<&str> = self.devices.iter().map(|d| d.name.as_str()).collect();
        validate_devices(&devices, &self.actions)?;
        validate_devices(&devices, &self.abort_actions)
    }

    /// Validates this configuration and converts it into the engine's run configuration.
    pub fn into_runner(self) -> Result<RunnerConfig, ConfigError> {
        self.validate()?;
        let schedule = Schedule::new(
            self.actions
                .into_iter()
                .map(|action| {
                    let time = action.time;
                    action.into_action(time)
                })
                .collect(),
        );
        let abort_actions = self
            .abort_actions
            .into_iter()
            .map(|action| action.into_action(0.0))
            .collect();

        Ok(RunnerConfig::new(self.api_url, schedule, abort_actions)
            .with_time_source(self.time_source)
            .with_timing(
                Duration::from_secs_f64(self.sleep_increment),
                self.lock_in_time,
            ))
    }
}

fn validate_devices(devices: &HashSet<&str>, actions: &[ActionConfig]) -> Result<(), ConfigError> {
    match actions.iter().find(|a| !devices.contains(a.device.as_str())) {
        Some(action) => Err(ConfigError::UnknownDevice {
            device: action.device.clone(),
            action: action.label(),
        }),
        None => Ok(()),
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Blanks out lines whose first non-whitespace characters are `//`.
fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| if line.trim_start().starts_with("//") { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The immutable configuration the engine runs from.
///
/// Variants are derived with the `with_*` methods, which return a modified
/// copy and leave the original untouched. Test mode uses this to point an
/// existing configuration at the simulated server.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    endpoint: String,
    time_source: TimeSourceKind,
    schedule: Arc<Schedule>,
    abort_actions: Arc<[Action]>,
    sleep_increment: Duration,
    lock_in_time: f64,
}

impl RunnerConfig {
    /// Creates a configuration with default timing and the default time source.
    pub fn new(endpoint: impl Into<String>, schedule: Schedule, abort_actions: Vec<Action>) -> Self {
        Self {
            endpoint: endpoint.into(),
            time_source: TimeSourceKind::default(),
            schedule: Arc::new(schedule),
            abort_actions: abort_actions.into(),
            sleep_increment: Duration::from_secs_f64(DEFAULT_SLEEP_INCREMENT),
            lock_in_time: DEFAULT_LOCK_IN_TIME,
        }
    }

    /// A copy polling a different endpoint.
    pub fn with_endpoint(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..self.clone()
        }
    }

    /// A copy using a different timing API.
    pub fn with_time_source(&self, time_source: TimeSourceKind) -> Self {
        Self {
            time_source,
            ..self.clone()
        }
    }

    /// A copy with different poll and lock-in timings.
    pub fn with_timing(&self, sleep_increment: Duration, lock_in_time: f64) -> Self {
        Self {
            sleep_increment,
            lock_in_time,
            ..self.clone()
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn time_source(&self) -> TimeSourceKind {
        self.time_source
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn abort_actions(&self) -> &[Action] {
        &self.abort_actions
    }

    pub fn sleep_increment(&self) -> Duration {
        self.sleep_increment
    }

    pub fn lock_in_time(&self) -> f64 {
        self.lock_in_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
    // Competition API
    "api_url": "http://compbox.local/comp-api/current",
    "devices": [
        {"name": "lights", "address": "127.0.0.1:9000"},
        {"name": "sound", "address": "127.0.0.1:9001"}
    ],
    "actions": [
        {"time": 150, "device": "lights", "message": "/end", "args": [1, 0.5, "x", true]},
        // Start of match
        {"time": 0, "device": "sound", "message": "/start", "args": "go", "description": "Start horn"},
        {"time": 0, "device": "lights", "message": "/green", "args": []}
    ],
    "abort_actions": [
        {"time": 99, "device": "lights", "message": "/house", "args": 1}
    ]
}"#;

    #[test]
    fn loads_json_with_comments() {
        let config = LiveConfig::from_text(SAMPLE, FileFormat::Json).unwrap();
        assert_eq!(config.api_url, "http://compbox.local/comp-api/current");
        assert_eq!(config.time_source, TimeSourceKind::Srcomp);
        assert_eq!(config.sleep_increment, DEFAULT_SLEEP_INCREMENT);
        assert_eq!(config.lock_in_time, DEFAULT_LOCK_IN_TIME);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.actions.len(), 3);
    }

    #[test]
    fn runner_config_sorts_actions_and_zeroes_abort_times() {
        let runner = LiveConfig::from_text(SAMPLE, FileFormat::Json)
            .unwrap()
            .into_runner()
            .unwrap();

        let addresses: Vec<_> = runner
            .schedule()
            .iter()
            .map(|a| a.message.address.as_str())
            .collect();
        assert_eq!(addresses, ["/start", "/green", "/end"]);

        let start = runner.schedule().get(0).unwrap();
        assert_eq!(start.message.args, vec![OscArg::Str("go".to_string())]);
        assert_eq!(start.description, "Start horn");

        let end = runner.schedule().get(2).unwrap();
        assert_eq!(
            end.message.args,
            vec![
                OscArg::Int(1),
                OscArg::Float(0.5),
                OscArg::Str("x".to_string()),
                OscArg::Bool(true),
            ]
        );

        assert_eq!(runner.abort_actions().len(), 1);
        assert_eq!(runner.abort_actions()[0].time, 0.0);
        assert_eq!(runner.abort_actions()[0].message.args, vec![OscArg::Int(1)]);
        assert_eq!(runner.sleep_increment(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_scheduled_device_is_rejected() {
        let text = r#"{
            "api_url": "http://localhost/current",
            "devices": [{"name": "lights", "address": "127.0.0.1:9000"}],
            "actions": [
                {"time": 5, "device": "lights", "message": "/go"},
                {"time": 10, "device": "fog", "message": "/puff"}
            ]
        }"#;
        let err = LiveConfig::from_text(text, FileFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDevice { ref device, .. } if device == "fog"));
    }

    #[test]
    fn integers_beyond_32_bits_stay_exact() {
        let text = r#"{
            "api_url": "http://localhost/current",
            "devices": [{"name": "lights", "address": "127.0.0.1:9000"}],
            "actions": [{"time": 5, "device": "lights", "message": "/go", "args": [3000000001, 7]}]
        }"#;
        let runner = LiveConfig::from_text(text, FileFormat::Json)
            .unwrap()
            .into_runner()
            .unwrap();
        assert_eq!(
            runner.schedule().get(0).unwrap().message.args,
            vec![OscArg::Long(3_000_000_001), OscArg::Int(7)]
        );
    }

    #[test]
    fn unknown_abort_device_is_rejected() {
        let text = r#"{
            "api_url": "http://localhost/current",
            "devices": [{"name": "lights", "address": "127.0.0.1:9000"}],
            "abort_actions": [{"device": "smoke", "message": "/off"}]
        }"#;
        let err = LiveConfig::from_text(text, FileFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDevice { ref device, .. } if device == "smoke"));
    }

    #[test]
    fn negative_action_time_is_rejected() {
        let text = r#"{
            "api_url": "http://localhost/current",
            "devices": [{"name": "lights", "address": "127.0.0.1:9000"}],
            "actions": [{"time": -1, "device": "lights", "message": "/go"}]
        }"#;
        let err = LiveConfig::from_text(text, FileFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "actions[0].time"));
    }

    #[test]
    fn zero_sleep_increment_is_rejected() {
        let text = r#"{"api_url": "http://localhost/current", "sleep_increment": 0}"#;
        let err = LiveConfig::from_text(text, FileFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "sleep_increment"));
    }

    #[test]
    fn missing_api_url_fails_to_load() {
        let err = LiveConfig::from_text(r#"{"devices": []}"#, FileFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn loads_toml_file_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
api_url = "http://localhost:8008/current"
sleep_increment = 1.5
lock_in_time = 4

[[devices]]
name = "lights"
address = "127.0.0.1:9000"

[[actions]]
time = 30
device = "lights"
message = "/flash"
args = ["Match {{match}}"]
"#
        )
        .unwrap();

        let runner = LiveConfig::load(file.path()).unwrap().into_runner().unwrap();
        assert_eq!(runner.sleep_increment(), Duration::from_millis(1500));
        assert_eq!(runner.lock_in_time(), 4.0);
        assert_eq!(runner.schedule().final_time(), Some(30.0));
        assert_eq!(
            runner.schedule().get(0).unwrap().message.args,
            vec![OscArg::Str("Match {match}".to_string())]
        );
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = LiveConfig::load("cues.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn derived_runner_config_leaves_original_untouched() {
        let base = RunnerConfig::new("http://compbox/current", Schedule::default(), Vec::new());
        let test = base.with_endpoint("http://127.0.0.1:8008/current");
        assert_eq!(base.endpoint(), "http://compbox/current");
        assert_eq!(test.endpoint(), "http://127.0.0.1:8008/current");
        assert_eq!(test.lock_in_time(), base.lock_in_time());
    }
}
