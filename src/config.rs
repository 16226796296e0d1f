use crate::consumers::{ConsumerKind, FrequencyTable, LogFormat};
use crate::engine::EngineSettings;
use crate::error::ConfigError;
use crate::window::DedupPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file to use instead of the default.
pub const CONFIG_ENV: &str = "QRSEQ_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
pub struct SequencerConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub tone: ToneConfig,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WindowConfig {
    pub duration_seconds: f64,
    pub emit_empty_batches: bool,
    pub dedup_policy: DedupPolicy,
    pub flush_on_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ToneConfig {
    pub duration_seconds: f64,
    pub frequencies: FrequencyTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TriggerConfig {
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    pub consumers: Vec<ConsumerKind>,
    pub format: LogFormat,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 0.5,
            emit_empty_batches: false,
            dedup_policy: DedupPolicy::FirstSeen,
            flush_on_exit: true,
        }
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 0.5,
            frequencies: FrequencyTable::default(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tracks: (1..=6).map(|i| format!("Track {i}")).collect(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            consumers: vec![ConsumerKind::Log],
            format: LogFormat::Text,
        }
    }
}

impl SequencerConfig {
    /// Load from an explicit path, then `$QRSEQ_CONFIG`, then the default
    /// location. A missing default file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&path));
        }
        match Self::config_file_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        seconds("window.duration_seconds", self.window.duration_seconds)?;
        seconds("tone.duration_seconds", self.tone.duration_seconds)?;
        for (payload, hz) in self.tone.frequencies.iter() {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(ConfigError::Invalid {
                    field: format!("tone.frequencies.{payload}"),
                    reason: format!("frequency must be positive, got {hz}"),
                });
            }
        }
        if self.output.consumers.is_empty() {
            return Err(ConfigError::Invalid {
                field: "output.consumers".into(),
                reason: "at least one consumer is required".into(),
            });
        }
        Ok(())
    }

    /// Engine settings for this configuration. `max_frames` is left unset;
    /// it only comes from the command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the window duration is not a
    /// positive number of seconds that fits in a [`Duration`].
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        Ok(EngineSettings {
            window_duration: seconds("window.duration_seconds", self.window.duration_seconds)?,
            emit_empty_batches: self.window.emit_empty_batches,
            dedup_policy: self.window.dedup_policy,
            flush_on_exit: self.window.flush_on_exit,
            max_frames: None,
        })
    }

    pub fn tone_duration(&self) -> Result<Duration, ConfigError> {
        seconds("tone.duration_seconds", self.tone.duration_seconds)
    }

    pub fn wants(&self, kind: ConsumerKind) -> bool {
        self.output.consumers.contains(&kind)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("qrseq");
            path
        })
    }

    /// Where `load(explicit)` would read from, if anywhere.
    pub fn resolved_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        Self::config_file_path().filter(|p| p.is_file())
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("must be a positive number of seconds, got {value}"),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("{value} seconds is too long"),
    })
}

/// Parse a comma-separated consumer list such as `log,tone`.
pub fn parse_consumer_list(list: &str) -> Result<Vec<ConsumerKind>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(ConfigError::UnknownConsumer))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SequencerConfig::default();
        assert_eq!(config.window.duration_seconds, 0.5);
        assert!(!config.window.emit_empty_batches);
        assert_eq!(config.window.dedup_policy, DedupPolicy::FirstSeen);
        assert!(config.window.flush_on_exit);
        assert_eq!(config.tone.frequencies.get("1"), Some(261.63));
        assert_eq!(config.trigger.tracks.len(), 6);
        assert_eq!(config.output.consumers, vec![ConsumerKind::Log]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = SequencerConfig::default().to_toml().unwrap();

        assert!(toml_str.contains("[window]"));
        assert!(toml_str.contains("[tone.frequencies]"));
        assert!(toml_str.contains("[trigger]"));
        assert!(toml_str.contains("[output]"));
        assert!(toml_str.contains("dedup_policy = \"first-seen\""));
        assert!(toml_str.contains("format = \"text\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
[window]
duration_seconds = 4.0
emit_empty_batches = true
dedup_policy = "last-seen"
flush_on_exit = false

[tone]
duration_seconds = 0.25
frequencies = { a = 110.0 }

[trigger]
tracks = ["Drums", "Bass"]

[output]
consumers = ["log", "trigger", "history"]
format = "json"
"#;

        let config: SequencerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.window.duration_seconds, 4.0);
        assert!(config.window.emit_empty_batches);
        assert_eq!(config.window.dedup_policy, DedupPolicy::LastSeen);
        assert!(!config.window.flush_on_exit);
        assert_eq!(config.tone.frequencies.get("a"), Some(110.0));
        assert_eq!(config.tone.frequencies.get("1"), None);
        assert_eq!(config.trigger.tracks, ["Drums", "Bass"]);
        assert!(config.wants(ConsumerKind::Trigger));
        assert!(!config.wants(ConsumerKind::Tone));
        assert_eq!(config.output.format, LogFormat::Json);

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.window_duration, Duration::from_secs(4));
        assert!(settings.emit_empty_batches);
    }

    #[test]
    fn test_config_partial_deserialization() {
        let toml_str = r#"
[window]
duration_seconds = 2.0
"#;

        let config: SequencerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.window.duration_seconds, 2.0);
        assert_eq!(config.window.dedup_policy, DedupPolicy::FirstSeen);
        assert_eq!(config.tone, ToneConfig::default());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn rejects_non_positive_window() {
        let mut config = SequencerConfig::default();
        config.window.duration_seconds = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "window.duration_seconds"
        ));
    }

    #[test]
    fn durations_too_long_to_represent_are_rejected() {
        let config: SequencerConfig = toml::from_str("[window]\nduration_seconds = 1e30").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "window.duration_seconds"
        ));
        assert!(config.engine_settings().is_err());

        let mut config = SequencerConfig::default();
        config.tone.duration_seconds = f64::MAX;
        assert!(config.validate().is_err());
        assert!(config.tone_duration().is_err());

        let mut config = SequencerConfig::default();
        config.window.duration_seconds = 86_400.0;
        assert_eq!(
            config.engine_settings().unwrap().window_duration,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn rejects_negative_frequency_and_empty_consumers() {
        let mut config = SequencerConfig::default();
        config.tone.frequencies = FrequencyTable::new([("x".to_string(), -1.0)]);
        assert!(config.validate().is_err());

        let mut config = SequencerConfig::default();
        config.output.consumers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn consumer_list_parsing() {
        assert_eq!(
            parse_consumer_list("log, tone,,history").unwrap(),
            vec![ConsumerKind::Log, ConsumerKind::Tone, ConsumerKind::History]
        );
        assert!(matches!(
            parse_consumer_list("log,speaker"),
            Err(ConfigError::UnknownConsumer(name)) if name == "speaker"
        ));
    }

    #[test]
    #[serial]
    fn env_var_points_at_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nduration_seconds = 1.5").unwrap();

        temp_env::with_var(CONFIG_ENV, Some(file.path()), || {
            let config = SequencerConfig::load(None).unwrap();
            assert_eq!(config.window.duration_seconds, 1.5);
            assert_eq!(
                SequencerConfig::resolved_path(None).as_deref(),
                Some(file.path())
            );
        });
    }

    #[test]
    #[serial]
    fn explicit_path_wins_and_must_exist() {
        temp_env::with_var(CONFIG_ENV, Some("/nonexistent/qrseq.toml"), || {
            let missing = SequencerConfig::load(Some(Path::new("/nonexistent/explicit.toml")));
            assert!(matches!(missing, Err(ConfigError::Read { .. })));
        });
    }

    #[test]
    fn parse_errors_name_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[window]\nduration_seconds = \"soon\"").unwrap();
        let err = SequencerConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
