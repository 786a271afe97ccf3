use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `recognition.api_key`
pub const API_KEY_ENV: &str = "VOICE_ASSISTANT_API_KEY";

/// Top-level configuration, loaded once at startup
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Capture/retry tunables
    pub listener: ListenerConfig,
    /// Recognition provider settings
    pub recognition: RecognitionConfig,
    /// Speech output settings
    pub speech: SpeechConfig,
    /// Session behaviour
    pub session: SessionConfig,
    /// Audio capture settings
    pub audio: AudioConfig,
    /// Logging destination
    pub telemetry: TelemetryConfig,
}

/// Tunables for the listen/recognize retry loop
///
/// Durations are stored in seconds to keep the TOML file readable.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listen attempts per call before giving up
    pub retries: u32,
    /// Seconds to wait for speech onset
    pub timeout_secs: f64,
    /// Maximum utterance length in seconds
    pub phrase_time_limit_secs: f64,
    /// Ambient noise sampling duration for calibration
    pub calibration_secs: f64,
    /// Multiple of ambient energy targeted while calibrating
    pub calibration_energy_ratio: f32,
    /// Lower bound for the calibrated energy threshold
    pub min_energy_threshold: f32,
    /// Seconds of silence that end a phrase
    pub pause_threshold_secs: f64,
    /// Minimum seconds of speech for a phrase to count
    pub phrase_threshold_secs: f64,
    /// Silence kept on both sides of a phrase
    pub non_speaking_secs: f64,
    /// Adapt the threshold while waiting for speech
    pub dynamic_energy_threshold: bool,
    /// Target multiple of ambient energy for dynamic adjustment
    pub dynamic_energy_ratio: f32,
    /// Fraction of the threshold kept per second of dynamic adjustment
    pub dynamic_energy_damping: f32,
    /// Pause after a failed attempt
    pub retry_pause_secs: f64,
    /// Pause after a failed attempt caused by the network
    pub network_retry_pause_secs: f64,
    /// Pause between two listen cycles of the session
    pub cycle_pause_secs: f64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            timeout_secs: 8.0,
            phrase_time_limit_secs: 15.0,
            calibration_secs: 2.0,
            calibration_energy_ratio: 1.5,
            min_energy_threshold: 300.0,
            pause_threshold_secs: 0.8,
            phrase_threshold_secs: 0.3,
            non_speaking_secs: 0.5,
            dynamic_energy_threshold: true,
            dynamic_energy_ratio: 1.15,
            dynamic_energy_damping: 0.15,
            retry_pause_secs: 0.5,
            network_retry_pause_secs: 1.0,
            cycle_pause_secs: 0.5,
        }
    }
}

impl ListenerConfig {
    /// Speech onset timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    /// Maximum phrase duration
    #[must_use]
    pub fn phrase_time_limit(&self) -> Duration {
        secs(self.phrase_time_limit_secs)
    }

    /// Calibration window
    #[must_use]
    pub fn calibration(&self) -> Duration {
        secs(self.calibration_secs)
    }

    /// Pause after a recoverable failure
    #[must_use]
    pub fn retry_pause(&self) -> Duration {
        secs(self.retry_pause_secs)
    }

    /// Pause after a network failure
    #[must_use]
    pub fn network_retry_pause(&self) -> Duration {
        secs(self.network_retry_pause_secs)
    }

    /// Pause between session cycles
    #[must_use]
    pub fn cycle_pause(&self) -> Duration {
        secs(self.cycle_pause_secs)
    }

    /// Same tunables with every pause set to zero (used by tests and scripted runs)
    #[must_use]
    pub fn without_pauses(mut self) -> Self {
        self.retry_pause_secs = 0.0;
        self.network_retry_pause_secs = 0.0;
        self.cycle_pause_secs = 0.0;
        self
    }
}

/// Recognition chain settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Locale of the primary online provider
    pub primary_locale: String,
    /// Locale of the secondary online provider
    pub secondary_locale: String,
    /// Web speech endpoint
    pub endpoint: String,
    /// API key for the web speech endpoint
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Offline model settings
    pub offline: OfflineModelConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            primary_locale: "en-US".to_owned(),
            secondary_locale: "en-IN".to_owned(),
            endpoint: "http://www.google.com/speech-api/v2/recognize".to_owned(),
            api_key: None,
            request_timeout_secs: 10,
            offline: OfflineModelConfig::default(),
        }
    }
}

impl RecognitionConfig {
    /// API key from the environment, falling back to the config file
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
    }
}

/// Local whisper model used as the last provider in the chain
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OfflineModelConfig {
    /// Model name (tiny, base, small, ...)
    pub name: String,
    /// Path to the ggml model file
    pub path: String,
    /// Inference threads
    pub threads: usize,
    /// Beam width (1 = greedy)
    pub beam_size: usize,
    /// Language code, `None` for auto-detect
    pub language: Option<String>,
}

impl Default for OfflineModelConfig {
    fn default() -> Self {
        Self {
            name: "base.en".to_owned(),
            path: "~/.voice-assistant/models/ggml-base.en.bin".to_owned(),
            threads: 4,
            beam_size: 1,
            language: Some("en".to_owned()),
        }
    }
}

/// Fixed speech output settings
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speaking rate in words per minute
    pub rate: u32,
    /// Volume in 0.0..=1.0
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 180,
            volume: 0.9,
        }
    }
}

/// How recognized commands are handled
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Classify intents and act on them
    #[default]
    Assistant,
    /// Repeat what was heard
    Echo,
}

/// Session behaviour
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Command handling mode
    pub mode: SessionMode,
}

/// Audio capture settings
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AudioConfig {
    /// Save every captured utterance as WAV into this directory
    pub debug_recordings_dir: Option<String>,
}

/// Logging destination
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log to a file instead of stdout
    pub enabled: bool,
    /// Log file path
    pub log_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: "~/.voice-assistant/assistant.log".to_owned(),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# voice-assistant configuration

[listener]
retries = 5
timeout_secs = 8.0
phrase_time_limit_secs = 15.0
calibration_secs = 2.0
calibration_energy_ratio = 1.5
min_energy_threshold = 300.0
pause_threshold_secs = 0.8
phrase_threshold_secs = 0.3
non_speaking_secs = 0.5
dynamic_energy_ratio = 1.15

[recognition]
primary_locale = "en-US"
secondary_locale = "en-IN"
# api_key = "..."  (or set VOICE_ASSISTANT_API_KEY)

[recognition.offline]
name = "base.en"
path = "~/.voice-assistant/models/ggml-base.en.bin"
threads = 4
beam_size = 1
language = "en"

[speech]
rate = 180
volume = 0.9

[session]
mode = "assistant"

[telemetry]
enabled = false
log_path = "~/.voice-assistant/assistant.log"
"#;

impl Config {
    /// Load config from ~/.voice-assistant.toml, writing the default file on first run
    ///
    /// # Errors
    /// Returns error if HOME is unset or the file cannot be written, read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("failed to read config file")?;
        let config: Self = toml::from_str(&contents).context("failed to parse config TOML")?;
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".voice-assistant.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
