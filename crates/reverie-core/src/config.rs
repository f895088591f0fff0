//! Experience configuration.
//!
//! Every timing constant of the narrative lives here so it can be tuned
//! without code edits. Precedence: env `REVERIE_*` (separator `__`) > TOML file
//! (`REVERIE_CONFIG`, default `config/reverie.toml`) > built-in defaults.
//!
//! | Env | Default |
//! |-----|---------|
//! | REVERIE_TIMING__READINESS_POLL_INTERVAL_MS | 200 |
//! | REVERIE_TIMING__READINESS_MAX_ATTEMPTS | 20 |
//! | REVERIE_TIMING__CAPTURE_DELAY_MS | 3500 |
//! | REVERIE_TIMING__HTTP_TIMEOUT_MS | 60000 |
//! | REVERIE_SPEECH__MIN_PAUSE_MS | 2000 |
//! | REVERIE_FOG__CLEAR_THRESHOLD | 0.40 |
//! | REVERIE_GEMINI__API_KEY (or GEMINI_API_KEY / API_KEY) | unset |

use crate::fog::FogGeometry;
use crate::timers::{Countdown, PollPolicy};
use reverie_voice::SpeechTiming;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceConfig {
    pub timing: TimingConfig,
    pub speech: SpeechConfig,
    pub fog: FogConfig,
    pub gemini: GeminiConfig,
    pub devices: DeviceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub readiness_poll_interval_ms: u64,
    pub readiness_max_attempts: u32,
    pub countdown_from: u32,
    pub countdown_tick_ms: u64,
    /// Capture fires this long after the countdown starts, strictly after the last digit is shown.
    pub capture_delay_ms: u64,
    /// Silence between the awakening chord and the first intro line.
    pub awakening_delay_ms: u64,
    pub fog_check_throttle_ms: u64,
    pub loading_caption_ms: u64,
    pub analysis_timeout_ms: u64,
    pub reply_timeout_ms: u64,
    /// Per-request limit on the generative backend's HTTP client.
    pub http_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            readiness_poll_interval_ms: 200,
            readiness_max_attempts: 20,
            countdown_from: 3,
            countdown_tick_ms: 1000,
            capture_delay_ms: 3500,
            awakening_delay_ms: 2000,
            fog_check_throttle_ms: 300,
            loading_caption_ms: 1200,
            analysis_timeout_ms: 30_000,
            reply_timeout_ms: 45_000,
            http_timeout_ms: 60_000,
        }
    }
}

impl TimingConfig {
    pub fn readiness_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.readiness_poll_interval_ms),
            self.readiness_max_attempts,
        )
    }

    pub fn countdown(&self) -> Countdown {
        Countdown::new(
            self.countdown_from,
            Duration::from_millis(self.countdown_tick_ms),
            Duration::from_millis(self.capture_delay_ms),
        )
    }

    pub fn awakening_delay(&self) -> Duration {
        Duration::from_millis(self.awakening_delay_ms)
    }

    pub fn fog_check_throttle(&self) -> Duration {
        Duration::from_millis(self.fog_check_throttle_ms)
    }

    pub fn loading_caption_interval(&self) -> Duration {
        Duration::from_millis(self.loading_caption_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub min_pause_ms: u64,
    pub per_char_pause_ms: u64,
    pub error_pause_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            min_pause_ms: 2000,
            per_char_pause_ms: 200,
            error_pause_ms: 2000,
        }
    }
}

impl SpeechConfig {
    pub fn timing(&self) -> SpeechTiming {
        SpeechTiming {
            min_pause: Duration::from_millis(self.min_pause_ms),
            per_char_pause: Duration::from_millis(self.per_char_pause_ms),
            error_pause: Duration::from_millis(self.error_pause_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    /// Fraction of sampled pixels that must be transparent before the world awakens.
    pub clear_threshold: f32,
    pub sample_width: u32,
    pub brush_radius: f32,
    pub brush_core: f32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            clear_threshold: 0.40,
            sample_width: 100,
            brush_radius: 80.0,
            brush_core: 10.0,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl FogConfig {
    pub fn geometry(&self) -> FogGeometry {
        FogGeometry {
            width: self.viewport_width,
            height: self.viewport_height,
            brush_radius: self.brush_radius,
            brush_core: self.brush_core,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_base: String,
    pub tts_model: String,
    pub vision_model: String,
    pub reply_model: String,
    pub voice: String,
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            vision_model: "gemini-2.5-flash".to_string(),
            reply_model: "gemini-2.5-flash".to_string(),
            voice: "Kore".to_string(),
            api_key: None,
        }
    }
}

impl GeminiConfig {
    /// Configured key, else `GEMINI_API_KEY`, else `API_KEY`. Blank values count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Still image served as the camera feed by console hosts.
    pub camera_frame: Option<PathBuf>,
    /// How long the camera reports "not ready" after it is opened.
    pub camera_warmup_ms: u64,
    /// Play speech and ambient sound through the default output device.
    pub audio_output: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            camera_frame: None,
            camera_warmup_ms: 600,
            audio_output: true,
        }
    }
}

impl DeviceConfig {
    pub fn camera_warmup(&self) -> Duration {
        Duration::from_millis(self.camera_warmup_ms)
    }
}

impl ExperienceConfig {
    /// Load config from file and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("REVERIE_CONFIG").unwrap_or_else(|_| "config/reverie.toml".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("REVERIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    /// Parse a TOML document directly, without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tuned_constants() {
        let config = ExperienceConfig::default();
        assert_eq!(config.timing.readiness_poll_interval_ms, 200);
        assert_eq!(config.timing.readiness_max_attempts, 20);
        assert_eq!(config.timing.capture_delay_ms, 3500);
        assert_eq!(config.timing.http_timeout(), Duration::from_secs(60));
        assert_eq!(config.speech.timing(), SpeechTiming::default());
        assert!((config.fog.clear_threshold - 0.40).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = ExperienceConfig::from_toml_str(
            r#"
            [timing]
            capture_delay_ms = 5000
            http_timeout_ms = 20000

            [gemini]
            voice = "Puck"
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.capture_delay_ms, 5000);
        assert_eq!(config.timing.countdown_from, 3);
        assert_eq!(config.timing.http_timeout(), Duration::from_secs(20));
        assert_eq!(config.gemini.voice, "Puck");
        assert_eq!(config.gemini.tts_model, "gemini-2.5-flash-preview-tts");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ExperienceConfig::load_from(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.timing.loading_caption_ms, 1200);
    }
}
