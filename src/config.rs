//! # Configuration
//!
//! Run settings loaded from an optional YAML file.
//!
//! The file is deserialized into `Raw*` structs where every key is
//! optional, then resolved into the typed [`Config`] with defaults filled
//! in and values checked.
//!
//! ## Example
//! ```rust
//! use vocalise::Config;
//!
//! let config = Config::from_yaml(r#"
//! score:
//!   default-tempo: 90
//! render:
//!   tuning: window
//! "#).unwrap();
//!
//! assert_eq!(config.score.default_tempo, 90.0);
//! assert_eq!(config.render.sample_rate, 44100);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, VocaliseError};

pub const DEFAULT_TEMPO_BPM: f64 = 126.0;
pub const DEFAULT_VOICE_ID: &str = "onwK4e9ZLuTAKqWW03F9";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// How the tuner applies pitch correction inside one sub-note slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningMode {
    /// One shift per slice, from the median pitch of its voiced windows
    #[default]
    Slice,
    /// Each analysis window is shifted on its own
    Window,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreConfig {
    /// Tempo used until the first tempo direction
    pub default_tempo: f64,
    /// Apply `<clef-octave-change>` to sung octaves
    pub clef_octave_change: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub model_id: String,
    pub stability: f64,
    pub similarity_boost: f64,
    /// Environment variable holding the provider API key
    pub api_key_env: String,
    pub base_url: String,
    /// PCM sample rate requested from the provider
    pub sample_rate: u32,
    pub timeout_secs: u64,
    /// Pause after each synthesis call, to stay inside provider rate limits
    pub request_delay_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Working sample rate for every rendered segment
    pub sample_rate: u32,
    pub silence_threshold_db: f64,
    pub silence_chunk_ms: f64,
    pub pitch_window_ms: f64,
    pub min_pitch_hz: f64,
    pub max_pitch_hz: f64,
    pub tuning: TuningMode,
    pub parallel_parts: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub score: ScoreConfig,
    pub voice: VoiceConfig,
    pub cache: CacheConfig,
    pub render: RenderConfig,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            default_tempo: DEFAULT_TEMPO_BPM,
            clef_octave_change: false,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            api_key_env: "XI_API_KEY".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            timeout_secs: 60,
            request_delay_ms: 200,
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_concurrent_requests: 1,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            silence_threshold_db: -50.0,
            silence_chunk_ms: 10.0,
            pitch_window_ms: 100.0,
            min_pitch_hz: 65.41,
            max_pitch_hz: 2093.0,
            tuning: TuningMode::Slice,
            parallel_parts: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let voice = VoiceConfig::default();
        Self {
            cache: CacheConfig {
                dir: default_cache_dir(&voice.voice_id),
            },
            score: ScoreConfig::default(),
            voice,
            render: RenderConfig::default(),
        }
    }
}

fn default_cache_dir(voice_id: &str) -> PathBuf {
    PathBuf::from(format!("audio-cache-{}", voice_id))
}

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    score: Option<RawScoreConfig>,
    voice: Option<RawVoiceConfig>,
    cache: Option<RawCacheConfig>,
    render: Option<RawRenderConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawScoreConfig {
    default_tempo: Option<f64>,
    clef_octave_change: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawVoiceConfig {
    voice_id: Option<String>,
    model_id: Option<String>,
    stability: Option<f64>,
    similarity_boost: Option<f64>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    sample_rate: Option<u32>,
    timeout_secs: Option<u64>,
    request_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_concurrent_requests: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawCacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawRenderConfig {
    sample_rate: Option<u32>,
    silence_threshold_db: Option<f64>,
    silence_chunk_ms: Option<f64>,
    pitch_window_ms: Option<f64>,
    min_pitch_hz: Option<f64>,
    max_pitch_hz: Option<f64>,
    tuning: Option<TuningMode>,
    parallel_parts: Option<bool>,
}

impl Config {
    /// Parse a YAML configuration document. Missing keys take defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| VocaliseError::Config(e.to_string()))?
        };
        let config = Self::resolve(raw);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    VocaliseError::Config(format!("couldn't read {}: {}", p.display(), e))
                })?;
                Self::from_yaml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    fn resolve(raw: RawConfig) -> Self {
        let score_raw = raw.score.unwrap_or_default();
        let voice_raw = raw.voice.unwrap_or_default();
        let render_raw = raw.render.unwrap_or_default();
        let defaults = Config::default();

        let score = ScoreConfig {
            default_tempo: score_raw.default_tempo.unwrap_or(defaults.score.default_tempo),
            clef_octave_change: score_raw
                .clef_octave_change
                .unwrap_or(defaults.score.clef_octave_change),
        };

        let dv = defaults.voice;
        let voice = VoiceConfig {
            voice_id: voice_raw.voice_id.unwrap_or(dv.voice_id),
            model_id: voice_raw.model_id.unwrap_or(dv.model_id),
            stability: voice_raw.stability.unwrap_or(dv.stability),
            similarity_boost: voice_raw.similarity_boost.unwrap_or(dv.similarity_boost),
            api_key_env: voice_raw.api_key_env.unwrap_or(dv.api_key_env),
            base_url: voice_raw.base_url.unwrap_or(dv.base_url),
            sample_rate: voice_raw.sample_rate.unwrap_or(dv.sample_rate),
            timeout_secs: voice_raw.timeout_secs.unwrap_or(dv.timeout_secs),
            request_delay_ms: voice_raw.request_delay_ms.unwrap_or(dv.request_delay_ms),
            max_attempts: voice_raw.max_attempts.unwrap_or(dv.max_attempts),
            initial_backoff_ms: voice_raw.initial_backoff_ms.unwrap_or(dv.initial_backoff_ms),
            max_concurrent_requests: voice_raw
                .max_concurrent_requests
                .unwrap_or(dv.max_concurrent_requests),
        };

        // The cache is per voice unless placed explicitly.
        let cache = CacheConfig {
            dir: raw
                .cache
                .and_then(|c| c.dir)
                .unwrap_or_else(|| default_cache_dir(&voice.voice_id)),
        };

        let dr = defaults.render;
        let render = RenderConfig {
            sample_rate: render_raw.sample_rate.unwrap_or(dr.sample_rate),
            silence_threshold_db: render_raw
                .silence_threshold_db
                .unwrap_or(dr.silence_threshold_db),
            silence_chunk_ms: render_raw.silence_chunk_ms.unwrap_or(dr.silence_chunk_ms),
            pitch_window_ms: render_raw.pitch_window_ms.unwrap_or(dr.pitch_window_ms),
            min_pitch_hz: render_raw.min_pitch_hz.unwrap_or(dr.min_pitch_hz),
            max_pitch_hz: render_raw.max_pitch_hz.unwrap_or(dr.max_pitch_hz),
            tuning: render_raw.tuning.unwrap_or(dr.tuning),
            parallel_parts: render_raw.parallel_parts.unwrap_or(dr.parallel_parts),
        };

        Config {
            score,
            voice,
            cache,
            render,
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(VocaliseError::Config(msg.to_string()));

        if !(self.score.default_tempo > 0.0) {
            return fail("score.default-tempo must be positive");
        }
        if self.voice.sample_rate == 0 || self.render.sample_rate == 0 {
            return fail("sample rates must be positive");
        }
        if self.voice.max_attempts == 0 {
            return fail("voice.max-attempts must be at least 1");
        }
        if self.voice.max_concurrent_requests == 0 {
            return fail("voice.max-concurrent-requests must be at least 1");
        }
        if !(self.render.silence_chunk_ms > 0.0) || !(self.render.pitch_window_ms > 0.0) {
            return fail("render window lengths must be positive");
        }
        if !(self.render.min_pitch_hz > 0.0 && self.render.min_pitch_hz < self.render.max_pitch_hz)
        {
            return fail("render.min-pitch-hz must be positive and below render.max-pitch-hz");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.cache.dir, PathBuf::from("audio-cache-onwK4e9ZLuTAKqWW03F9"));
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_yaml(
            r#"
voice:
  voice-id: abc
  max-concurrent-requests: 4
render:
  tuning: window
  parallel-parts: true
"#,
        )
        .unwrap();
        assert_eq!(config.voice.voice_id, "abc");
        assert_eq!(config.voice.max_concurrent_requests, 4);
        assert_eq!(config.cache.dir, PathBuf::from("audio-cache-abc"));
        assert_eq!(config.render.tuning, TuningMode::Window);
        assert!(config.render.parallel_parts);
        assert_eq!(config.score.default_tempo, DEFAULT_TEMPO_BPM);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = Config::from_yaml("render:\n  tempo: 3\n");
        assert!(matches!(result, Err(VocaliseError::Config(_))));
    }

    #[test]
    fn test_invalid_pitch_range() {
        let result = Config::from_yaml("render:\n  min-pitch-hz: 900\n  max-pitch-hz: 100\n");
        assert!(matches!(result, Err(VocaliseError::Config(_))));
    }

    #[test]
    fn test_zero_tempo_rejected() {
        let result = Config::from_yaml("score:\n  default-tempo: 0\n");
        assert!(matches!(result, Err(VocaliseError::Config(_))));
    }
}
