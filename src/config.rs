use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    composition::{layout::CompositionSpec, strategy::StrategyRegistry},
    error::{ConfigError, Result},
};

/// Main configuration for the Talk-Compositor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output geometry
    pub composition: CompositionSpec,

    /// Rendering strategy and frame pacing
    pub render: RenderConfig,

    /// ffmpeg binaries and codec settings
    pub encoder: EncoderConfig,

    /// Slide retrieval settings
    pub fetch: FetchConfig,

    /// Multi-talk processing settings
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.composition.validate().map_err(|e| ConfigError::InvalidValue {
            key: "composition".to_string(),
            value: e.to_string(),
        })?;
        self.render.validate()?;
        self.encoder.validate()?;
        self.fetch.validate()?;
        self.batch.validate()?;
        Ok(())
    }
}

/// Rendering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Strategy name, resolved through the strategy registry
    pub strategy: String,

    /// Output frame rate
    pub fps: f64,

    /// Frames composed in parallel per batch (frame strategy)
    pub frame_batch: usize,

    /// Worker threads for per-frame compositing
    pub threads: usize,

    /// Keep concat lists and intermediate encodes next to the output
    pub keep_intermediates: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strategy: "segment".to_string(),
            fps: 30.0,
            frame_batch: 32,
            threads: num_cpus::get(),
            keep_intermediates: false,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if !StrategyRegistry::new().has(&self.strategy) {
            return Err(ConfigError::InvalidValue {
                key: "render.strategy".to_string(),
                value: self.strategy.clone()
            }.into());
        }

        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "render.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.frame_batch == 0 || self.threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.parallelism".to_string(),
                value: format!("batch {} / threads {}", self.frame_batch, self.threads)
            }.into());
        }

        Ok(())
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: String,
    pub ffprobe: String,

    /// Primary video codec
    pub codec: String,

    /// Retried once when the primary codec fails
    pub fallback_codec: Option<String>,

    /// x264/x265 preset
    pub preset: String,

    /// x264/x265 constant rate factor, ignored when a bitrate is set
    pub crf: u8,

    pub video_bitrate: Option<String>,

    pub audio_codec: String,
    pub audio_bitrate: Option<String>,

    pub pix_fmt: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        // Hardware encoding where it is reliably present
        let (codec, fallback) = if cfg!(target_os = "macos") {
            ("h264_videotoolbox", "libx264")
        } else {
            ("libx264", "mpeg4")
        };

        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            codec: codec.to_string(),
            fallback_codec: Some(fallback.to_string()),
            preset: "veryfast".to_string(),
            crf: 23,
            video_bitrate: None,
            audio_codec: "aac".to_string(),
            audio_bitrate: Some("192k".to_string()),
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "encoder.codec".to_string(),
                value: self.codec.clone()
            }.into());
        }

        if self.crf > 51 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.crf".to_string(),
                value: self.crf.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Slide retrieval configuration
///
/// URL templates substitute `{id}` (presentation id) and `{name}` (image name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub slides_json_url: String,
    pub slide_image_url: String,
    pub request_timeout_secs: u64,

    /// Concurrent slide downloads
    pub max_concurrent: usize,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            slides_json_url: "https://s.slideslive.com/{id}/v3/slides.json".to_string(),
            slide_image_url:
                "https://rs.slideslive.com/{id}/slides/{name}.png?h=432&f=webp&s=lambda&accelerate_s3=1"
                    .to_string(),
            request_timeout_secs: 30,
            max_concurrent: 5,
            user_agent: concat!("talk-compositor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                key: "fetch.max_concurrent".to_string(),
                value: self.max_concurrent.to_string()
            }.into());
        }

        if !self.slide_image_url.contains("{name}") {
            return Err(ConfigError::InvalidValue {
                key: "fetch.slide_image_url".to_string(),
                value: self.slide_image_url.clone()
            }.into());
        }

        Ok(())
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory holding one `talk_<id>_<title>` folder per talk
    pub output_root: String,

    /// Talks processed concurrently
    pub max_concurrent_talks: usize,

    /// External HLS downloader
    pub downloader: String,

    /// Overlay the original video once more onto the composed one
    pub final_pip: bool,

    /// Extract `audio.mp3` after download
    pub extract_audio: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_root: "talks".to_string(),
            max_concurrent_talks: 3,
            downloader: "youtube-dl".to_string(),
            final_pip: false,
            extract_audio: true,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_talks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_concurrent_talks".to_string(),
                value: self.max_concurrent_talks.to_string()
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let original_config = Config::default();

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[render]\nstrategy = \"frame\"\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.render.strategy, "frame");
        assert_eq!(config.render.fps, 30.0);
        assert_eq!(config.fetch.max_concurrent, 5);
        assert_eq!(config.batch.max_concurrent_talks, 3);
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/talk.toml").is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let mut config = Config::default();
        config.render.strategy = "hologram".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_overlay_scale() {
        let mut config = Config::default();
        config.composition.overlay_scale = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.fetch.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch.max_concurrent_talks = 0;
        assert!(config.validate().is_err());
    }
}
