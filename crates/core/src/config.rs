use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::infrastructure::onnx_face_locator::DEFAULT_CONFIDENCE;
use crate::shared::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_CAPTURE_FPS, DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH,
    DEFAULT_FRAME_INTERVAL_MS, DEFAULT_RETRY_BACKOFF_MS, DEFAULT_SKIP_INTERVAL,
    DEFAULT_SUBSCRIBER_QUEUE,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Local camera settings for the pull source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_index: u32,
    /// Overrides the platform default device path (e.g. `/dev/video2`).
    pub device_path: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Pause between loop iterations, independent of the camera's rate.
    pub frame_interval_ms: u64,
    /// Pause after a failed read.
    pub retry_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            device_path: None,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Classify every Nth frame.
    pub skip_interval: usize,
    pub capture: CaptureConfig,
    /// Readings buffered per subscriber before the oldest is dropped.
    pub subscriber_queue: usize,
    pub bind_address: String,
    pub face_model: Option<PathBuf>,
    pub emotion_model: Option<PathBuf>,
    pub face_confidence: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            skip_interval: DEFAULT_SKIP_INTERVAL,
            capture: CaptureConfig::default(),
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            face_model: None,
            emotion_model: None,
            face_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl ServiceConfig {
    /// Loads `path` if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.skip_interval == 0 {
            return Err(ConfigError::Invalid("skip_interval must be >= 1".into()));
        }
        if self.subscriber_queue == 0 {
            return Err(ConfigError::Invalid("subscriber_queue must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.face_confidence) {
            return Err(ConfigError::Invalid(format!(
                "face_confidence must be within [0, 1], got {}",
                self.face_confidence
            )));
        }
        Ok(())
    }
}

/// `<config dir>/EmotionRelay/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("EmotionRelay").join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.skip_interval, 2);
        assert_eq!(config.subscriber_queue, 8);
        assert_eq!(config.bind_address, "0.0.0.0:5000");
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.frame_interval_ms, 33);
        assert!(config.emotion_model.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"skip_interval": 3, "capture": {"device_index": 1}, "emotion_model": "/m/e.onnx"}"#,
        );

        let config = ServiceConfig::load(Some(&path)).unwrap();

        assert_eq!(config.skip_interval, 3);
        assert_eq!(config.capture.device_index, 1);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.subscriber_queue, 8);
        assert_eq!(config.emotion_model, Some(PathBuf::from("/m/e.onnx")));
    }

    #[rstest]
    #[case::zero_skip(r#"{"skip_interval": 0}"#)]
    #[case::zero_queue(r#"{"subscriber_queue": 0}"#)]
    #[case::confidence_high(r#"{"face_confidence": 1.5}"#)]
    #[case::confidence_negative(r#"{"face_confidence": -0.1}"#)]
    fn test_invalid_values_rejected(#[case] body: &str) {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, body);
        assert!(matches!(
            ServiceConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "{ not json");
        assert!(matches!(
            ServiceConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            ServiceConfig::load(Some(&path)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = ServiceConfig {
            skip_interval: 5,
            face_model: Some(PathBuf::from("face.onnx")),
            ..ServiceConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: ServiceConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_default_config_path_is_namespaced() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("EmotionRelay/config.json"));
        }
    }
}
