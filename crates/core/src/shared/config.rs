//! Application configuration loaded from a JSON file.
//!
//! Sections mirror the tracker's concerns: `model`, `input`, `tracking`,
//! `logging` and `pipeline`. Every field has a default so partial files are
//! accepted; [`AppConfig::validate`] enforces the cross-field rules.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::constants::{
    DEFAULT_CAMERA_DEVICE, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH,
    DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_FRAMES_TO_SKIP, DEFAULT_MAX_IN_FLIGHT, MODEL_EXTENSION,
};
use super::image::ImageSize;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model path {0}: file must have .onnx extension")]
    InvalidModelPath(PathBuf),
    #[error("neither input source nor video path specified")]
    MissingSource,
    #[error("video source selected but no valid video path provided")]
    MissingVideoPath,
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    OutOfRange { name: &'static str, value: f32 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Camera,
}

impl SourceKind {
    /// Case-insensitive; unknown values fall back to video with a warning.
    fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "camera" => SourceKind::Camera,
            "video" => SourceKind::Video,
            other => {
                log::warn!("Invalid input source: '{other}'. Using default (video).");
                SourceKind::Video
            }
        }
    }
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<Option<SourceKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(SourceKind::parse_lenient))
}

/// Resolved frame source after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Video(PathBuf),
    Camera(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub confidence_threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
        }
    }
}

impl ModelConfig {
    pub fn input_size(&self) -> ImageSize {
        ImageSize::new(self.input_width, self.input_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    #[serde(deserialize_with = "deserialize_source")]
    pub source: Option<SourceKind>,
    pub video_path: Option<PathBuf>,
    pub camera_device: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: None,
            video_path: None,
            camera_device: DEFAULT_CAMERA_DEVICE.to_string(),
        }
    }
}

impl InputConfig {
    /// True when a non-empty video path is configured.
    pub fn has_video_path(&self) -> bool {
        self.video_path
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub iou_threshold: f32,
    pub max_frames_to_skip: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_frames_to_skip: DEFAULT_MAX_FRAMES_TO_SKIP,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_in_flight: usize,
    pub continuous: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            continuous: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub input: InputConfig,
    pub tracking: TrackingConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks value ranges and resolves the input source in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let has_onnx_ext = self
            .model
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == MODEL_EXTENSION);
        if !has_onnx_ext {
            return Err(ConfigError::InvalidModelPath(self.model.path.clone()));
        }

        check_unit_range("confidence_threshold", self.model.confidence_threshold)?;
        check_unit_range("iou_threshold", self.tracking.iou_threshold)?;
        if self.model.input_width == 0 {
            return Err(ConfigError::Zero("input_width"));
        }
        if self.model.input_height == 0 {
            return Err(ConfigError::Zero("input_height"));
        }
        if self.pipeline.max_in_flight == 0 {
            return Err(ConfigError::Zero("max_in_flight"));
        }

        self.resolve_source()
    }

    fn resolve_source(&mut self) -> Result<(), ConfigError> {
        let has_video_path = self.input.has_video_path();

        let source = match self.input.source {
            Some(kind) => kind,
            None if has_video_path => {
                log::warn!("Input source not specified. Using video because a video path is present.");
                SourceKind::Video
            }
            None => return Err(ConfigError::MissingSource),
        };

        match source {
            SourceKind::Video if !has_video_path => return Err(ConfigError::MissingVideoPath),
            SourceKind::Camera => {
                if has_video_path {
                    log::warn!("Camera input selected but video path also specified. Video path will be ignored.");
                }
                self.input.video_path = None;
            }
            _ => {}
        }

        self.input.source = Some(source);
        Ok(())
    }

    /// The frame source this config selects. Call after [`validate`](Self::validate).
    pub fn input_source(&self) -> InputSource {
        match self.input.source {
            Some(SourceKind::Camera) => InputSource::Camera(self.input.camera_device.clone()),
            _ => InputSource::Video(self.input.video_path.clone().unwrap_or_default()),
        }
    }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}
