use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::NavError;
use crate::ingest::{
    DefaultSourceOpener, SourceDescriptor, DEFAULT_EXTERNAL_INDEX, DEFAULT_WEBCAM_INDEX,
};
use crate::locale::Language;
use crate::pipeline::PipelineConfig;
use crate::recorder::{FourCc, DEFAULT_KEEP_RECORDINGS};
use crate::zone::DEFAULT_DIVISIONS;

const DEFAULT_SOURCE: &str = "webcam";
const DEFAULT_DEVICE_TEMPLATE: &str = "/dev/video{index}";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MODEL: &str = "yolov8n";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_VOICE_COOLDOWN_SECS: f64 = 5.0;
const DEFAULT_VOICE_COMMAND: &str = "espeak-ng";
const DEFAULT_VOICE_RATE: u32 = 150;
const DEFAULT_VOICE_VOLUME: f32 = 0.9;
const DEFAULT_RECORDING_DIR_NAME: &str = "Navigation_Assistant_Recordings";
const DEFAULT_RECORDING_FPS: f64 = 20.0;
const DEFAULT_RECORDING_CODEC: &str = "mp4v";
const DEFAULT_STOP_TIMEOUT_MS: u64 = 1000;
const DEFAULT_FRAME_QUEUE: usize = 2;

#[derive(Debug, Deserialize, Default)]
struct NavConfigFile {
    source: Option<String>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    display: Option<DisplayConfigFile>,
    voice: Option<VoiceConfigFile>,
    recording: Option<RecordingConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    webcam_index: Option<u32>,
    external_index: Option<u32>,
    device_template: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    model: Option<String>,
    confidence_threshold: Option<f32>,
    models: Option<Vec<ModelSpec>>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mirror: Option<bool>,
    show_fps: Option<bool>,
    zone_divisions: Option<usize>,
    zone_alpha: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct VoiceConfigFile {
    enabled: Option<bool>,
    announce_zone: Option<bool>,
    cooldown_secs: Option<f64>,
    language: Option<Language>,
    engine: Option<VoiceEngineKind>,
    command: Option<String>,
    rate: Option<u32>,
    volume: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    dir: Option<PathBuf>,
    fps: Option<f64>,
    codec: Option<String>,
    keep: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    stop_timeout_ms: Option<u64>,
    frame_queue: Option<usize>,
}

/// How a configured model is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackendKind {
    Synthetic,
    Onnx,
}

/// One named model slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub backend: ModelBackendKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// One class name per line; COCO names when absent.
    #[serde(default)]
    pub labels: Option<PathBuf>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

impl ModelSpec {
    fn onnx(name: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            backend: ModelBackendKind::Onnx,
            path: Some(PathBuf::from(file)),
            labels: None,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }

    fn synthetic() -> Self {
        Self {
            name: "synthetic".to_string(),
            backend: ModelBackendKind::Synthetic,
            path: None,
            labels: None,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Stock model slots: the two pretrained exports, two custom exports and
/// the synthetic demo model.
pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::onnx("yolov8n", "yolov8n.onnx"),
        ModelSpec::onnx("yolo11n", "yolo11n.onnx"),
        ModelSpec::onnx("yolo8_custom", "best8.onnx"),
        ModelSpec::onnx("yolo11_custom", "best11.onnx"),
        ModelSpec::synthetic(),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEngineKind {
    /// Utterances go to the log only.
    Log,
    /// An external synthesizer process per utterance.
    Command,
}

#[derive(Debug, Clone)]
pub struct NavConfig {
    pub source: SourceDescriptor,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub display: DisplaySettings,
    pub voice: VoiceSettings,
    pub recording: RecordingSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub webcam_index: u32,
    pub external_index: u32,
    pub device_template: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub model: String,
    pub confidence_threshold: f32,
    pub models: Vec<ModelSpec>,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// `None` follows the source default (mirrored webcam).
    pub mirror: Option<bool>,
    pub show_fps: bool,
    pub zone_divisions: usize,
    pub zone_alpha: f32,
}

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub announce_zone: bool,
    pub cooldown: Duration,
    pub language: Language,
    pub engine: VoiceEngineKind,
    pub command: String,
    pub rate: u32,
    pub volume: f32,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub dir: PathBuf,
    pub fps: f64,
    pub codec: FourCc,
    /// Recordings kept after each stop; 0 keeps everything.
    pub keep: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub stop_timeout: Duration,
    pub frame_queue: usize,
}

impl NavConfig {
    /// Defaults, then the file named by `NAV_CONFIG`, then `NAV_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("NAV_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NavConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            webcam_index: camera_file.webcam_index.unwrap_or(DEFAULT_WEBCAM_INDEX),
            external_index: camera_file.external_index.unwrap_or(DEFAULT_EXTERNAL_INDEX),
            device_template: camera_file
                .device_template
                .unwrap_or_else(|| DEFAULT_DEVICE_TEMPLATE.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fps: camera_file.fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };
        let source = parse_source(
            file.source.as_deref().unwrap_or(DEFAULT_SOURCE),
            &camera,
        )?;

        let detection_file = file.detection.unwrap_or_default();
        let detection = DetectionSettings {
            model: detection_file
                .model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            confidence_threshold: detection_file
                .confidence_threshold
                .unwrap_or(crate::DEFAULT_CONF_THRESHOLD),
            models: detection_file.models.unwrap_or_else(default_models),
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            mirror: display_file.mirror,
            show_fps: display_file.show_fps.unwrap_or(true),
            zone_divisions: display_file.zone_divisions.unwrap_or(DEFAULT_DIVISIONS),
            zone_alpha: display_file
                .zone_alpha
                .unwrap_or(crate::overlay::DEFAULT_ZONE_ALPHA),
        };

        let voice_file = file.voice.unwrap_or_default();
        let voice = VoiceSettings {
            enabled: voice_file.enabled.unwrap_or(true),
            announce_zone: voice_file.announce_zone.unwrap_or(true),
            cooldown: duration_from_secs(
                "voice.cooldown_secs",
                voice_file.cooldown_secs.unwrap_or(DEFAULT_VOICE_COOLDOWN_SECS),
            )?,
            language: voice_file.language.unwrap_or_default(),
            engine: voice_file.engine.unwrap_or(VoiceEngineKind::Log),
            command: voice_file
                .command
                .unwrap_or_else(|| DEFAULT_VOICE_COMMAND.to_string()),
            rate: voice_file.rate.unwrap_or(DEFAULT_VOICE_RATE),
            volume: voice_file.volume.unwrap_or(DEFAULT_VOICE_VOLUME),
        };

        let recording_file = file.recording.unwrap_or_default();
        let recording = RecordingSettings {
            dir: recording_file.dir.unwrap_or_else(default_recording_dir),
            fps: recording_file.fps.unwrap_or(DEFAULT_RECORDING_FPS),
            codec: recording_file
                .codec
                .as_deref()
                .unwrap_or(DEFAULT_RECORDING_CODEC)
                .parse()
                .map_err(|e: String| NavError::Config(e))?,
            keep: recording_file.keep.unwrap_or(DEFAULT_KEEP_RECORDINGS),
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline = PipelineSettings {
            stop_timeout: Duration::from_millis(
                pipeline_file.stop_timeout_ms.unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
            ),
            frame_queue: pipeline_file.frame_queue.unwrap_or(DEFAULT_FRAME_QUEUE),
        };

        Ok(Self {
            source,
            camera,
            detection,
            display,
            voice,
            recording,
            pipeline,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_nonempty("NAV_SOURCE") {
            self.source = parse_source(&source, &self.camera)?;
        }
        if let Some(model) = env_nonempty("NAV_MODEL") {
            self.detection.model = model;
        }
        if let Some(threshold) = env_nonempty("NAV_CONF_THRESHOLD") {
            self.detection.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("NAV_CONF_THRESHOLD must be a number"))?;
        }
        if let Some(dir) = env_nonempty("NAV_RECORDING_DIR") {
            self.recording.dir = PathBuf::from(dir);
        }
        if let Some(language) = env_nonempty("NAV_LANGUAGE") {
            self.voice.language = language
                .parse()
                .map_err(|e| anyhow!("NAV_LANGUAGE: {}", e))?;
        }
        if let Some(voice) = env_nonempty("NAV_VOICE") {
            self.voice.enabled = parse_bool(&voice)
                .ok_or_else(|| anyhow!("NAV_VOICE must be on/off, true/false or 1/0"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(NavError::Config(format!(
                "confidence threshold {} must be within [0, 1]",
                threshold
            ))
            .into());
        }
        self.detection.confidence_threshold = crate::clamp_conf_threshold(threshold);

        if self.display.zone_divisions == 0 {
            return Err(NavError::Config("zone_divisions must be at least 1".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.display.zone_alpha) {
            return Err(NavError::Config("zone_alpha must be within [0, 1]".to_string()).into());
        }
        if self.detection.models.is_empty() {
            return Err(NavError::Config("at least one model must be configured".to_string()).into());
        }
        let mut names: Vec<&str> = self.detection.models.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(NavError::Config("model names must be unique".to_string()).into());
        }
        if !(self.recording.fps > 0.0 && self.recording.fps.is_finite()) {
            return Err(NavError::Config("recording fps must be positive".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.voice.volume) {
            return Err(NavError::Config("voice volume must be within [0, 1]".to_string()).into());
        }
        if self.pipeline.frame_queue == 0 {
            return Err(NavError::Config("frame_queue must be at least 1".to_string()).into());
        }
        if !self.camera.device_template.contains("{index}") {
            log::warn!(
                "camera device template {} has no {{index}} placeholder; webcam and external share one device",
                self.camera.device_template
            );
        }
        Ok(())
    }

    /// Parse a source string using the configured camera indices.
    pub fn parse_source(&self, value: &str) -> Result<SourceDescriptor> {
        parse_source(value, &self.camera)
    }

    /// Initial pipeline configuration derived from these settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mirror: self
                .display
                .mirror
                .unwrap_or_else(|| self.source.default_mirror()),
            source: self.source.clone(),
            confidence_threshold: self.detection.confidence_threshold,
            active_model: self.detection.model.clone(),
            show_fps: self.display.show_fps,
            zone_alpha: self.display.zone_alpha,
            zone_divisions: self.display.zone_divisions,
            language: self.voice.language,
        }
    }

    pub fn source_opener(&self) -> DefaultSourceOpener {
        DefaultSourceOpener {
            device_template: self.camera.device_template.clone(),
            width: self.camera.width,
            height: self.camera.height,
            target_fps: self.camera.fps,
        }
    }
}

fn parse_source(value: &str, camera: &CameraSettings) -> Result<SourceDescriptor> {
    SourceDescriptor::parse_with(value, camera.webcam_index, camera.external_index)
        .map_err(|e| NavError::Config(format!("source '{}': {}", value, e)).into())
}

fn read_config_file(path: &Path) -> Result<NavConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn default_recording_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(DEFAULT_RECORDING_DIR_NAME),
        None => PathBuf::from(DEFAULT_RECORDING_DIR_NAME),
    }
}

fn duration_from_secs(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| NavError::Config(format!("{} must be a non-negative number", field)).into())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_deployment() -> Result<()> {
        let cfg = NavConfig::from_file(NavConfigFile::default())?;
        assert_eq!(cfg.source, SourceDescriptor::Webcam(0));
        assert_eq!(cfg.detection.model, "yolov8n");
        assert_eq!(cfg.detection.confidence_threshold, 0.25);
        assert_eq!(cfg.detection.models.len(), 5);
        assert_eq!(cfg.voice.cooldown, Duration::from_secs(5));
        assert_eq!(cfg.voice.language, Language::Fr);
        assert_eq!(cfg.recording.codec.as_str(), "mp4v");
        assert_eq!(cfg.recording.keep, 10);
        assert!(cfg.pipeline_config().mirror);
        Ok(())
    }

    #[test]
    fn toml_sections_override_defaults() -> Result<()> {
        let file: NavConfigFile = toml::from_str(
            r#"
            source = "external"

            [camera]
            external_index = 3

            [display]
            mirror = false
            zone_divisions = 5

            [voice]
            cooldown_secs = 2.5
            language = "en"
            "#,
        )?;
        let cfg = NavConfig::from_file(file)?;
        assert_eq!(cfg.source, SourceDescriptor::External(3));
        assert_eq!(cfg.display.zone_divisions, 5);
        assert_eq!(cfg.voice.cooldown, Duration::from_millis(2500));
        assert_eq!(cfg.voice.language, Language::En);
        assert!(!cfg.pipeline_config().mirror);
        Ok(())
    }

    #[test]
    fn validate_rejects_out_of_range_values() -> Result<()> {
        let mut cfg = NavConfig::from_file(NavConfigFile::default())?;
        cfg.detection.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = NavConfig::from_file(NavConfigFile::default())?;
        cfg.display.zone_divisions = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = NavConfig::from_file(NavConfigFile::default())?;
        cfg.detection.models.push(ModelSpec::synthetic());
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn zero_threshold_is_clamped_to_minimum() -> Result<()> {
        let mut cfg = NavConfig::from_file(NavConfigFile::default())?;
        cfg.detection.confidence_threshold = 0.0;
        cfg.validate()?;
        assert_eq!(cfg.detection.confidence_threshold, crate::MIN_CONF_THRESHOLD);
        Ok(())
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
