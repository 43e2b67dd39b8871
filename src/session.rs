//! Headless session controller.
//!
//! Owns the pipeline handle and the consumers of its output. Everything here
//! runs on the caller's thread: voice cooldown state and the recorder are
//! never touched by the capture worker.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use crate::config::NavConfig;
use crate::detect::{ModelRegistry, ProviderFactory, TrackedObject};
use crate::frame::Frame;
use crate::ingest::{SourceDescriptor, DEFAULT_EXTERNAL_INDEX, DEFAULT_WEBCAM_INDEX};
use crate::locale::Language;
use crate::pipeline::{
    FrameOutput, FramePipeline, PipelineEvent, PipelineReceivers, PipelineState, PipelineStats,
};
use crate::recorder::{default_factory, Recorder, RecordingInfo, DEFAULT_RECORDING_FPS};
use crate::voice::{self, NotificationManager, SpeechQueue, SpeechSink};
use crate::zone::Zone;

/// Operator command, one per input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pause,
    Resume,
    Mirror(bool),
    Conf(f32),
    Model(String),
    Models,
    Source(String),
    Record,
    Voice(bool),
    Describe,
    Snapshot,
    Stats,
    Quit,
}

fn parse_switch(arg: Option<&str>, name: &str) -> Result<bool> {
    match arg.map(|a| a.to_ascii_lowercase()) {
        Some(a) if matches!(a.as_str(), "on" | "true" | "1" | "yes") => Ok(true),
        Some(a) if matches!(a.as_str(), "off" | "false" | "0" | "no") => Ok(false),
        _ => Err(anyhow!("usage: {} on|off", name)),
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (line, None),
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "mirror" => Command::Mirror(parse_switch(rest, "mirror")?),
            "voice" => Command::Voice(parse_switch(rest, "voice")?),
            "conf" => {
                let value = rest.ok_or_else(|| anyhow!("usage: conf <0.01-1.0>"))?;
                Command::Conf(
                    value
                        .parse()
                        .with_context(|| format!("invalid threshold '{}'", value))?,
                )
            }
            "model" => Command::Model(rest.ok_or_else(|| anyhow!("usage: model <name>"))?.to_string()),
            "models" => Command::Models,
            "source" => Command::Source(
                rest.ok_or_else(|| anyhow!("usage: source webcam|external|<path>"))?
                    .to_string(),
            ),
            "record" => Command::Record,
            "describe" => Command::Describe,
            "snapshot" => Command::Snapshot,
            "stats" => Command::Stats,
            "quit" | "exit" | "q" => Command::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command '{}'", other),
        };
        Ok(command)
    }
}

/// Whether the session should keep running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    #[serde(flatten)]
    pipeline: &'a PipelineStats,
    recording: bool,
    recorded_frames: u64,
}

/// Spoken summary of objects per zone, left to right.
pub fn describe_by_zone(objects: &[TrackedObject], language: Language) -> String {
    if objects.is_empty() {
        return language.no_objects().to_string();
    }
    let mut parts = Vec::new();
    for zone in Zone::ALL {
        let mut names: Vec<&str> = Vec::new();
        for object in objects.iter().filter(|o| o.zone == zone) {
            if !names.contains(&object.class_name.as_str()) {
                names.push(&object.class_name);
            }
        }
        if !names.is_empty() {
            parts.push(format!("{}: {}", language.zone_name(zone), names.join(", ")));
        }
    }
    parts.join(". ")
}

pub struct Session {
    pipeline: FramePipeline,
    receivers: PipelineReceivers,
    voice: NotificationManager,
    speech: Box<dyn SpeechSink>,
    registry: Option<Arc<ModelRegistry>>,
    recorder: Option<Recorder>,
    recording_fps: f64,
    webcam_index: u32,
    external_index: u32,
    last_frame: Option<Frame>,
    last_objects: Vec<TrackedObject>,
}

impl Session {
    pub fn new(
        pipeline: FramePipeline,
        receivers: PipelineReceivers,
        voice: NotificationManager,
        speech: Box<dyn SpeechSink>,
    ) -> Self {
        Self {
            pipeline,
            receivers,
            voice,
            speech,
            registry: None,
            recorder: None,
            recording_fps: DEFAULT_RECORDING_FPS,
            webcam_index: DEFAULT_WEBCAM_INDEX,
            external_index: DEFAULT_EXTERNAL_INDEX,
            last_frame: None,
            last_objects: Vec::new(),
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder, fps: f64) -> Self {
        self.recorder = Some(recorder);
        self.recording_fps = fps;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_source_indices(mut self, webcam: u32, external: u32) -> Self {
        self.webcam_index = webcam;
        self.external_index = external;
        self
    }

    /// Wire up models, source opener, pipeline, speech and recorder from config.
    pub fn from_config(cfg: &NavConfig) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::from_specs(
            &cfg.detection.models,
            &cfg.detection.model,
        ));
        let providers: Arc<dyn ProviderFactory> = registry.clone();
        let (pipeline, receivers) = FramePipeline::with_queue(
            cfg.pipeline_config(),
            Arc::new(cfg.source_opener()),
            providers,
            cfg.pipeline.frame_queue,
        );
        let pipeline = pipeline.with_stop_timeout(cfg.pipeline.stop_timeout);

        let speech = SpeechQueue::spawn(voice::engine_from_settings(&cfg.voice));
        let mut session = Self::new(
            pipeline,
            receivers,
            voice::manager_from_settings(&cfg.voice),
            Box::new(speech),
        )
        .with_registry(registry)
        .with_source_indices(cfg.camera.webcam_index, cfg.camera.external_index);

        match Recorder::new(&cfg.recording.dir, cfg.recording.codec, default_factory()) {
            Ok(recorder) => {
                let recorder = recorder.with_keep(cfg.recording.keep);
                session = session.with_recorder(recorder, cfg.recording.fps);
            }
            Err(err) => log::warn!("Session: recording disabled: {:#}", err),
        }
        Ok(session)
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn voice(&self) -> &NotificationManager {
        &self.voice
    }

    pub fn last_objects(&self) -> &[TrackedObject] {
        &self.last_objects
    }

    pub fn recording_info(&self) -> Option<RecordingInfo> {
        self.recorder.as_ref().map(Recorder::info)
    }

    pub fn start(&mut self) -> Result<()> {
        self.pipeline.start()
    }

    /// Drain pending events, then wait up to `timeout` for one frame.
    ///
    /// Returns true when a frame was handled.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        while let Ok(event) = self.receivers.events.try_recv() {
            self.handle_event(event);
        }
        match self.receivers.frames.recv_timeout(timeout) {
            Ok(output) => {
                self.handle_frame(output);
                true
            }
            Err(_) => false,
        }
    }

    pub fn handle_frame(&mut self, output: FrameOutput) {
        for request in self.voice.on_frame(&output.objects) {
            self.speech.submit(&request);
        }
        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.is_recording() {
                recorder.write(&output.frame);
            }
        }
        self.last_objects = output.objects;
        self.last_frame = Some(output.frame);
    }

    pub fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StateChanged(state) => {
                log::info!("Session: pipeline {:?}", state);
                if state == PipelineState::Idle {
                    self.stop_recording();
                    self.voice.reset();
                }
            }
            PipelineEvent::CameraError(err) => {
                log::error!("Session: {}", err);
            }
        }
    }

    /// Apply an operator command.
    pub fn apply(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Pause => {
                if !self.pipeline.pause() {
                    log::info!("Session: nothing to pause ({:?})", self.pipeline.state());
                }
            }
            Command::Resume => {
                if !self.pipeline.resume() {
                    log::info!("Session: nothing to resume ({:?})", self.pipeline.state());
                }
            }
            Command::Mirror(enabled) => {
                self.pipeline.set_mirror(enabled);
                let language = self.pipeline.config().language;
                self.speech.speak(language.mirror_status(enabled));
            }
            Command::Conf(threshold) => {
                let applied = self.pipeline.set_confidence_threshold(threshold);
                log::info!("Session: confidence threshold {:.2}", applied);
            }
            Command::Model(name) => {
                self.pipeline.set_model(&name)?;
                if let Some(registry) = &self.registry {
                    registry.switch_model(&name)?;
                }
            }
            Command::Models => self.log_models(),
            Command::Source(value) => {
                let source =
                    SourceDescriptor::parse_with(&value, self.webcam_index, self.external_index)
                        .map_err(|e| anyhow!("source '{}': {}", value, e))?;
                let was_active = self.pipeline.state().is_active();
                self.stop_recording();
                self.pipeline.set_source(source)?;
                if !was_active {
                    self.pipeline.start()?;
                }
            }
            Command::Record => {
                self.toggle_recording()?;
            }
            Command::Voice(enabled) => {
                self.voice.set_enabled(enabled);
                log::info!("Session: voice {}", if enabled { "on" } else { "off" });
            }
            Command::Describe => {
                let language = self.pipeline.config().language;
                let text = describe_by_zone(&self.last_objects, language);
                self.speech.speak_now(&text);
            }
            Command::Snapshot => {
                let path = self.snapshot()?;
                log::info!("Session: snapshot saved to {}", path.display());
            }
            Command::Stats => log::info!("Session: {}", self.stats_json()?),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Start recording at the current frame size, or stop the active recording.
    ///
    /// Returns the path of the started recording, `None` when one was stopped.
    pub fn toggle_recording(&mut self) -> Result<Option<PathBuf>> {
        let size = self.pipeline.frame_dimensions();
        let fps = self.recording_fps;
        let recorder = self
            .recorder
            .as_mut()
            .ok_or_else(|| anyhow!("recording is not available"))?;
        if recorder.is_recording() {
            recorder.stop();
            return Ok(None);
        }
        let (width, height) =
            size.ok_or_else(|| anyhow!("no video source has been opened yet"))?;
        recorder.start(width, height, fps).map(Some)
    }

    pub fn stats_json(&self) -> Result<String> {
        let stats = self.pipeline.stats();
        let info = self.recording_info();
        let report = StatsReport {
            pipeline: &stats,
            recording: info.as_ref().map(|i| i.is_recording).unwrap_or(false),
            recorded_frames: info.map(|i| i.frame_count).unwrap_or(0),
        };
        serde_json::to_string(&report).context("serialize stats")
    }

    /// Save the last annotated frame as PNG next to the recordings.
    pub fn snapshot(&self) -> Result<PathBuf> {
        let frame = self
            .last_frame
            .as_ref()
            .ok_or_else(|| anyhow!("no frame to save yet"))?;
        let dir = self
            .recorder
            .as_ref()
            .map(|r| r.dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("snapshot_{}_{}.png", stamp, frame.index));
        frame
            .image()
            .save(&path)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Stop recording and the pipeline.
    pub fn shutdown(&mut self) {
        self.stop_recording();
        self.pipeline.stop();
        while let Ok(event) = self.receivers.events.try_recv() {
            if let PipelineEvent::CameraError(err) = event {
                log::error!("Session: {}", err);
            }
        }
    }

    fn stop_recording(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
        }
    }

    fn log_models(&self) {
        let Some(registry) = &self.registry else {
            log::info!("Session: model {}", self.pipeline.config().active_model);
            return;
        };
        let active = self.pipeline.config().active_model.clone();
        for (name, reason) in registry.list() {
            let marker = if name == active { "*" } else { " " };
            match reason {
                None => log::info!("Session: {} {}", marker, name),
                Some(reason) => log::info!("Session: {} {} (unavailable: {})", marker, name, reason),
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
