use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nav_assist::recorder::Y4mWriterFactory;
use nav_assist::session::Flow;
use nav_assist::{
    Command, DefaultSourceOpener, FourCc, FramePipeline, Language, ModelRegistry,
    NotificationManager, PipelineConfig, PipelineState, Recorder, Session, SourceDescriptor,
    SpeechSink, SyntheticBackend,
};

#[derive(Clone, Default)]
struct CapturedSpeech {
    spoken: Arc<Mutex<Vec<(String, bool)>>>,
}

impl SpeechSink for CapturedSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push((text.to_string(), false));
    }

    fn speak_now(&self, text: &str) {
        self.spoken.lock().unwrap().push((text.to_string(), true));
    }
}

fn stub_source() -> SourceDescriptor {
    SourceDescriptor::File(PathBuf::from("stub://hallway?frames=40&width=160&height=120"))
}

fn session(dir: &std::path::Path) -> (Session, CapturedSpeech) {
    let mut registry = ModelRegistry::new();
    registry.register("synthetic", SyntheticBackend::new());
    let registry = Arc::new(registry);

    let config = PipelineConfig {
        source: stub_source(),
        mirror: false,
        active_model: "synthetic".to_string(),
        language: Language::En,
        ..PipelineConfig::default()
    };
    let (pipeline, receivers) =
        FramePipeline::new(config, Arc::new(DefaultSourceOpener::default()), registry.clone());
    let speech = CapturedSpeech::default();
    let recorder = Recorder::new(dir, FourCc::default(), Box::new(Y4mWriterFactory)).unwrap();
    let session = Session::new(
        pipeline,
        receivers,
        NotificationManager::new(Duration::from_secs(5), Language::En),
        Box::new(speech.clone()),
    )
    .with_registry(registry)
    .with_recorder(recorder, 20.0);
    (session, speech)
}

fn pump_frames(session: &mut Session, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut handled = 0;
    while handled < count && Instant::now() < deadline {
        if session.pump(Duration::from_millis(50)) {
            handled += 1;
        }
    }
    assert_eq!(handled, count, "pipeline stopped producing frames");
}

#[test]
fn frames_feed_voice_and_recorder() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, speech) = session(dir.path());
    session.start().unwrap();
    pump_frames(&mut session, 3);

    // The first frame always produces an announcement: objects or "no objects".
    assert!(!speech.spoken.lock().unwrap().is_empty());

    assert_eq!(session.apply(Command::Record).unwrap(), Flow::Continue);
    assert!(session.recording_info().unwrap().is_recording);
    pump_frames(&mut session, 5);
    session.apply(Command::Record).unwrap();

    let info = session.recording_info().unwrap();
    assert!(!info.is_recording);
    let recorder = Recorder::new(dir.path(), FourCc::default(), Box::new(Y4mWriterFactory)).unwrap();
    let recordings = recorder.list_recordings().unwrap();
    assert_eq!(recordings.len(), 1);
    let size = std::fs::metadata(&recordings[0]).unwrap().len();
    assert!(size >= 5 * (160 * 120 * 3) as u64);

    session.shutdown();
    assert_eq!(session.pipeline().state(), PipelineState::Idle);
}

#[test]
fn commands_adjust_the_running_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, speech) = session(dir.path());
    session.start().unwrap();
    pump_frames(&mut session, 1);

    session.apply("conf 0.6".parse().unwrap()).unwrap();
    assert_eq!(session.pipeline().config().confidence_threshold, 0.6);

    session.apply(Command::Mirror(true)).unwrap();
    assert!(session.pipeline().config().mirror);
    assert!(speech
        .spoken
        .lock()
        .unwrap()
        .contains(&("Mirror: ON".to_string(), false)));

    assert!(session.apply(Command::Model("missing".to_string())).is_err());
    assert_eq!(session.pipeline().config().active_model, "synthetic");

    session.apply(Command::Pause).unwrap();
    assert_eq!(session.pipeline().state(), PipelineState::Paused);
    session.apply(Command::Resume).unwrap();
    assert_eq!(session.pipeline().state(), PipelineState::Running);

    pump_frames(&mut session, 1);
    session.apply(Command::Describe).unwrap();
    assert!(speech.spoken.lock().unwrap().last().unwrap().1);

    let stats = session.stats_json().unwrap();
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats["source_kind"], "file");
    assert_eq!(stats["recording"], false);

    let snapshot = session.snapshot().unwrap();
    assert!(snapshot.starts_with(dir.path()));
    assert!(image::open(&snapshot).is_ok());

    assert_eq!(session.apply(Command::Quit).unwrap(), Flow::Quit);
}

#[test]
fn recording_requires_an_opened_source() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, _) = session(dir.path());
    assert!(session.toggle_recording().is_err());
    assert!(session.snapshot().is_err());
}
