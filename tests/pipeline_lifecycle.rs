use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use nav_assist::{
    BBox, Detection, DetectionProvider, Frame, FramePipeline, FrameSource, NavError,
    PipelineConfig, PipelineEvent, PipelineReceivers, PipelineState, ProviderFactory,
    SourceDescriptor, SourceKind, SourceOpener, TrackedObject, Zone,
};

const WIDTH: u32 = 90;
const HEIGHT: u32 = 60;
const FRAME_DELAY: Duration = Duration::from_millis(2);
const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Default)]
struct Script {
    fail_open: bool,
    panic_open: bool,
    /// Frames before end of stream (per pass for rewindable sources).
    frames: u64,
    live: bool,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
    stall: Option<Duration>,
}

struct ScriptedSource {
    script: Script,
    position: u64,
    read: u64,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(stall) = self.script.stall {
            std::thread::sleep(stall);
        }
        if self.script.fail_at == Some(self.read) {
            return Err(anyhow!("device unplugged"));
        }
        if self.script.panic_at == Some(self.read) {
            panic!("driver crashed");
        }
        if self.position >= self.script.frames {
            return Ok(None);
        }
        std::thread::sleep(FRAME_DELAY);
        self.position += 1;
        self.read += 1;
        Ok(Some(Frame::solid(WIDTH, HEIGHT, [20, 20, 20], self.position)))
    }

    fn rewind(&mut self) -> Result<()> {
        if self.script.live {
            return Err(anyhow!("live source cannot rewind"));
        }
        self.position = 0;
        Ok(())
    }

    fn dimensions(&self) -> (u32, u32) {
        (WIDTH, HEIGHT)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn is_live(&self) -> bool {
        self.script.live
    }

    fn frames_read(&self) -> u64 {
        self.read
    }
}

struct ScriptedOpener {
    script: Script,
    opened: AtomicUsize,
}

impl SourceOpener for ScriptedOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.script.panic_open {
            panic!("firmware hang");
        }
        if self.script.fail_open {
            return Err(anyhow!("no such device: {}", descriptor));
        }
        Ok(Box::new(ScriptedSource {
            script: self.script,
            position: 0,
            read: 0,
        }))
    }
}

/// Reports one left-side person at confidence 0.5.
struct ScriptedProvider {
    panic_on_call: Option<usize>,
    calls: usize,
    thresholds: Arc<Mutex<Vec<f32>>>,
}

impl DetectionProvider for ScriptedProvider {
    fn track(&mut self, _frame: &Frame, threshold: f32) -> Vec<TrackedObject> {
        self.calls += 1;
        self.thresholds.lock().unwrap().push(threshold);
        if self.panic_on_call == Some(self.calls) {
            panic!("detector exploded");
        }
        if threshold > 0.5 {
            return Vec::new();
        }
        let bbox: BBox = [0, 10, 20, 40];
        vec![TrackedObject::from_detection(
            Detection::new(bbox, 0.5, 0, "person"),
            0,
        )]
    }
}

#[derive(Default)]
struct ScriptedProviders {
    panic_on_call: Option<usize>,
    thresholds: Arc<Mutex<Vec<f32>>>,
    created: Mutex<Vec<String>>,
}

impl ProviderFactory for ScriptedProviders {
    fn create(&self, model: &str) -> Box<dyn DetectionProvider> {
        self.created.lock().unwrap().push(model.to_string());
        Box::new(ScriptedProvider {
            panic_on_call: self.panic_on_call,
            calls: 0,
            thresholds: self.thresholds.clone(),
        })
    }

    fn check(&self, model: &str) -> Result<()> {
        if model == "missing" {
            return Err(NavError::ModelUnavailable {
                name: model.to_string(),
                reason: "not configured".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

struct Harness {
    pipeline: FramePipeline,
    rx: PipelineReceivers,
    opener: Arc<ScriptedOpener>,
    providers: Arc<ScriptedProviders>,
}

fn harness(script: Script, providers: ScriptedProviders) -> Harness {
    let opener = Arc::new(ScriptedOpener {
        script,
        opened: AtomicUsize::new(0),
    });
    let providers = Arc::new(providers);
    let source = if script.live {
        SourceDescriptor::Webcam(0)
    } else {
        SourceDescriptor::File(PathBuf::from("walk.mp4"))
    };
    let config = PipelineConfig {
        source,
        mirror: false,
        active_model: "scripted".to_string(),
        ..PipelineConfig::default()
    };
    let (pipeline, rx) = FramePipeline::new(config, opener.clone(), providers.clone());
    Harness {
        pipeline,
        rx,
        opener,
        providers,
    }
}

fn endless() -> Script {
    Script {
        frames: u64::MAX,
        live: true,
        ..Script::default()
    }
}

fn drain_events(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    rx.try_iter().collect()
}

/// Collect events up to and including the first Idle transition.
fn events_until_idle(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(WAIT) {
        let idle = event == PipelineEvent::StateChanged(PipelineState::Idle);
        events.push(event);
        if idle {
            break;
        }
    }
    events
}

fn camera_errors(events: &[PipelineEvent]) -> Vec<NavError> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::CameraError(err) => Some(err.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn open_failure_reports_once_and_stays_idle() {
    let mut h = harness(
        Script {
            fail_open: true,
            ..Script::default()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();

    let events = events_until_idle(&h.rx.events);
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
    let errors = camera_errors(&events);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], NavError::SourceOpen { .. }));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::StateChanged(PipelineState::Idle))
    );
    assert!(h.rx.frames.try_recv().is_err());
    assert!(h.providers.created.lock().unwrap().is_empty());
}

#[test]
fn file_source_loops_at_end_of_stream() {
    let mut h = harness(
        Script {
            frames: 3,
            ..Script::default()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();

    for _ in 0..8 {
        let output = h.rx.frames.recv_timeout(WAIT).expect("frame");
        assert!((1..=3).contains(&output.frame.index));
        assert_eq!(output.objects.len(), 1);
        assert_eq!(output.objects[0].zone, Zone::Left);
    }
    assert_eq!(h.pipeline.state(), PipelineState::Running);
    assert_eq!(h.opener.opened.load(Ordering::SeqCst), 1);

    let stats = h.pipeline.stats();
    assert_eq!(stats.source_kind, SourceKind::File);
    assert!(stats.frames_processed >= 8);
    assert_eq!(stats.frame_size, Some((WIDTH, HEIGHT)));

    h.pipeline.stop();
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
    assert!(camera_errors(&drain_events(&h.rx.events)).is_empty());
}

#[test]
fn live_source_stops_at_end_of_stream() {
    let mut h = harness(
        Script {
            frames: 2,
            live: true,
            ..Script::default()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));

    let frames: Vec<_> = h.rx.frames.try_iter().collect();
    assert!(frames.len() <= 2);
    let events = drain_events(&h.rx.events);
    assert!(camera_errors(&events).is_empty());
    assert!(events.contains(&PipelineEvent::StateChanged(PipelineState::Running)));

    // A finished run can be started again.
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));
    assert_eq!(h.opener.opened.load(Ordering::SeqCst), 2);
}

#[test]
fn pause_suppresses_emission_until_resume() {
    let mut h = harness(endless(), ScriptedProviders::default());
    h.pipeline.start().unwrap();
    h.rx.frames.recv_timeout(WAIT).expect("first frame");

    assert!(h.pipeline.pause());
    assert_eq!(h.pipeline.state(), PipelineState::Paused);
    assert!(!h.pipeline.pause());

    std::thread::sleep(Duration::from_millis(250));
    while h.rx.frames.try_recv().is_ok() {}
    assert!(h.rx.frames.recv_timeout(Duration::from_millis(300)).is_err());

    assert!(h.pipeline.resume());
    assert_eq!(h.pipeline.state(), PipelineState::Running);
    h.rx.frames.recv_timeout(WAIT).expect("frame after resume");
    h.pipeline.stop();
}

#[test]
fn read_fault_stops_the_pipeline() {
    let mut h = harness(
        Script {
            fail_at: Some(3),
            ..endless()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));

    let errors = camera_errors(&drain_events(&h.rx.events));
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        NavError::SourceRead(message) => assert!(message.contains("device unplugged")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn read_panic_becomes_a_camera_error() {
    let mut h = harness(
        Script {
            panic_at: Some(2),
            ..endless()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));
    assert_eq!(h.pipeline.state(), PipelineState::Idle);

    let events = events_until_idle(&h.rx.events);
    let errors = camera_errors(&events);
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        NavError::SourceRead(message) => assert!(message.contains("driver crashed")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(events.contains(&PipelineEvent::StateChanged(PipelineState::Stopping)));
    assert_eq!(h.rx.frames.try_iter().count(), 2);

    // The pipeline is usable again after the fault.
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));
}

#[test]
fn open_panic_is_reported_as_open_failure() {
    let mut h = harness(
        Script {
            panic_open: true,
            ..endless()
        },
        ScriptedProviders::default(),
    );
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));

    let errors = camera_errors(&events_until_idle(&h.rx.events));
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        NavError::SourceOpen { reason, .. } => assert!(reason.contains("firmware hang")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn processing_panic_becomes_a_camera_error() {
    let mut h = harness(
        endless(),
        ScriptedProviders {
            panic_on_call: Some(2),
            ..ScriptedProviders::default()
        },
    );
    h.pipeline.start().unwrap();
    assert!(h.pipeline.wait_until_idle(WAIT));

    let errors = camera_errors(&drain_events(&h.rx.events));
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        NavError::SourceRead(message) => assert!(message.contains("detector exploded")),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(h.rx.frames.try_iter().count(), 1);
}

#[test]
fn threshold_change_applies_to_following_frames() {
    let mut h = harness(endless(), ScriptedProviders::default());
    h.pipeline.start().unwrap();
    let first = h.rx.frames.recv_timeout(WAIT).expect("frame");
    assert_eq!(first.objects.len(), 1);

    assert_eq!(h.pipeline.set_confidence_threshold(0.9), 0.9);
    let deadline = Instant::now() + WAIT;
    let mut cleared = false;
    while Instant::now() < deadline {
        let output = h.rx.frames.recv_timeout(WAIT).expect("frame");
        if output.objects.is_empty() {
            cleared = true;
            break;
        }
    }
    assert!(cleared);
    assert_eq!(*h.providers.thresholds.lock().unwrap().last().unwrap(), 0.9);

    assert_eq!(h.pipeline.set_confidence_threshold(0.0), nav_assist::MIN_CONF_THRESHOLD);
    assert_eq!(h.pipeline.config().confidence_threshold, nav_assist::MIN_CONF_THRESHOLD);
    h.pipeline.stop();
}

#[test]
fn unavailable_model_is_rejected_without_restart() {
    let mut h = harness(endless(), ScriptedProviders::default());
    h.pipeline.start().unwrap();
    h.rx.frames.recv_timeout(WAIT).expect("frame");

    let err = h.pipeline.set_model("missing").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NavError>(),
        Some(NavError::ModelUnavailable { .. })
    ));
    assert_eq!(h.pipeline.config().active_model, "scripted");
    assert_eq!(h.opener.opened.load(Ordering::SeqCst), 1);

    h.pipeline.set_model("other").unwrap();
    h.rx.frames.recv_timeout(WAIT).expect("frame after switch");
    assert_eq!(h.opener.opened.load(Ordering::SeqCst), 2);
    assert_eq!(
        *h.providers.created.lock().unwrap(),
        vec!["scripted".to_string(), "other".to_string()]
    );
    h.pipeline.stop();
}

#[test]
fn start_while_active_is_rejected_and_stop_is_idempotent() {
    let mut h = harness(endless(), ScriptedProviders::default());
    h.pipeline.start().unwrap();
    assert!(h.pipeline.start().is_err());
    h.pipeline.stop();
    h.pipeline.stop();
    assert_eq!(h.pipeline.state(), PipelineState::Idle);
}

#[test]
fn stuck_worker_is_detached_after_timeout() {
    let opener = Arc::new(ScriptedOpener {
        script: Script {
            stall: Some(Duration::from_secs(3)),
            ..endless()
        },
        opened: AtomicUsize::new(0),
    });
    let (pipeline, _rx) = FramePipeline::new(
        PipelineConfig::default(),
        opener,
        Arc::new(ScriptedProviders::default()),
    );
    let mut pipeline = pipeline.with_stop_timeout(Duration::from_millis(100));
    pipeline.start().unwrap();

    let deadline = Instant::now() + WAIT;
    while pipeline.state() != PipelineState::Running && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let began = Instant::now();
    pipeline.stop();
    assert!(began.elapsed() < Duration::from_secs(1));
    assert_eq!(pipeline.state(), PipelineState::Idle);

    // The detached run cannot disturb a new one.
    pipeline.start().unwrap();
    assert!(pipeline.state().is_active());
}
