use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use super::shared::{PipelineConfig, Shared};
use super::worker::{self, WorkerContext};
use super::{FrameOutput, PipelineEvent, PipelineState, PipelineStats};
use crate::detect::ProviderFactory;
use crate::ingest::{SourceDescriptor, SourceOpener};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_FRAME_QUEUE: usize = 2;
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Consumer ends of the pipeline's channels.
pub struct PipelineReceivers {
    /// Processed frames. Bounded: when the consumer lags, new frames are dropped.
    pub frames: Receiver<FrameOutput>,
    /// State changes and camera errors. Unbounded.
    pub events: Receiver<PipelineEvent>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Control handle for the capture worker.
pub struct FramePipeline {
    shared: Arc<Shared>,
    frames_tx: SyncSender<FrameOutput>,
    opener: Arc<dyn SourceOpener>,
    providers: Arc<dyn ProviderFactory>,
    worker: Option<Worker>,
    stop_timeout: Duration,
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        opener: Arc<dyn SourceOpener>,
        providers: Arc<dyn ProviderFactory>,
    ) -> (Self, PipelineReceivers) {
        Self::with_queue(config, opener, providers, DEFAULT_FRAME_QUEUE)
    }

    pub fn with_queue(
        mut config: PipelineConfig,
        opener: Arc<dyn SourceOpener>,
        providers: Arc<dyn ProviderFactory>,
        frame_queue: usize,
    ) -> (Self, PipelineReceivers) {
        config.confidence_threshold = crate::clamp_conf_threshold(config.confidence_threshold);
        let (frames_tx, frames) = mpsc::sync_channel(frame_queue.max(1));
        let (events_tx, events) = mpsc::channel();
        let pipeline = Self {
            shared: Arc::new(Shared::new(config, events_tx)),
            frames_tx,
            opener,
            providers,
            worker: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        };
        (pipeline, PipelineReceivers { frames, events })
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Spawn the capture worker. The source is opened on the worker thread;
    /// an open failure arrives as a `CameraError` event.
    pub fn start(&mut self) -> Result<()> {
        if self.shared.state().is_active() {
            return Err(anyhow!("pipeline already {:?}", self.shared.state()));
        }
        self.reap_finished();

        let generation = self.shared.begin_run();
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            shared: self.shared.clone(),
            generation,
            stop: stop.clone(),
            frames: self.frames_tx.clone(),
            opener: self.opener.clone(),
            providers: self.providers.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || worker::run(ctx));
        match spawned {
            Ok(join) => {
                self.worker = Some(Worker { stop, join });
                Ok(())
            }
            Err(err) => {
                self.shared.abandon_run();
                Err(anyhow!("failed to spawn capture worker: {}", err))
            }
        }
    }

    /// Request a cooperative stop and wait up to the stop timeout.
    ///
    /// A worker that does not finish in time is detached and the pipeline
    /// goes Idle regardless; the stale run can no longer change state.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::SeqCst);
        for from in [PipelineState::Running, PipelineState::Paused, PipelineState::Opening] {
            if self.shared.transition_from(from, PipelineState::Stopping) {
                break;
            }
        }

        let deadline = Instant::now() + self.stop_timeout;
        while !worker.join.is_finished() && Instant::now() < deadline {
            std::thread::sleep(JOIN_POLL);
        }
        if worker.join.is_finished() {
            if worker.join.join().is_err() {
                log::error!("FramePipeline: capture worker panicked");
            }
            // Covers a worker that panicked outside per-frame processing.
            self.shared.transition_from(PipelineState::Stopping, PipelineState::Idle);
        } else {
            log::error!(
                "FramePipeline: capture worker did not stop within {:?}; detaching it",
                self.stop_timeout
            );
            self.shared.abandon_run();
        }
    }

    /// Running -> Paused. No frames are read while paused.
    pub fn pause(&self) -> bool {
        self.shared
            .transition_from(PipelineState::Running, PipelineState::Paused)
    }

    /// Paused -> Running.
    pub fn resume(&self) -> bool {
        self.shared
            .transition_from(PipelineState::Paused, PipelineState::Running)
    }

    /// Switch source. A running pipeline is restarted against the new source.
    ///
    /// The mirror setting follows the new source's default.
    pub fn set_source(&mut self, source: SourceDescriptor) -> Result<()> {
        log::info!("FramePipeline: source -> {}", source);
        self.shared.update_config(|cfg| {
            cfg.mirror = source.default_mirror();
            cfg.source = source;
        });
        self.restart_if_active()
    }

    /// Switch model. Unavailable models are rejected and nothing changes.
    pub fn set_model(&mut self, model: &str) -> Result<()> {
        self.providers.check(model)?;
        log::info!("FramePipeline: model -> {}", model);
        self.shared
            .update_config(|cfg| cfg.active_model = model.to_string());
        self.restart_if_active()
    }

    /// Applies from the next frame.
    pub fn set_mirror(&self, mirror: bool) {
        self.shared.update_config(|cfg| cfg.mirror = mirror);
    }

    /// Clamp and apply from the next frame. Returns the stored value.
    pub fn set_confidence_threshold(&self, threshold: f32) -> f32 {
        let clamped = crate::clamp_conf_threshold(threshold);
        self.shared
            .update_config(|cfg| cfg.confidence_threshold = clamped);
        clamped
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn config(&self) -> Arc<PipelineConfig> {
        self.shared.config()
    }

    /// Dimensions reported by the most recently opened source.
    pub fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.shared.frame_size()
    }

    pub fn stats(&self) -> PipelineStats {
        let config = self.shared.config();
        PipelineStats {
            fps: self.shared.fps(),
            frames_processed: self.shared.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
            source_kind: config.source.kind(),
            state: self.shared.state(),
            frame_size: self.shared.frame_size(),
            model: config.active_model.clone(),
        }
    }

    /// Poll until the worker reports Idle or `timeout` passes.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.state() == PipelineState::Idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(JOIN_POLL);
        }
    }

    fn restart_if_active(&mut self) -> Result<()> {
        if !self.shared.state().is_active() {
            self.reap_finished();
            return Ok(());
        }
        self.stop();
        self.start()
    }

    /// Join a worker that already ended on its own (end of stream, fault).
    fn reap_finished(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join.is_finished() {
                if worker.join.join().is_err() {
                    log::error!("FramePipeline: capture worker panicked");
                }
            } else {
                // Idle but still unwinding its last frame: let `stop` handle it.
                self.worker = Some(worker);
                self.stop();
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
