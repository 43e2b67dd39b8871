use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;

use super::processor::FrameProcessor;
use super::shared::Shared;
use super::{FrameOutput, PipelineEvent, PipelineState, PAUSE_POLL};
use crate::detect::ProviderFactory;
use crate::error::NavError;
use crate::ingest::{FrameSource, SourceOpener};

/// Everything one run of the capture worker needs.
pub(super) struct WorkerContext {
    pub(super) shared: Arc<Shared>,
    pub(super) generation: u64,
    pub(super) stop: Arc<AtomicBool>,
    pub(super) frames: SyncSender<FrameOutput>,
    pub(super) opener: Arc<dyn SourceOpener>,
    pub(super) providers: Arc<dyn ProviderFactory>,
}

/// Owns the open source; dropping it releases the capture handle.
struct CaptureGuard {
    source: Box<dyn FrameSource>,
    name: String,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        log::info!(
            "FramePipeline: released {} after {} frames",
            self.name,
            self.source.frames_read()
        );
    }
}

enum Exit {
    Stopped,
    EndOfStream,
    Fault(NavError),
}

pub(super) fn run(ctx: WorkerContext) {
    // Backstop for panics outside the guarded source and processing calls.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| run_inner(&ctx))) {
        let error = NavError::SourceRead(format!(
            "panic in capture worker: {}",
            panic_message(payload.as_ref())
        ));
        log::error!("FramePipeline: {}", error);
        ctx.shared.emit(PipelineEvent::CameraError(error));
        ctx.shared.transition(ctx.generation, PipelineState::Stopping);
        ctx.shared.transition(ctx.generation, PipelineState::Idle);
    }
}

fn run_inner(ctx: &WorkerContext) {
    let config = ctx.shared.config();
    let mut guard = match guarded("opening the source", || ctx.opener.open(&config.source)) {
        Ok(source) => CaptureGuard {
            name: source.describe(),
            source,
        },
        Err(err) => {
            let error = NavError::SourceOpen {
                source_name: config.source.to_string(),
                reason: format!("{:#}", err),
            };
            log::error!("FramePipeline: {}", error);
            ctx.shared.emit(PipelineEvent::CameraError(error));
            ctx.shared.transition(ctx.generation, PipelineState::Idle);
            return;
        }
    };

    let (width, height) = guard.source.dimensions();
    ctx.shared.set_frame_size((width, height));
    let provider = ctx.providers.create(&config.active_model);
    let mut processor = match FrameProcessor::new(width, config.zone_divisions, provider) {
        Ok(processor) => processor,
        Err(err) => {
            let error = NavError::SourceRead(format!("{:#}", err));
            ctx.shared.emit(PipelineEvent::CameraError(error));
            ctx.shared.transition(ctx.generation, PipelineState::Idle);
            return;
        }
    };

    // `stop` may have landed while the source was opening.
    if ctx.stop.load(Ordering::SeqCst)
        || !ctx.shared.transition(ctx.generation, PipelineState::Running)
    {
        ctx.shared.transition(ctx.generation, PipelineState::Idle);
        return;
    }
    log::info!(
        "FramePipeline: running {} ({}x{}, model {})",
        guard.name,
        width,
        height,
        config.active_model
    );

    let exit = run_loop(ctx, &mut guard, &mut processor);
    match &exit {
        Exit::Stopped => log::info!("FramePipeline: stop requested"),
        Exit::EndOfStream => log::info!("FramePipeline: end of stream on {}", guard.name),
        Exit::Fault(error) => {
            log::error!("FramePipeline: {}", error);
            ctx.shared.emit(PipelineEvent::CameraError(error.clone()));
        }
    }

    ctx.shared.transition(ctx.generation, PipelineState::Stopping);
    drop(guard);
    ctx.shared.transition(ctx.generation, PipelineState::Idle);
}

fn run_loop(ctx: &WorkerContext, guard: &mut CaptureGuard, processor: &mut FrameProcessor) -> Exit {
    let mut produced_since_rewind = false;
    loop {
        if ctx.stop.load(Ordering::SeqCst) || ctx.shared.generation() != ctx.generation {
            return Exit::Stopped;
        }
        if ctx.shared.state() == PipelineState::Paused {
            std::thread::sleep(PAUSE_POLL);
            continue;
        }

        let config = ctx.shared.config();
        let frame = match guarded("reading a frame", || guard.source.next_frame()) {
            Ok(Some(frame)) => frame,
            Ok(None) if guard.source.is_live() => return Exit::EndOfStream,
            Ok(None) => {
                if !produced_since_rewind {
                    return Exit::Fault(NavError::SourceRead(format!(
                        "{} produced no frames",
                        guard.name
                    )));
                }
                if let Err(err) = guarded("rewinding", || guard.source.rewind()) {
                    return Exit::Fault(NavError::SourceRead(format!("{:#}", err)));
                }
                log::debug!("FramePipeline: looping {}", guard.name);
                produced_since_rewind = false;
                continue;
            }
            Err(err) => return Exit::Fault(NavError::SourceRead(format!("{:#}", err))),
        };
        produced_since_rewind = true;

        let output = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(frame, &config))) {
            Ok(output) => output,
            Err(payload) => {
                return Exit::Fault(NavError::SourceRead(format!(
                    "panic in frame processing: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        ctx.shared.frames_processed.fetch_add(1, Ordering::Relaxed);
        match ctx.frames.try_send(output) {
            Ok(()) => ctx.shared.set_fps(processor.emitted_at(Instant::now())),
            Err(TrySendError::Full(_)) => {
                ctx.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("FramePipeline: frame consumer disconnected");
                return Exit::Stopped;
            }
        }
    }
}

/// Run a source call, turning a panic into an error.
fn guarded<T>(action: &str, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(anyhow!(
            "panic while {}: {}",
            action,
            panic_message(payload.as_ref())
        ))
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
