use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use super::{PipelineEvent, PipelineState};
use crate::ingest::SourceDescriptor;
use crate::locale::Language;

/// Configuration read by the worker at the top of every iteration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub source: SourceDescriptor,
    pub mirror: bool,
    /// Always within `[MIN_CONF_THRESHOLD, MAX_CONF_THRESHOLD]`.
    pub confidence_threshold: f32,
    pub active_model: String,
    pub show_fps: bool,
    pub zone_alpha: f32,
    pub zone_divisions: usize,
    pub language: Language,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let source = SourceDescriptor::default();
        Self {
            mirror: source.default_mirror(),
            source,
            confidence_threshold: crate::DEFAULT_CONF_THRESHOLD,
            active_model: "synthetic".to_string(),
            show_fps: true,
            zone_alpha: crate::overlay::DEFAULT_ZONE_ALPHA,
            zone_divisions: crate::zone::DEFAULT_DIVISIONS,
            language: Language::default(),
        }
    }
}

struct StateSlot {
    state: PipelineState,
    generation: u64,
}

/// State shared between the control handle and the capture worker.
pub(super) struct Shared {
    config: RwLock<Arc<PipelineConfig>>,
    state: Mutex<StateSlot>,
    events: Mutex<Sender<PipelineEvent>>,
    frame_size: Mutex<Option<(u32, u32)>>,
    fps_bits: AtomicU64,
    pub(super) frames_processed: AtomicU64,
    pub(super) frames_dropped: AtomicU64,
}

impl Shared {
    pub(super) fn new(config: PipelineConfig, events: Sender<PipelineEvent>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            state: Mutex::new(StateSlot {
                state: PipelineState::Idle,
                generation: 0,
            }),
            events: Mutex::new(events),
            frame_size: Mutex::new(None),
            fps_bits: AtomicU64::new(0f64.to_bits()),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub(super) fn config(&self) -> Arc<PipelineConfig> {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the snapshot with an edited copy of the current one.
    pub(super) fn update_config<F: FnOnce(&mut PipelineConfig)>(&self, edit: F) -> Arc<PipelineConfig> {
        let mut guard = match self.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = PipelineConfig::clone(&guard);
        edit(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }

    pub(super) fn state(&self) -> PipelineState {
        self.lock_state().state
    }

    pub(super) fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    /// Begin a new run. Returns its generation.
    pub(super) fn begin_run(&self) -> u64 {
        let generation = {
            let mut slot = self.lock_state();
            slot.generation += 1;
            slot.state = PipelineState::Opening;
            slot.generation
        };
        self.emit(PipelineEvent::StateChanged(PipelineState::Opening));
        generation
    }

    /// Move to `next` if `generation` is still the current run.
    ///
    /// A detached worker from an earlier run can no longer change state.
    pub(super) fn transition(&self, generation: u64, next: PipelineState) -> bool {
        {
            let mut slot = self.lock_state();
            if slot.generation != generation || slot.state == next {
                return false;
            }
            slot.state = next;
        }
        self.emit(PipelineEvent::StateChanged(next));
        true
    }

    /// Move from `from` to `to` for the current run only.
    pub(super) fn transition_from(&self, from: PipelineState, to: PipelineState) -> bool {
        {
            let mut slot = self.lock_state();
            if slot.state != from {
                return false;
            }
            slot.state = to;
        }
        self.emit(PipelineEvent::StateChanged(to));
        true
    }

    /// Abandon the current run: bump the generation and go Idle.
    pub(super) fn abandon_run(&self) {
        {
            let mut slot = self.lock_state();
            slot.generation += 1;
            if slot.state == PipelineState::Idle {
                return;
            }
            slot.state = PipelineState::Idle;
        }
        self.emit(PipelineEvent::StateChanged(PipelineState::Idle));
    }

    pub(super) fn emit(&self, event: PipelineEvent) {
        let sender = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A dropped receiver only means nobody listens for events.
        let _ = sender.send(event);
    }

    pub(super) fn frame_size(&self) -> Option<(u32, u32)> {
        match self.frame_size.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(super) fn set_frame_size(&self, size: (u32, u32)) {
        match self.frame_size.lock() {
            Ok(mut guard) => *guard = Some(size),
            Err(poisoned) => *poisoned.into_inner() = Some(size),
        }
    }

    pub(super) fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    pub(super) fn set_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StateSlot> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
