use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::{ModelBackendKind, ModelSpec};
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::SyntheticBackend;
use crate::detect::provider::{DetectionProvider, ProviderFactory, TrackingProvider};
use crate::detect::tracker::TrackerConfig;
use crate::error::NavError;

/// A named model slot. Unavailable slots stay listed with the reason.
#[derive(Clone)]
pub enum ModelSlot {
    Loaded(Arc<Mutex<dyn DetectorBackend>>),
    Unavailable(String),
}

/// Thread-safe registry of named detection models.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes
/// `&mut self`. The registry is shared between the controller, which switches
/// models, and the capture worker, which builds a provider per run.
pub struct ModelRegistry {
    slots: BTreeMap<String, ModelSlot>,
    active: Mutex<Option<String>>,
    tracker: TrackerConfig,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            active: Mutex::new(None),
            tracker: TrackerConfig::default(),
        }
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    /// Register a loaded backend under `name`. The first loaded model becomes active.
    pub fn register<B: DetectorBackend + 'static>(&mut self, name: &str, backend: B) {
        self.slots
            .insert(name.to_string(), ModelSlot::Loaded(Arc::new(Mutex::new(backend))));
        if let Ok(mut active) = self.active.lock() {
            if active.is_none() {
                *active = Some(name.to_string());
            }
        }
    }

    /// Record a model that could not be loaded.
    pub fn register_unavailable(&mut self, name: &str, reason: impl Into<String>) {
        self.slots
            .insert(name.to_string(), ModelSlot::Unavailable(reason.into()));
    }

    /// Build the registry from configured model specs.
    ///
    /// Load failures never abort: the slot is kept as unavailable and logged.
    pub fn from_specs(specs: &[ModelSpec], default_model: &str) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            match load_backend(spec) {
                Ok(LoadedBackend::Synthetic(backend)) => registry.register(&spec.name, backend),
                #[cfg(feature = "backend-tract")]
                Ok(LoadedBackend::Tract(backend)) => registry.register(&spec.name, *backend),
                Err(err) => {
                    log::warn!("ModelRegistry: {} not available ({})", spec.name, err);
                    registry.register_unavailable(&spec.name, err.to_string());
                    continue;
                }
            }
            log::info!("ModelRegistry: {} loaded", spec.name);
        }
        if let Err(err) = registry.switch_model(default_model) {
            log::warn!("ModelRegistry: default model: {}", err);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        match self.slots.get(name) {
            Some(ModelSlot::Loaded(backend)) => Some(backend.clone()),
            _ => None,
        }
    }

    pub fn is_model_loaded(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(ModelSlot::Loaded(_)))
    }

    /// Names of models that can be switched to.
    pub fn available_models(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, ModelSlot::Loaded(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All slots with their availability (`None` when loaded, else the reason).
    pub fn list(&self) -> Vec<(String, Option<String>)> {
        self.slots
            .iter()
            .map(|(name, slot)| {
                let reason = match slot {
                    ModelSlot::Loaded(_) => None,
                    ModelSlot::Unavailable(reason) => Some(reason.clone()),
                };
                (name.clone(), reason)
            })
            .collect()
    }

    pub fn active_model(&self) -> Option<String> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    /// Make `name` the active model. Fails for unknown or unavailable slots.
    pub fn switch_model(&self, name: &str) -> Result<()> {
        self.check(name)?;
        let mut active = self
            .active
            .lock()
            .map_err(|_| anyhow!("model registry lock poisoned"))?;
        *active = Some(name.to_string());
        log::info!("ModelRegistry: switched to {}", name);
        Ok(())
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for ModelRegistry {
    fn create(&self, model: &str) -> Box<dyn DetectionProvider> {
        Box::new(TrackingProvider::new(self.get(model), self.tracker))
    }

    fn check(&self, model: &str) -> Result<()> {
        match self.slots.get(model) {
            Some(ModelSlot::Loaded(_)) => Ok(()),
            Some(ModelSlot::Unavailable(reason)) => Err(NavError::ModelUnavailable {
                name: model.to_string(),
                reason: reason.clone(),
            }
            .into()),
            None => Err(NavError::ModelUnavailable {
                name: model.to_string(),
                reason: "not configured".to_string(),
            }
            .into()),
        }
    }
}

enum LoadedBackend {
    Synthetic(SyntheticBackend),
    #[cfg(feature = "backend-tract")]
    Tract(Box<crate::detect::backends::TractBackend>),
}

fn load_backend(spec: &ModelSpec) -> Result<LoadedBackend> {
    match spec.backend {
        ModelBackendKind::Synthetic => Ok(LoadedBackend::Synthetic(SyntheticBackend::new())),
        ModelBackendKind::Onnx => load_onnx(spec),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(spec: &ModelSpec) -> Result<LoadedBackend> {
    use crate::detect::backends::TractBackend;

    let path = spec
        .path
        .as_ref()
        .ok_or_else(|| anyhow!("no model path configured"))?;
    if !path.exists() {
        return Err(anyhow!("{} not found", path.display()));
    }
    let mut backend = TractBackend::new(path, spec.input_size, spec.labels.as_deref())?;
    backend.warm_up()?;
    Ok(LoadedBackend::Tract(Box::new(backend)))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(_spec: &ModelSpec) -> Result<LoadedBackend> {
    Err(anyhow!(
        "ONNX models require the backend-tract feature (cargo build --features backend-tract)"
    ))
}
