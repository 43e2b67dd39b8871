//! Voice feedback.
//!
//! `NotificationManager` decides what to say for each frame; `SpeechQueue`
//! says it, one utterance at a time, on its own thread.

mod engine;
mod manager;
mod queue;

pub use engine::{CommandEngine, LogEngine, SpeechEngine};
pub use manager::{NotificationManager, SpeechRequest, DEFAULT_COOLDOWN};
pub use queue::{SpeechQueue, SpeechSink};

use crate::config::{VoiceEngineKind, VoiceSettings};

/// Build the configured speech engine.
pub fn engine_from_settings(settings: &VoiceSettings) -> Box<dyn SpeechEngine> {
    match settings.engine {
        VoiceEngineKind::Log => Box::new(LogEngine),
        VoiceEngineKind::Command => Box::new(CommandEngine::new(
            settings.command.clone(),
            settings.language,
            settings.rate,
            settings.volume,
        )),
    }
}

/// Build the notification manager from settings.
pub fn manager_from_settings(settings: &VoiceSettings) -> NotificationManager {
    let mut manager = NotificationManager::new(settings.cooldown, settings.language)
        .with_announce_zone(settings.announce_zone);
    manager.set_enabled(settings.enabled);
    manager
}
