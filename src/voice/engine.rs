use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::locale::Language;

const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Renders one utterance to completion, or until `cancel` is raised.
pub trait SpeechEngine: Send {
    fn name(&self) -> &str;

    fn say(&mut self, text: &str, cancel: &AtomicBool) -> Result<()>;
}

/// Writes utterances to the log.
#[derive(Debug, Default)]
pub struct LogEngine;

impl SpeechEngine for LogEngine {
    fn name(&self) -> &str {
        "log"
    }

    fn say(&mut self, text: &str, _cancel: &AtomicBool) -> Result<()> {
        log::info!("SpeechQueue: \"{}\"", text);
        Ok(())
    }
}

/// Runs an external synthesizer (`espeak-ng` style CLI) per utterance.
///
/// Invoked as `<program> -v <lang> -s <rate> -a <amplitude> <text>`, where
/// amplitude is `volume * 200`. The process is killed on interrupt.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    language: Language,
    rate: u32,
    volume: f32,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, language: Language, rate: u32, volume: f32) -> Self {
        Self {
            program: program.into(),
            language,
            rate,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-v".to_string(),
            self.language.code().to_string(),
            "-s".to_string(),
            self.rate.to_string(),
            "-a".to_string(),
            ((self.volume * 200.0).round() as u32).to_string(),
            text.to_string(),
        ]
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn say(&mut self, text: &str, cancel: &AtomicBool) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        loop {
            if let Some(status) = child.try_wait().context("wait for synthesizer")? {
                if status.success() {
                    return Ok(());
                }
                return Err(anyhow!("{} exited with {}", self.program, status));
            }
            if cancel.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
            std::thread::sleep(CANCEL_POLL);
        }
    }
}
