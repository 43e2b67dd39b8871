use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::engine::SpeechEngine;
use super::manager::SpeechRequest;

const STOP_TIMEOUT: Duration = Duration::from_secs(1);
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Destination for speech requests.
pub trait SpeechSink {
    fn speak(&self, text: &str);

    /// Drop pending speech, interrupt the current utterance, then speak `text`.
    fn speak_now(&self, text: &str);

    fn submit(&self, request: &SpeechRequest) {
        if request.urgent {
            self.speak_now(&request.text);
        } else {
            self.speak(&request.text);
        }
    }
}

struct QueueState {
    pending: VecDeque<String>,
    speaking: bool,
    running: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    wake: Condvar,
    interrupt: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// FIFO of utterances spoken one at a time by a dedicated worker thread.
pub struct SpeechQueue {
    inner: Arc<Inner>,
    join: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    pub fn spawn(engine: Box<dyn SpeechEngine>) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                speaking: false,
                running: true,
            }),
            wake: Condvar::new(),
            interrupt: AtomicBool::new(false),
        });
        let worker_inner = inner.clone();
        let join = std::thread::Builder::new()
            .name("speech".to_string())
            .spawn(move || run(worker_inner, engine));
        let join = match join {
            Ok(join) => Some(join),
            Err(err) => {
                log::error!("SpeechQueue: failed to spawn worker: {}; speech disabled", err);
                None
            }
        };
        Self { inner, join }
    }

    pub fn clear(&self) {
        self.inner.lock().pending.clear();
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// True while an utterance is playing or queued.
    pub fn is_speaking(&self) -> bool {
        let state = self.inner.lock();
        state.speaking || !state.pending.is_empty()
    }

    /// Stop the worker, dropping pending speech. Waits at most one second.
    pub fn stop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.running = false;
            state.pending.clear();
        }
        self.inner.interrupt.store(true, Ordering::SeqCst);
        self.inner.wake.notify_all();

        let Some(join) = self.join.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !join.is_finished() && Instant::now() < deadline {
            std::thread::sleep(JOIN_POLL);
        }
        if join.is_finished() {
            if join.join().is_err() {
                log::error!("SpeechQueue: worker panicked");
            }
        } else {
            log::error!("SpeechQueue: worker did not stop within {:?}; detaching it", STOP_TIMEOUT);
        }
    }
}

impl SpeechSink for SpeechQueue {
    fn speak(&self, text: &str) {
        let mut state = self.inner.lock();
        if !state.running {
            return;
        }
        state.pending.push_back(text.to_string());
        self.inner.wake.notify_one();
    }

    fn speak_now(&self, text: &str) {
        let mut state = self.inner.lock();
        if !state.running {
            return;
        }
        state.pending.clear();
        state.pending.push_back(text.to_string());
        if state.speaking {
            self.inner.interrupt.store(true, Ordering::SeqCst);
        }
        self.inner.wake.notify_one();
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(inner: Arc<Inner>, mut engine: Box<dyn SpeechEngine>) {
    log::info!("SpeechQueue: worker started ({})", engine.name());
    loop {
        let text = {
            let mut state = inner.lock();
            loop {
                if !state.running {
                    return;
                }
                if let Some(text) = state.pending.pop_front() {
                    state.speaking = true;
                    // An interrupt aimed at the previous utterance is spent.
                    inner.interrupt.store(false, Ordering::SeqCst);
                    break text;
                }
                state = match inner.wake.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        };

        if let Err(err) = engine.say(&text, &inner.interrupt) {
            log::warn!("SpeechQueue: {} failed: {:#}", engine.name(), err);
        }
        inner.lock().speaking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    struct Recording {
        spoken: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl SpeechEngine for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn say(&mut self, text: &str, cancel: &AtomicBool) -> Result<()> {
            let deadline = Instant::now() + self.delay;
            while Instant::now() < deadline {
                if cancel.load(Ordering::SeqCst) {
                    self.spoken.lock().unwrap().push(format!("{} (cut)", text));
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn wait_idle(queue: &SpeechQueue) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while queue.is_speaking() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn utterances_are_spoken_in_order() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut queue = SpeechQueue::spawn(Box::new(Recording {
            spoken: spoken.clone(),
            delay: Duration::from_millis(5),
        }));
        for text in ["one", "two", "three"] {
            queue.speak(text);
        }
        wait_idle(&queue);
        assert_eq!(*spoken.lock().unwrap(), vec!["one", "two", "three"]);
        queue.stop();
    }

    #[test]
    fn speak_now_interrupts_and_clears() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut queue = SpeechQueue::spawn(Box::new(Recording {
            spoken: spoken.clone(),
            delay: Duration::from_millis(400),
        }));
        queue.speak("long");
        queue.speak("queued");
        let deadline = Instant::now() + Duration::from_secs(2);
        while queue.pending() > 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        queue.speak_now("urgent");
        wait_idle(&queue);
        assert_eq!(*spoken.lock().unwrap(), vec!["long (cut)", "urgent"]);
        queue.stop();
    }

    #[test]
    fn stopped_queue_ignores_requests() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut queue = SpeechQueue::spawn(Box::new(Recording {
            spoken: spoken.clone(),
            delay: Duration::from_millis(1),
        }));
        queue.stop();
        queue.speak("late");
        assert_eq!(queue.pending(), 0);
        assert!(spoken.lock().unwrap().is_empty());
    }
}
