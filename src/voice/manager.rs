use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::detect::TrackedObject;
use crate::locale::Language;
use crate::zone::Zone;

/// Default minimum interval between repeats of the same announcement.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Text handed to the speech sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    /// Clear pending speech and interrupt the current utterance.
    pub urgent: bool,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            urgent: false,
        }
    }
}

type AnnouncementKey = (String, Zone);

/// Turns per-frame detections into announcements with cooldown and dedup.
///
/// Each `(class, zone)` pair is announced at most once per cooldown window.
/// An object-free frame announces "no objects" at most once per window and
/// clears the per-object record so returning objects are announced afresh.
#[derive(Debug)]
pub struct NotificationManager {
    cooldown: Duration,
    enabled: bool,
    announce_zone: bool,
    language: Language,
    last_spoken_at: HashMap<AnnouncementKey, Instant>,
    no_detection_last_at: Option<Instant>,
}

impl NotificationManager {
    pub fn new(cooldown: Duration, language: Language) -> Self {
        Self {
            cooldown,
            enabled: true,
            announce_zone: true,
            language,
            last_spoken_at: HashMap::new(),
            no_detection_last_at: None,
        }
    }

    pub fn with_announce_zone(mut self, announce_zone: bool) -> Self {
        self.announce_zone = announce_zone;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// While disabled no requests are produced and the record is left alone.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_announce_zone(&mut self, announce_zone: bool) {
        self.announce_zone = announce_zone;
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn on_frame(&mut self, objects: &[TrackedObject]) -> Vec<SpeechRequest> {
        self.on_frame_at(objects, Instant::now())
    }

    pub fn on_frame_at(&mut self, objects: &[TrackedObject], now: Instant) -> Vec<SpeechRequest> {
        if !self.enabled {
            return Vec::new();
        }
        if objects.is_empty() {
            return self.no_detection_at(now).into_iter().collect();
        }

        let groups = group_by_key(objects);
        let mut requests = Vec::new();
        for (key, count) in &groups {
            let due = match self.last_spoken_at.get(key) {
                Some(last) => self.elapsed(*last, now),
                None => true,
            };
            if !due {
                continue;
            }
            requests.push(SpeechRequest::new(self.phrase(&key.0, key.1, *count)));
            self.last_spoken_at.insert(key.clone(), now);
        }

        self.last_spoken_at
            .retain(|key, _| groups.iter().any(|(seen, _)| seen == key));
        requests
    }

    /// Forget everything, including the last "no objects" announcement.
    pub fn reset(&mut self) {
        self.last_spoken_at.clear();
        self.no_detection_last_at = None;
    }

    /// Number of `(class, zone)` pairs currently under cooldown tracking.
    pub fn tracked_keys(&self) -> usize {
        self.last_spoken_at.len()
    }

    fn no_detection_at(&mut self, now: Instant) -> Option<SpeechRequest> {
        if let Some(last) = self.no_detection_last_at {
            if !self.elapsed(last, now) {
                return None;
            }
        }
        self.no_detection_last_at = Some(now);
        self.last_spoken_at.clear();
        Some(SpeechRequest::new(self.language.no_objects()))
    }

    fn elapsed(&self, last: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last) >= self.cooldown
    }

    fn phrase(&self, class_name: &str, zone: Zone, count: usize) -> String {
        let mut text = if count > 1 {
            format!("{} {}", count, class_name)
        } else {
            class_name.to_string()
        };
        if self.announce_zone {
            text.push_str(&self.language.zone_suffix(zone));
        }
        text
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, Language::default())
    }
}

/// `(class, zone)` groups with counts, in order of first appearance.
fn group_by_key(objects: &[TrackedObject]) -> Vec<(AnnouncementKey, usize)> {
    let mut groups: Vec<(AnnouncementKey, usize)> = Vec::new();
    for object in objects {
        match groups
            .iter_mut()
            .find(|((class, zone), _)| *class == object.class_name && *zone == object.zone)
        {
            Some((_, count)) => *count += 1,
            None => groups.push(((object.class_name.clone(), object.zone), 1)),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(class: &str, zone: Zone) -> TrackedObject {
        TrackedObject {
            id: 1,
            bbox: [0, 0, 10, 10],
            center: (5, 5),
            confidence: 0.9,
            class_name: class.to_string(),
            class_id: 0,
            zone,
        }
    }

    fn texts(requests: &[SpeechRequest]) -> Vec<&str> {
        requests.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn cooldown_blocks_repeats_until_elapsed() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        let frame = [object("person", Zone::Left)];

        assert_eq!(texts(&manager.on_frame_at(&frame, t0)), vec!["person à gauche"]);
        assert!(manager.on_frame_at(&frame, t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(
            texts(&manager.on_frame_at(&frame, t0 + Duration::from_millis(5100))),
            vec!["person à gauche"]
        );
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        let frame = [object("chair", Zone::Right)];
        manager.on_frame_at(&frame, t0);
        assert!(manager
            .on_frame_at(&frame, t0 + Duration::from_millis(4999))
            .is_empty());
        assert_eq!(manager.on_frame_at(&frame, t0 + Duration::from_secs(5)).len(), 1);
    }

    #[test]
    fn groups_are_counted_per_class_and_zone() {
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        let frame = [
            object("person", Zone::Left),
            object("chair", Zone::Center),
            object("person", Zone::Left),
        ];
        assert_eq!(
            texts(&manager.on_frame(&frame)),
            vec!["2 person à gauche", "chair à milieu"]
        );
        assert_eq!(manager.tracked_keys(), 2);
    }

    #[test]
    fn empty_frame_announces_once_and_clears_objects() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        let frame = [object("person", Zone::Left)];
        manager.on_frame_at(&frame, t0);

        let requests = manager.on_frame_at(&[], t0 + Duration::from_secs(1));
        assert_eq!(texts(&requests), vec!["Aucun objet détecté"]);
        assert_eq!(manager.tracked_keys(), 0);
        assert!(manager.on_frame_at(&[], t0 + Duration::from_secs(2)).is_empty());

        // Fresh start: the object is announced again despite its own cooldown.
        assert_eq!(manager.on_frame_at(&frame, t0 + Duration::from_secs(2)).len(), 1);
    }

    #[test]
    fn no_detection_cooldown_survives_object_frames() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::En);
        assert_eq!(manager.on_frame_at(&[], t0).len(), 1);
        manager.on_frame_at(&[object("dog", Zone::Right)], t0 + Duration::from_secs(1));
        assert!(manager.on_frame_at(&[], t0 + Duration::from_secs(2)).is_empty());
        assert_eq!(
            texts(&manager.on_frame_at(&[], t0 + Duration::from_secs(5))),
            vec!["No objects detected"]
        );
    }

    #[test]
    fn absent_keys_are_forgotten() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        manager.on_frame_at(&[object("person", Zone::Left)], t0);
        manager.on_frame_at(&[object("person", Zone::Right)], t0 + Duration::from_secs(1));
        assert_eq!(manager.tracked_keys(), 1);
        // Back on the left within the window: announced because the key was dropped.
        let requests =
            manager.on_frame_at(&[object("person", Zone::Left)], t0 + Duration::from_secs(2));
        assert_eq!(texts(&requests), vec!["person à gauche"]);
    }

    #[test]
    fn disabled_manager_is_silent_and_keeps_state() {
        let t0 = Instant::now();
        let mut manager = NotificationManager::new(Duration::from_secs(5), Language::Fr);
        manager.on_frame_at(&[object("person", Zone::Left)], t0);
        manager.set_enabled(false);
        assert!(manager.on_frame_at(&[], t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(manager.tracked_keys(), 1);
    }

    #[test]
    fn zone_suffix_is_optional() {
        let mut manager =
            NotificationManager::new(Duration::from_secs(5), Language::En).with_announce_zone(false);
        assert_eq!(
            texts(&manager.on_frame(&[object("car", Zone::Center)])),
            vec!["car"]
        );
    }
}
