//! Persistence IDs across frames.
//!
//! Greedy IoU association: each detection is matched to the live track of the
//! same class it overlaps most (above `iou_threshold`). Unmatched detections
//! start new tracks; tracks unmatched for more than `max_age` frames are
//! dropped. A re-acquired object after expiry gets a new ID.

use crate::detect::result::{iou, BBox, Detection};

#[derive(Clone, Copy, Debug)]
pub struct TrackerConfig {
    pub iou_threshold: f32,
    /// Consecutive missed frames before a track is removed.
    pub max_age: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 30,
        }
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: u64,
    bbox: BBox,
    class_id: u32,
    missed: u32,
}

#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Assign track IDs to this frame's detections, preserving their order.
    pub fn update(&mut self, mut detections: Vec<Detection>) -> Vec<Detection> {
        let mut pairs = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if det.class_id != track.class_id {
                    continue;
                }
                let overlap = iou(track.bbox, det.bbox);
                if overlap >= self.config.iou_threshold {
                    pairs.push((overlap, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_used = vec![false; self.tracks.len()];
        let mut det_track: Vec<Option<usize>> = vec![None; detections.len()];
        for (_, ti, di) in pairs {
            if track_used[ti] || det_track[di].is_some() {
                continue;
            }
            track_used[ti] = true;
            det_track[di] = Some(ti);
        }

        for (ti, used) in track_used.iter().enumerate() {
            if !used {
                self.tracks[ti].missed += 1;
            }
        }

        for (di, det) in detections.iter_mut().enumerate() {
            let id = match det_track[di] {
                Some(ti) => {
                    let track = &mut self.tracks[ti];
                    track.bbox = det.bbox;
                    track.missed = 0;
                    track.id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bbox: det.bbox,
                        class_id: det.class_id,
                        missed: 0,
                    });
                    id
                }
            };
            det.track_id = Some(id);
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|track| track.missed <= max_age);
        detections
    }

    /// Forget all tracks. IDs keep increasing.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    pub fn active_tracks(&self) -> Vec<u64> {
        self.tracks.iter().map(|track| track.id).collect()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: BBox, class_id: u32) -> Detection {
        Detection::new(bbox, 0.9, class_id, "obj")
    }

    #[test]
    fn overlapping_boxes_keep_their_id() {
        let mut tracker = Tracker::default();
        let first = tracker.update(vec![det([0, 0, 100, 100], 0), det([300, 0, 400, 100], 0)]);
        let second = tracker.update(vec![det([310, 5, 410, 105], 0), det([5, 0, 105, 100], 0)]);
        assert_eq!(second[0].track_id, first[1].track_id);
        assert_eq!(second[1].track_id, first[0].track_id);
    }

    #[test]
    fn class_change_starts_new_track() {
        let mut tracker = Tracker::default();
        let first = tracker.update(vec![det([0, 0, 100, 100], 0)]);
        let second = tracker.update(vec![det([0, 0, 100, 100], 56)]);
        assert_ne!(first[0].track_id, second[0].track_id);
    }

    #[test]
    fn expired_tracks_are_dropped() {
        let mut tracker = Tracker::new(TrackerConfig {
            iou_threshold: 0.3,
            max_age: 2,
        });
        let first = tracker.update(vec![det([0, 0, 100, 100], 0)]);
        for _ in 0..3 {
            tracker.update(Vec::new());
        }
        assert!(tracker.active_tracks().is_empty());
        let again = tracker.update(vec![det([0, 0, 100, 100], 0)]);
        assert_ne!(again[0].track_id, first[0].track_id);
    }

    #[test]
    fn short_gaps_are_bridged() {
        let mut tracker = Tracker::default();
        let first = tracker.update(vec![det([0, 0, 100, 100], 0)]);
        tracker.update(Vec::new());
        let again = tracker.update(vec![det([2, 2, 102, 102], 0)]);
        assert_eq!(again[0].track_id, first[0].track_id);
    }
}
