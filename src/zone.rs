//! Horizontal zone classification.
//!
//! The frame is split into vertical bands. The canonical deployment uses
//! three (left / center / right); any positive number of equal divisions is
//! supported.
//!
//! Classification is a pure function of the current boundaries. Recomputing
//! boundaries is a separate, explicit step (`ZoneLayout::update_width`)
//! triggered when the observed frame width changes.

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::detect::BBox;

/// Number of zones in the canonical layout.
pub const DEFAULT_DIVISIONS: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Left,
    /// Also the fallback when no positional information is available.
    #[default]
    Center,
    Right,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Left, Zone::Center, Zone::Right];

    /// Display color used for the zone band and for boxes of objects in the zone.
    pub fn color(self) -> Rgb<u8> {
        match self {
            Zone::Left => Rgb([200, 70, 70]),
            Zone::Center => Rgb([70, 200, 70]),
            Zone::Right => Rgb([70, 70, 200]),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zone::Left => "left",
            Zone::Center => "center",
            Zone::Right => "right",
        }
    }

    /// Zone label for division `index` out of `divisions`.
    ///
    /// The first division is Left and the last is Right; everything in
    /// between is Center. A single division is Center.
    pub fn for_division(index: usize, divisions: usize) -> Zone {
        if divisions <= 1 {
            Zone::Center
        } else if index == 0 {
            Zone::Left
        } else if index + 1 >= divisions {
            Zone::Right
        } else {
            Zone::Center
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizontal center of a bounding box, floored.
pub fn center_x_of(bbox: BBox) -> i32 {
    let [x1, _, x2, _] = bbox;
    (x1 + x2).div_euclid(2)
}

/// Three-way split derived from a frame width.
///
/// Invariant: `0 <= left_boundary <= right_boundary <= frame_width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneBoundary {
    pub frame_width: u32,
    pub left_boundary: u32,
    pub right_boundary: u32,
}

impl ZoneBoundary {
    pub fn new(frame_width: u32) -> Self {
        let width = frame_width as u64;
        Self {
            frame_width,
            left_boundary: (width / 3) as u32,
            right_boundary: (2 * width / 3) as u32,
        }
    }

    /// Zone of an object whose horizontal center is `center_x`.
    pub fn zone_of_center(&self, center_x: i32) -> Zone {
        let x = center_x as i64;
        if x < self.left_boundary as i64 {
            Zone::Left
        } else if x > self.right_boundary as i64 {
            Zone::Right
        } else {
            Zone::Center
        }
    }

    pub fn zone_of_bbox(&self, bbox: BBox) -> Zone {
        self.zone_of_center(center_x_of(bbox))
    }
}

/// Classify from whatever positional information is available.
///
/// An explicit center wins over a bbox. With neither, the object is placed in
/// the Center zone.
pub fn zone_of(bbox: Option<BBox>, center_x: Option<i32>, boundary: &ZoneBoundary) -> Zone {
    match (center_x, bbox) {
        (Some(x), _) => boundary.zone_of_center(x),
        (None, Some(bbox)) => boundary.zone_of_bbox(bbox),
        (None, None) => Zone::Center,
    }
}

/// Zone layout for the active session.
///
/// Holds the cached frame width and the boundaries derived from it. The
/// boundaries are replaced as a whole whenever the width changes.
#[derive(Clone, Debug)]
pub struct ZoneLayout {
    divisions: usize,
    boundary: ZoneBoundary,
}

impl ZoneLayout {
    pub fn new(frame_width: u32, divisions: usize) -> Result<Self> {
        if divisions == 0 {
            return Err(anyhow!("zone divisions must be >= 1"));
        }
        Ok(Self {
            divisions,
            boundary: ZoneBoundary::new(frame_width),
        })
    }

    pub fn divisions(&self) -> usize {
        self.divisions
    }

    pub fn frame_width(&self) -> u32 {
        self.boundary.frame_width
    }

    pub fn boundary(&self) -> ZoneBoundary {
        self.boundary
    }

    /// Recompute boundaries if `frame_width` differs from the cached width.
    ///
    /// Returns true when the layout changed.
    pub fn update_width(&mut self, frame_width: u32) -> bool {
        if frame_width == self.boundary.frame_width {
            return false;
        }
        log::debug!(
            "ZoneLayout: frame width changed {} -> {}",
            self.boundary.frame_width,
            frame_width
        );
        self.boundary = ZoneBoundary::new(frame_width);
        true
    }

    /// Contiguous pixel ranges `[i*W/N, (i+1)*W/N)` covering `[0, W)`.
    pub fn division_ranges(&self) -> Vec<Range<u32>> {
        let width = self.boundary.frame_width as u64;
        let n = self.divisions as u64;
        (0..n)
            .map(|i| ((i * width / n) as u32)..(((i + 1) * width / n) as u32))
            .collect()
    }

    /// Positions between divisions, excluding 0 and the frame width.
    pub fn divider_positions(&self) -> Vec<u32> {
        if self.divisions == DEFAULT_DIVISIONS {
            return vec![self.boundary.left_boundary, self.boundary.right_boundary];
        }
        self.division_ranges()
            .iter()
            .skip(1)
            .map(|range| range.start)
            .collect()
    }

    /// Index of the division containing `center_x`.
    ///
    /// Positions outside the frame clamp to the first or last division.
    pub fn division_of(&self, center_x: i32) -> usize {
        let width = self.boundary.frame_width as i64;
        if width == 0 || center_x < 0 {
            return 0;
        }
        let x = (center_x as i64).min(width - 1);
        let n = self.divisions as i64;
        // Largest i with i*W/N <= x.
        let mut index = ((x * n) / width) as usize;
        while index + 1 < self.divisions && ((index as i64 + 1) * width / n) <= x {
            index += 1;
        }
        while index > 0 && (index as i64 * width / n) > x {
            index -= 1;
        }
        index
    }

    /// Zone of a bounding box under this layout.
    ///
    /// The three-way layout uses the left/right boundary rule; other layouts
    /// map the containing division through `Zone::for_division`.
    pub fn classify(&self, bbox: BBox) -> Zone {
        let center_x = center_x_of(bbox);
        if self.divisions == DEFAULT_DIVISIONS {
            return self.boundary.zone_of_center(center_x);
        }
        Zone::for_division(self.division_of(center_x), self.divisions)
    }

    /// Zone label for each division, left to right.
    pub fn zones(&self) -> Vec<Zone> {
        (0..self.divisions)
            .map(|i| Zone::for_division(i, self.divisions))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_900_splits_at_300_and_600() {
        let boundary = ZoneBoundary::new(900);
        assert_eq!(boundary.left_boundary, 300);
        assert_eq!(boundary.right_boundary, 600);

        assert_eq!(boundary.zone_of_center(150), Zone::Left);
        assert_eq!(boundary.zone_of_center(450), Zone::Center);
        assert_eq!(boundary.zone_of_center(800), Zone::Right);
    }

    #[test]
    fn boundaries_hold_invariant_for_all_widths() {
        for width in 0..2_000u32 {
            let b = ZoneBoundary::new(width);
            assert!(b.left_boundary <= b.right_boundary);
            assert!(b.right_boundary <= width);
        }
        let b = ZoneBoundary::new(u32::MAX);
        assert!(b.left_boundary <= b.right_boundary);
    }

    #[test]
    fn edges_belong_to_center() {
        let boundary = ZoneBoundary::new(900);
        assert_eq!(boundary.zone_of_center(299), Zone::Left);
        assert_eq!(boundary.zone_of_center(300), Zone::Center);
        assert_eq!(boundary.zone_of_center(600), Zone::Center);
        assert_eq!(boundary.zone_of_center(601), Zone::Right);
    }

    #[test]
    fn bbox_center_is_floored() {
        assert_eq!(center_x_of([0, 0, 5, 10]), 2);
        assert_eq!(center_x_of([-5, 0, 0, 10]), -3);
        let boundary = ZoneBoundary::new(900);
        assert_eq!(boundary.zone_of_bbox([100, 0, 200, 50]), Zone::Left);
        assert_eq!(boundary.zone_of_bbox([700, 0, 890, 50]), Zone::Right);
    }

    #[test]
    fn missing_position_defaults_to_center() {
        let boundary = ZoneBoundary::new(900);
        assert_eq!(zone_of(None, None, &boundary), Zone::Center);
        assert_eq!(zone_of(Some([0, 0, 10, 10]), Some(850), &boundary), Zone::Right);
        assert_eq!(zone_of(Some([0, 0, 10, 10]), None, &boundary), Zone::Left);
    }

    #[test]
    fn classification_is_repeatable() {
        let layout = ZoneLayout::new(640, 3).unwrap();
        let bbox = [200, 10, 260, 80];
        let first = layout.classify(bbox);
        assert_eq!(layout.classify(bbox), first);
    }

    #[test]
    fn update_width_replaces_boundaries_only_on_change() {
        let mut layout = ZoneLayout::new(640, 3).unwrap();
        assert!(!layout.update_width(640));
        assert!(layout.update_width(900));
        assert_eq!(layout.boundary(), ZoneBoundary::new(900));
    }

    #[test]
    fn n_way_divisions_partition_the_width() {
        for divisions in 1..8 {
            let layout = ZoneLayout::new(1001, divisions).unwrap();
            let ranges = layout.division_ranges();
            assert_eq!(ranges.len(), divisions);
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges[divisions - 1].end, 1001);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            for x in 0..1001 {
                let index = layout.division_of(x);
                assert!(ranges[index].contains(&(x as u32)));
            }
        }
    }

    #[test]
    fn n_way_out_of_frame_positions_clamp() {
        let layout = ZoneLayout::new(500, 5).unwrap();
        assert_eq!(layout.division_of(-40), 0);
        assert_eq!(layout.division_of(10_000), 4);
        assert_eq!(layout.classify([480, 0, 500, 20]), Zone::Right);
        assert_eq!(layout.classify([220, 0, 260, 20]), Zone::Center);
    }

    #[test]
    fn zero_divisions_rejected() {
        assert!(ZoneLayout::new(640, 0).is_err());
    }
}
