//! Track layout and text-fitting decisions.
//!
//! Engines here are pure: they turn a line, a route position and viewport
//! parameters into coordinates and colors. Nothing is cached between renders.

/// Arrival-screen neighbour selection.
pub mod arrival;
/// Straight-line station map.
pub mod linear;
/// Marquee (scrolling text) decisions.
pub mod marquee;
/// Display class and visible-station-count lookup.
pub mod profile;
/// Rounded-rectangle map for loop lines.
pub mod ring;

use serde::{Deserialize, Serialize};

use crate::color::{parse_color, Rgb};
use crate::models::{LineData, LineMeta, LineMode, Step};
use crate::route::suppressed_at;

pub use arrival::{select_arrival_window, ArrivalWindow};
pub use linear::{LinearLayout, LinearParams, Regime};
pub use marquee::{Marquee, MarqueeConfig};
pub use profile::{DisplayClass, DisplayProfile, DriftWarning, ProfileMonitor};
pub use ring::{RingGeometry, RingLayout, RingParams};

/// Theme color used when the line's own color token is invalid.
pub const DEFAULT_THEME: Rgb = Rgb::new(0x00, 0x62, 0x9b);

/// Why a segment has the color it has, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentTone {
    /// An endpoint is not served.
    Suspended,
    /// Outside the active short turn.
    OutOfRange,
    /// Inside an explicit color range.
    Custom(Rgb),
    /// Upcoming part of the route.
    Highlight,
    /// Already traveled or otherwise inactive.
    Idle,
}

impl SegmentTone {
    pub fn color(self, theme: Rgb) -> Rgb {
        match self {
            SegmentTone::Custom(color) => color,
            SegmentTone::Highlight => theme,
            SegmentTone::Suspended | SegmentTone::OutOfRange | SegmentTone::Idle => Rgb::INACTIVE,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, SegmentTone::Custom(_) | SegmentTone::Highlight)
    }
}

/// Role of a station relative to the train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationRole {
    Passed,
    Current,
    Next,
    Upcoming,
}

/// Parsed theme color of `meta`.
pub fn theme_color(meta: &LineMeta) -> Rgb {
    parse_color(&meta.theme_color).unwrap_or(DEFAULT_THEME)
}

/// Inclusive range membership where `start > end` wraps past the seam.
pub fn in_wrapped_range(idx: usize, start: usize, end: usize) -> bool {
    if start <= end {
        (start..=end).contains(&idx)
    } else {
        idx >= start || idx <= end
    }
}

/// Whether the segment `a -> b` (adjacent stations) lies inside `[start, end]`.
/// Loops honour wraparound; linear ranges are order-insensitive.
pub fn range_covers_segment(start: usize, end: usize, a: usize, b: usize, mode: LineMode) -> bool {
    match mode {
        LineMode::Linear => {
            let (lo, hi) = (start.min(end), start.max(end));
            let (from, to) = (a.min(b), a.max(b));
            lo <= from && to <= hi
        }
        LineMode::Loop => {
            in_wrapped_range(a, start, end) && in_wrapped_range(b, start, end) && a != end
        }
    }
}

/// Color of the first valid custom range covering `a -> b`.
pub fn custom_range_color(line: &LineData, a: usize, b: usize) -> Option<Rgb> {
    let len = line.len() as i64;
    line.meta.custom_color_ranges.iter().find_map(|range| {
        if !(0..len).contains(&range.start_idx) || !(0..len).contains(&range.end_idx) {
            return None;
        }
        let covered = range_covers_segment(
            range.start_idx as usize,
            range.end_idx as usize,
            a,
            b,
            line.meta.mode,
        );
        if covered {
            parse_color(&range.color)
        } else {
            None
        }
    })
}

/// Either endpoint of `a -> b` is suppressed by the service filter.
pub(crate) fn segment_suspended(line: &LineData, a: usize, b: usize) -> bool {
    suppressed_at(line, a) || suppressed_at(line, b)
}

/// Role of `idx` given the train's current and next stop.
pub(crate) fn station_role(
    idx: usize,
    current: usize,
    next: usize,
    step: Step,
    mode: LineMode,
) -> StationRole {
    if idx == current {
        return StationRole::Current;
    }
    if idx == next {
        return StationRole::Next;
    }
    if mode == LineMode::Loop {
        return StationRole::Upcoming;
    }
    let behind = match step {
        Step::Forward => idx < current,
        Step::Backward => idx > current,
    };
    if behind {
        StationRole::Passed
    } else {
        StationRole::Upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_range_membership() {
        assert!(in_wrapped_range(17, 15, 3));
        assert!(in_wrapped_range(0, 15, 3));
        assert!(!in_wrapped_range(10, 15, 3));
        assert!(in_wrapped_range(4, 2, 6));
        assert!(!in_wrapped_range(7, 2, 6));
    }

    #[test]
    fn seam_segment_only_inside_wrapping_range() {
        assert!(range_covers_segment(15, 3, 17, 0, LineMode::Loop));
        assert!(!range_covers_segment(15, 3, 3, 4, LineMode::Loop));
        assert!(!range_covers_segment(0, 17, 17, 0, LineMode::Loop));
        assert!(range_covers_segment(5, 2, 3, 4, LineMode::Linear));
        assert!(!range_covers_segment(5, 2, 5, 6, LineMode::Linear));
    }

    #[test]
    fn tone_colors() {
        let theme = Rgb::new(1, 2, 3);
        assert_eq!(SegmentTone::Highlight.color(theme), theme);
        assert_eq!(SegmentTone::Suspended.color(theme), Rgb::INACTIVE);
        assert!(!SegmentTone::OutOfRange.is_active());
    }
}
