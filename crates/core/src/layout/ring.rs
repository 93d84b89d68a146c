//! Loop lines drawn on a rounded-rectangle track.
//!
//! Stations sit at distances along the track perimeter. The first
//! `ceil(n/2)` stations run left to right along the top side, the rest right to
//! left along the bottom side. The path starts at the top-left end of the top
//! side and continues clockwise (in screen coordinates, y down).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::models::{LineData, LineMode, RouteState, Step};
use crate::route::{active_bounds, dock_allows, next_valid, suppressed_at};

use super::{
    custom_range_color, range_covers_segment, segment_suspended, station_role, theme_color,
    SegmentTone, StationRole,
};

/// Half-width of the finite-difference probe used for tangents.
const TANGENT_PROBE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingParams {
    /// Lower bound for the straight-side length.
    pub min_total_width: f64,
    /// Lower bound for the spacing of top-arc stations.
    pub min_station_spacing: f64,
    /// Radius of the two end caps.
    pub radius: f64,
    /// Left end of the top straight side.
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for RingParams {
    fn default() -> Self {
        Self {
            min_total_width: 600.0,
            min_station_spacing: 64.0,
            radius: 80.0,
            origin_x: 120.0,
            origin_y: 40.0,
        }
    }
}

/// The track shape and its perimeter parametrisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingGeometry {
    pub origin: (f64, f64),
    pub straight: f64,
    pub radius: f64,
}

impl RingGeometry {
    pub fn perimeter(&self) -> f64 {
        2.0 * self.straight + 2.0 * PI * self.radius
    }

    /// Overall `(width, height)` of the track including the caps.
    pub fn extent(&self) -> (f64, f64) {
        (self.straight + 2.0 * self.radius, 2.0 * self.radius)
    }

    /// Point at `distance` along the path, wrapping around the perimeter.
    pub fn point_at(&self, distance: f64) -> (f64, f64) {
        let perimeter = self.perimeter();
        if perimeter <= 0.0 || !distance.is_finite() {
            return self.origin;
        }
        let (ox, oy) = self.origin;
        let (straight, r) = (self.straight, self.radius);
        let cap = PI * r;
        let d = distance.rem_euclid(perimeter);

        if d < straight {
            return (ox + d, oy);
        }
        let d = d - straight;
        if d < cap {
            let theta = if r > 0.0 { d / r } else { 0.0 };
            let (cx, cy) = (ox + straight, oy + r);
            return (cx + r * theta.sin(), cy - r * theta.cos());
        }
        let d = d - cap;
        if d < straight {
            return (ox + straight - d, oy + 2.0 * r);
        }
        let d = d - straight;
        let theta = if r > 0.0 { d / r } else { 0.0 };
        let (cx, cy) = (ox, oy + r);
        (cx - r * theta.sin(), cy + r * theta.cos())
    }

    /// Direction of travel at `distance` in degrees, `[0, 360)`, 0 pointing right
    /// and 90 pointing down.
    pub fn tangent_degrees(&self, distance: f64) -> f64 {
        let (x1, y1) = self.point_at(distance - TANGENT_PROBE);
        let (x2, y2) = self.point_at(distance + TANGENT_PROBE);
        (y2 - y1).atan2(x2 - x1).to_degrees().rem_euclid(360.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingStation {
    pub idx: usize,
    pub distance: f64,
    pub point: (f64, f64),
    pub on_top: bool,
    pub role: StationRole,
    pub suppressed: bool,
    pub dock_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingArrow {
    pub distance: f64,
    pub point: (f64, f64),
    pub angle_degrees: f64,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingSegment {
    pub from: usize,
    pub to: usize,
    pub from_distance: f64,
    /// May exceed the perimeter for the seam segment.
    pub to_distance: f64,
    pub tone: SegmentTone,
    pub arrow: RingArrow,
}

/// Draw instructions for a loop line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingLayout {
    pub geometry: RingGeometry,
    pub top_count: usize,
    pub bottom_count: usize,
    pub top_step: f64,
    pub bottom_step: f64,
    pub stations: Vec<RingStation>,
    pub segments: Vec<RingSegment>,
    pub theme: Rgb,
}

impl RingLayout {
    pub fn compute(line: &LineData, route: &RouteState, params: RingParams) -> Self {
        let total = line.len();
        let top_count = total.div_ceil(2);
        let bottom_count = total - top_count;
        let straight = params
            .min_total_width
            .max(top_count as f64 * params.min_station_spacing);
        let geometry = RingGeometry {
            origin: (params.origin_x, params.origin_y),
            straight,
            radius: params.radius.max(0.0),
        };
        let top_step = if top_count > 0 {
            straight / top_count as f64
        } else {
            0.0
        };
        let bottom_step = if bottom_count > 0 {
            straight / bottom_count as f64
        } else {
            0.0
        };
        let theme = theme_color(&line.meta);

        let mut layout = Self {
            geometry,
            top_count,
            bottom_count,
            top_step,
            bottom_step,
            stations: Vec::new(),
            segments: Vec::new(),
            theme,
        };

        let Some(bounds) = active_bounds(line) else {
            return layout;
        };
        let step = line.meta.dir_type.step();
        let current = bounds.clamp(route.idx);
        let next = next_valid(current, step, line);

        layout.stations = (0..total)
            .map(|idx| {
                let distance = layout.distance_of(idx);
                RingStation {
                    idx,
                    distance,
                    point: geometry.point_at(distance),
                    on_top: idx < top_count,
                    role: station_role(idx, current, next, step, LineMode::Loop),
                    suppressed: suppressed_at(line, idx),
                    dock_blocked: line
                        .station(idx)
                        .map(|station| !dock_allows(station.dock, line.meta.dir_type))
                        .unwrap_or(false),
                }
            })
            .collect();

        if total < 2 {
            return layout;
        }

        let crossed = crossed_segments(current, next, step, total);
        let range = wrapped_short_turn(line);
        let perimeter = geometry.perimeter();

        layout.segments = (0..total)
            .map(|from| {
                let to = (from + 1) % total;
                let tone = if segment_suspended(line, from, to) {
                    SegmentTone::Suspended
                } else if range
                    .map(|(start, end)| !range_covers_segment(start, end, from, to, LineMode::Loop))
                    .unwrap_or(false)
                {
                    SegmentTone::OutOfRange
                } else if let Some(color) = custom_range_color(line, from, to) {
                    SegmentTone::Custom(color)
                } else {
                    SegmentTone::Highlight
                };

                let from_distance = layout.distance_of(from);
                let mut to_distance = layout.distance_of(to);
                if to_distance < from_distance {
                    to_distance += perimeter;
                }
                let mid = (from_distance + to_distance) / 2.0;
                let reverse = if step == Step::Backward { 180.0 } else { 0.0 };

                RingSegment {
                    from,
                    to,
                    from_distance,
                    to_distance,
                    tone,
                    arrow: RingArrow {
                        distance: mid.rem_euclid(perimeter),
                        point: geometry.point_at(mid),
                        angle_degrees: (geometry.tangent_degrees(mid) + reverse).rem_euclid(360.0),
                        current: crossed.contains(&from),
                    },
                }
            })
            .collect();

        layout
    }

    /// Perimeter distance of station `idx`.
    pub fn distance_of(&self, idx: usize) -> f64 {
        if idx < self.top_count {
            idx as f64 * self.top_step + self.top_step / 2.0
        } else {
            let j = (idx - self.top_count) as f64;
            self.geometry.straight
                + PI * self.geometry.radius
                + j * self.bottom_step
                + self.bottom_step / 2.0
        }
    }

    pub fn station(&self, idx: usize) -> Option<&RingStation> {
        self.stations.get(idx)
    }
}

/// Short turn in its configured order, so `start > term` wraps past the seam.
fn wrapped_short_turn(line: &LineData) -> Option<(usize, usize)> {
    let len = line.len();
    let start = usize::try_from(line.meta.start_idx).ok().filter(|idx| *idx < len)?;
    let term = usize::try_from(line.meta.term_idx).ok().filter(|idx| *idx < len)?;
    Some((start, term))
}

/// Segment indices (by their `from` station) between `current` and `next`.
fn crossed_segments(current: usize, next: usize, step: Step, total: usize) -> Vec<usize> {
    let mut crossed = Vec::new();
    let mut cursor = current;
    for _ in 0..total {
        if cursor == next {
            break;
        }
        match step {
            Step::Forward => {
                crossed.push(cursor);
                cursor = (cursor + 1) % total;
            }
            Step::Backward => {
                cursor = (cursor + total - 1) % total;
                crossed.push(cursor);
            }
        }
    }
    crossed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DirType, LineMeta, RunState, Station};

    fn ring(count: usize) -> LineData {
        LineData {
            meta: LineMeta {
                mode: LineMode::Loop,
                dir_type: DirType::Outer,
                ..LineMeta::default()
            },
            stations: (0..count)
                .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
                .collect(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn splits_stations_between_arcs() {
        let layout = RingLayout::compute(&ring(7), &RouteState::default(), RingParams::default());
        assert_eq!((layout.top_count, layout.bottom_count), (4, 3));
        assert!(layout.station(3).unwrap().on_top);
        assert!(!layout.station(4).unwrap().on_top);
    }

    #[test]
    fn places_station_on_top_arc_by_half_step() {
        let params = RingParams::default();
        let layout = RingLayout::compute(&ring(18), &RouteState::new(2, RunState::Arriving), params);
        assert_eq!(layout.top_count, 9);
        assert!(close(layout.geometry.straight, 9.0 * 64.0_f64.max(600.0 / 9.0)));
        let expected = layout.top_step * 2.0 + layout.top_step / 2.0;
        let station = layout.station(2).unwrap();
        assert!(close(station.distance, expected));
        assert!(close(station.point.0, params.origin_x + expected));
        assert!(close(station.point.1, params.origin_y));
        assert_eq!(station.role, StationRole::Current);
        assert_eq!(layout.station(3).unwrap().role, StationRole::Next);
    }

    #[test]
    fn straight_side_respects_minimum_width() {
        let layout = RingLayout::compute(&ring(4), &RouteState::default(), RingParams::default());
        assert!(close(layout.geometry.straight, 600.0));
        assert!(close(layout.top_step, 300.0));
    }

    #[test]
    fn seam_segment_highlighted_when_range_wraps() {
        let mut line = ring(18);
        line.meta.start_idx = 15;
        line.meta.term_idx = 3;
        let layout = RingLayout::compute(&line, &RouteState::new(1, RunState::Arriving), RingParams::default());
        let seam = &layout.segments[17];
        assert_eq!((seam.from, seam.to), (17, 0));
        assert_eq!(seam.tone, SegmentTone::Highlight);
        assert!(seam.to_distance > seam.from_distance);
        assert_eq!(layout.segments[10].tone, SegmentTone::OutOfRange);
        assert_eq!(layout.segments[3].tone, SegmentTone::OutOfRange);
        assert_eq!(layout.segments[2].tone, SegmentTone::Highlight);
    }

    #[test]
    fn seam_segment_excluded_when_range_does_not_wrap() {
        let mut line = ring(18);
        line.meta.start_idx = 2;
        line.meta.term_idx = 9;
        let layout = RingLayout::compute(&line, &RouteState::new(4, RunState::Arriving), RingParams::default());
        assert_eq!(layout.segments[17].tone, SegmentTone::OutOfRange);
        assert_eq!(layout.segments[5].tone, SegmentTone::Highlight);
    }

    #[test]
    fn tangent_follows_the_track() {
        let geometry = RingGeometry {
            origin: (0.0, 0.0),
            straight: 400.0,
            radius: 50.0,
        };
        let cap = PI * 50.0;
        assert!(close(geometry.tangent_degrees(100.0), 0.0));
        assert!((geometry.tangent_degrees(400.0 + cap / 2.0) - 90.0).abs() < 0.5);
        assert!(close(geometry.tangent_degrees(400.0 + cap + 100.0), 180.0));
        assert!((geometry.tangent_degrees(800.0 + cap * 1.5) - 270.0).abs() < 0.5);
        assert!(close(geometry.point_at(geometry.perimeter() + 10.0).0, 10.0));
    }

    #[test]
    fn inner_direction_reverses_arrows_and_current_segments() {
        let mut line = ring(6);
        line.meta.dir_type = DirType::Inner;
        let layout = RingLayout::compute(&line, &RouteState::new(0, RunState::Running), RingParams::default());
        let current: Vec<usize> = layout
            .segments
            .iter()
            .filter(|seg| seg.arrow.current)
            .map(|seg| seg.from)
            .collect();
        assert_eq!(current, vec![5]);
        assert!(close(layout.segments[0].arrow.angle_degrees, 180.0));
    }

    #[test]
    fn single_station_has_no_track() {
        let layout = RingLayout::compute(&ring(1), &RouteState::default(), RingParams::default());
        assert_eq!(layout.stations.len(), 1);
        assert!(layout.segments.is_empty());
    }
}
