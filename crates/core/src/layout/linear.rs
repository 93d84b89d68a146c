use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::models::{LineData, RouteState, Step};
use crate::route::{active_bounds, dock_allows, next_valid, suppressed_at};

use super::{
    custom_range_color, segment_suspended, station_role, theme_color, SegmentTone, StationRole,
};

/// Viewport inputs for [`LinearLayout::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub viewport_width: f64,
    /// Stations shown before the map starts scrolling.
    pub visible_count: usize,
}

/// Placement strategy chosen for the station count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    /// Every station visible, evenly spread across the viewport.
    Dense,
    /// Fixed pitch, scrolled to keep the train centered.
    Scrolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Right,
    Left,
}

impl From<Step> for Orientation {
    fn from(step: Step) -> Self {
        match step {
            Step::Forward => Orientation::Right,
            Step::Backward => Orientation::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMark {
    pub idx: usize,
    /// Center, relative to the viewport's left edge.
    pub x: f64,
    pub role: StationRole,
    pub suppressed: bool,
    /// The platform does not serve the current direction.
    pub dock_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrowMark {
    pub x: f64,
    /// On the stretch the train is currently covering.
    pub current: bool,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMark {
    pub from: usize,
    pub to: usize,
    pub x_from: f64,
    pub x_to: f64,
    pub tone: SegmentTone,
    pub arrow: ArrowMark,
}

/// Draw instructions for a straight station map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearLayout {
    pub regime: Regime,
    pub station_width: f64,
    pub scroll_offset: f64,
    pub content_width: f64,
    /// Indices of the stations inside the viewport.
    pub window: Range<usize>,
    pub stations: Vec<StationMark>,
    pub segments: Vec<SegmentMark>,
    pub theme: Rgb,
}

impl LinearLayout {
    pub fn compute(line: &LineData, route: &RouteState, params: LinearParams) -> Self {
        let theme = theme_color(&line.meta);
        let viewport = params.viewport_width.max(0.0);
        let visible_count = params.visible_count.max(1);
        let station_width = viewport / visible_count as f64;
        let total = line.len();

        let Some(bounds) = active_bounds(line) else {
            return Self {
                regime: Regime::Dense,
                station_width,
                scroll_offset: 0.0,
                content_width: 0.0,
                window: 0..0,
                stations: Vec::new(),
                segments: Vec::new(),
                theme,
            };
        };

        let step = line.meta.dir_type.step();
        let current = bounds.clamp(route.idx);
        let next = next_valid(current, step, line);

        let regime = if total <= visible_count {
            Regime::Dense
        } else {
            Regime::Scrolling
        };

        let (content_x, content_width): (Box<dyn Fn(usize) -> f64>, f64) = match regime {
            Regime::Dense => {
                let first = station_width / 2.0;
                let last = viewport - station_width / 2.0;
                let span = if total > 1 {
                    (last - first) / (total - 1) as f64
                } else {
                    0.0
                };
                let single = total == 1;
                (
                    Box::new(move |idx| {
                        if single {
                            viewport / 2.0
                        } else {
                            first + span * idx as f64
                        }
                    }),
                    viewport,
                )
            }
            Regime::Scrolling => (
                Box::new(move |idx| idx as f64 * station_width + station_width / 2.0),
                total as f64 * station_width,
            ),
        };

        let (scroll_offset, window) = match regime {
            Regime::Dense => (0.0, 0..total),
            Regime::Scrolling => {
                let focus = if route.is_running() && next != current {
                    (content_x(current) + content_x(next)) / 2.0
                } else {
                    content_x(current)
                };
                let max_offset = (content_width - viewport).max(0.0);
                let offset = (focus - viewport / 2.0).clamp(0.0, max_offset);
                let first = (offset / station_width).floor() as usize;
                let last = (((offset + viewport) / station_width).ceil() as usize).min(total);
                (offset, first.min(last)..last)
            }
        };

        let x_of = |idx: usize| content_x(idx) - scroll_offset;

        let stations = window
            .clone()
            .map(|idx| StationMark {
                idx,
                x: x_of(idx),
                role: station_role(idx, current, next, step, line.meta.mode),
                suppressed: suppressed_at(line, idx),
                dock_blocked: line
                    .station(idx)
                    .map(|station| !dock_allows(station.dock, line.meta.dir_type))
                    .unwrap_or(false),
            })
            .collect::<Vec<_>>();

        let mut segments = Vec::new();
        if stations.len() >= 2 {
            let (travel_lo, travel_hi) = (current.min(next), current.max(next));
            for from in window.start.saturating_sub(1)..window.end {
                let to = from + 1;
                if to >= total {
                    break;
                }
                let tone = linear_tone(line, from, to, current, step, bounds.lo, bounds.hi);
                let (x_from, x_to) = (x_of(from), x_of(to));
                segments.push(SegmentMark {
                    from,
                    to,
                    x_from,
                    x_to,
                    tone,
                    arrow: ArrowMark {
                        x: (x_from + x_to) / 2.0,
                        current: current != next && travel_lo <= from && to <= travel_hi,
                        orientation: step.into(),
                    },
                });
            }
        }

        Self {
            regime,
            station_width,
            scroll_offset,
            content_width,
            window,
            stations,
            segments,
            theme,
        }
    }

    pub fn station(&self, idx: usize) -> Option<&StationMark> {
        self.stations.iter().find(|mark| mark.idx == idx)
    }
}

fn linear_tone(
    line: &LineData,
    from: usize,
    to: usize,
    current: usize,
    step: Step,
    lo: usize,
    hi: usize,
) -> SegmentTone {
    if segment_suspended(line, from, to) {
        return SegmentTone::Suspended;
    }
    if from < lo || to > hi {
        return SegmentTone::OutOfRange;
    }
    if let Some(color) = custom_range_color(line, from, to) {
        return SegmentTone::Custom(color);
    }
    let upcoming = match step {
        Step::Forward => from >= current,
        Step::Backward => to <= current,
    };
    if upcoming {
        SegmentTone::Highlight
    } else {
        SegmentTone::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColorRange, DirType, LineMeta, RunState, Station};

    fn line(count: usize) -> LineData {
        LineData {
            meta: LineMeta::default(),
            stations: (0..count)
                .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
                .collect(),
        }
    }

    fn params() -> LinearParams {
        LinearParams {
            viewport_width: 1000.0,
            visible_count: 10,
        }
    }

    #[test]
    fn dense_regime_spreads_stations_evenly() {
        let layout = LinearLayout::compute(&line(5), &RouteState::default(), params());
        assert_eq!(layout.regime, Regime::Dense);
        let xs: Vec<f64> = layout.stations.iter().map(|mark| mark.x).collect();
        assert_eq!(xs, vec![50.0, 275.0, 500.0, 725.0, 950.0]);
    }

    #[test]
    fn single_station_is_centered_without_track() {
        let layout = LinearLayout::compute(&line(1), &RouteState::default(), params());
        assert_eq!(layout.stations[0].x, 500.0);
        assert!(layout.segments.is_empty());
    }

    #[test]
    fn scrolling_regime_centers_current_station() {
        let route = RouteState::new(15, RunState::Arriving);
        let layout = LinearLayout::compute(&line(30), &route, params());
        assert_eq!(layout.regime, Regime::Scrolling);
        assert_eq!(layout.scroll_offset, 1050.0);
        assert_eq!(layout.window, 10..21);
        assert_eq!(layout.station(15).unwrap().x, 500.0);
    }

    #[test]
    fn scrolling_clamps_at_line_ends() {
        let layout = LinearLayout::compute(&line(30), &RouteState::new(1, RunState::Running), params());
        assert_eq!(layout.scroll_offset, 0.0);
        assert_eq!(layout.window, 0..10);
        let layout = LinearLayout::compute(&line(30), &RouteState::new(29, RunState::Arriving), params());
        assert_eq!(layout.scroll_offset, 2000.0);
        assert_eq!(layout.window, 20..30);
    }

    #[test]
    fn segment_priority_order() {
        let mut line = line(8);
        line.stations[6].skip = true;
        line.meta.start_idx = 1;
        line.meta.term_idx = 7;
        line.meta.custom_color_ranges.push(ColorRange {
            start_idx: 3,
            end_idx: 4,
            color: "#ff0000".to_string(),
        });
        let layout = LinearLayout::compute(&line, &RouteState::new(2, RunState::Arriving), params());
        let tones: Vec<SegmentTone> = layout.segments.iter().map(|seg| seg.tone).collect();
        assert_eq!(
            tones,
            vec![
                SegmentTone::OutOfRange,
                SegmentTone::Idle,
                SegmentTone::Highlight,
                SegmentTone::Custom(Rgb::new(0xff, 0, 0)),
                SegmentTone::Highlight,
                SegmentTone::Suspended,
                SegmentTone::Suspended,
            ]
        );
    }

    #[test]
    fn down_direction_highlights_towards_lower_indices() {
        let mut line = line(5);
        line.meta.dir_type = DirType::Down;
        let layout = LinearLayout::compute(&line, &RouteState::new(2, RunState::Running), params());
        let tones: Vec<SegmentTone> = layout.segments.iter().map(|seg| seg.tone).collect();
        assert_eq!(
            tones,
            vec![
                SegmentTone::Highlight,
                SegmentTone::Highlight,
                SegmentTone::Idle,
                SegmentTone::Idle,
            ]
        );
        let current: Vec<usize> = layout
            .segments
            .iter()
            .filter(|seg| seg.arrow.current)
            .map(|seg| seg.from)
            .collect();
        assert_eq!(current, vec![1]);
        assert!(layout
            .segments
            .iter()
            .all(|seg| seg.arrow.orientation == Orientation::Left));
    }

    #[test]
    fn current_arrows_span_skipped_stations() {
        let mut line = line(5);
        line.stations[2].skip = true;
        let layout = LinearLayout::compute(&line, &RouteState::new(1, RunState::Running), params());
        let current: Vec<usize> = layout
            .segments
            .iter()
            .filter(|seg| seg.arrow.current)
            .map(|seg| seg.from)
            .collect();
        assert_eq!(current, vec![1, 2]);
        assert_eq!(layout.station(3).unwrap().role, StationRole::Next);
        assert_eq!(layout.station(0).unwrap().role, StationRole::Passed);
    }

    #[test]
    fn empty_line_produces_nothing() {
        let layout = LinearLayout::compute(&LineData::default(), &RouteState::default(), params());
        assert!(layout.stations.is_empty());
        assert!(layout.segments.is_empty());
    }
}
