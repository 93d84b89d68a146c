//! Next-stop search honoring service pattern, dock side and short turns.

use crate::models::{DirType, Dock, LineData, LineMode, Step};

use super::service::suppressed_at;

/// Inclusive index range the train may occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub lo: usize,
    pub hi: usize,
}

impl Bounds {
    pub fn contains(&self, idx: usize) -> bool {
        (self.lo..=self.hi).contains(&idx)
    }

    pub fn clamp(&self, idx: usize) -> usize {
        idx.clamp(self.lo, self.hi)
    }

    /// Bound reached when travelling with `step`.
    pub fn end_towards(&self, step: Step) -> usize {
        match step {
            Step::Forward => self.hi,
            Step::Backward => self.lo,
        }
    }
}

/// Short-turn range `(min, max)` when both bounds are valid indices.
pub fn short_turn_range(line: &LineData) -> Option<(usize, usize)> {
    let len = line.len();
    let start = usize::try_from(line.meta.start_idx).ok().filter(|idx| *idx < len)?;
    let term = usize::try_from(line.meta.term_idx).ok().filter(|idx| *idx < len)?;
    Some((start.min(term), start.max(term)))
}

/// Active bounds of `line`; `None` for an empty line. Loops always span the
/// whole line because navigation wraps.
pub fn active_bounds(line: &LineData) -> Option<Bounds> {
    if line.is_empty() {
        return None;
    }
    let full = Bounds {
        lo: 0,
        hi: line.len() - 1,
    };
    if line.meta.mode == LineMode::Loop {
        return Some(full);
    }
    Some(
        short_turn_range(line)
            .map(|(lo, hi)| Bounds { lo, hi })
            .unwrap_or(full),
    )
}

/// Whether a platform with `dock` can be boarded by a train running `dir`.
pub fn dock_allows(dock: Dock, dir: DirType) -> bool {
    match dock {
        Dock::Both => true,
        Dock::Up => matches!(dir, DirType::Up | DirType::Outer),
        Dock::Down => matches!(dir, DirType::Down | DirType::Inner),
    }
}

/// Dock-compatible and not suppressed by the service pattern.
pub fn is_boardable(line: &LineData, idx: usize) -> bool {
    let Some(station) = line.station(idx) else {
        return false;
    };
    dock_allows(station.dock, line.meta.dir_type) && !suppressed_at(line, idx)
}

/// Index of the next boardable station from `idx` moving by `step`.
///
/// Linear lines stop at the active bounds: reaching one returns the bound
/// itself, so `next_valid(idx, ..) == idx` signals the terminus. Loops wrap and
/// return `idx` if no other station qualifies. The search is bounded by the
/// line length and never returns an index outside the active bounds.
pub fn next_valid(idx: usize, step: Step, line: &LineData) -> usize {
    let Some(bounds) = active_bounds(line) else {
        return 0;
    };
    let len = line.len() as i64;
    let origin = bounds.clamp(idx);
    let delta = step.delta();
    let mut cursor = origin as i64;

    for _ in 0..len {
        let candidate = match line.meta.mode {
            LineMode::Linear => {
                cursor += delta;
                if cursor < bounds.lo as i64 {
                    return bounds.lo;
                }
                if cursor > bounds.hi as i64 {
                    return bounds.hi;
                }
                cursor as usize
            }
            LineMode::Loop => {
                cursor = (cursor + delta).rem_euclid(len);
                let candidate = cursor as usize;
                if candidate == origin {
                    return origin;
                }
                candidate
            }
        };

        if is_boardable(line, candidate) {
            return candidate;
        }
    }

    origin
}

/// Terminus in the direction of travel. Loops have none.
pub fn terminus(line: &LineData) -> Option<usize> {
    if line.meta.mode == LineMode::Loop {
        return None;
    }
    active_bounds(line).map(|bounds| bounds.end_towards(line.meta.dir_type.step()))
}

/// Whether a train at `idx` cannot advance any further.
pub fn is_at_terminus(line: &LineData, idx: usize) -> bool {
    if line.meta.mode != LineMode::Linear {
        return false;
    }
    let Some(bounds) = active_bounds(line) else {
        return false;
    };
    let origin = bounds.clamp(idx);
    next_valid(origin, line.meta.dir_type.step(), line) == origin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineMeta, ServiceMode, Station};

    fn line_of(names: &[&str]) -> LineData {
        LineData {
            meta: LineMeta::default(),
            stations: names.iter().map(|name| Station::new(*name, *name)).collect(),
        }
    }

    #[test]
    fn skips_suspended_station() {
        let mut line = line_of(&["A", "B", "C", "D"]);
        line.stations[1].skip = true;
        assert_eq!(next_valid(0, Step::Forward, &line), 2);
    }

    #[test]
    fn express_skips_non_express_but_keeps_endpoints() {
        let mut line = line_of(&["A", "B", "C", "D"]);
        line.meta.service_mode = ServiceMode::Express;
        line.stations[1].express_stop = Some(false);
        line.stations[2].express_stop = Some(true);
        assert_eq!(next_valid(0, Step::Forward, &line), 2);
        assert_eq!(next_valid(2, Step::Forward, &line), 3);
        assert_eq!(next_valid(3, Step::Backward, &line), 2);
        assert_eq!(next_valid(2, Step::Backward, &line), 0);
    }

    #[test]
    fn dock_restriction_rejects_wrong_direction() {
        let mut line = line_of(&["A", "B", "C"]);
        line.stations[1].dock = Dock::Down;
        assert_eq!(next_valid(0, Step::Forward, &line), 2);
        line.meta.dir_type = DirType::Down;
        assert_eq!(next_valid(2, Step::Backward, &line), 1);
    }

    #[test]
    fn terminal_returns_itself() {
        let line = line_of(&["A", "B", "C"]);
        assert_eq!(next_valid(2, Step::Forward, &line), 2);
        assert_eq!(next_valid(0, Step::Backward, &line), 0);
        assert!(is_at_terminus(&line, 2));
        assert!(!is_at_terminus(&line, 1));
    }

    #[test]
    fn short_turn_clamps_search() {
        let mut line = line_of(&["A", "B", "C", "D", "E"]);
        line.meta.start_idx = 3;
        line.meta.term_idx = 1;
        assert_eq!(active_bounds(&line), Some(Bounds { lo: 1, hi: 3 }));
        assert_eq!(next_valid(3, Step::Forward, &line), 3);
        assert_eq!(next_valid(0, Step::Forward, &line), 2);
        assert_eq!(terminus(&line), Some(3));
    }

    #[test]
    fn single_short_turn_bound_is_ignored() {
        let mut line = line_of(&["A", "B", "C"]);
        line.meta.start_idx = 1;
        assert_eq!(active_bounds(&line), Some(Bounds { lo: 0, hi: 2 }));
    }

    #[test]
    fn loop_wraps_around_the_seam() {
        let mut line = line_of(&["A", "B", "C", "D"]);
        line.meta.mode = LineMode::Loop;
        line.meta.dir_type = DirType::Outer;
        assert_eq!(next_valid(3, Step::Forward, &line), 0);
        assert_eq!(next_valid(0, Step::Backward, &line), 3);
        assert_eq!(terminus(&line), None);
    }

    #[test]
    fn unsatisfiable_loop_returns_origin() {
        let mut line = line_of(&["A", "B", "C"]);
        line.meta.mode = LineMode::Loop;
        line.meta.dir_type = DirType::Outer;
        for station in &mut line.stations {
            station.skip = true;
        }
        assert_eq!(next_valid(1, Step::Forward, &line), 1);
    }

    #[test]
    fn stays_in_bounds_for_every_start() {
        let mut line = line_of(&["A", "B", "C", "D", "E", "F"]);
        line.stations[2].skip = true;
        line.stations[4].dock = Dock::Down;
        line.meta.start_idx = 1;
        line.meta.term_idx = 4;
        for mode in [LineMode::Linear, LineMode::Loop] {
            line.meta.mode = mode;
            let bounds = active_bounds(&line).unwrap();
            for idx in 0..10 {
                for step in [Step::Forward, Step::Backward] {
                    let next = next_valid(idx, step, &line);
                    assert!(bounds.contains(next), "{mode:?} {idx} {step:?} -> {next}");
                }
            }
        }
    }

    #[test]
    fn empty_line_is_harmless() {
        let line = line_of(&[]);
        assert_eq!(next_valid(5, Step::Forward, &line), 0);
        assert_eq!(active_bounds(&line), None);
        assert!(!is_at_terminus(&line, 0));
    }
}
