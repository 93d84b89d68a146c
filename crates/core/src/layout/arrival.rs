use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{LineData, LineMode, RouteState, Step};
use crate::route::{active_bounds, Bounds};

/// Upper bound on stations collected ahead of the train before extension.
pub const MAX_FUTURE: usize = 5;
/// Past stations kept even when the target is small.
pub const MIN_PAST: usize = 2;

/// Stations shown on the arrival screen around the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalWindow {
    /// Behind the train, nearest first.
    pub past: Vec<usize>,
    pub current: usize,
    /// Ahead of the train, nearest first.
    pub future: Vec<usize>,
}

impl ArrivalWindow {
    /// Travel order: oldest past station first, farthest future station last.
    pub fn ordered(&self) -> Vec<usize> {
        self.past
            .iter()
            .rev()
            .copied()
            .chain(std::iter::once(self.current))
            .chain(self.future.iter().copied())
            .collect()
    }

    pub fn station_count(&self) -> usize {
        self.past.len() + 1 + self.future.len()
    }
}

/// Picks about `target` stations around the train.
///
/// Up to [`MAX_FUTURE`] stations are taken ahead inside the active range, then
/// enough behind to fill the target (at least [`MIN_PAST`]). A short window is
/// extended backward, then forward; an oversized one loses future stations
/// first and then past ones down to the floor.
pub fn select_arrival_window(
    line: &LineData,
    route: &RouteState,
    target: usize,
) -> Option<ArrivalWindow> {
    let bounds = active_bounds(line)?;
    let step = line.meta.dir_type.step();
    let current = bounds.clamp(route.idx);
    let mut taken = HashSet::from([current]);

    let mut future = collect(line, bounds, current, step, MAX_FUTURE, &mut taken);
    let past_target = MIN_PAST.max(target.saturating_sub(1 + future.len()));
    let mut past = collect(line, bounds, current, step.reverse(), past_target, &mut taken);

    let total = |past: &Vec<usize>, future: &Vec<usize>| past.len() + 1 + future.len();

    if total(&past, &future) < target {
        let from = past.last().copied().unwrap_or(current);
        let want = target - total(&past, &future);
        past.extend(collect(line, bounds, from, step.reverse(), want, &mut taken));
    }
    if total(&past, &future) < target {
        let from = future.last().copied().unwrap_or(current);
        let want = target - total(&past, &future);
        future.extend(collect(line, bounds, from, step, want, &mut taken));
    }

    while total(&past, &future) > target && !future.is_empty() {
        future.pop();
    }
    while total(&past, &future) > target && past.len() > MIN_PAST {
        past.pop();
    }

    Some(ArrivalWindow {
        past,
        current,
        future,
    })
}

/// Walks from `from` in `step` direction, returning up to `want` stations not
/// yet in `taken`. Linear lines stop at the active bounds; loops wrap.
fn collect(
    line: &LineData,
    bounds: Bounds,
    from: usize,
    step: Step,
    want: usize,
    taken: &mut HashSet<usize>,
) -> Vec<usize> {
    let len = line.len() as i64;
    let mut out = Vec::new();
    let mut cursor = from as i64;
    for _ in 0..line.len() {
        if out.len() >= want {
            break;
        }
        cursor += step.delta();
        let idx = match line.meta.mode {
            LineMode::Linear => {
                if cursor < bounds.lo as i64 || cursor > bounds.hi as i64 {
                    break;
                }
                cursor as usize
            }
            LineMode::Loop => cursor.rem_euclid(len) as usize,
        };
        if taken.insert(idx) {
            out.push(idx);
        }
    }
    out
}
