//! Automatic short turns around suspended terminals.

use tracing::debug;

use crate::models::LineData;

/// Outcome of [`resolve_short_turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortTurnChange {
    Unchanged,
    /// A derived short turn was set or moved.
    Applied { start: usize, term: usize },
    /// A previously derived short turn was removed.
    Cleared,
}

/// Derive or clear the automatic short turn of `line`.
///
/// When the first or last physical station is suspended the route is cut
/// back to the outermost non-suspended stations and marked `autoShortTurn`.
/// When neither end is suspended any derived short turn is cleared. A manual
/// short turn is never touched, and a line where every station is suspended
/// is left as is.
pub fn resolve_short_turn(line: &mut LineData) -> ShortTurnChange {
    let len = line.stations.len();
    if len == 0 || line.meta.has_manual_short_turn() {
        return ShortTurnChange::Unchanged;
    }

    let first_skipped = line.stations[0].skip;
    let last_skipped = line.stations[len - 1].skip;

    if !first_skipped && !last_skipped {
        if line.meta.auto_short_turn {
            line.meta.clear_short_turn();
            debug!("cleared automatic short turn");
            return ShortTurnChange::Cleared;
        }
        return ShortTurnChange::Unchanged;
    }

    let Some(start) = line.stations.iter().position(|station| !station.skip) else {
        return ShortTurnChange::Unchanged;
    };
    let Some(term) = line.stations.iter().rposition(|station| !station.skip) else {
        return ShortTurnChange::Unchanged;
    };
    if start == 0 && term == len - 1 {
        return ShortTurnChange::Unchanged;
    }

    let meta = &mut line.meta;
    if meta.auto_short_turn && meta.start_idx == start as i64 && meta.term_idx == term as i64 {
        return ShortTurnChange::Unchanged;
    }

    meta.start_idx = start as i64;
    meta.term_idx = term as i64;
    meta.auto_short_turn = true;
    debug!(start, term, "applied automatic short turn");
    ShortTurnChange::Applied { start, term }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineMeta, Station};

    fn five() -> LineData {
        LineData {
            meta: LineMeta::default(),
            stations: ["A", "B", "C", "D", "E"]
                .iter()
                .map(|name| Station::new(*name, *name))
                .collect(),
        }
    }

    #[test]
    fn suspended_first_station_derives_short_turn_and_clears_again() {
        let mut line = five();
        line.stations[0].skip = true;
        assert_eq!(
            resolve_short_turn(&mut line),
            ShortTurnChange::Applied { start: 1, term: 4 }
        );
        assert_eq!(line.meta.start_idx, 1);
        assert_eq!(line.meta.term_idx, 4);
        assert!(line.meta.auto_short_turn);

        line.stations[0].skip = false;
        assert_eq!(resolve_short_turn(&mut line), ShortTurnChange::Cleared);
        assert_eq!(line.meta.start_idx, -1);
        assert_eq!(line.meta.term_idx, -1);
        assert!(!line.meta.auto_short_turn);
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let mut line = five();
        line.stations[4].skip = true;
        line.stations[3].skip = true;
        resolve_short_turn(&mut line);
        let first = line.clone();
        assert_eq!(resolve_short_turn(&mut line), ShortTurnChange::Unchanged);
        assert_eq!(line, first);
        assert_eq!((line.meta.start_idx, line.meta.term_idx), (0, 2));
    }

    #[test]
    fn manual_short_turn_is_preserved() {
        let mut line = five();
        line.meta.start_idx = 2;
        line.meta.term_idx = 3;
        line.stations[0].skip = true;
        assert_eq!(resolve_short_turn(&mut line), ShortTurnChange::Unchanged);
        assert_eq!((line.meta.start_idx, line.meta.term_idx), (2, 3));
        assert!(!line.meta.auto_short_turn);
    }

    #[test]
    fn lone_bound_does_not_block_derivation() {
        let mut line = five();
        line.meta.start_idx = 2;
        line.stations[0].skip = true;
        line.normalize();
        assert_eq!(
            resolve_short_turn(&mut line),
            ShortTurnChange::Applied { start: 1, term: 4 }
        );
        assert!(line.meta.auto_short_turn);
    }

    #[test]
    fn derived_short_turn_follows_new_suspensions() {
        let mut line = five();
        line.stations[0].skip = true;
        resolve_short_turn(&mut line);
        line.stations[1].skip = true;
        assert_eq!(
            resolve_short_turn(&mut line),
            ShortTurnChange::Applied { start: 2, term: 4 }
        );
    }

    #[test]
    fn fully_suspended_line_is_left_alone() {
        let mut line = five();
        for station in &mut line.stations {
            station.skip = true;
        }
        assert_eq!(resolve_short_turn(&mut line), ShortTurnChange::Unchanged);
        assert!(!line.meta.has_short_turn());
    }
}
