//! Route/service state machine.

/// Controller-side ownership of the route state.
pub mod controller;
/// Derived banner facts.
pub mod facts;
/// Next-stop search.
pub mod navigator;
/// Service-pattern filter.
pub mod service;
/// Automatic short turns.
pub mod short_turn;

pub use controller::{ControlAction, Controller};
pub use facts::DisplayFacts;
pub use navigator::{
    active_bounds, dock_allows, is_at_terminus, is_boardable, next_valid, short_turn_range,
    terminus, Bounds,
};
pub use service::{is_suppressed, suppressed_at};
pub use short_turn::{resolve_short_turn, ShortTurnChange};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dock, LineData, LineMeta, ServiceMode, Station, Step};

    /// Navigation must never stop at a station the displays gray out.
    #[test]
    fn navigation_agrees_with_graying() {
        let mut stations: Vec<Station> = (0..9)
            .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
            .collect();
        stations[2].skip = true;
        stations[3].express_stop = Some(true);
        stations[5].express_stop = Some(true);
        stations[6].skip = true;
        stations[6].express_stop = Some(true);
        let mut line = LineData {
            meta: LineMeta::default(),
            stations,
        };

        for mode in [ServiceMode::Normal, ServiceMode::Express, ServiceMode::Direct] {
            line.meta.service_mode = mode;
            for idx in 0..line.len() {
                for step in [Step::Forward, Step::Backward] {
                    let next = next_valid(idx, step, &line);
                    let bounds = active_bounds(&line).unwrap();
                    if next != bounds.end_towards(step) {
                        assert!(!suppressed_at(&line, next), "{mode:?}: {idx} -> {next}");
                    }
                }
                let grayed = suppressed_at(&line, idx);
                let filtered = is_suppressed(line.station(idx), idx, line.len(), &line.meta);
                assert_eq!(grayed, filtered);
                assert_eq!(grayed, suppressed_at(&line, idx));
            }
        }

        line.meta.service_mode = ServiceMode::Normal;
        line.stations[4].dock = Dock::Down;
        assert!(!suppressed_at(&line, 4));
        assert!(!is_boardable(&line, 4));
        assert_eq!(next_valid(3, Step::Forward, &line), 5);
    }
}
