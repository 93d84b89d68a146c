//! Service-pattern filtering of stations.
//!
//! This is the only place that decides whether a station is passed without
//! stopping. Navigation, station tags and segment coloring all call it.

use crate::models::{LineData, LineMeta, ServiceMode, Station};

/// Whether the station at `idx` (of `len`) is not served under `meta`.
///
/// A missing station counts as suppressed. Suspended (`skip`) stations are
/// always suppressed. Otherwise the service mode decides: direct service only
/// serves the two physical terminals, express service serves terminals plus
/// stations explicitly flagged `expressStop`.
pub fn is_suppressed(station: Option<&Station>, idx: usize, len: usize, meta: &LineMeta) -> bool {
    let Some(station) = station else {
        return true;
    };
    if station.skip {
        return true;
    }

    let is_terminal = idx == 0 || idx + 1 == len;
    match meta.service_mode {
        ServiceMode::Normal => false,
        ServiceMode::Direct => !is_terminal,
        ServiceMode::Express => !is_terminal && station.express_stop != Some(true),
    }
}

/// [`is_suppressed`] for the station at `idx` of `line`.
pub fn suppressed_at(line: &LineData, idx: usize) -> bool {
    is_suppressed(line.station(idx), idx, line.len(), &line.meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Station;

    fn line(mode: ServiceMode) -> LineData {
        let mut stations: Vec<Station> = ["A", "B", "C", "D"]
            .iter()
            .map(|name| Station::new(*name, *name))
            .collect();
        stations[2].express_stop = Some(true);
        LineData {
            meta: LineMeta {
                service_mode: mode,
                ..LineMeta::default()
            },
            stations,
        }
    }

    #[test]
    fn missing_station_is_suppressed() {
        let line = line(ServiceMode::Normal);
        assert!(suppressed_at(&line, 9));
    }

    #[test]
    fn normal_service_only_honours_skip() {
        let mut line = line(ServiceMode::Normal);
        line.stations[1].skip = true;
        let flags: Vec<bool> = (0..4).map(|idx| suppressed_at(&line, idx)).collect();
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn direct_service_keeps_terminals_only() {
        let line = line(ServiceMode::Direct);
        let flags: Vec<bool> = (0..4).map(|idx| suppressed_at(&line, idx)).collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn express_service_keeps_terminals_and_express_stops() {
        let mut line = line(ServiceMode::Express);
        line.stations[1].express_stop = Some(false);
        let flags: Vec<bool> = (0..4).map(|idx| suppressed_at(&line, idx)).collect();
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn skip_wins_over_terminal_status() {
        let mut line = line(ServiceMode::Express);
        line.stations[0].skip = true;
        assert!(suppressed_at(&line, 0));
    }
}
