//! Banner facts derived from a line and a route position.

use crate::models::{DirType, DoorSide, LineData, RouteState, RunState, Transfer};

use super::navigator::{active_bounds, is_at_terminus, next_valid, terminus};

/// What the next-station and terminal banners show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFacts {
    /// Current index, clamped into the active bounds.
    pub current: usize,
    /// Next boardable station in the direction of travel.
    pub next: usize,
    /// Station named by the banner: the current one while standing, the next
    /// one while running.
    pub announced: usize,
    pub terminal: Option<usize>,
    pub at_terminus: bool,
    pub direction: DirType,
    /// Door side at the announced station, inverted at a turnback terminal.
    pub door: DoorSide,
    pub transfers: Vec<Transfer>,
}

impl DisplayFacts {
    /// Derive facts for `route` on `line`; `None` for an empty line.
    pub fn derive(line: &LineData, route: &RouteState) -> Option<Self> {
        let bounds = active_bounds(line)?;
        let current = bounds.clamp(route.idx);
        let direction = line.meta.dir_type;
        let next = next_valid(current, direction.step(), line);
        let announced = match route.state {
            RunState::Arriving => current,
            RunState::Running => next,
        };
        let terminal = terminus(line);
        let at_terminus = is_at_terminus(line, announced);

        let station = line.station(announced)?;
        let door = if at_terminus && station.turnback.is_turnback() {
            station.door.inverted()
        } else {
            station.door
        };

        Some(Self {
            current,
            next,
            announced,
            terminal,
            at_terminus,
            direction,
            door,
            transfers: station.xfer.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineMeta, Station, Turnback};

    fn line() -> LineData {
        let mut stations: Vec<Station> = ["A", "B", "C"]
            .iter()
            .map(|name| Station::new(*name, *name))
            .collect();
        stations[2].turnback = Turnback::Terminal("post".to_string());
        stations[2].door = DoorSide::Left;
        stations[1].xfer.push(Transfer {
            line: "2号线".to_string(),
            color: "#97d700".to_string(),
            ..Transfer::default()
        });
        LineData {
            meta: LineMeta::default(),
            stations,
        }
    }

    #[test]
    fn running_announces_next_station() {
        let line = line();
        let facts = DisplayFacts::derive(&line, &RouteState::new(0, RunState::Running)).unwrap();
        assert_eq!(facts.announced, 1);
        assert_eq!(facts.terminal, Some(2));
        assert_eq!(facts.transfers.len(), 1);
        assert!(!facts.at_terminus);
    }

    #[test]
    fn turnback_terminal_inverts_doors() {
        let line = line();
        let facts = DisplayFacts::derive(&line, &RouteState::new(1, RunState::Running)).unwrap();
        assert_eq!(facts.announced, 2);
        assert!(facts.at_terminus);
        assert_eq!(facts.door, DoorSide::Right);
    }

    #[test]
    fn out_of_range_index_is_clamped() {
        let line = line();
        let facts = DisplayFacts::derive(&line, &RouteState::new(40, RunState::Arriving)).unwrap();
        assert_eq!(facts.current, 2);
        assert!(DisplayFacts::derive(&LineData::default(), &RouteState::default()).is_none());
    }
}
