//! The controller: sole owner and writer of the route state.

use tracing::{debug, info};

use crate::models::{LineData, LineMode, RouteState, RunState, Step};
use crate::sync::message::Snapshot;

use super::navigator::{active_bounds, next_valid};
use super::short_turn::{resolve_short_turn, ShortTurnChange};

/// Operations reachable from the keyboard, locally or via `CMD_KEY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Advance,
    Retreat,
    JumpFirst,
    JumpLast,
    ToggleDirection,
    CycleServiceMode,
}

impl ControlAction {
    /// Map a normalized key code (`ArrowRight`, `Space`, `KeyD`, ...) to an action.
    pub fn from_key(code: &str) -> Option<Self> {
        match code {
            "ArrowRight" | "ArrowDown" | "Space" | "Enter" | "PageDown" => Some(Self::Advance),
            "ArrowLeft" | "ArrowUp" | "Backspace" | "PageUp" => Some(Self::Retreat),
            "Home" => Some(Self::JumpFirst),
            "End" => Some(Self::JumpLast),
            "KeyD" => Some(Self::ToggleDirection),
            "KeyM" => Some(Self::CycleServiceMode),
            _ => None,
        }
    }
}

/// Holds the authoritative line and route. Every mutation re-derives the
/// automatic short turn and keeps `idx` inside the active bounds.
#[derive(Debug, Clone)]
pub struct Controller {
    line: LineData,
    route: RouteState,
    revision: u64,
}

impl Controller {
    pub fn new(line: LineData) -> Self {
        let mut controller = Self {
            line,
            route: RouteState::default(),
            revision: 0,
        };
        controller.line.normalize();
        controller.settle();
        controller
    }

    pub fn line(&self) -> &LineData {
        &self.line
    }

    pub fn route(&self) -> RouteState {
        self.route
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Owned copy for broadcasting.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            line: self.line.clone(),
            route: self.route,
        }
    }

    fn step(&self) -> Step {
        self.line.meta.dir_type.step()
    }

    /// Replace the line definition, keeping the position when still valid.
    pub fn load_line(&mut self, mut line: LineData) {
        line.normalize();
        info!(
            stations = line.len(),
            name = %crate::markup::strip(&line.meta.line_name),
            "line loaded"
        );
        self.line = line;
        self.settle();
    }

    /// Depart when standing, arrive at the next stop when running.
    /// Returns `false` when standing at the terminus.
    pub fn advance(&mut self) -> bool {
        if self.line.is_empty() {
            return false;
        }
        let step = self.step();
        match self.route.state {
            RunState::Arriving => {
                if next_valid(self.route.idx, step, &self.line) == self.route.idx {
                    return false;
                }
                self.route.state = RunState::Running;
            }
            RunState::Running => {
                self.route.idx = next_valid(self.route.idx, step, &self.line);
                self.route.state = RunState::Arriving;
            }
        }
        self.settle();
        true
    }

    /// Undo one [`Controller::advance`].
    pub fn retreat(&mut self) -> bool {
        if self.line.is_empty() {
            return false;
        }
        match self.route.state {
            RunState::Running => self.route.state = RunState::Arriving,
            RunState::Arriving => {
                let previous = next_valid(self.route.idx, self.step().reverse(), &self.line);
                if previous == self.route.idx {
                    return false;
                }
                self.route.idx = previous;
                self.route.state = RunState::Running;
            }
        }
        self.settle();
        true
    }

    /// Stand at `idx`, clamped into the active bounds.
    pub fn jump_to(&mut self, idx: usize) {
        self.route = RouteState::new(idx, RunState::Arriving);
        self.settle();
    }

    pub fn toggle_direction(&mut self) {
        self.line.meta.dir_type = self.line.meta.dir_type.reversed();
        self.settle();
    }

    pub fn cycle_service_mode(&mut self) {
        self.line.meta.service_mode = self.line.meta.service_mode.cycle();
        self.settle();
    }

    pub fn toggle_mode(&mut self) {
        self.line.meta.mode = match self.line.meta.mode {
            LineMode::Linear => LineMode::Loop,
            LineMode::Loop => LineMode::Linear,
        };
        self.line.meta.dir_type = self.line.meta.dir_type.for_mode(self.line.meta.mode);
        self.settle();
    }

    pub fn toggle_skip(&mut self, idx: usize) {
        if let Some(station) = self.line.stations.get_mut(idx) {
            station.skip = !station.skip;
            self.settle();
        }
    }

    pub fn toggle_express_stop(&mut self, idx: usize) {
        if let Some(station) = self.line.stations.get_mut(idx) {
            station.express_stop = Some(station.express_stop != Some(true));
            self.settle();
        }
    }

    pub fn cycle_dock(&mut self, idx: usize) {
        if let Some(station) = self.line.stations.get_mut(idx) {
            station.dock = station.dock.cycle();
            self.settle();
        }
    }

    /// Set a manual short turn. Out-of-range indices are ignored.
    pub fn set_short_turn(&mut self, start: usize, term: usize) {
        if start >= self.line.len() || term >= self.line.len() {
            return;
        }
        self.line.meta.start_idx = start as i64;
        self.line.meta.term_idx = term as i64;
        self.line.meta.auto_short_turn = false;
        self.settle();
    }

    pub fn clear_short_turn(&mut self) {
        self.line.meta.clear_short_turn();
        self.settle();
    }

    /// Apply a keyboard action; returns whether anything changed.
    pub fn apply(&mut self, action: ControlAction) -> bool {
        debug!(?action, "control action");
        match action {
            ControlAction::Advance => self.advance(),
            ControlAction::Retreat => self.retreat(),
            ControlAction::JumpFirst | ControlAction::JumpLast => {
                let Some(bounds) = active_bounds(&self.line) else {
                    return false;
                };
                let target = if action == ControlAction::JumpFirst {
                    bounds.lo
                } else {
                    bounds.hi
                };
                self.jump_to(target);
                true
            }
            ControlAction::ToggleDirection => {
                self.toggle_direction();
                true
            }
            ControlAction::CycleServiceMode => {
                self.cycle_service_mode();
                true
            }
        }
    }

    fn settle(&mut self) {
        match resolve_short_turn(&mut self.line) {
            ShortTurnChange::Unchanged => {}
            change => info!(?change, "short turn updated"),
        }
        match active_bounds(&self.line) {
            Some(bounds) => {
                let clamped = bounds.clamp(self.route.idx);
                if clamped != self.route.idx {
                    self.route = RouteState::new(clamped, RunState::Arriving);
                }
            }
            None => self.route = RouteState::default(),
        }
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DirType, LineMeta, Station};

    fn controller() -> Controller {
        Controller::new(LineData {
            meta: LineMeta::default(),
            stations: ["A", "B", "C", "D"]
                .iter()
                .map(|name| Station::new(*name, *name))
                .collect(),
        })
    }

    #[test]
    fn advance_alternates_departure_and_arrival() {
        let mut controller = controller();
        controller.toggle_skip(1);
        assert!(controller.advance());
        assert_eq!(controller.route(), RouteState::new(0, RunState::Running));
        assert!(controller.advance());
        assert_eq!(controller.route(), RouteState::new(2, RunState::Arriving));
        assert!(controller.advance());
        assert!(controller.advance());
        assert_eq!(controller.route(), RouteState::new(3, RunState::Arriving));
        assert!(!controller.advance());
    }

    #[test]
    fn retreat_reverses_advance() {
        let mut controller = controller();
        controller.jump_to(2);
        assert!(controller.retreat());
        assert_eq!(controller.route(), RouteState::new(1, RunState::Running));
        assert!(controller.retreat());
        assert_eq!(controller.route(), RouteState::new(1, RunState::Arriving));
    }

    #[test]
    fn suspending_terminal_pulls_route_inside_short_turn() {
        let mut controller = controller();
        controller.jump_to(3);
        controller.toggle_skip(3);
        assert!(controller.line().meta.auto_short_turn);
        assert_eq!(controller.line().meta.term_idx, 2);
        assert_eq!(controller.route().idx, 2);
    }

    #[test]
    fn direction_and_mode_toggles_keep_direction_valid() {
        let mut controller = controller();
        controller.toggle_direction();
        assert_eq!(controller.line().meta.dir_type, DirType::Down);
        controller.toggle_mode();
        assert_eq!(controller.line().meta.dir_type, DirType::Inner);
        controller.jump_to(0);
        assert!(controller.advance());
        assert!(controller.advance());
        assert_eq!(controller.route().idx, 3);
    }

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(ControlAction::from_key("Space"), Some(ControlAction::Advance));
        assert_eq!(ControlAction::from_key("KeyD"), Some(ControlAction::ToggleDirection));
        assert_eq!(ControlAction::from_key("KeyZ"), None);

        let mut controller = controller();
        let before = controller.revision();
        assert!(controller.apply(ControlAction::JumpLast));
        assert_eq!(controller.route().idx, 3);
        assert!(controller.revision() > before);
    }

    #[test]
    fn manual_short_turn_rejects_out_of_range() {
        let mut controller = controller();
        controller.set_short_turn(1, 9);
        assert!(!controller.line().meta.has_short_turn());
        controller.set_short_turn(2, 1);
        controller.jump_to(0);
        assert_eq!(controller.route().idx, 1);
    }
}
