//! Line and route data shared between the controller and every display.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Which traffic direction a platform serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dock {
    /// Only trains running `up`/`outer` may board here.
    Up,
    /// Only trains running `down`/`inner` may board here.
    Down,
    /// Both directions board.
    #[default]
    Both,
}

impl Dock {
    /// Next value in the editor cycle.
    pub fn cycle(self) -> Self {
        match self {
            Dock::Both => Dock::Up,
            Dock::Up => Dock::Down,
            Dock::Down => Dock::Both,
        }
    }
}

/// Side on which the train doors open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorSide {
    /// Doors open on the left.
    #[default]
    Left,
    /// Doors open on the right.
    Right,
    /// Doors open on both sides.
    Both,
}

impl DoorSide {
    /// Mirror the door side, as happens when a train reverses at a turnback.
    pub fn inverted(self) -> Self {
        match self {
            DoorSide::Left => DoorSide::Right,
            DoorSide::Right => DoorSide::Left,
            DoorSide::Both => DoorSide::Both,
        }
    }

    /// Bilingual label used by the banners.
    pub fn label(self) -> &'static str {
        match self {
            DoorSide::Left => "左侧开门 Doors open on the left",
            DoorSide::Right => "右侧开门 Doors open on the right",
            DoorSide::Both => "两侧开门 Doors open on both sides",
        }
    }
}

/// Turnback configuration of a station. Anything other than `none` marks a
/// terminal where the door side inverts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Turnback {
    /// Regular platform.
    #[default]
    None,
    /// Turnback platform, keeping the configured kind verbatim.
    Terminal(String),
}

impl Turnback {
    /// Whether the door side inverts here.
    pub fn is_turnback(&self) -> bool {
        matches!(self, Turnback::Terminal(_))
    }
}

impl From<String> for Turnback {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Turnback::None
        } else {
            Turnback::Terminal(trimmed.to_string())
        }
    }
}

impl From<Turnback> for String {
    fn from(value: Turnback) -> Self {
        match value {
            Turnback::None => "none".to_string(),
            Turnback::Terminal(kind) => kind,
        }
    }
}

/// Transfer badge shown next to a station.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transfer {
    /// Line label, markup-bearing.
    pub line: String,
    /// Badge color token.
    pub color: String,
    /// Transfer line currently suspended.
    pub suspended: bool,
    /// Transfer requires leaving the paid area.
    pub exit_transfer: bool,
}

/// A single station of a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Primary (Chinese) name, markup-bearing.
    #[serde(default)]
    pub name: String,
    /// English name, markup-bearing.
    #[serde(default)]
    pub en: String,
    /// Administratively suspended.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub dock: Dock,
    /// Served by express trains. `None` behaves like `Some(false)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub express_stop: Option<bool>,
    #[serde(default)]
    pub xfer: Vec<Transfer>,
    #[serde(default)]
    pub door: DoorSide,
    #[serde(default)]
    pub turnback: Turnback,
}

impl Station {
    /// Station with the given bilingual name and default flags.
    pub fn new(name: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            en: en.into(),
            skip: false,
            dock: Dock::Both,
            express_stop: None,
            xfer: Vec::new(),
            door: DoorSide::Left,
            turnback: Turnback::None,
        }
    }
}

/// Track topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMode {
    #[default]
    Linear,
    Loop,
}

/// Direction of travel. `up`/`down` apply to linear lines, `outer`/`inner` to loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirType {
    #[default]
    Up,
    Down,
    Outer,
    Inner,
}

impl DirType {
    /// Index step for travelling in this direction.
    pub fn step(self) -> Step {
        match self {
            DirType::Up | DirType::Outer => Step::Forward,
            DirType::Down | DirType::Inner => Step::Backward,
        }
    }

    /// The opposite direction on the same kind of line.
    pub fn reversed(self) -> Self {
        match self {
            DirType::Up => DirType::Down,
            DirType::Down => DirType::Up,
            DirType::Outer => DirType::Inner,
            DirType::Inner => DirType::Outer,
        }
    }

    /// Coerce the direction to one valid for `mode`, keeping the step sign.
    pub fn for_mode(self, mode: LineMode) -> Self {
        match (mode, self) {
            (LineMode::Linear, DirType::Outer) => DirType::Up,
            (LineMode::Linear, DirType::Inner) => DirType::Down,
            (LineMode::Loop, DirType::Up) => DirType::Outer,
            (LineMode::Loop, DirType::Down) => DirType::Inner,
            (_, dir) => dir,
        }
    }

    /// Bilingual label.
    pub fn label(self) -> &'static str {
        match self {
            DirType::Up => "上行 Up",
            DirType::Down => "下行 Down",
            DirType::Outer => "外环 Outer loop",
            DirType::Inner => "内环 Inner loop",
        }
    }
}

/// Index step, `+1` or `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Forward,
    Backward,
}

impl Step {
    /// Signed delta.
    pub fn delta(self) -> i64 {
        match self {
            Step::Forward => 1,
            Step::Backward => -1,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Step::Forward => Step::Backward,
            Step::Backward => Step::Forward,
        }
    }
}

/// Operating pattern of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    #[default]
    Normal,
    /// Only the two physical terminals are served.
    Direct,
    /// Terminals plus stations flagged `expressStop`.
    Express,
}

impl ServiceMode {
    pub fn cycle(self) -> Self {
        match self {
            ServiceMode::Normal => ServiceMode::Express,
            ServiceMode::Express => ServiceMode::Direct,
            ServiceMode::Direct => ServiceMode::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceMode::Normal => "普通 Normal",
            ServiceMode::Direct => "直达 Direct",
            ServiceMode::Express => "快车 Express",
        }
    }
}

/// Explicit coloring of a stretch of track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRange {
    pub start_idx: i64,
    pub end_idx: i64,
    pub color: String,
}

/// Line-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineMeta {
    /// Line name, markup-bearing.
    pub line_name: String,
    pub mode: LineMode,
    pub dir_type: DirType,
    pub service_mode: ServiceMode,
    /// Short-turn bound, `-1` for none.
    pub start_idx: i64,
    /// Short-turn bound, `-1` for none.
    pub term_idx: i64,
    /// The current short turn was derived from suspended terminals.
    pub auto_short_turn: bool,
    pub theme_color: String,
    pub custom_color_ranges: Vec<ColorRange>,
}

impl Default for LineMeta {
    fn default() -> Self {
        Self {
            line_name: String::new(),
            mode: LineMode::Linear,
            dir_type: DirType::Up,
            service_mode: ServiceMode::Normal,
            start_idx: -1,
            term_idx: -1,
            auto_short_turn: false,
            theme_color: "#00629b".to_string(),
            custom_color_ranges: Vec::new(),
        }
    }
}

impl LineMeta {
    /// Whether both short-turn bounds are set. A lone bound counts as none.
    pub fn has_short_turn(&self) -> bool {
        self.start_idx >= 0 && self.term_idx >= 0
    }

    /// Short-turn set by a human rather than derived.
    pub fn has_manual_short_turn(&self) -> bool {
        self.has_short_turn() && !self.auto_short_turn
    }

    pub fn clear_short_turn(&mut self) {
        self.start_idx = -1;
        self.term_idx = -1;
        self.auto_short_turn = false;
    }
}

/// A complete line definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineData {
    #[serde(default)]
    pub meta: LineMeta,
    #[serde(default)]
    pub stations: Vec<Station>,
}

impl LineData {
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn station(&self, idx: usize) -> Option<&Station> {
        self.stations.get(idx)
    }

    /// Repair values that would otherwise need special-casing downstream:
    /// a short turn with a missing or out-of-range bound is cleared and the
    /// direction matches the mode.
    pub fn normalize(&mut self) {
        let len = self.stations.len() as i64;
        let meta = &mut self.meta;
        if !(0..len).contains(&meta.start_idx) || !(0..len).contains(&meta.term_idx) {
            meta.clear_short_turn();
        }
        meta.dir_type = meta.dir_type.for_mode(meta.mode);
    }
}

/// Whether the train is standing at `idx` or has departed towards the next stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum RunState {
    /// `0`: arriving at / stopped at the current station.
    #[default]
    Arriving,
    /// `1`: departed, running towards the next station.
    Running,
}

impl From<u8> for RunState {
    fn from(value: u8) -> Self {
        if value == 0 {
            RunState::Arriving
        } else {
            RunState::Running
        }
    }
}

impl From<RunState> for u8 {
    fn from(value: RunState) -> Self {
        match value {
            RunState::Arriving => 0,
            RunState::Running => 1,
        }
    }
}

/// Runtime position of the train. Written only by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteState {
    #[serde(deserialize_with = "lenient_index")]
    pub idx: usize,
    pub state: RunState,
}

impl RouteState {
    pub fn new(idx: usize, state: RunState) -> Self {
        Self { idx, state }
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            RunState::Arriving => write!(f, "at #{}", self.idx),
            RunState::Running => write!(f, "departed #{}", self.idx),
        }
    }
}

fn lenient_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(usize::try_from(raw).unwrap_or(0))
}
