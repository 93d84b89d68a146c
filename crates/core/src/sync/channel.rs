//! Display-side sync state machine.

use tracing::{debug, info};

use crate::models::{LineData, RouteState};
use crate::route::{resolve_short_turn, DisplayFacts};

use super::message::{Snapshot, SyncMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No bus subscription. Only a restored snapshot can be shown.
    Disconnected,
    /// Subscribed and `REQ` sent, no `SYNC` seen yet.
    AwaitingSnapshot,
    /// At least one live `SYNC` received.
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Restored,
    Live,
}

/// The display's received copy of the controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayView {
    pub line: LineData,
    pub route: RouteState,
    pub source: SnapshotSource,
}

/// What a handled message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Updated,
    RecordingStarted(u64),
    RecordingStopped,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct DisplayChannel {
    state: ChannelState,
    view: Option<DisplayView>,
    recording_bps: Option<u64>,
}

impl Default for DisplayChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayChannel {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Disconnected,
            view: None,
            recording_bps: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn view(&self) -> Option<&DisplayView> {
        self.view.as_ref()
    }

    /// Active capture bitrate, if recording.
    pub fn recording_bps(&self) -> Option<u64> {
        self.recording_bps
    }

    pub fn facts(&self) -> Option<DisplayFacts> {
        self.view
            .as_ref()
            .and_then(|view| DisplayFacts::derive(&view.line, &view.route))
    }

    /// Begin a session. Returns the `REQ` to broadcast when subscribed.
    ///
    /// `restored` covers a `SYNC` published before the subscription existed.
    pub fn start(&mut self, subscribed: bool, restored: Option<Snapshot>) -> Option<SyncMessage> {
        self.state = if subscribed {
            ChannelState::AwaitingSnapshot
        } else {
            ChannelState::Disconnected
        };
        if let Some(snapshot) = restored {
            self.restore(snapshot);
        }
        subscribed.then_some(SyncMessage::Req)
    }

    /// Apply a cached snapshot unless live state already arrived.
    pub fn restore(&mut self, snapshot: Snapshot) -> DisplayEvent {
        if self.state == ChannelState::Synced {
            debug!("ignoring cached snapshot, already synced");
            return DisplayEvent::Ignored;
        }
        self.apply(snapshot.line, snapshot.route, SnapshotSource::Restored);
        DisplayEvent::Updated
    }

    pub fn handle(&mut self, message: SyncMessage) -> DisplayEvent {
        match message {
            SyncMessage::Sync { d, r } => {
                if self.state != ChannelState::Synced {
                    info!(stations = d.len(), "display synced");
                }
                self.state = ChannelState::Synced;
                self.apply(d, r, SnapshotSource::Live);
                DisplayEvent::Updated
            }
            SyncMessage::RecStart { bps } => {
                self.recording_bps = Some(bps);
                DisplayEvent::RecordingStarted(bps)
            }
            SyncMessage::RecStop => {
                self.recording_bps = None;
                DisplayEvent::RecordingStopped
            }
            SyncMessage::CmdKey { .. } | SyncMessage::Req => DisplayEvent::Ignored,
        }
    }

    fn apply(&mut self, mut line: LineData, route: RouteState, source: SnapshotSource) {
        line.normalize();
        resolve_short_turn(&mut line);
        self.view = Some(DisplayView {
            line,
            route,
            source,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunState, Station};

    fn snapshot(idx: usize) -> Snapshot {
        Snapshot {
            line: LineData {
                stations: (0..5)
                    .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
                    .collect(),
                ..LineData::default()
            },
            route: RouteState::new(idx, RunState::Arriving),
        }
    }

    #[test]
    fn start_requests_and_restores() {
        let mut channel = DisplayChannel::new();
        let request = channel.start(true, Some(snapshot(1)));
        assert_eq!(request, Some(SyncMessage::Req));
        assert_eq!(channel.state(), ChannelState::AwaitingSnapshot);
        let view = channel.view().unwrap();
        assert_eq!(view.source, SnapshotSource::Restored);
        assert_eq!(view.route.idx, 1);
    }

    #[test]
    fn live_sync_wins_over_late_restore() {
        let mut channel = DisplayChannel::new();
        channel.start(true, None);
        assert_eq!(channel.handle(SyncMessage::sync(snapshot(3))), DisplayEvent::Updated);
        assert_eq!(channel.state(), ChannelState::Synced);
        assert_eq!(channel.restore(snapshot(0)), DisplayEvent::Ignored);
        assert_eq!(channel.view().unwrap().route.idx, 3);
        assert_eq!(channel.view().unwrap().source, SnapshotSource::Live);
    }

    #[test]
    fn unsubscribed_display_uses_cache_only() {
        let mut channel = DisplayChannel::new();
        assert!(channel.start(false, Some(snapshot(2))).is_none());
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(channel.facts().is_some());
    }

    #[test]
    fn resolves_short_turn_on_receipt() {
        let mut channel = DisplayChannel::new();
        channel.start(true, None);
        let mut snap = snapshot(2);
        snap.line.stations[0].skip = true;
        channel.handle(SyncMessage::sync(snap));
        let meta = &channel.view().unwrap().line.meta;
        assert_eq!((meta.start_idx, meta.term_idx), (1, 4));
        assert!(meta.auto_short_turn);
    }

    #[test]
    fn tracks_recording_and_ignores_controller_bound_messages() {
        let mut channel = DisplayChannel::new();
        assert_eq!(
            channel.handle(SyncMessage::RecStart { bps: 5_000_000 }),
            DisplayEvent::RecordingStarted(5_000_000)
        );
        assert_eq!(channel.recording_bps(), Some(5_000_000));
        assert_eq!(channel.handle(SyncMessage::RecStop), DisplayEvent::RecordingStopped);
        assert_eq!(channel.recording_bps(), None);
        assert_eq!(channel.handle(SyncMessage::Req), DisplayEvent::Ignored);
        assert!(channel.view().is_none());
    }
}
