//! Display windows as spawned tasks.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::error::PidsError;

use super::bus::{next_window_id, BusEndpoint, BusSender, SyncBus, WindowId};
use super::cache::SnapshotStore;
use super::channel::{ChannelState, DisplayChannel, DisplayEvent, DisplayView};
use super::keys::normalize_key;
use super::message::SyncMessage;

/// Screen-capture collaborator driven by `REC_START`/`REC_STOP`.
pub trait Recorder: Send + Sync {
    fn start(&self, bps: u64);
    fn stop(&self);
}

/// Recorder that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn start(&self, bps: u64) {
        debug!(bps, "recording not supported, ignoring start");
    }

    fn stop(&self) {
        debug!("recording not supported, ignoring stop");
    }
}

/// Sent from a display task to whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowUpdate {
    View {
        window: WindowId,
        view: DisplayView,
        state: ChannelState,
    },
    Recording {
        window: WindowId,
        bps: Option<u64>,
    },
}

/// Handle to a running display. Dropping it stops the task and releases the
/// bus subscription.
pub struct DisplayWindow {
    id: WindowId,
    sender: Option<BusSender>,
    handle: JoinHandle<()>,
}

impl DisplayWindow {
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Forward a key press to the controller as `CMD_KEY`.
    /// Returns `false` when the key was filtered out or no bus is attached.
    pub fn forward_key(&self, code: &str, key: &str, editable: bool) -> Result<bool, PidsError> {
        let (Some(sender), Some(command)) = (&self.sender, normalize_key(code, key, editable))
        else {
            return Ok(false);
        };
        sender.send(SyncMessage::CmdKey {
            code: command.code,
            key: command.key,
        })?;
        Ok(true)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DisplayWindow {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Open a display window.
///
/// The bus subscription is taken before this returns, so a `SYNC` published
/// afterwards is never missed. The cached snapshot is consumed on start.
pub fn spawn_display(
    bus: Option<&SyncBus>,
    cache: Arc<dyn SnapshotStore>,
    updates: mpsc::Sender<WindowUpdate>,
    recorder: Arc<dyn Recorder>,
) -> DisplayWindow {
    let endpoint = bus.map(SyncBus::endpoint);
    let id = endpoint
        .as_ref()
        .map(BusEndpoint::id)
        .unwrap_or_else(next_window_id);
    let sender = endpoint.as_ref().map(BusEndpoint::sender);

    let handle = tokio::spawn(run_display(id, endpoint, cache, updates, recorder));
    info!(window = id, "display window opened");

    DisplayWindow { id, sender, handle }
}

async fn run_display(
    id: WindowId,
    mut endpoint: Option<BusEndpoint>,
    cache: Arc<dyn SnapshotStore>,
    updates: mpsc::Sender<WindowUpdate>,
    recorder: Arc<dyn Recorder>,
) {
    let mut channel = DisplayChannel::new();
    let restored = cache.take().unwrap_or_else(|err| {
        warn!(window = id, "snapshot cache unavailable: {err}");
        None
    });

    if let Some(request) = channel.start(endpoint.is_some(), restored) {
        if let Some(endpoint) = &endpoint {
            if let Err(err) = endpoint.send(request) {
                warn!(window = id, "failed to request snapshot: {err}");
            }
        }
    }
    if !push_view(id, &channel, &updates).await {
        return;
    }

    let Some(endpoint) = endpoint.as_mut() else {
        debug!(window = id, "no bus, showing cached snapshot only");
        return;
    };

    while let Some(message) = endpoint.recv().await {
        let delivered = match channel.handle(message) {
            DisplayEvent::Updated => push_view(id, &channel, &updates).await,
            DisplayEvent::RecordingStarted(bps) => {
                recorder.start(bps);
                updates
                    .send(WindowUpdate::Recording {
                        window: id,
                        bps: Some(bps),
                    })
                    .await
                    .is_ok()
            }
            DisplayEvent::RecordingStopped => {
                recorder.stop();
                updates
                    .send(WindowUpdate::Recording {
                        window: id,
                        bps: None,
                    })
                    .await
                    .is_ok()
            }
            DisplayEvent::Ignored => true,
        };
        if !delivered {
            break;
        }
    }
    debug!(window = id, "display task finished");
}

/// Send the current view, if any. `false` once the receiver is gone.
async fn push_view(
    id: WindowId,
    channel: &DisplayChannel,
    updates: &mpsc::Sender<WindowUpdate>,
) -> bool {
    let Some(view) = channel.view() else {
        return true;
    };
    updates
        .send(WindowUpdate::View {
            window: id,
            view: view.clone(),
            state: channel.state(),
        })
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{LineData, RouteState, RunState, Station};
    use crate::route::Controller;
    use crate::sync::bus::{ControllerLink, ControllerRequest};
    use crate::sync::cache::MemorySnapshotCache;
    use crate::sync::channel::SnapshotSource;
    use crate::sync::message::Snapshot;

    fn line() -> LineData {
        LineData {
            stations: (0..6)
                .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
                .collect(),
            ..LineData::default()
        }
    }

    async fn next(rx: &mut mpsc::Receiver<WindowUpdate>) -> WindowUpdate {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for window update")
            .expect("display task ended")
    }

    #[tokio::test]
    async fn late_window_restores_cached_snapshot() {
        let cache = Arc::new(MemorySnapshotCache::new());
        cache
            .store(&Snapshot {
                line: line(),
                route: RouteState::new(4, RunState::Running),
            })
            .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let _window = spawn_display(None, cache.clone(), tx, Arc::new(NoopRecorder));

        let WindowUpdate::View { view, state, .. } = next(&mut rx).await else {
            panic!("expected a view");
        };
        assert_eq!(view.source, SnapshotSource::Restored);
        assert_eq!(view.route.idx, 4);
        assert_eq!(state, ChannelState::Disconnected);
        assert!(cache.take().unwrap().is_none());
    }

    #[tokio::test]
    async fn request_is_answered_with_live_state() {
        let bus = SyncBus::default();
        let cache: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotCache::new());
        let mut link = ControllerLink::new(&bus, cache.clone());
        let mut controller = Controller::new(line());
        controller.jump_to(2);

        let (tx, mut rx) = mpsc::channel(8);
        let window = spawn_display(Some(&bus), cache, tx, Arc::new(NoopRecorder));

        let request = link.next_request().await.unwrap();
        assert_eq!(request, ControllerRequest::Resync);
        link.respond(request, &mut controller).unwrap();

        let WindowUpdate::View { view, state, .. } = next(&mut rx).await else {
            panic!("expected a view");
        };
        assert_eq!(state, ChannelState::Synced);
        assert_eq!(view.source, SnapshotSource::Live);
        assert_eq!(view.route.idx, 2);

        assert!(window.forward_key("NumpadEnter", "Enter", false).unwrap());
        assert!(!window.forward_key("ShiftLeft", "Shift", false).unwrap());
        let request = link.next_request().await.unwrap();
        link.respond(request, &mut controller).unwrap();
        let WindowUpdate::View { view, .. } = next(&mut rx).await else {
            panic!("expected a view");
        };
        assert!(view.route.is_running());
    }

    #[tokio::test]
    async fn recording_messages_reach_the_renderer() {
        let bus = SyncBus::default();
        let cache: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotCache::new());
        let mut link = ControllerLink::new(&bus, cache.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let _window = spawn_display(Some(&bus), cache, tx, Arc::new(NoopRecorder));

        assert_eq!(link.next_request().await, Some(ControllerRequest::Resync));
        link.start_recording(6_000_000).unwrap();
        assert!(matches!(
            next(&mut rx).await,
            WindowUpdate::Recording { bps: Some(6_000_000), .. }
        ));
    }

    #[tokio::test]
    async fn dropping_the_window_stops_its_task() {
        let bus = SyncBus::default();
        let cache: Arc<dyn SnapshotStore> = Arc::new(MemorySnapshotCache::new());
        let (tx, mut rx) = mpsc::channel(8);
        let window = spawn_display(Some(&bus), cache, tx, Arc::new(NoopRecorder));
        drop(window);

        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("task did not stop");
        assert!(closed.is_none());
    }
}
