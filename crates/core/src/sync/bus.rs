//! In-process broadcast bus shared by the controller and display windows.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::error::PidsError;
use crate::route::{ControlAction, Controller};

use super::cache::SnapshotStore;
use super::keys::KeyCommand;
use super::message::{Snapshot, SyncMessage};

/// Messages buffered per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 64;

/// Identifies the sender of a bus message.
pub type WindowId = u64;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique participant id.
pub fn next_window_id() -> WindowId {
    NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: WindowId,
    pub message: SyncMessage,
}

/// The shared channel. Clones refer to the same bus.
#[derive(Clone)]
pub struct SyncBus {
    sender: broadcast::Sender<Envelope>,
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SyncBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe a new participant.
    pub fn endpoint(&self) -> BusEndpoint {
        let id = next_window_id();
        BusEndpoint {
            sender: BusSender {
                id,
                sender: self.sender.clone(),
            },
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Send half of an endpoint, cheap to clone into other tasks.
#[derive(Clone)]
pub struct BusSender {
    id: WindowId,
    sender: broadcast::Sender<Envelope>,
}

impl BusSender {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn send(&self, message: SyncMessage) -> Result<(), PidsError> {
        debug!(from = self.id, kind = message.kind(), "bus send");
        self.sender
            .send(Envelope {
                from: self.id,
                message,
            })
            .map(|_| ())
            .map_err(|_| PidsError::BusClosed)
    }
}

/// A subscription plus the matching sender. Own messages are not echoed back.
pub struct BusEndpoint {
    sender: BusSender,
    receiver: broadcast::Receiver<Envelope>,
}

impl BusEndpoint {
    pub fn id(&self) -> WindowId {
        self.sender.id
    }

    pub fn sender(&self) -> BusSender {
        self.sender.clone()
    }

    pub fn send(&self, message: SyncMessage) -> Result<(), PidsError> {
        self.sender.send(message)
    }

    /// Next message from another participant, `None` once the bus is gone.
    /// A lagging receiver drops the overflow and carries on with newer messages.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.from == self.sender.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(endpoint = self.sender.id, skipped, "bus subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Requests reaching the controller from display windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerRequest {
    /// A display asked for the current state.
    Resync,
    /// A key forwarded from a display.
    Key(KeyCommand),
}

/// Controller side of the bus: publishes state and receives requests.
pub struct ControllerLink {
    endpoint: BusEndpoint,
    cache: Arc<dyn SnapshotStore>,
}

impl ControllerLink {
    pub fn new(bus: &SyncBus, cache: Arc<dyn SnapshotStore>) -> Self {
        Self {
            endpoint: bus.endpoint(),
            cache,
        }
    }

    /// Cache `snapshot` for late windows and broadcast it as `SYNC`.
    pub fn publish(&self, snapshot: Snapshot) -> Result<(), PidsError> {
        if let Err(err) = self.cache.store(&snapshot) {
            warn!("failed to cache snapshot: {err}");
        }
        self.endpoint.send(SyncMessage::sync(snapshot))
    }

    pub fn start_recording(&self, bps: u64) -> Result<(), PidsError> {
        info!(bps, "recording requested");
        self.endpoint.send(SyncMessage::RecStart { bps })
    }

    pub fn stop_recording(&self) -> Result<(), PidsError> {
        info!("recording stop requested");
        self.endpoint.send(SyncMessage::RecStop)
    }

    /// Waits for the next `REQ` or `CMD_KEY`.
    pub async fn next_request(&mut self) -> Option<ControllerRequest> {
        loop {
            match self.endpoint.recv().await? {
                SyncMessage::Req => return Some(ControllerRequest::Resync),
                SyncMessage::CmdKey { code, key } => {
                    return Some(ControllerRequest::Key(KeyCommand { code, key }))
                }
                _ => continue,
            }
        }
    }

    /// Serve `request` against `controller`, publishing when state changed or
    /// was asked for. Returns whether anything was published.
    pub fn respond(
        &self,
        request: ControllerRequest,
        controller: &mut Controller,
    ) -> Result<bool, PidsError> {
        match request {
            ControllerRequest::Resync => {
                self.publish(controller.snapshot())?;
                Ok(true)
            }
            ControllerRequest::Key(command) => {
                let Some(action) = ControlAction::from_key(&command.code) else {
                    debug!(code = %command.code, "unmapped remote key");
                    return Ok(false);
                };
                if !controller.apply(action) {
                    return Ok(false);
                }
                self.publish(controller.snapshot())?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineData, Station};
    use crate::sync::cache::MemorySnapshotCache;

    fn controller() -> Controller {
        Controller::new(LineData {
            stations: (0..4)
                .map(|i| Station::new(format!("S{i}"), format!("S{i}")))
                .collect(),
            ..LineData::default()
        })
    }

    #[tokio::test]
    async fn endpoints_do_not_hear_themselves() {
        let bus = SyncBus::default();
        let mut a = bus.endpoint();
        let mut b = bus.endpoint();
        a.send(SyncMessage::Req).unwrap();
        b.send(SyncMessage::RecStop).unwrap();
        assert_eq!(a.recv().await, Some(SyncMessage::RecStop));
        assert_eq!(b.recv().await, Some(SyncMessage::Req));
    }

    #[tokio::test]
    async fn lagging_endpoint_keeps_newest_messages() {
        let bus = SyncBus::new(2);
        let sender = bus.endpoint();
        let mut slow = bus.endpoint();
        for bps in 1..=5 {
            sender.send(SyncMessage::RecStart { bps }).unwrap();
        }
        assert_eq!(slow.recv().await, Some(SyncMessage::RecStart { bps: 4 }));
        assert_eq!(slow.recv().await, Some(SyncMessage::RecStart { bps: 5 }));
    }

    #[tokio::test]
    async fn remote_keys_drive_the_controller() {
        let bus = SyncBus::default();
        let cache = Arc::new(MemorySnapshotCache::new());
        let mut link = ControllerLink::new(&bus, cache.clone());
        let display = bus.endpoint();
        let mut controller = controller();

        display
            .send(SyncMessage::CmdKey {
                code: "ArrowRight".into(),
                key: "ArrowRight".into(),
            })
            .unwrap();
        let request = link.next_request().await.unwrap();
        assert!(link.respond(request, &mut controller).unwrap());
        assert!(controller.route().is_running());
        assert_eq!(cache.take().unwrap(), Some(controller.snapshot()));

        display
            .send(SyncMessage::CmdKey {
                code: "KeyZ".into(),
                key: "z".into(),
            })
            .unwrap();
        let request = link.next_request().await.unwrap();
        assert!(!link.respond(request, &mut controller).unwrap());
    }
}
