//! Controller ↔ display synchronisation.
//!
//! The controller publishes `SYNC` snapshots on a broadcast bus and mirrors the
//! latest one into a one-shot cache. Displays subscribe, send `REQ`, and fall
//! back on the cache when they start after the last publish.

/// Broadcast transport and the controller's end of it.
pub mod bus;
/// Last-snapshot cache for late windows.
pub mod cache;
/// Display state machine.
pub mod channel;
/// Key normalization for remote control.
pub mod keys;
/// Wire messages.
pub mod message;
/// Display window tasks.
pub mod window;

pub use bus::{BusEndpoint, BusSender, ControllerLink, ControllerRequest, SyncBus, WindowId};
pub use cache::{FileSnapshotCache, MemorySnapshotCache, SnapshotStore};
pub use channel::{ChannelState, DisplayChannel, DisplayEvent, DisplayView, SnapshotSource};
pub use keys::{normalize_key, KeyCommand};
pub use message::{Snapshot, SyncMessage};
pub use window::{spawn_display, DisplayWindow, NoopRecorder, Recorder, WindowUpdate};
