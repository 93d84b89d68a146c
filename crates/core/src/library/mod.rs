//! Line files, presets and the remote preset API.

/// Line file discovery and parsing.
pub mod loader;
/// Local presets with history.
pub mod presets;
/// HTTP preset client.
pub mod remote;
/// Reload-on-change for the active line file.
pub mod watch;

pub use loader::{read_line_file, write_line_file, LineEntry, LineLibrary};
pub use presets::{PresetEntry, PresetPayload, PresetStore};
pub use remote::PresetClient;
pub use watch::{LibraryEvent, LineWatcher};
