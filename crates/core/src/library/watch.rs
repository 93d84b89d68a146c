use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use notify::{event::EventKind, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::LineData;

use super::loader::read_line_file;

/// Events emitted while watching the active line file.
#[derive(Debug)]
pub enum LibraryEvent {
    /// The file changed and parsed successfully.
    Reloaded {
        path: PathBuf,
        line: LineData,
    },
    /// The file changed but could not be loaded.
    Error(anyhow::Error),
}

/// Watches one line file and delivers reloads over a channel.
///
/// The parent directory is watched rather than the file itself so editors
/// that save by rename are picked up. Stops when dropped.
pub struct LineWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl LineWatcher {
    /// Start watching `path`. `current` seeds duplicate suppression.
    pub fn spawn(
        path: impl Into<PathBuf>,
        current: Option<LineData>,
        sender: mpsc::Sender<LibraryEvent>,
    ) -> Result<Self> {
        let path: PathBuf = path.into();
        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let last = Arc::new(Mutex::new(current));

        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    let _ = sender.blocking_send(LibraryEvent::Error(err.into()));
                    return;
                }
            };
            if let Some(update) = handle_event(&event, &target, &last) {
                if sender.blocking_send(update).is_err() {
                    debug!("line watcher receiver dropped");
                }
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", directory.display()))?;
        info!(path = %path.display(), "watching line file");

        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Turn a raw notification into a reload, skipping unrelated paths,
/// non-content events and reloads identical to the last one.
fn handle_event(
    event: &Event,
    target: &Path,
    last: &Mutex<Option<LineData>>,
) -> Option<LibraryEvent> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return None;
    }
    let file_name = target.file_name()?;
    if !event
        .paths
        .iter()
        .any(|changed| changed.file_name() == Some(file_name))
    {
        return None;
    }

    match read_line_file(target) {
        Ok(line) => {
            let mut last = last.lock();
            if last.as_ref() == Some(&line) {
                return None;
            }
            *last = Some(line.clone());
            Some(LibraryEvent::Reloaded {
                path: target.to_path_buf(),
                line,
            })
        }
        Err(err) => {
            warn!("line file changed but failed to load: {err}");
            Some(LibraryEvent::Error(err.into()))
        }
    }
}
