//! Local named line presets with undo history.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::markup;
use crate::models::LineData;

/// Maximum number of history states kept per preset.
pub const HISTORY_LIMIT: usize = 50;

/// A preset as listed on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub path: PathBuf,
    pub name: String,
    pub station_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Serialized preset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetPayload {
    name: String,
    saved_at: DateTime<Utc>,
    line: LineData,
    #[serde(default)]
    history: Vec<LineData>,
    #[serde(default)]
    history_index: usize,
}

impl PresetPayload {
    fn new(name: &str, line: LineData) -> Self {
        let mut payload = Self {
            name: name.to_string(),
            saved_at: Utc::now(),
            line,
            history: Vec::new(),
            history_index: 0,
        };
        payload.normalize_history();
        payload
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> &LineData {
        &self.line
    }

    pub fn into_line(self) -> LineData {
        self.line
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_index(&self) -> usize {
        self.history_index
    }

    pub fn can_undo(&self) -> bool {
        self.history_index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history_index + 1 < self.history.len()
    }

    fn normalize_history(&mut self) {
        if self.history.is_empty() {
            self.history.push(self.line.clone());
            self.history_index = 0;
        } else if self.history_index >= self.history.len() {
            self.history_index = self.history.len() - 1;
        }
        if let Some(current) = self.history.get(self.history_index) {
            self.line = current.clone();
        }
    }

    /// Record a new state, dropping any redo tail. Identical states are ignored.
    fn push_line(&mut self, line: LineData) {
        self.normalize_history();
        self.history.truncate(self.history_index + 1);
        if self.history.last() == Some(&line) {
            return;
        }
        self.history.push(line.clone());
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
        self.history_index = self.history.len() - 1;
        self.line = line;
        self.saved_at = Utc::now();
    }

    fn set_history_index(&mut self, index: usize) -> Result<()> {
        self.normalize_history();
        if index >= self.history.len() {
            return Err(anyhow!("history index {index} out of range"));
        }
        self.history_index = index;
        self.line = self.history[index].clone();
        self.saved_at = Utc::now();
        Ok(())
    }

    fn entry(&self, path: PathBuf) -> PresetEntry {
        PresetEntry {
            path,
            name: self.name.clone(),
            station_count: self.line.len(),
            updated_at: self.saved_at,
        }
    }
}

/// Loads and writes preset files in one directory.
pub struct PresetStore {
    root: PathBuf,
}

impl PresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All presets, most recently updated first.
    pub fn entries(&self) -> Result<Vec<PresetEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).context("failed to read preset directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_file()
                || entry.path().extension().and_then(|ext| ext.to_str()) != Some("json")
            {
                continue;
            }
            match self.read_payload(entry.path()) {
                Ok(payload) => entries.push(payload.entry(entry.path())),
                Err(err) => warn!("failed to read preset {:?}: {err}", entry.path()),
            }
        }

        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    pub fn find(&self, name: &str) -> Result<Option<PresetEntry>> {
        let name = name.trim();
        Ok(self.entries()?.into_iter().find(|entry| entry.name == name))
    }

    /// Save `line` under `name`. An existing preset of that name gains a new
    /// history state; otherwise a new file is created. An empty name falls back
    /// to the line's own name.
    pub fn save(&self, name: Option<&str>, line: &LineData) -> Result<PresetEntry> {
        let name = name
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let line_name = markup::strip(&line.meta.line_name);
                if line_name.trim().is_empty() {
                    "preset".to_string()
                } else {
                    line_name.trim().to_string()
                }
            });

        if let Some(existing) = self.find(&name)? {
            return self.update(&existing, line);
        }

        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let payload = PresetPayload::new(&name, line.clone());
        let mut path = self.root.join(format!("{}.json", sanitize_component(&name)));
        if path.exists() {
            path = self.root.join(format!(
                "{}_{}.json",
                sanitize_component(&name),
                payload.saved_at.format("%Y%m%d%H%M%S%3f")
            ));
        }
        self.write_payload(&path, &payload)?;
        info!(name = %name, path = %path.display(), "preset created");
        Ok(payload.entry(path))
    }

    /// Push a new state onto an existing preset.
    pub fn update(&self, entry: &PresetEntry, line: &LineData) -> Result<PresetEntry> {
        let mut payload = self.read_payload(&entry.path)?;
        payload.push_line(line.clone());
        self.write_payload(&entry.path, &payload)?;
        Ok(payload.entry(entry.path.clone()))
    }

    pub fn load(&self, entry: &PresetEntry) -> Result<PresetPayload> {
        let mut payload = self.read_payload(&entry.path)?;
        payload.normalize_history();
        Ok(payload)
    }

    /// Move the active state without altering the history itself.
    pub fn set_history_index(
        &self,
        entry: &PresetEntry,
        index: usize,
    ) -> Result<(PresetEntry, PresetPayload)> {
        let mut payload = self.read_payload(&entry.path)?;
        payload
            .set_history_index(index)
            .with_context(|| format!("failed to set history index to {index}"))?;
        self.write_payload(&entry.path, &payload)?;
        Ok((payload.entry(entry.path.clone()), payload))
    }

    /// Step back one state. `None` when already at the oldest.
    pub fn undo(&self, entry: &PresetEntry) -> Result<Option<PresetPayload>> {
        let payload = self.load(entry)?;
        if !payload.can_undo() {
            return Ok(None);
        }
        let (_, payload) = self.set_history_index(entry, payload.history_index - 1)?;
        Ok(Some(payload))
    }

    /// Step forward one state. `None` when already at the newest.
    pub fn redo(&self, entry: &PresetEntry) -> Result<Option<PresetPayload>> {
        let payload = self.load(entry)?;
        if !payload.can_redo() {
            return Ok(None);
        }
        let (_, payload) = self.set_history_index(entry, payload.history_index + 1)?;
        Ok(Some(payload))
    }

    pub fn delete(&self, entry: &PresetEntry) -> Result<()> {
        fs::remove_file(&entry.path)
            .with_context(|| format!("failed to delete {}", entry.path.display()))?;
        info!(name = %entry.name, "preset deleted");
        Ok(())
    }

    fn write_payload(&self, path: &Path, payload: &PresetPayload) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let serialised = serde_json::to_vec_pretty(payload)?;
        fs::write(path, serialised).with_context(|| format!("failed to write {}", path.display()))
    }

    fn read_payload(&self, path: impl AsRef<Path>) -> Result<PresetPayload> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// File-name-safe version of a preset name. Keeps letters and digits of any
/// script, maps whitespace to `_`.
fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_alphanumeric() || matches!(ch, '-' | '_') {
            result.push(ch);
        } else if ch.is_whitespace() && !result.ends_with('_') {
            result.push('_');
        }
    }
    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        "preset".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Station;
    use tempfile::tempdir;

    fn line(stations: &[&str]) -> LineData {
        let mut line = LineData::default();
        line.meta.line_name = "<red>1号线</>".into();
        line.stations = stations.iter().map(|name| Station::new(*name, *name)).collect();
        line
    }

    #[test]
    fn preset_history_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = PresetStore::new(dir.path());

        let entry = store.save(None, &line(&["A", "B"]))?;
        assert_eq!(entry.name, "1号线");
        assert!(entry.path.ends_with("1号线.json"));

        let updated = store.save(Some("1号线"), &line(&["A", "B", "C"]))?;
        assert_eq!(updated.path, entry.path);
        assert_eq!(store.entries()?.len(), 1);

        let payload = store.load(&updated)?;
        assert_eq!(payload.history_len(), 2);
        assert_eq!(payload.line().len(), 3);

        let undone = store.undo(&updated)?.expect("undo available");
        assert_eq!(undone.line().len(), 2);
        assert!(store.undo(&updated)?.is_none());
        let redone = store.redo(&updated)?.expect("redo available");
        assert_eq!(redone.line().len(), 3);
        assert!(store.redo(&updated)?.is_none());
        Ok(())
    }

    #[test]
    fn editing_after_undo_drops_redo_tail() -> Result<()> {
        let dir = tempdir()?;
        let store = PresetStore::new(dir.path());
        let entry = store.save(Some("demo"), &line(&["A"]))?;
        store.update(&entry, &line(&["A", "B"]))?;
        store.undo(&entry)?;
        store.update(&entry, &line(&["A", "Z"]))?;

        let payload = store.load(&entry)?;
        assert_eq!(payload.history_len(), 2);
        assert_eq!(payload.history_index(), 1);
        assert!(!payload.can_redo());
        assert_eq!(payload.line().stations[1].name, "Z");

        store.update(&entry, &line(&["A", "Z"]))?;
        assert_eq!(store.load(&entry)?.history_len(), 2);
        Ok(())
    }

    #[test]
    fn history_is_bounded() -> Result<()> {
        let dir = tempdir()?;
        let store = PresetStore::new(dir.path());
        let entry = store.save(Some("long"), &line(&["0"]))?;
        for i in 1..=HISTORY_LIMIT + 5 {
            store.update(&entry, &line(&[&i.to_string()]))?;
        }
        let payload = store.load(&entry)?;
        assert_eq!(payload.history_len(), HISTORY_LIMIT);
        assert_eq!(payload.history_index(), HISTORY_LIMIT - 1);
        Ok(())
    }

    #[test]
    fn delete_removes_file() -> Result<()> {
        let dir = tempdir()?;
        let store = PresetStore::new(dir.path());
        let entry = store.save(Some("gone"), &line(&["A"]))?;
        store.delete(&entry)?;
        assert!(store.entries()?.is_empty());
        assert!(store.find("gone")?.is_none());
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_component("Line 1 / Express!"), "Line_1_Express");
        assert_eq!(sanitize_component("机场线"), "机场线");
        assert_eq!(sanitize_component("???"), "preset");
    }
}
