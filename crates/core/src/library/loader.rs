use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::PidsError;
use crate::markup;
use crate::models::{LineData, LineMode};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Summary of a line definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct LineEntry {
    pub path: PathBuf,
    /// Line name without markup, or the file stem when unnamed.
    pub name: String,
    pub mode: LineMode,
    pub station_count: usize,
    /// Plain station names in both languages, for search.
    pub station_names: Vec<String>,
    pub modified: Option<DateTime<Utc>>,
}

/// Thread-safe index of line files below a directory.
#[derive(Clone)]
pub struct LineLibrary {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    root: PathBuf,
    cache: Option<Vec<LineEntry>>,
}

impl LineLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                root: root.into(),
                cache: None,
            })),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.inner.read().root.clone()
    }

    /// Forget cached entries, optionally switching to a new root.
    pub fn refresh(&self, root: Option<PathBuf>) {
        let mut inner = self.inner.write();
        if let Some(root) = root {
            inner.root = root;
        }
        inner.cache = None;
    }

    /// All discovered lines, scanning the tree on first use.
    pub fn entries(&self) -> Result<Vec<LineEntry>> {
        if let Some(cache) = &self.inner.read().cache {
            return Ok(cache.clone());
        }
        let mut inner = self.inner.write();
        let entries = discover_lines(&inner.root)?;
        inner.cache = Some(entries.clone());
        Ok(entries)
    }

    /// Case-insensitive substring search over file, line and station names.
    pub fn entries_matching(&self, query: &str) -> Result<Vec<LineEntry>> {
        let needle = normalize(query);
        if needle.is_empty() {
            return self.entries();
        }
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| {
                normalize(&entry.name).contains(&needle)
                    || entry
                        .path
                        .file_stem()
                        .map(|stem| normalize(&stem.to_string_lossy()).contains(&needle))
                        .unwrap_or(false)
                    || entry
                        .station_names
                        .iter()
                        .any(|name| normalize(name).contains(&needle))
            })
            .collect())
    }

    /// Load the line behind `entry`.
    pub fn load(&self, entry: &LineEntry) -> Result<LineData> {
        read_line_file(&entry.path)
            .with_context(|| format!("failed to load line {}", entry.name))
    }
}

fn normalize(value: &str) -> String {
    WHITESPACE
        .replace_all(value.trim(), " ")
        .to_lowercase()
}

/// Parse and normalize a line definition file.
pub fn read_line_file(path: impl AsRef<Path>) -> Result<LineData, PidsError> {
    let path = path.as_ref();
    let invalid = |reason: String| PidsError::InvalidLine {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
    let mut line: LineData =
        serde_json::from_str(&contents).map_err(|err| invalid(err.to_string()))?;
    line.normalize();
    Ok(line)
}

/// Write `line` as pretty JSON, creating parent directories.
pub fn write_line_file(path: impl AsRef<Path>, line: &LineData) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_vec_pretty(line).context("failed to serialize line")?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

fn discover_lines(root: &Path) -> Result<Vec<LineEntry>> {
    if !root.is_dir() {
        debug!(root = %root.display(), "line directory missing");
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for item in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                warn!("skipping unreadable path below {}: {err}", root.display());
                continue;
            }
        };
        if !item.file_type().is_file()
            || item.path().extension().and_then(|ext| ext.to_str()) != Some("json")
        {
            continue;
        }
        match build_entry(item.path()) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!("skipping {}: {err}", item.path().display()),
        }
    }
    Ok(entries)
}

fn build_entry(path: &Path) -> Result<LineEntry> {
    let line = read_line_file(path)?;
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    let name = Some(markup::strip(&line.meta.line_name))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
        })
        .unwrap_or_default();
    let station_names = line
        .stations
        .iter()
        .flat_map(|station| [markup::strip(&station.name), markup::strip(&station.en)])
        .filter(|name| !name.is_empty())
        .collect();

    Ok(LineEntry {
        path: path.to_path_buf(),
        name,
        mode: line.meta.mode,
        station_count: line.len(),
        station_names,
        modified,
    })
}
