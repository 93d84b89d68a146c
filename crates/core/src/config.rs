//! Application configuration.
//!
//! Layers, lowest priority first: built-in defaults, `~/.config/pids/config.toml`,
//! then `PIDS_*` environment variables using `__` between nested keys
//! (`PIDS_MARQUEE__SPEED=60`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::layout::{DisplayProfile, MarqueeConfig, RingParams};

/// Directory name under the platform config/cache roots.
pub const APP_DIR: &str = "pids";

const DEFAULT_CONFIG: &str = r#"# pids configuration. Every key is optional.

# cache_root = "~/.cache/pids"
# lines_dir = "~/.config/pids/lines"
# presets_dir = "~/.config/pids/presets"
# active_line = "~/.config/pids/lines/line1.json"
# preset_api_url = "http://localhost:8080/api/"

[display]
width = 1920
height = 1080
scale_percent = 100
cell_width = 8.0

[marquee]
speed = 40.0
pad = 48.0
min_secs = 4.0
max_secs = 30.0
separator = "    "
char_threshold = 12

[ring]
min_total_width = 600.0
min_station_spacing = 64.0
radius = 80.0
origin_x = 120.0
origin_y = 40.0
"#;

/// Resolution the displays assume, plus terminal cell size used to map layout
/// units onto columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    pub scale_percent: u32,
    /// Layout units per terminal column.
    pub cell_width: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            scale_percent: 100,
            cell_width: 8.0,
        }
    }
}

impl DisplaySettings {
    pub fn profile(&self) -> DisplayProfile {
        DisplayProfile::new(self.width, self.height, f64::from(self.scale_percent) / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Snapshot cache and other disposable state.
    pub cache_root: PathBuf,
    /// Searched recursively for line files.
    pub lines_dir: PathBuf,
    pub presets_dir: PathBuf,
    /// Line opened at startup and watched for changes.
    pub active_line: Option<PathBuf>,
    pub preset_api_url: Option<String>,
    pub display: DisplaySettings,
    pub marquee: MarqueeConfig,
    pub ring: RingParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_root: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join(APP_DIR),
            lines_dir: config_dir().join("lines"),
            presets_dir: config_dir().join("presets"),
            active_line: None,
            preset_api_url: None,
            display: DisplaySettings::default(),
            marquee: MarqueeConfig::default(),
            ring: RingParams::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default config file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Some(&config_path()))
    }

    /// Load with an explicit (optional) config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder().add_source(
            ::config::Config::try_from(&AppConfig::default())
                .context("failed to build default configuration")?,
        );
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path.to_path_buf()).required(false));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("PIDS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;
        let mut config: AppConfig = settings
            .try_deserialize()
            .context("invalid configuration")?;
        config.expand_home();
        Ok(config)
    }

    /// Location of the snapshot cache file.
    pub fn snapshot_cache_path(&self) -> PathBuf {
        crate::sync::cache::cache_path(&self.cache_root)
    }

    fn expand_home(&mut self) {
        for path in [&mut self.cache_root, &mut self.lines_dir, &mut self.presets_dir] {
            *path = expand_tilde(path);
        }
        if let Some(active) = &mut self.active_line {
            *active = expand_tilde(active);
        }
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Write the commented default config file when none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_file_matches_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        write_default_config(&path)?;
        let config = AppConfig::load_from(Some(&path))?;
        assert_eq!(config.marquee, MarqueeConfig::default());
        assert_eq!(config.display, DisplaySettings::default());
        Ok(())
    }

    #[test]
    fn file_overrides_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "lines_dir = \"/srv/lines\"\npreset_api_url = \"http://localhost:8080/\"\n[marquee]\nspeed = 60.0\n",
        )?;
        let config = AppConfig::load_from(Some(&path))?;
        assert_eq!(config.lines_dir, PathBuf::from("/srv/lines"));
        assert_eq!(config.marquee.speed, 60.0);
        assert_eq!(config.marquee.pad, 48.0);
        assert_eq!(config.preset_api_url.as_deref(), Some("http://localhost:8080/"));
        Ok(())
    }

    #[test]
    fn existing_file_is_left_alone() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "# mine\n")?;
        write_default_config(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "# mine\n");
        Ok(())
    }

    #[test]
    fn profile_from_scale_percent() {
        let display = DisplaySettings {
            scale_percent: 150,
            ..DisplaySettings::default()
        };
        assert_eq!(display.profile().scale_percent(), 150);
    }
}
