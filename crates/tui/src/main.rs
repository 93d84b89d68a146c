mod app;
mod clock_font;
mod display;

use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::sync::Arc;

use pids_core::{
    config::{self, AppConfig},
    library::read_line_file,
    models::{LineData, LineMode, Station, Transfer},
    sync::FileSnapshotCache,
    Controller, SyncBus,
};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Displays opened at startup.
const INITIAL_DISPLAYS: usize = 1;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let line = match &config.active_line {
        Some(path) => match read_line_file(path) {
            Ok(line) => line,
            Err(err) => {
                warn!("falling back to the demo line: {err}");
                demo_line()
            }
        },
        None => demo_line(),
    };

    let cache = Arc::new(FileSnapshotCache::in_dir(&config.cache_root));
    info!(cache = %cache.path().display(), "snapshot cache ready");
    let bus = SyncBus::default();
    let controller = Controller::new(line);
    let active_line = config.active_line.clone();

    let mut app = app::PidsApp::new(config, controller, bus, cache);
    if let Some(path) = active_line.filter(|path| path.is_file()) {
        app.watch_line(path);
    }
    app.run(INITIAL_DISPLAYS).await
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("pids.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Stdout belongs to the terminal UI, so everything goes to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}

/// Built-in line used when no line file is configured.
fn demo_line() -> LineData {
    let names = [
        ("西直门", "Xizhimen"),
        ("积水潭", "Jishuitan"),
        ("鼓楼大街", "Gulou Dajie"),
        ("安定门", "Andingmen"),
        ("雍和宫", "Yonghegong Lama Temple"),
        ("东直门", "Dongzhimen"),
        ("东四十条", "Dongsi Shitiao"),
        ("朝阳门", "Chaoyangmen"),
        ("建国门", "Jianguomen"),
        ("北京站", "Beijing Railway Station"),
        ("崇文门", "Chongwenmen"),
        ("前门", "Qianmen"),
        ("和平门", "Hepingmen"),
        ("宣武门", "Xuanwumen"),
        ("长椿街", "Changchunjie"),
        ("复兴门", "Fuxingmen"),
        ("阜成门", "Fuchengmen"),
        ("车公庄", "Chegongzhuang"),
    ];
    let mut line = LineData::default();
    line.meta.line_name = "<#004b87>2号线</> Line 2".to_string();
    line.meta.theme_color = "#004b87".to_string();
    line.meta.mode = LineMode::Loop;
    line.meta.dir_type = line.meta.dir_type.for_mode(LineMode::Loop);
    line.stations = names
        .iter()
        .map(|(name, en)| Station::new(*name, *en))
        .collect();
    let transfers = [
        (0, "4号线", "#008e9c"),
        (5, "机场线", "#a29bbb"),
        (8, "1号线", "#c23a30"),
        (15, "1号线", "#c23a30"),
    ];
    for (idx, label, color) in transfers {
        if let Some(station) = line.stations.get_mut(idx) {
            station.xfer.push(Transfer {
                line: label.to_string(),
                color: color.to_string(),
                ..Transfer::default()
            });
        }
    }
    line
}
