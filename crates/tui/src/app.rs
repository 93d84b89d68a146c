use std::{
    future::Future,
    io,
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pids_core::{
    config::AppConfig,
    layout::{theme_color, DisplayProfile, DriftWarning, ProfileMonitor},
    library::{LibraryEvent, LineEntry, LineLibrary, LineWatcher, PresetClient, PresetEntry, PresetStore},
    markup,
    models::{Dock, LineData},
    route::{short_turn_range, ControlAction},
    sync::{
        spawn_display, ControllerLink, ControllerRequest, NoopRecorder, Recorder, SnapshotStore,
        SyncBus, WindowId, WindowUpdate,
    },
    Controller, PidsError,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::display::{draw_display, rgb, styled_spans, DisplayPane, RenderContext};

const TICK_RATE: Duration = Duration::from_millis(250);
/// Bitrate requested when recording is toggled on.
const RECORDING_BPS: u64 = 8_000_000;

#[derive(Debug, Clone, Copy)]
struct Theme {
    accent: Color,
    text: Color,
    muted: Color,
    warning: Color,
    selection_bg: Color,
    selection_fg: Color,
}

impl Theme {
    /// Accent follows the line's theme color.
    fn for_line(line: &LineData) -> Self {
        let accent = theme_color(&line.meta);
        Self {
            accent: rgb(accent),
            text: Color::White,
            muted: Color::DarkGray,
            warning: Color::Yellow,
            selection_bg: rgb(accent),
            selection_fg: rgb(pids_core::color::arrow_color(accent)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Controller,
    Display(usize),
}

enum AppEvent {
    Input(Event),
    Tick,
    PresetUploaded(Result<String>),
    RemoteListed(Result<Vec<String>>),
    RemoteFetched(Result<(String, LineData)>),
    RemoteDeleted(Result<String>),
}

/// Line picker overlay over the line library.
struct LibraryPicker {
    entries: Vec<LineEntry>,
    filter: String,
    cursor: usize,
}

/// Presets stored behind the preset API.
struct RemotePicker {
    names: Vec<String>,
    cursor: usize,
}

/// Terminal host: the controller panel plus any number of display windows.
pub struct PidsApp {
    config: AppConfig,
    controller: Controller,
    bus: SyncBus,
    link: ControllerLink,
    cache: Arc<dyn SnapshotStore>,
    recorder: Arc<dyn Recorder>,
    displays: Vec<DisplayPane>,
    update_tx: mpsc::Sender<WindowUpdate>,
    update_rx: mpsc::Receiver<WindowUpdate>,
    library: LineLibrary,
    picker: Option<LibraryPicker>,
    remote_picker: Option<RemotePicker>,
    watcher: Option<LineWatcher>,
    library_rx: Option<mpsc::Receiver<LibraryEvent>>,
    presets: PresetStore,
    active_preset: Option<PresetEntry>,
    preset_client: Option<PresetClient>,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    monitor: ProfileMonitor,
    drift: Option<DriftWarning>,
    /// Latest terminal size not yet checked for drift.
    pending_resize: Option<(u16, u16)>,
    focus: Focus,
    cursor: usize,
    short_turn_anchor: Option<usize>,
    recording: bool,
    started: Instant,
    status: String,
    should_quit: bool,
}

impl PidsApp {
    pub fn new(
        config: AppConfig,
        controller: Controller,
        bus: SyncBus,
        cache: Arc<dyn SnapshotStore>,
    ) -> Self {
        let link = ControllerLink::new(&bus, cache.clone());
        let (update_tx, update_rx) = mpsc::channel(64);
        let preset_client = config.preset_api_url.as_deref().and_then(|url| {
            PresetClient::new(url)
                .map_err(|err| warn!("preset API disabled: {err}"))
                .ok()
        });
        Self {
            library: LineLibrary::new(config.lines_dir.clone()),
            presets: PresetStore::new(config.presets_dir.clone()),
            monitor: ProfileMonitor::new(config.display.profile()),
            config,
            controller,
            bus,
            link,
            cache,
            recorder: Arc::new(NoopRecorder),
            displays: Vec::new(),
            update_tx,
            update_rx,
            picker: None,
            remote_picker: None,
            watcher: None,
            library_rx: None,
            active_preset: None,
            preset_client,
            event_tx: None,
            drift: None,
            pending_resize: None,
            focus: Focus::Controller,
            cursor: 0,
            short_turn_anchor: None,
            recording: false,
            started: Instant::now(),
            status: "Ready".to_string(),
            should_quit: false,
        }
    }

    /// Watch `path` and reload the controller's line whenever it changes.
    pub fn watch_line(&mut self, path: PathBuf) {
        let (tx, rx) = mpsc::channel(16);
        match LineWatcher::spawn(&path, Some(self.controller.line().clone()), tx) {
            Ok(watcher) => {
                self.watcher = Some(watcher);
                self.library_rx = Some(rx);
            }
            Err(err) => {
                error!(?err, "failed to watch line file");
                self.set_status(format!("Watching {} failed: {err}", path.display()));
            }
        }
    }

    pub async fn run(&mut self, initial_displays: usize) -> Result<()> {
        self.publish();
        for _ in 0..initial_displays {
            self.open_display();
        }

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let size = terminal.size()?;
        self.monitor = ProfileMonitor::new(self.terminal_profile(size.width, size.height));

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    if !self.process_app_event(maybe_event) {
                        break;
                    }
                }
                Some(request) = self.link.next_request() => self.handle_request(request),
                Some(update) = self.update_rx.recv() => self.handle_window_update(update),
                maybe_library = recv_optional(self.library_rx.as_mut()) => match maybe_library {
                    Some(event) => self.handle_library_event(event),
                    None => self.library_rx = None,
                },
            }

            if self.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        self.displays.clear();
        info!("shutting down");
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            Some(AppEvent::PresetUploaded(result)) => {
                match result {
                    Ok(message) => self.set_status(message),
                    Err(err) => {
                        error!(?err, "preset upload failed");
                        self.set_status(format!("Upload failed: {err:#}"));
                    }
                }
                true
            }
            Some(AppEvent::RemoteListed(result)) => {
                match result {
                    Ok(names) if names.is_empty() => self.set_status("No remote presets"),
                    Ok(names) => {
                        self.set_status(format!("{} remote presets", names.len()));
                        self.remote_picker = Some(RemotePicker { names, cursor: 0 });
                    }
                    Err(err) => self.remote_failed("listing", err),
                }
                true
            }
            Some(AppEvent::RemoteFetched(result)) => {
                match result {
                    Ok((name, line)) => {
                        self.replace_line(line);
                        self.set_status(format!("Downloaded remote preset {name}"));
                    }
                    Err(err) => self.remote_failed("download", err),
                }
                true
            }
            Some(AppEvent::RemoteDeleted(result)) => {
                match result {
                    Ok(name) => {
                        if let Some(picker) = self.remote_picker.as_mut() {
                            picker.names.retain(|entry| *entry != name);
                            picker.cursor = picker.cursor.min(picker.names.len().saturating_sub(1));
                        }
                        self.set_status(format!("Deleted remote preset {name}"));
                    }
                    Err(err) => self.remote_failed("delete", err),
                }
                true
            }
            None => false,
        }
    }

    fn remote_failed(&mut self, what: &str, err: anyhow::Error) {
        error!(?err, what, "preset API request failed");
        self.set_status(format!("Remote {what} failed: {err:#}"));
    }

    fn handle_tick(&mut self) {
        if let Some((columns, rows)) = self.pending_resize.take() {
            self.check_drift(columns, rows);
        }
        let before = self.displays.len();
        self.displays.retain(|pane| !pane.window.is_finished());
        if self.displays.len() != before {
            warn!(closed = before - self.displays.len(), "display task ended");
            self.clamp_focus();
        }
    }

    fn handle_request(&mut self, request: ControllerRequest) {
        match self.link.respond(request, &mut self.controller) {
            Ok(true) => debug!(revision = self.controller.revision(), "published after request"),
            Ok(false) => {}
            Err(err) => {
                warn!("failed to answer display request: {err}");
                self.set_status(format!("Sync failed: {err}"));
            }
        }
    }

    fn handle_window_update(&mut self, update: WindowUpdate) {
        match update {
            WindowUpdate::View {
                window,
                view,
                state,
            } => {
                if let Some(pane) = self.pane_mut(window) {
                    pane.view = Some(view);
                    pane.state = state;
                }
            }
            WindowUpdate::Recording { window, bps } => {
                if let Some(pane) = self.pane_mut(window) {
                    pane.recording = bps;
                }
            }
        }
    }

    fn handle_library_event(&mut self, event: LibraryEvent) {
        match event {
            LibraryEvent::Reloaded { path, line } => {
                info!(path = %path.display(), "line file reloaded");
                self.controller.load_line(line);
                self.clamp_cursor();
                self.publish();
                self.set_status(format!("Reloaded {}", path.display()));
            }
            LibraryEvent::Error(err) => {
                error!(?err, "line watcher error");
                self.set_status(format!("Line reload failed: {err}"));
            }
        }
    }

    fn pane_mut(&mut self, window: WindowId) -> Option<&mut DisplayPane> {
        self.displays
            .iter_mut()
            .find(|pane| pane.window.id() == window)
    }

    fn publish(&mut self) {
        if let Err(err) = self.link.publish(self.controller.snapshot()) {
            error!("failed to publish snapshot: {err}");
            self.set_status(format!("Publish failed: {err}"));
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn check_drift(&mut self, columns: u16, rows: u16) {
        let current = self.terminal_profile(columns, rows);
        self.drift = self.monitor.check(current);
        if let Some(warning) = &self.drift {
            warn!("{}", warning.message());
        }
    }

    fn terminal_profile(&self, columns: u16, rows: u16) -> DisplayProfile {
        let settings = &self.config.display;
        if columns == 0 || rows == 0 {
            return settings.profile();
        }
        // Terminal cells are roughly twice as tall as they are wide.
        let width = (f64::from(columns) * settings.cell_width).round() as u32;
        let height = (f64::from(rows) * settings.cell_width * 2.0).round() as u32;
        DisplayProfile::new(width, height, settings.profile().device_pixel_ratio)
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                if self.picker.is_some() {
                    return self.handle_picker_key(key);
                }
                if self.remote_picker.is_some() {
                    return self.handle_remote_picker_key(key);
                }
                if self.handle_global_shortcut(&key)? {
                    return Ok(());
                }
                match self.focus {
                    Focus::Controller => self.handle_controller_key(key),
                    Focus::Display(index) => self.handle_display_key(index, key),
                }
            }
            Event::Resize(columns, rows) => {
                self.pending_resize = Some((columns, rows));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_global_shortcut(&mut self, key: &KeyEvent) -> Result<bool> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    return Ok(true);
                }
                KeyCode::Char('r') => {
                    self.apply_history_step(1)?;
                    return Ok(true);
                }
                _ => return Ok(false),
            }
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => self.cycle_focus(1),
            KeyCode::BackTab => self.cycle_focus(-1),
            KeyCode::Char('n') => self.open_display(),
            KeyCode::Char('x') => self.close_display(),
            KeyCode::Char('r') => self.toggle_recording(),
            KeyCode::Esc if self.focus != Focus::Controller => self.focus = Focus::Controller,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_controller_key(&mut self, key: KeyEvent) -> Result<()> {
        let len = self.controller.line().len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.saturating_sub(1);
                return Ok(());
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor + 1 < len {
                    self.cursor += 1;
                }
                return Ok(());
            }
            KeyCode::Char('g') => {
                self.controller.jump_to(self.cursor);
                self.set_status(format!("Jumped to {}", self.station_label(self.cursor)));
            }
            KeyCode::Char('s') => {
                self.controller.toggle_skip(self.cursor);
                self.set_status(format!("Toggled skip at {}", self.station_label(self.cursor)));
            }
            KeyCode::Char('e') => {
                self.controller.toggle_express_stop(self.cursor);
                self.set_status(format!(
                    "Toggled express stop at {}",
                    self.station_label(self.cursor)
                ));
            }
            KeyCode::Char('b') => {
                self.controller.cycle_dock(self.cursor);
                self.set_status(format!("Dock changed at {}", self.station_label(self.cursor)));
            }
            KeyCode::Char('o') => {
                self.controller.toggle_mode();
                self.set_status("Switched line mode");
            }
            KeyCode::Char('t') => match self.short_turn_anchor.take() {
                None => {
                    self.short_turn_anchor = Some(self.cursor);
                    self.set_status(format!(
                        "Short turn from {}; press t again on the terminal",
                        self.station_label(self.cursor)
                    ));
                    return Ok(());
                }
                Some(anchor) => {
                    self.controller.set_short_turn(anchor, self.cursor);
                    self.set_status(format!(
                        "Short turn {} - {}",
                        self.station_label(anchor),
                        self.station_label(self.cursor)
                    ));
                }
            },
            KeyCode::Char('c') => {
                self.short_turn_anchor = None;
                self.controller.clear_short_turn();
                self.set_status("Short turn cleared");
            }
            KeyCode::Char('w') => return self.save_preset(),
            KeyCode::Char('u') => return self.apply_history_step(-1),
            KeyCode::Char('p') => return self.upload_preset(),
            KeyCode::Char('l') => return self.open_picker(),
            KeyCode::Char('P') => return self.open_remote_picker(),
            _ => {
                let Some((code, _)) = dom_key(&key) else {
                    return Ok(());
                };
                let Some(action) = ControlAction::from_key(&code) else {
                    return Ok(());
                };
                if !self.controller.apply(action) {
                    return Ok(());
                }
                if matches!(action, ControlAction::JumpFirst | ControlAction::JumpLast) {
                    self.cursor = self.controller.route().idx;
                }
            }
        }
        self.publish();
        Ok(())
    }

    fn handle_display_key(&mut self, index: usize, key: KeyEvent) -> Result<()> {
        let Some(pane) = self.displays.get_mut(index) else {
            self.focus = Focus::Controller;
            return Ok(());
        };
        if key.code == KeyCode::Char('v') {
            pane.screen = pane.screen.toggled();
            return Ok(());
        }
        let Some((code, name)) = dom_key(&key) else {
            return Ok(());
        };
        let forwarded = pane.window.forward_key(&code, &name, false)?;
        debug!(code = %code, forwarded, "display key");
        Ok(())
    }

    fn open_display(&mut self) {
        let window = spawn_display(
            Some(&self.bus),
            self.cache.clone(),
            self.update_tx.clone(),
            self.recorder.clone(),
        );
        self.displays.push(DisplayPane::new(window));
        self.focus = Focus::Display(self.displays.len() - 1);
        self.set_status(format!(
            "Opened display ({} subscribers)",
            self.bus.subscriber_count()
        ));
    }

    fn close_display(&mut self) {
        let Focus::Display(index) = self.focus else {
            self.set_status("Focus a display to close it");
            return;
        };
        if index < self.displays.len() {
            let pane = self.displays.remove(index);
            info!(window = pane.window.id(), "display window closed");
        }
        self.clamp_focus();
        self.set_status("Display closed");
    }

    fn toggle_recording(&mut self) {
        let result = if self.recording {
            self.link.stop_recording()
        } else {
            self.link.start_recording(RECORDING_BPS)
        };
        match result {
            Ok(()) => {
                self.recording = !self.recording;
                self.set_status(if self.recording {
                    "Recording started"
                } else {
                    "Recording stopped"
                });
            }
            Err(err) => self.set_status(format!("Recording command failed: {err}")),
        }
    }

    fn cycle_focus(&mut self, delta: isize) {
        let slots = self.displays.len() as isize + 1;
        let current = match self.focus {
            Focus::Controller => 0,
            Focus::Display(index) => index as isize + 1,
        };
        self.focus = match (current + delta).rem_euclid(slots) {
            0 => Focus::Controller,
            slot => Focus::Display(slot as usize - 1),
        };
    }

    fn clamp_focus(&mut self) {
        if let Focus::Display(index) = self.focus {
            self.focus = match self.displays.len() {
                0 => Focus::Controller,
                len => Focus::Display(index.min(len - 1)),
            };
        }
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self
            .cursor
            .min(self.controller.line().len().saturating_sub(1));
    }

    fn station_label(&self, idx: usize) -> String {
        self.controller
            .line()
            .station(idx)
            .map(|station| markup::strip(&station.name))
            .unwrap_or_else(|| format!("#{idx}"))
    }

    fn preset_name(&self) -> String {
        let name = markup::strip(&self.controller.line().meta.line_name);
        let name = name.trim();
        if name.is_empty() {
            "preset".to_string()
        } else {
            name.to_string()
        }
    }

    fn save_preset(&mut self) -> Result<()> {
        let entry = match &self.active_preset {
            Some(entry) => self.presets.update(entry, self.controller.line())?,
            None => self.presets.save(None, self.controller.line())?,
        };
        self.set_status(format!("Saved preset {}", entry.name));
        self.active_preset = Some(entry);
        Ok(())
    }

    fn apply_history_step(&mut self, delta: isize) -> Result<()> {
        let Some(entry) = self.active_preset.clone() else {
            self.set_status("No preset saved yet (w)");
            return Ok(());
        };
        let payload = if delta < 0 {
            self.presets.undo(&entry)?
        } else {
            self.presets.redo(&entry)?
        };
        let Some(payload) = payload else {
            self.set_status(if delta < 0 {
                "Nothing to undo"
            } else {
                "Nothing to redo"
            });
            return Ok(());
        };
        let position = format!("{}/{}", payload.history_index() + 1, payload.history_len());
        self.controller.load_line(payload.into_line());
        self.clamp_cursor();
        self.publish();
        self.set_status(format!("Preset history {position}"));
        Ok(())
    }

    /// Run a preset API call in the background and feed its outcome back
    /// through the event channel.
    fn spawn_remote<F, Fut>(&mut self, status: String, request: F) -> Result<()>
    where
        F: FnOnce(PresetClient) -> Fut,
        Fut: Future<Output = AppEvent> + Send + 'static,
    {
        let Some(client) = self.preset_client.clone() else {
            self.set_status("No preset_api_url configured");
            return Ok(());
        };
        let Some(sender) = self.event_tx.clone() else {
            return Ok(());
        };
        self.set_status(status);
        let task = request(client);
        tokio::spawn(async move {
            let _ = sender.send(task.await).await;
        });
        Ok(())
    }

    fn upload_preset(&mut self) -> Result<()> {
        let name = self.preset_name();
        let line = self.controller.line().clone();
        self.spawn_remote(format!("Uploading {name}..."), move |client| async move {
            AppEvent::PresetUploaded(upload_preset(client, name, line).await)
        })
    }

    fn open_remote_picker(&mut self) -> Result<()> {
        self.spawn_remote("Listing remote presets...".to_string(), |client| async move {
            AppEvent::RemoteListed(client.list().await.context("failed to list remote presets"))
        })
    }

    fn handle_remote_picker_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(picker) = self.remote_picker.as_mut() else {
            return Ok(());
        };
        let selected = picker.names.get(picker.cursor).cloned();
        match key.code {
            KeyCode::Esc => self.remote_picker = None,
            KeyCode::Up => picker.cursor = picker.cursor.saturating_sub(1),
            KeyCode::Down => {
                if picker.cursor + 1 < picker.names.len() {
                    picker.cursor += 1;
                }
            }
            KeyCode::Enter => {
                let Some(name) = selected else {
                    return Ok(());
                };
                self.remote_picker = None;
                return self.spawn_remote(format!("Downloading {name}..."), |client| async move {
                    let result = client
                        .fetch(&name)
                        .await
                        .with_context(|| format!("failed to download remote preset {name}"));
                    AppEvent::RemoteFetched(result.map(|line| (name, line)))
                });
            }
            KeyCode::Delete | KeyCode::Char('d') => {
                let Some(name) = selected else {
                    return Ok(());
                };
                return self.spawn_remote(format!("Deleting {name}..."), |client| async move {
                    let result = client
                        .delete(&name)
                        .await
                        .with_context(|| format!("failed to delete remote preset {name}"));
                    AppEvent::RemoteDeleted(result.map(|()| name))
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Swap in a whole new line and publish it.
    fn replace_line(&mut self, line: LineData) {
        self.controller.load_line(line);
        self.cursor = 0;
        self.short_turn_anchor = None;
        self.active_preset = None;
        self.publish();
    }

    fn open_picker(&mut self) -> Result<()> {
        self.library.refresh(None);
        let entries = self.library.entries()?;
        if entries.is_empty() {
            self.set_status(format!(
                "No line files under {}",
                self.library.root().display()
            ));
            return Ok(());
        }
        self.picker = Some(LibraryPicker {
            entries,
            filter: String::new(),
            cursor: 0,
        });
        Ok(())
    }

    fn handle_picker_key(&mut self, key: KeyEvent) -> Result<()> {
        let Some(picker) = self.picker.as_mut() else {
            return Ok(());
        };
        match key.code {
            KeyCode::Esc => {
                self.picker = None;
                return Ok(());
            }
            KeyCode::Up => picker.cursor = picker.cursor.saturating_sub(1),
            KeyCode::Down => {
                if picker.cursor + 1 < picker.entries.len() {
                    picker.cursor += 1;
                }
            }
            KeyCode::Backspace => {
                picker.filter.pop();
                picker.entries = self.library.entries_matching(&picker.filter)?;
                picker.cursor = 0;
            }
            KeyCode::Char(c) => {
                picker.filter.push(c);
                picker.entries = self.library.entries_matching(&picker.filter)?;
                picker.cursor = 0;
            }
            KeyCode::Enter => {
                let Some(entry) = picker.entries.get(picker.cursor).cloned() else {
                    return Ok(());
                };
                self.picker = None;
                let line = self.library.load(&entry)?;
                self.replace_line(line);
                self.watch_line(entry.path.clone());
                self.set_status(format!("Loaded {}", entry.name));
            }
            _ => {}
        }
        Ok(())
    }

    fn draw(&mut self, frame: &mut Frame) {
        let theme = Theme::for_line(self.controller.line());
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(4),
            ])
            .split(frame.size());

        self.render_tabs(frame, layout[0], &theme);
        match self.focus {
            Focus::Controller => self.draw_controller(frame, layout[1], &theme),
            Focus::Display(index) => match self.displays.get(index) {
                Some(pane) => {
                    let ctx = RenderContext {
                        marquee: &self.config.marquee,
                        ring: self.config.ring,
                        cell_width: self.config.display.cell_width.max(1.0),
                        visible_count: self.monitor.startup().visible_count(),
                        elapsed: self.started.elapsed(),
                        drift: self.drift.as_ref(),
                    };
                    draw_display(frame, layout[1], pane, &ctx);
                }
                None => self.draw_controller(frame, layout[1], &theme),
            },
        }
        self.render_status(frame, layout[2], &theme);

        if let Some(picker) = &self.picker {
            render_picker(frame, picker, &theme);
        }
        if let Some(picker) = &self.remote_picker {
            render_remote_picker(frame, picker, &theme);
        }
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let mut titles = vec![Line::from("控制器 Controller")];
        titles.extend(
            self.displays
                .iter()
                .enumerate()
                .map(|(position, pane)| Line::from(pane.title(position))),
        );
        let selected = match self.focus {
            Focus::Controller => 0,
            Focus::Display(index) => index + 1,
        };
        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL).title("PIDS"))
            .select(selected)
            .highlight_style(
                Style::default()
                    .fg(theme.selection_fg)
                    .bg(theme.selection_bg)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_controller(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(area);
        self.render_station_list(frame, columns[0], theme);
        self.render_route_info(frame, columns[1], theme);
    }

    fn render_station_list(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let line = self.controller.line();
        let route = self.controller.route();
        let range = short_turn_range(line);
        let items: Vec<ListItem> = line
            .stations
            .iter()
            .enumerate()
            .map(|(idx, station)| {
                let marker = if idx == route.idx {
                    if route.is_running() {
                        "▷ "
                    } else {
                        "▶ "
                    }
                } else {
                    "  "
                };
                let suppressed = pids_core::route::suppressed_at(line, idx);
                let base = if suppressed {
                    Style::default().fg(theme.muted)
                } else {
                    Style::default().fg(theme.text)
                };
                let mut spans = vec![
                    Span::styled(marker, Style::default().fg(theme.accent)),
                    Span::styled(format!("{idx:>3} "), Style::default().fg(theme.muted)),
                ];
                spans.extend(styled_spans(&station.name, base));
                spans.push(Span::styled(format!(" {}", station.en), base));

                let mut flags = Vec::new();
                if station.skip {
                    flags.push("skip".to_string());
                }
                if station.express_stop == Some(true) {
                    flags.push("express".to_string());
                }
                match station.dock {
                    Dock::Both => {}
                    Dock::Up => flags.push("dock:up".to_string()),
                    Dock::Down => flags.push("dock:down".to_string()),
                }
                if range.is_some_and(|(lo, hi)| idx == lo || idx == hi) {
                    flags.push("short-turn".to_string());
                }
                if self.short_turn_anchor == Some(idx) {
                    flags.push("anchor".to_string());
                }
                if !flags.is_empty() {
                    spans.push(Span::styled(
                        format!("  [{}]", flags.join(", ")),
                        Style::default().fg(theme.warning),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let mut state = ListState::default();
        if !line.is_empty() {
            state.select(Some(self.cursor));
        }
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("车站 Stations"))
            .highlight_style(
                Style::default()
                    .bg(theme.selection_bg)
                    .fg(theme.selection_fg),
            );
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_route_info(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let line = self.controller.line();
        let meta = &line.meta;
        let route = self.controller.route();
        let label = Style::default().fg(theme.muted);

        let mut name = vec![Span::styled("Line      ", label)];
        name.extend(styled_spans(
            &meta.line_name,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let short_turn = match short_turn_range(line) {
            Some((lo, hi)) => format!(
                "{} - {}{}",
                self.station_label(lo),
                self.station_label(hi),
                if meta.auto_short_turn { " (auto)" } else { "" }
            ),
            None => "none".to_string(),
        };
        let preset = self
            .active_preset
            .as_ref()
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| "unsaved".to_string());
        let watching = self
            .watcher
            .as_ref()
            .map(|watcher| watcher.path().display().to_string())
            .unwrap_or_else(|| "-".to_string());

        let row = |key: &'static str, value: String| {
            Line::from(vec![Span::styled(key, label), Span::raw(value)])
        };
        let lines = vec![
            Line::from(name),
            row("Mode      ", format!("{:?}", meta.mode)),
            row("Direction ", meta.dir_type.label().to_string()),
            row("Service   ", meta.service_mode.label().to_string()),
            row("Short turn", format!(" {short_turn}")),
            row(
                "Position  ",
                format!("{} ({:?})", self.station_label(route.idx), route.state),
            ),
            row("Revision  ", self.controller.revision().to_string()),
            row("Displays  ", self.displays.len().to_string()),
            row("Recording ", if self.recording { "on" } else { "off" }.to_string()),
            row("Preset    ", preset),
            row("Watching  ", watching),
            Line::from(""),
            Line::from(Span::styled(
                "←/→ space: retreat/advance  home/end: ends  d: direction  m: service",
                label,
            )),
            Line::from(Span::styled(
                "j/k: select  g: jump  s: skip  e: express  b: dock  o: loop/linear",
                label,
            )),
            Line::from(Span::styled(
                "t t: short turn  c: clear  w: save  u/^R: undo/redo  p/P: upload/remote  l: lines",
                label,
            )),
            Line::from(Span::styled(
                "n: new display  x: close  v: map/arrival  r: record  tab: switch  q: quit",
                label,
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("运行 Route"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let mut secondary = vec![Span::styled(
            format!(
                "Cache: {}  Lines: {}",
                self.config.snapshot_cache_path().display(),
                self.library.root().display()
            ),
            Style::default().fg(theme.muted),
        )];
        if let Some(warning) = &self.drift {
            secondary.push(Span::raw("  "));
            secondary.push(Span::styled(
                warning.message(),
                Style::default().fg(theme.warning),
            ));
        }
        let paragraph = Paragraph::new(vec![
            Line::from(self.status.clone()),
            Line::from(secondary),
        ])
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn render_picker(frame: &mut Frame, picker: &LibraryPicker, theme: &Theme) {
    let area = centered_rect(60, 60, frame.size());
    frame.render_widget(Clear, area);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let filter = Paragraph::new(format!("/{}", picker.filter))
        .block(Block::default().borders(Borders::ALL).title("Filter"));
    frame.render_widget(filter, chunks[0]);

    let items: Vec<ListItem> = picker
        .entries
        .iter()
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(entry.name.clone(), Style::default().fg(theme.text)),
                Span::styled(
                    format!("  {:?}, {} stations", entry.mode, entry.station_count),
                    Style::default().fg(theme.muted),
                ),
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if !picker.entries.is_empty() {
        state.select(Some(picker.cursor));
    }
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("线路 Lines (enter: load, esc: close)"),
        )
        .highlight_style(Style::default().bg(theme.selection_bg).fg(theme.selection_fg));
    frame.render_stateful_widget(list, chunks[1], &mut state);

    if picker.entries.is_empty() {
        let empty = Paragraph::new("No matches").alignment(Alignment::Center);
        frame.render_widget(empty, chunks[1].inner(&ratatui::layout::Margin::new(1, 2)));
    }
}

fn render_remote_picker(frame: &mut Frame, picker: &RemotePicker, theme: &Theme) {
    let area = centered_rect(50, 50, frame.size());
    frame.render_widget(Clear, area);
    let items: Vec<ListItem> = picker
        .names
        .iter()
        .map(|name| ListItem::new(Span::styled(name.clone(), Style::default().fg(theme.text))))
        .collect();
    let mut state = ListState::default();
    if !picker.names.is_empty() {
        state.select(Some(picker.cursor));
    }
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("远程 Remote presets (enter: download, d: delete, esc: close)"),
        )
        .highlight_style(Style::default().bg(theme.selection_bg).fg(theme.selection_fg));
    frame.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Update the remote preset, creating it when the server does not know it.
async fn upload_preset(client: PresetClient, name: String, line: LineData) -> Result<String> {
    match client.update(&name, &line).await {
        Ok(()) => Ok(format!("Updated remote preset {name}")),
        Err(PidsError::PresetApi { status: 404, .. }) => {
            client
                .create(&name, &line)
                .await
                .with_context(|| format!("failed to create remote preset {name}"))?;
            Ok(format!("Created remote preset {name}"))
        }
        Err(err) => Err(err).with_context(|| format!("failed to update remote preset {name}")),
    }
}

/// Browser-style `(code, key)` names for a terminal key press.
fn dom_key(key: &KeyEvent) -> Option<(String, String)> {
    let named = |name: &str| Some((name.to_string(), name.to_string()));
    match key.code {
        KeyCode::Char(' ') => Some(("Space".to_string(), " ".to_string())),
        KeyCode::Char(c) if c.is_ascii_alphabetic() => {
            Some((format!("Key{}", c.to_ascii_uppercase()), c.to_string()))
        }
        KeyCode::Char(c) if c.is_ascii_digit() => Some((format!("Digit{c}"), c.to_string())),
        KeyCode::Char(c) => Some((String::new(), c.to_string())),
        KeyCode::Enter => named("Enter"),
        KeyCode::Left => named("ArrowLeft"),
        KeyCode::Right => named("ArrowRight"),
        KeyCode::Up => named("ArrowUp"),
        KeyCode::Down => named("ArrowDown"),
        KeyCode::Home => named("Home"),
        KeyCode::End => named("End"),
        KeyCode::PageUp => named("PageUp"),
        KeyCode::PageDown => named("PageDown"),
        KeyCode::Backspace => named("Backspace"),
        KeyCode::Delete => named("Delete"),
        KeyCode::F(n) => Some((format!("F{n}"), format!("F{n}"))),
        _ => None,
    }
}

async fn recv_optional<T>(receiver: Option<&mut mpsc::Receiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pids_core::{
        models::Station,
        sync::{normalize_key, MemorySnapshotCache},
    };

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn demo_app() -> PidsApp {
        let mut line = LineData::default();
        line.meta.line_name = "<#e4002b>1号线</>".to_string();
        for name in ["A", "B", "C", "D"] {
            line.stations.push(Station::new(name, name));
        }
        PidsApp::new(
            AppConfig::default(),
            Controller::new(line),
            SyncBus::default(),
            Arc::new(MemorySnapshotCache::new()),
        )
    }

    #[test]
    fn terminal_keys_map_to_controller_actions() {
        let (code, key) = dom_key(&press(KeyCode::Char(' '))).unwrap();
        let command = normalize_key(&code, &key, false).unwrap();
        assert_eq!(ControlAction::from_key(&command.code), Some(ControlAction::Advance));

        let (code, _) = dom_key(&press(KeyCode::Char('d'))).unwrap();
        assert_eq!(ControlAction::from_key(&code), Some(ControlAction::ToggleDirection));
        let (code, _) = dom_key(&press(KeyCode::Left)).unwrap();
        assert_eq!(ControlAction::from_key(&code), Some(ControlAction::Retreat));
        assert!(dom_key(&press(KeyCode::Null)).is_none());
    }

    #[tokio::test]
    async fn controller_keys_edit_and_publish() -> Result<()> {
        let mut app = demo_app();
        app.handle_controller_key(press(KeyCode::Down))?;
        app.handle_controller_key(press(KeyCode::Char('s')))?;
        assert!(app.controller.line().stations[1].skip);

        app.handle_controller_key(press(KeyCode::Right))?;
        app.handle_controller_key(press(KeyCode::Right))?;
        assert_eq!(app.controller.route().idx, 2);

        app.handle_controller_key(press(KeyCode::Char('t')))?;
        assert_eq!(app.short_turn_anchor, Some(1));
        app.handle_controller_key(press(KeyCode::Char('c')))?;
        assert_eq!(app.short_turn_anchor, None);
        Ok(())
    }

    #[tokio::test]
    async fn focus_cycles_through_displays() {
        let mut app = demo_app();
        app.open_display();
        app.open_display();
        assert_eq!(app.focus, Focus::Display(1));
        app.cycle_focus(1);
        assert_eq!(app.focus, Focus::Controller);
        app.cycle_focus(-1);
        assert_eq!(app.focus, Focus::Display(1));
        app.close_display();
        assert_eq!(app.focus, Focus::Display(0));
        app.close_display();
        assert_eq!(app.focus, Focus::Controller);
    }

    #[test]
    fn resizes_settle_on_tick() -> Result<()> {
        let mut app = demo_app();
        app.handle_input(Event::Resize(200, 50))?;
        app.handle_input(Event::Resize(400, 60))?;
        assert!(app.drift.is_none());

        app.handle_tick();
        let warning = app.drift.as_ref().expect("wide terminal drifts");
        assert_eq!(warning.current.physical().0, 3200);
        assert!(app.pending_resize.is_none());

        app.handle_input(Event::Resize(200, 50))?;
        app.handle_tick();
        assert!(app.drift.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn remote_results_drive_the_picker() {
        let mut app = demo_app();
        app.process_app_event(Some(AppEvent::RemoteListed(Ok(vec![
            "Line 1".to_string(),
            "Airport".to_string(),
        ]))));
        assert_eq!(app.remote_picker.as_ref().map(|p| p.names.len()), Some(2));

        app.handle_input(Event::Key(press(KeyCode::Down))).unwrap();
        app.process_app_event(Some(AppEvent::RemoteDeleted(Ok("Airport".to_string()))));
        let picker = app.remote_picker.as_ref().unwrap();
        assert_eq!(picker.names, vec!["Line 1".to_string()]);
        assert_eq!(picker.cursor, 0);

        let mut line = LineData::default();
        for name in ["X", "Y"] {
            line.stations.push(Station::new(name, name));
        }
        app.cursor = 1;
        app.process_app_event(Some(AppEvent::RemoteFetched(Ok(("Line 1".to_string(), line)))));
        assert_eq!(app.controller.line().len(), 2);
        assert_eq!(app.cursor, 0);
        assert_eq!(app.status, "Downloaded remote preset Line 1");

        app.handle_input(Event::Key(press(KeyCode::Esc))).unwrap();
        assert!(app.remote_picker.is_none());
    }

    #[test]
    fn remote_actions_need_an_api_url() -> Result<()> {
        let mut app = demo_app();
        app.handle_controller_key(press(KeyCode::Char('P')))?;
        assert!(app.remote_picker.is_none());
        assert_eq!(app.status, "No preset_api_url configured");
        Ok(())
    }

    #[test]
    fn picker_rect_is_centered() {
        let area = centered_rect(50, 50, Rect::new(0, 0, 100, 40));
        assert_eq!((area.x, area.width), (25, 50));
        assert_eq!((area.y, area.height), (10, 20));
    }
}
