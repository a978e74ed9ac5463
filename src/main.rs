//! LD2450 zone console - live view and zone editor for LD2450 sensors in Home Assistant
//!
//! Module structure:
//! - `domain/` - Entity records, zones, targets and trail
//! - `io/` - Home Assistant REST client
//! - `services/` - Reconstruction, rendering, editing, polling, controller
//! - `infra/` - Config, settings, metrics
//!
//! The terminal is owned by this task. Network work runs on tokio tasks that
//! report back over a channel; each loop iteration drains that channel into
//! the controller, draws a frame and handles at most one input event.

use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ld2450_zones::domain::types::ZoneKind;
use ld2450_zones::domain::zone::epoch_ms;
use ld2450_zones::infra::metrics::Metrics;
use ld2450_zones::infra::settings::{Settings, SettingsStore, Theme, DEFAULT_REFRESH_RATE_MS};
use ld2450_zones::infra::Config;
use ld2450_zones::services::controller::{Command, ConnectionStatus, Controller, Severity};
use ld2450_zones::services::editor::FormField;
use ld2450_zones::services::renderer::{kind_color, render, render_preview, ColorRole, DrawCommand};
use ld2450_zones::services::session::{Session, SessionEvent};
use ld2450_zones::services::transform::{CellMapper, CoordinateTransform, Millimeters, Pixel};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::canvas::{Canvas, Circle, Context, Line as CanvasLine, Points},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
    Frame, Terminal,
};
use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// LD2450 zone console for Home Assistant
#[derive(Parser, Debug)]
#[command(name = "ld2450-zones", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Settings file, overrides the one named in the config
    #[arg(long)]
    settings: Option<String>,
}

const TICK: Duration = Duration::from_millis(50);
const DASH: f64 = 8.0;
const GAP: f64 = 6.0;

enum Mode {
    Normal,
    Settings(SettingsForm),
    DevicePicker { index: usize },
    /// Waiting for the id of the zone to clear
    ClearZone,
    ConfirmReset,
}

/// Connection settings being edited
struct SettingsForm {
    url: String,
    token: String,
    refresh: String,
    focus: usize,
}

impl SettingsForm {
    const LABELS: [&'static str; 3] = ["Home Assistant URL", "Access token", "Refresh rate (ms)"];

    fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.ha_url.clone(),
            token: settings.ha_token.clone(),
            refresh: settings.refresh_rate_ms.to_string(),
            focus: 0,
        }
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focus {
            0 => &mut self.url,
            1 => &mut self.token,
            _ => &mut self.refresh,
        }
    }
}

struct App {
    controller: Controller,
    session: Session,
    store: SettingsStore,
    main_view: CoordinateTransform,
    preview_view: CoordinateTransform,
    mode: Mode,
    /// Inner area of the sensor surface in the last frame
    surface_area: Rect,
    quit: bool,
}

impl App {
    /// Carry out what the controller asked for
    fn dispatch(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Connect { url, token, epoch } => {
                    if let Err(e) = self.session.connect(&url, &token, epoch) {
                        error!(url = %url, error = %e, "ha_client_rejected");
                        self.controller.connect_rejected(&e.to_string());
                    }
                }
                Command::Disconnect => self.session.disconnect(),
                Command::RefreshDevices { epoch } => self.session.refresh_devices(epoch),
                Command::StartPolling { device, epoch, period } => {
                    info!(device = %device, epoch = %epoch, period_ms = %period.as_millis(), "polling_started");
                    self.session.start_polling(&device, epoch, period);
                }
                Command::WriteZones { batches, epoch } => self.session.write_zones(batches, epoch),
                Command::SaveSettings(settings) => {
                    if let Err(e) = self.store.save(&settings) {
                        warn!(error = %format!("{:#}", e), "settings_save_failed");
                    }
                }
                Command::ResetSettings => {
                    if let Err(e) = self.store.reset() {
                        warn!(error = %format!("{:#}", e), "settings_reset_failed");
                    }
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        // The zone form takes every key while it is open
        if self.controller.form().is_some() {
            self.handle_form_key(key);
            return;
        }

        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Settings(form) => self.handle_settings_key(form, key),
            Mode::DevicePicker { index } => self.handle_picker_key(index, key),
            Mode::ClearZone => {
                if let KeyCode::Char(c @ '1'..='4') = key.code {
                    let commands = self.controller.clear_zone(self.controller.draft_kind(), c as u8 - b'0');
                    self.dispatch(commands);
                }
            }
            Mode::ConfirmReset => {
                if key.code == KeyCode::Char('y') {
                    let commands = self.controller.reset_settings();
                    self.dispatch(commands);
                }
            }
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        let commands = match key.code {
            KeyCode::Char('q') => {
                self.quit = true;
                Vec::new()
            }
            KeyCode::Esc => {
                if self.controller.draft().is_some() {
                    self.controller.discard_draft();
                } else {
                    self.quit = true;
                }
                Vec::new()
            }
            KeyCode::Char('c') => self.controller.connect(),
            KeyCode::Char('x') => self.controller.disconnect(),
            KeyCode::Char('r') => self.controller.refresh_devices(),
            KeyCode::Char('p') => {
                let index = self
                    .controller
                    .selected_device()
                    .and_then(|name| self.controller.devices().iter().position(|d| d.name == name))
                    .unwrap_or(0);
                self.mode = Mode::DevicePicker { index };
                Vec::new()
            }
            KeyCode::Char('s') => {
                self.mode = Mode::Settings(SettingsForm::from_settings(self.controller.settings()));
                Vec::new()
            }
            KeyCode::Char('e') => {
                self.controller.toggle_edit_mode();
                Vec::new()
            }
            KeyCode::Char('k') => {
                self.controller.toggle_draft_kind();
                Vec::new()
            }
            KeyCode::Char(c @ '1'..='4') => {
                let id = c as u8 - b'0';
                self.controller.edit_zone(self.controller.draft_kind(), id);
                Vec::new()
            }
            KeyCode::Char('d') => {
                self.mode = Mode::ClearZone;
                Vec::new()
            }
            KeyCode::Char('g') => self.controller.toggle_grid(),
            KeyCode::Char('t') => self.controller.toggle_persistence(),
            KeyCode::Char('T') => {
                self.controller.clear_trail();
                Vec::new()
            }
            KeyCode::Char('m') => self.controller.toggle_theme(),
            KeyCode::Char('w') => self.controller.save_all_zones(),
            KeyCode::Char('R') => {
                self.mode = Mode::ConfirmReset;
                Vec::new()
            }
            _ => Vec::new(),
        };
        self.dispatch(commands);
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let commands = match key.code {
            KeyCode::Esc => {
                self.controller.discard_draft();
                Vec::new()
            }
            KeyCode::Enter => self.controller.save_draft(),
            KeyCode::Delete => self.controller.delete_draft(),
            _ => {
                if let Some(form) = self.controller.form_mut() {
                    match key.code {
                        KeyCode::Tab | KeyCode::Down => form.focus_next(),
                        KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
                        KeyCode::Backspace => form.backspace(),
                        KeyCode::Char(c) => form.input(c),
                        _ => {}
                    }
                }
                Vec::new()
            }
        };
        self.dispatch(commands);
    }

    fn handle_settings_key(&mut self, mut form: SettingsForm, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Enter => {
                let refresh = form.refresh.trim().parse().unwrap_or(DEFAULT_REFRESH_RATE_MS);
                let commands = self.controller.update_connection(&form.url, &form.token, refresh);
                self.dispatch(commands);
                return;
            }
            KeyCode::Tab | KeyCode::Down => form.focus = (form.focus + 1) % SettingsForm::LABELS.len(),
            KeyCode::BackTab | KeyCode::Up => {
                form.focus = (form.focus + SettingsForm::LABELS.len() - 1) % SettingsForm::LABELS.len()
            }
            KeyCode::Backspace => {
                form.field_mut().pop();
            }
            KeyCode::Char(c) => form.field_mut().push(c),
            _ => {}
        }
        self.mode = Mode::Settings(form);
    }

    fn handle_picker_key(&mut self, index: usize, key: KeyEvent) {
        let count = self.controller.devices().len();
        match key.code {
            KeyCode::Esc => {}
            KeyCode::Up => self.mode = Mode::DevicePicker { index: index.saturating_sub(1) },
            KeyCode::Down => {
                self.mode = Mode::DevicePicker { index: (index + 1).min(count.saturating_sub(1)) }
            }
            KeyCode::Enter => {
                if let Some(device) = self.controller.devices().get(index) {
                    let name = device.name.clone();
                    let commands = self.controller.select_device(&name);
                    self.dispatch(commands);
                }
            }
            _ => self.mode = Mode::DevicePicker { index },
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if !matches!(self.mode, Mode::Normal) {
            return;
        }
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(at) = self.surface_point(mouse.column, mouse.row) {
                    self.controller.pointer_down(at);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some(at) = self.surface_point(mouse.column, mouse.row) {
                    self.controller.pointer_move(at);
                }
            }
            MouseEventKind::Moved => {
                let at = self.surface_point(mouse.column, mouse.row);
                self.controller.pointer_hover(at);
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.controller.pointer_up();
            }
            _ => {}
        }
    }

    /// Terminal cell -> sensor millimeters, `None` outside the surface
    fn surface_point(&self, column: u16, row: u16) -> Option<Millimeters> {
        let mapper = CellMapper {
            x: self.surface_area.x,
            y: self.surface_area.y,
            columns: self.surface_area.width,
            rows: self.surface_area.height,
            surface_width: self.main_view.width(),
            surface_height: self.main_view.height(),
        };
        let pixel = mapper.cell_to_pixel(column, row)?;
        let mm = self.main_view.to_millimeters(pixel);
        Some(Millimeters { x: mm.x.round(), y: mm.y.round() })
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_ansi(false);

    // The terminal belongs to the UI, so logs go to a file
    match OpenOptions::new().create(true).append(true).open(config.log_file()) {
        Ok(file) => builder.with_writer(Mutex::new(file)).init(),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}. Logging disabled.", config.log_file(), e);
            builder.with_writer(io::sink).init();
        }
    }
}

async fn report_metrics(metrics: Arc<Metrics>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => metrics.report().log(),
            _ = shutdown.changed() => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(settings_file) = &args.settings {
        config = config.with_settings_file(settings_file);
    }
    init_logging(&config);

    info!(
        config_file = %config.config_file(),
        settings_file = %config.settings_file(),
        log_file = %config.log_file(),
        http_timeout_ms = %config.http_timeout_ms(),
        "config_loaded"
    );

    let store = SettingsStore::new(config.settings_file());
    let settings = store.load_or_default();
    let metrics = Arc::new(Metrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(report_metrics(
        metrics.clone(),
        Duration::from_secs(config.metrics_interval_secs()),
        shutdown_rx,
    ));

    // Bounded; pollers await send, so a slow UI slows polling instead of queueing
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let session = Session::new(event_tx, metrics.clone(), Duration::from_millis(config.http_timeout_ms()));

    let mut app = App {
        controller: Controller::new(settings, metrics),
        session,
        store,
        main_view: config.canvas().transform(),
        preview_view: config.preview().transform(),
        mode: Mode::Normal,
        surface_area: Rect::default(),
        quit: false,
    };

    // Reconnect with stored credentials
    if app.controller.settings().has_credentials() {
        let commands = app.controller.connect();
        app.dispatch(commands);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, &mut app, &mut event_rx).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    app.session.disconnect();
    let _ = shutdown_tx.send(true);
    info!("ld2450-zones shutdown complete");

    result
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut mpsc::Receiver<SessionEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        while let Ok(event) = events.try_recv() {
            let commands = app.controller.apply(event);
            app.dispatch(commands);
        }

        terminal.draw(|f| draw_ui(f, app))?;

        if event::poll(TICK)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }

        if app.quit {
            return Ok(());
        }
        tokio::task::yield_now().await;
    }
}

fn palette(role: ColorRole, theme: Theme) -> Color {
    match (theme, role) {
        (Theme::Light, ColorRole::Background) => Color::White,
        (Theme::Light, ColorRole::Border) => Color::Gray,
        (Theme::Light, ColorRole::Primary) => Color::Blue,
        (Theme::Light, ColorRole::Secondary) => Color::Green,
        (Theme::Light, ColorRole::Error) => Color::Red,
        (Theme::Light, ColorRole::Accent) => Color::Magenta,
        (Theme::Light, ColorRole::Text) => Color::Black,
        (Theme::Light, ColorRole::TextInverse) => Color::White,
        (Theme::Dark, ColorRole::Background) => Color::Black,
        (Theme::Dark, ColorRole::Border) => Color::DarkGray,
        (Theme::Dark, ColorRole::Primary) => Color::LightBlue,
        (Theme::Dark, ColorRole::Secondary) => Color::LightGreen,
        (Theme::Dark, ColorRole::Error) => Color::LightRed,
        (Theme::Dark, ColorRole::Accent) => Color::LightMagenta,
        (Theme::Dark, ColorRole::Text) => Color::White,
        (Theme::Dark, ColorRole::TextInverse) => Color::Black,
    }
}

fn draw_ui(f: &mut Frame, app: &mut App) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Surface + side panel
            Constraint::Length(7), // Notices
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(40), Constraint::Length(50)])
        .split(main_chunks[1]);

    draw_surface(f, body[0], app);
    draw_side_panel(f, body[1], app);
    draw_notices(f, main_chunks[2], app);

    if app.controller.form().is_some() {
        draw_zone_form(f, app);
        return;
    }
    match &app.mode {
        Mode::Normal => {}
        Mode::Settings(form) => draw_settings_form(f, form),
        Mode::DevicePicker { index } => draw_device_picker(f, app, *index),
        Mode::ClearZone => draw_clear_prompt(f, app.controller.draft_kind()),
        Mode::ConfirmReset => draw_confirm_reset(f),
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let c = &app.controller;
    let status_color = match c.status() {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Connecting => Color::Yellow,
        ConnectionStatus::Disconnected => Color::Red,
    };
    let device = c
        .selected_device()
        .and_then(|name| c.devices().iter().find(|d| d.name == name))
        .map(|d| d.display_name())
        .unwrap_or_else(|| "no device".to_string());
    let updated = c
        .last_update_ms()
        .map(|t| format!("{:.1}s ago", epoch_ms().saturating_sub(t) as f64 / 1000.0))
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::styled("LD2450 Zones ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::styled(c.status().label(), Style::default().fg(status_color)),
        Span::raw(" | "),
        Span::styled(device, Style::default().fg(Color::Yellow)),
        Span::raw(" | Updated: "),
        Span::raw(updated),
        Span::raw(" | "),
        Span::styled(c.metrics().headline(), Style::default().fg(Color::DarkGray)),
    ];
    if let Some(e) = c.last_poll_error() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(format!("poll: {e}"), Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_surface(f: &mut Frame, area: Rect, app: &mut App) {
    let c = &app.controller;
    let mut title = if c.editor().is_enabled() {
        format!(" Sensor view | EDIT: drag to draw a {} ", c.draft_kind().label())
    } else {
        " Sensor view ".to_string()
    };
    if let Some(readout) = c.cursor_readout() {
        title.push_str(&format!("| {readout} "));
    }
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if c.editor().is_enabled() { Color::Magenta } else { Color::Blue }));

    let commands = render(&c.scene(), &app.main_view);
    let theme = c.theme();
    app.surface_area = block.inner(area);
    paint_surface(f, area, block, commands, &app.main_view, theme);
}

/// Paint draw commands onto a braille canvas; surface y points down, canvas y up
fn paint_surface(
    f: &mut Frame,
    area: Rect,
    block: Block<'_>,
    commands: Vec<DrawCommand>,
    view: &CoordinateTransform,
    theme: Theme,
) {
    let (width, height) = (view.width(), view.height());
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .background_color(palette(ColorRole::Background, theme))
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            for command in &commands {
                paint(ctx, command, height, theme);
                ctx.layer();
            }
        });
    f.render_widget(canvas, area);
}

fn paint(ctx: &mut Context<'_>, command: &DrawCommand, height: f64, theme: Theme) {
    let flip = |p: Pixel| (p.px, height - p.py);
    match command {
        DrawCommand::Clear { .. } => {}
        DrawCommand::Line { from, to, color, dashed } => {
            stroke(ctx, flip(*from), flip(*to), palette(*color, theme), *dashed)
        }
        DrawCommand::Polygon { points, color } => {
            let color = palette(*color, theme);
            for (i, p) in points.iter().enumerate() {
                let next = points[(i + 1) % points.len()];
                stroke(ctx, flip(*p), flip(next), color, false);
            }
        }
        DrawCommand::Rect { rect, color, fill_alpha, dashed } => {
            let color = palette(*color, theme);
            let (left, right) = (rect.x, rect.x + rect.width);
            let (top, bottom) = (height - rect.y, height - rect.y - rect.height);
            if *fill_alpha > 0.0 {
                // Sparser dots read as more transparent
                let step = (4.0 / fill_alpha).clamp(8.0, 24.0);
                let mut coords = Vec::new();
                let mut x = left + step / 2.0;
                while x < right {
                    let mut y = bottom + step / 2.0;
                    while y < top {
                        coords.push((x, y));
                        y += step;
                    }
                    x += step;
                }
                ctx.draw(&Points { coords: &coords, color });
            }
            let corners = [(left, top), (right, top), (right, bottom), (left, bottom)];
            for i in 0..corners.len() {
                stroke(ctx, corners[i], corners[(i + 1) % corners.len()], color, *dashed);
            }
        }
        DrawCommand::Circle { center, radius, color } => {
            let (x, y) = flip(*center);
            ctx.draw(&Circle { x, y, radius: *radius, color: palette(*color, theme) });
        }
        DrawCommand::Polyline { points, color, .. } => {
            let color = palette(*color, theme);
            for pair in points.windows(2) {
                stroke(ctx, flip(pair[0]), flip(pair[1]), color, false);
            }
        }
        DrawCommand::Text { at, text, color } => {
            let (x, y) = flip(*at);
            ctx.print(x, y, Line::styled(text.clone(), Style::default().fg(palette(*color, theme))));
        }
    }
}

fn stroke(ctx: &mut Context<'_>, a: (f64, f64), b: (f64, f64), color: Color, dashed: bool) {
    if !dashed {
        ctx.draw(&CanvasLine { x1: a.0, y1: a.1, x2: b.0, y2: b.1, color });
        return;
    }
    let length = (b.0 - a.0).hypot(b.1 - a.1);
    if length == 0.0 {
        return;
    }
    let (dx, dy) = ((b.0 - a.0) / length, (b.1 - a.1) / length);
    let mut t = 0.0;
    while t < length {
        let end = (t + DASH).min(length);
        ctx.draw(&CanvasLine { x1: a.0 + dx * t, y1: a.1 + dy * t, x2: a.0 + dx * end, y2: a.1 + dy * end, color });
        t += DASH + GAP;
    }
}

fn draw_side_panel(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),  // Zones
            Constraint::Length(6),  // Targets
            Constraint::Min(0),     // Device + keys
        ])
        .split(area);

    let model = app.controller.model();

    let zones: Vec<ListItem> = model
        .zones
        .slots()
        .map(|(kind, id, zone)| {
            let (icon, color) = match (kind, zone.is_some()) {
                (_, false) => ("·", Color::DarkGray),
                (ZoneKind::Detection, true) => ("■", Color::Blue),
                (ZoneKind::Exclusion, true) => ("■", Color::Red),
            };
            let coords = zone
                .map(|z| format!("({:.0},{:.0})-({:.0},{:.0})", z.x1, z.y1, z.x2, z.y2))
                .unwrap_or_else(|| "—".to_string());
            let status = if zone.is_some() { "Active" } else { "Inactive" };
            ListItem::new(Line::from(vec![
                Span::styled(icon, Style::default().fg(color)),
                Span::raw(format!(" {:<11}", format!("{} {}", kind.label(), id))),
                Span::styled(format!("{status:<9}"), Style::default().fg(color)),
                Span::styled(coords, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let zones = List::new(zones).block(
        Block::default().title(" Zones ").borders(Borders::ALL).border_style(Style::default().fg(Color::Blue)),
    );
    f.render_widget(zones, chunks[0]);

    let targets: Vec<ListItem> = if model.targets.is_empty() {
        vec![ListItem::new(Span::styled("No targets", Style::default().fg(Color::DarkGray)))]
    } else {
        model
            .targets
            .iter()
            .map(|t| {
                ListItem::new(Line::from(vec![
                    Span::styled(format!("T{} ", t.id), Style::default().fg(Color::Green)),
                    Span::raw(format!("{:.0},{:.0} mm ", t.x, t.y)),
                    Span::styled(
                        format!("{:.0}cm/s {:.0}mm {:.0}°", t.speed, t.distance, t.angle),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]))
            })
            .collect()
    };
    let targets = List::new(targets).block(
        Block::default().title(" Targets ").borders(Borders::ALL).border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(targets, chunks[1]);

    let info = &model.device_info;
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(vec![Span::styled("Model: ", dim), Span::raw(info.model)]),
        Line::from(vec![
            Span::styled("Max distance: ", dim),
            Span::raw(info.max_distance.as_deref().map(|d| format!("{d} cm")).unwrap_or_else(|| "-".into())),
        ]),
        Line::from(vec![
            Span::styled("Install angle: ", dim),
            Span::raw(info.installation_angle.as_deref().map(|a| format!("{a}°")).unwrap_or_else(|| "-".into())),
        ]),
        Line::from(vec![
            Span::styled("Grid ", dim),
            Span::raw(on_off(app.controller.settings().show_grid)),
            Span::styled("  Trail ", dim),
            Span::raw(format!("{} ({})", on_off(app.controller.settings().enable_persistence), app.controller.trail().len())),
        ]),
        Line::raw(""),
    ];
    lines.extend(
        [
            "c connect  x disconnect  s settings",
            "r rescan  p pick device  R reset",
            "e edit mode  k zone/exclusion",
            "1-4 edit zone  d clear zone",
            "w write all zones",
            "g grid  t trail  T clear  m theme",
            "q quit",
        ]
        .into_iter()
        .map(|help| Line::styled(help, dim)),
    );
    let panel = Paragraph::new(lines).block(
        Block::default().title(" Device ").borders(Borders::ALL).border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(panel, chunks[2]);
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn draw_notices(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .controller
        .notices()
        .rev()
        .map(|n| {
            let (icon, color) = match n.severity {
                Severity::Info => ("i", Color::Cyan),
                Severity::Success => ("✓", Color::Green),
                Severity::Error => ("✗", Color::Red),
            };
            let at = chrono::DateTime::from_timestamp_millis(n.at_ms as i64)
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                .unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(icon, Style::default().fg(color)),
                Span::styled(format!(" {at} "), Style::default().fg(Color::DarkGray)),
                Span::raw(n.text.clone()),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default().title(" Notices ").borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, area);
}

fn popup(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_zone_form(f: &mut Frame, app: &App) {
    let (Some(form), Some(draft)) = (app.controller.form(), app.controller.draft()) else {
        return;
    };
    let area = popup(f.area(), 76, 16);
    f.render_widget(Clear, area);

    let color = form_border(draft.kind, app.controller.theme());
    let outer = Block::default()
        .title(format!(" {} {} ", draft.kind.label(), draft.zone.id))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(0)])
        .split(inner);

    let mut lines: Vec<Line> = FormField::ORDER
        .iter()
        .map(|field| {
            let focused = form.focused() == *field;
            let style = if focused {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:<9}", field.label()), Style::default().fg(Color::DarkGray)),
                Span::styled(format!(" {:<12}", form.value(*field)), style),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::from(vec![
        Span::styled("Size ", Style::default().fg(Color::DarkGray)),
        Span::raw(format!("{:.0} x {:.0} mm", draft.zone.width(), draft.zone.height())),
    ]));
    lines.push(Line::raw(""));
    for help in ["Tab next  Space type", "Enter save  Del delete", "Esc discard"] {
        lines.push(Line::styled(help, Style::default().fg(Color::DarkGray)));
    }
    f.render_widget(Paragraph::new(lines), halves[0]);

    let preview = Block::default().title(" Preview ").borders(Borders::ALL);
    let theme = app.controller.theme();
    paint_surface(f, halves[1], preview, render_preview(&draft, &app.preview_view), &app.preview_view, theme);
}

fn form_border(kind: ZoneKind, theme: Theme) -> Color {
    palette(kind_color(kind), theme)
}

fn draw_settings_form(f: &mut Frame, form: &SettingsForm) {
    let area = popup(f.area(), 64, 11);
    f.render_widget(Clear, area);

    let values = [form.url.clone(), "*".repeat(form.token.chars().count()), form.refresh.clone()];
    let mut lines: Vec<Line> = SettingsForm::LABELS
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (label, value))| {
            let style = if i == form.focus {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:<19}", label), Style::default().fg(Color::DarkGray)),
                Span::styled(format!(" {:<40}", value), style),
            ])
        })
        .collect();
    lines.push(Line::raw(""));
    lines.push(Line::styled(
        "Tab next  Enter save and connect  Esc cancel",
        Style::default().fg(Color::DarkGray),
    ));

    let panel = Paragraph::new(lines).block(
        Block::default().title(" Settings ").borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(panel, area);
}

fn draw_device_picker(f: &mut Frame, app: &App, index: usize) {
    let area = popup(f.area(), 48, 12);
    f.render_widget(Clear, area);

    let devices = app.controller.devices();
    let items: Vec<ListItem> = if devices.is_empty() {
        vec![ListItem::new(Span::styled("No LD2450 devices found", Style::default().fg(Color::DarkGray)))]
    } else {
        devices
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let style = if i == index {
                    Style::default().fg(Color::Black).bg(Color::Cyan)
                } else {
                    Style::default()
                };
                let selected = if app.controller.selected_device() == Some(d.name.as_str()) { "●" } else { " " };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("{selected} ")),
                    Span::styled(format!("{} ({} entities)", d.display_name(), d.entity_count), style),
                ]))
            })
            .collect()
    };

    let list = List::new(items).block(
        Block::default()
            .title(" Select device (Enter) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(list, area);
}

fn draw_clear_prompt(f: &mut Frame, kind: ZoneKind) {
    let area = popup(f.area(), 52, 4);
    f.render_widget(Clear, area);
    let panel = Paragraph::new(Line::styled(
        format!("1-{} clears that {}, any other key cancels", kind.max_id(), kind.label()),
        Style::default().fg(Color::DarkGray),
    ))
    .block(Block::default().title(" Clear zone ").borders(Borders::ALL).border_style(Style::default().fg(Color::Red)));
    f.render_widget(panel, area);
}

fn draw_confirm_reset(f: &mut Frame) {
    let area = popup(f.area(), 52, 5);
    f.render_widget(Clear, area);
    let panel = Paragraph::new(vec![
        Line::raw("Forget URL, token and all preferences?"),
        Line::styled("y confirm  any other key cancels", Style::default().fg(Color::DarkGray)),
    ])
    .block(Block::default().title(" Reset settings ").borders(Borders::ALL).border_style(Style::default().fg(Color::Red)));
    f.render_widget(panel, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_border_follows_theme() {
        assert_eq!(form_border(ZoneKind::Detection, Theme::Light), Color::Blue);
        assert_eq!(form_border(ZoneKind::Detection, Theme::Dark), Color::LightBlue);
        assert_eq!(form_border(ZoneKind::Exclusion, Theme::Dark), Color::LightRed);
    }
}
