pub mod ui;

use chidori::{
    alarm::AlarmMode,
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore, MIN_TICK_RATE_MS},
    export::{export_to_dir, ExportFormat, PatientInfo, Sex},
    history::{HistoryDb, SessionSummary},
    logging::init_file_logger,
    runtime::{CrosstermEventSource, FixedTicker, MonitorEvent, MonitorEventSource, Runner, Ticker},
    session::{Notification, SessionEngine},
    upstream::{NullSink, Upstream},
    util::format_event_time,
};
use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::mpsc::Receiver,
    time::Duration,
};

const HISTORY_LIMIT: usize = 20;

/// real-time bioimpedance monitor with session statistics, event marking and threshold alarms
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal monitor for a bioimpedance sensor bridge. Streams readings, tracks session statistics and rate of change, marks events, raises a threshold alarm and exports sessions as CSV, TXT or JSON."
)]
pub struct Cli {
    /// address of the sensor bridge (host:port)
    #[clap(short = 'u', long)]
    upstream: Option<String>,

    /// run without connecting to the sensor bridge
    #[clap(long)]
    offline: bool,

    /// number of trailing readings used for the rate of change
    #[clap(short = 'r', long)]
    rate_window: Option<usize>,

    /// display refresh interval in milliseconds
    #[clap(long)]
    tick_ms: Option<u64>,

    /// enable the alarm in the given mode
    #[clap(short = 'a', long, value_enum)]
    alarm: Option<AlarmMode>,

    /// alarm threshold for the selected mode (Ω, % of initial value, or Ω drop)
    #[clap(short = 't', long)]
    alarm_threshold: Option<f64>,

    /// directory for exported files (default: current directory)
    #[clap(short = 'o', long)]
    export_dir: Option<PathBuf>,

    /// do not record finished sessions in the history log
    #[clap(long)]
    no_history: bool,

    /// print recently recorded sessions and exit
    #[clap(long)]
    history: bool,

    /// delete every recorded session and exit
    #[clap(long)]
    clear_history: bool,

    /// patient name for reports
    #[clap(long)]
    patient_name: Option<String>,

    /// patient age in years
    #[clap(long)]
    patient_age: Option<u32>,

    /// patient sex
    #[clap(long, value_enum)]
    patient_sex: Option<Sex>,

    /// patient weight in kg
    #[clap(long)]
    patient_weight: Option<f64>,

    /// patient height in m
    #[clap(long)]
    patient_height: Option<f64>,

    /// suprailiac circumference in cm
    #[clap(long)]
    patient_circumference: Option<f64>,

    /// date of last menstruation (reported for female patients only)
    #[clap(long)]
    patient_last_menstruation: Option<String>,
}

impl Cli {
    /// Layer command line overrides on top of the stored configuration
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = &self.upstream {
            config.upstream_addr = addr.clone();
        }
        if let Some(window) = self.rate_window {
            config.rate_window = window.max(2);
        }
        if let Some(ms) = self.tick_ms {
            config.tick_rate_ms = ms.max(MIN_TICK_RATE_MS);
        }
        if let Some(mode) = self.alarm {
            config.alarm.enabled = true;
            config.alarm.mode = mode;
        }
        if let Some(threshold) = self.alarm_threshold {
            let mode = config.alarm.mode;
            config.alarm.set_threshold(mode, Some(threshold));
        }
        if let Some(dir) = &self.export_dir {
            config.export_dir = Some(dir.clone());
        }
        if self.no_history {
            config.record_history = false;
        }
    }

    fn patient(&self) -> PatientInfo {
        PatientInfo {
            name: self.patient_name.clone(),
            age: self.patient_age,
            sex: self.patient_sex,
            weight_kg: self.patient_weight,
            height_m: self.patient_height,
            suprailiac_cm: self.patient_circumference,
            last_menstruation: self.patient_last_menstruation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Connection {
    Online(String),
    Offline,
    Lost(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Monitor,
    ConfirmReset,
    ExportMenu,
    EditThreshold(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Redraw,
    /// Redraw and ring the terminal bell
    Alert,
    Quit,
}

pub struct App<C: Clock = SystemClock> {
    pub engine: SessionEngine<C>,
    pub notifications: Receiver<Notification>,
    pub connection: Connection,
    pub mode: Mode,
    pub status_message: Option<String>,
    pub patient: PatientInfo,
    pub export_dir: PathBuf,
    pub history: Option<HistoryDb>,
}

impl<C: Clock> App<C> {
    pub fn new(
        mut engine: SessionEngine<C>,
        patient: PatientInfo,
        export_dir: PathBuf,
        history: Option<HistoryDb>,
    ) -> Self {
        let notifications = engine.subscribe();
        Self {
            engine,
            notifications,
            connection: Connection::Offline,
            mode: Mode::Monitor,
            status_message: None,
            patient,
            export_dir,
            history,
        }
    }

    pub fn handle_event(&mut self, event: MonitorEvent) -> Flow {
        let flow = match event {
            MonitorEvent::Tick => {
                if self.engine.on_tick() {
                    Flow::Redraw
                } else {
                    Flow::Continue
                }
            }
            MonitorEvent::Resize => Flow::Redraw,
            MonitorEvent::Message(line) => {
                if self.engine.ingest_message(&line) {
                    Flow::Redraw
                } else {
                    Flow::Continue
                }
            }
            MonitorEvent::Disconnected => {
                if let Connection::Online(addr) = &self.connection {
                    self.connection = Connection::Lost(addr.clone());
                }
                self.engine.set_upstream(Box::new(NullSink));
                self.status_message = Some(String::from("sensor bridge disconnected"));
                Flow::Redraw
            }
            MonitorEvent::Key(key) => self.handle_key(key),
        };

        match (self.drain_notifications(), flow) {
            (_, Flow::Quit) => Flow::Quit,
            (true, _) => Flow::Alert,
            (false, flow) => flow,
        }
    }

    /// Returns true when the alarm fired since the last drain
    fn drain_notifications(&mut self) -> bool {
        let mut fired = false;
        while let Ok(notification) = self.notifications.try_recv() {
            if let Notification::AlarmFired { value, threshold } = notification {
                self.status_message = Some(format!(
                    "ALARM: {value:.2} Ω reached {threshold:.2} Ω, it is advisable to urinate"
                ));
                fired = true;
            }
        }
        fired
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.kind == KeyEventKind::Release {
            return Flow::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Flow::Quit;
        }

        match self.mode.clone() {
            Mode::Monitor => return self.handle_monitor_key(key),
            Mode::ConfirmReset => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.record_history();
                    self.engine.reset();
                    self.status_message = Some(String::from("session reset"));
                    self.mode = Mode::Monitor;
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = Mode::Monitor;
                }
                _ => return Flow::Continue,
            },
            Mode::ExportMenu => match key.code {
                KeyCode::Char('c') => self.export(ExportFormat::Csv),
                KeyCode::Char('t') => self.export(ExportFormat::Txt),
                KeyCode::Char('j') => self.export(ExportFormat::Json),
                KeyCode::Esc => self.mode = Mode::Monitor,
                _ => return Flow::Continue,
            },
            Mode::EditThreshold(mut input) => match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() || c == '.' || c == '-' => {
                    input.push(c);
                    self.mode = Mode::EditThreshold(input);
                }
                KeyCode::Backspace => {
                    input.pop();
                    self.mode = Mode::EditThreshold(input);
                }
                KeyCode::Enter => {
                    let mode = self.engine.alarm().mode;
                    self.engine.set_threshold_text(mode, &input);
                    self.status_message = Some(self.engine.alarm().describe());
                    self.mode = Mode::Monitor;
                }
                KeyCode::Esc => self.mode = Mode::Monitor,
                _ => return Flow::Continue,
            },
        }
        Flow::Redraw
    }

    fn handle_monitor_key(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Flow::Quit,
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.mode = Mode::ConfirmReset;
            }
            KeyCode::Char(' ') => {
                self.engine.toggle();
                self.status_message = None;
            }
            KeyCode::Char('e') => {
                self.status_message = Some(match self.engine.mark_event() {
                    Some(event) => format!(
                        "event #{} marked at {}",
                        event.id,
                        format_event_time(event.time)
                    ),
                    None => String::from("events can only be marked while running"),
                });
            }
            KeyCode::Char('x') => {
                if self.engine.readings().is_empty() {
                    self.status_message = Some(String::from("nothing to export yet"));
                } else {
                    self.mode = Mode::ExportMenu;
                }
            }
            KeyCode::Char('a') => {
                let enabled = !self.engine.alarm().enabled;
                self.engine.set_alarm_enabled(enabled);
                self.status_message = Some(self.engine.alarm().describe());
            }
            KeyCode::Char('m') => {
                let mode = self.engine.alarm().mode.next();
                self.engine.set_alarm_mode(mode);
                self.status_message = Some(self.engine.alarm().describe());
            }
            KeyCode::Char('t') => {
                let alarm = self.engine.alarm();
                let current = alarm
                    .threshold(alarm.mode)
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                self.mode = Mode::EditThreshold(current);
            }
            _ => return Flow::Continue,
        }
        Flow::Redraw
    }

    fn export(&mut self, format: ExportFormat) {
        let snapshot = self.engine.snapshot();
        self.status_message = Some(
            match export_to_dir(&snapshot, &self.patient, format, &self.export_dir) {
                Ok(path) => format!("exported {format} to {}", path.display()),
                Err(e) => {
                    log::error!("{format} export failed: {e}");
                    format!("{format} export failed: {e}")
                }
            },
        );
        self.mode = Mode::Monitor;
    }

    /// Store a summary of the current session if it produced any data
    pub fn record_history(&mut self) {
        let Some(db) = &self.history else {
            return;
        };
        let Some(summary) = SessionSummary::from_snapshot(&self.engine.snapshot()) else {
            return;
        };
        if let Err(e) = db.record(&summary) {
            log::warn!("could not record session history: {e}");
            self.status_message = Some(format!("history not saved: {e}"));
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Some(path) = AppDirs::log_path() {
        if let Err(e) = init_file_logger(&path) {
            eprintln!("warning: cannot open log file {}: {e}", path.display());
        }
    }

    if cli.history {
        return print_history();
    }

    if cli.clear_history {
        return clear_history();
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);

    let history = if config.record_history {
        AppDirs::history_db_path().and_then(|path| match HistoryDb::open(&path) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("history disabled, cannot open {}: {e}", path.display());
                None
            }
        })
    } else {
        None
    };

    let engine = SessionEngine::offline()
        .with_rate_window(config.rate_window)
        .with_alarm(config.alarm.clone());
    let export_dir = config.export_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut app = App::new(engine, cli.patient(), export_dir, history);

    let events = CrosstermEventSource::new();
    if cli.offline {
        app.status_message = Some(String::from("offline mode"));
    } else {
        let connected = Upstream::connect(&config.upstream_addr).and_then(|up| {
            let addr = up.addr().to_string();
            up.split(events.sender()).map(|sink| (addr, sink))
        });
        match connected {
            Ok((addr, sink)) => {
                app.engine.set_upstream(Box::new(sink));
                app.connection = Connection::Online(addr);
            }
            Err(e) => {
                log::warn!("running offline: {e}");
                app.status_message = Some(e.to_string());
            }
        }
    }
    let runner = Runner::new(
        events,
        FixedTicker::new(Duration::from_millis(config.tick_rate_ms)),
    );

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    app.record_history();
    let mut saved = store.load();
    saved.alarm = app.engine.alarm().clone();
    if let Err(e) = store.save(&saved) {
        log::warn!("could not save config to {}: {e}", store.path().display());
    }

    result
}

fn print_history() -> Result<(), Box<dyn Error>> {
    let Some(path) = AppDirs::history_db_path() else {
        println!("no history location available");
        return Ok(());
    };
    let db = HistoryDb::open(&path)?;
    let sessions = db.recent(HISTORY_LIMIT)?;
    if sessions.is_empty() {
        println!("no sessions recorded yet");
    }
    let now = Local::now();
    for session in sessions {
        println!("{}", session.describe(now));
    }
    Ok(())
}

fn clear_history() -> Result<(), Box<dyn Error>> {
    let Some(path) = AppDirs::history_db_path() else {
        println!("no history location available");
        return Ok(());
    };
    let db = HistoryDb::open(&path)?;
    let removed = db.count()?;
    db.clear()?;
    log::info!("cleared {removed} sessions from {}", path.display());
    println!("removed {removed} recorded sessions");
    Ok(())
}

fn start_tui<B, C, E, T>(
    terminal: &mut Terminal<B>,
    app: &mut App<C>,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>>
where
    B: Backend,
    C: Clock,
    E: MonitorEventSource,
    T: Ticker,
{
    terminal.draw(|f| ui(app, f))?;

    loop {
        match app.handle_event(runner.step()) {
            Flow::Quit => break,
            Flow::Redraw => {
                terminal.draw(|f| ui(app, f))?;
            }
            Flow::Alert => {
                let mut out = io::stdout();
                out.write_all(b"\x07")?;
                out.flush()?;
                terminal.draw(|f| ui(app, f))?;
            }
            Flow::Continue => {}
        }
    }

    Ok(())
}

fn ui<C: Clock>(app: &App<C>, f: &mut Frame) {
    f.render_widget(app, f.area());
}
