//! The session engine: lifecycle, reading history, statistics, alarm latch and
//! operator events for one monitoring session.
//!
//! Every public operation is total. Calls that make no sense in the current
//! state (stopping while idle, marking an event before start) are ignored and
//! report `false`, since the presentation layer is expected to hide those
//! affordances anyway.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmConfig, AlarmMode};
use crate::clock::{Clock, SystemClock};
use crate::stats::{window_rate, Statistics, DEFAULT_RATE_WINDOW};
use crate::time_series::{Reading, TimeSeriesPoint};
use crate::upstream::{CommandSink, NullSink, UpstreamCommand};
use crate::util::{format_elapsed, parse_decimal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Operator-marked point on the session timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u32,
    /// Elapsed session seconds when marked
    pub time: f64,
    /// Latest reading when marked, if any had arrived
    pub value: Option<f64>,
    /// `value - initial_value` when both are known
    pub change: Option<f64>,
}

/// State-change notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StatusChanged(SessionStatus),
    ReadingIngested {
        reading: Reading,
        statistics: Statistics,
    },
    AlarmFired {
        value: f64,
        threshold: f64,
    },
    EventMarked(Event),
    SessionReset,
}

/// Owned copy of everything the export layer may need
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Local>>,
    pub elapsed_secs: f64,
    pub statistics: Statistics,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub mean: Option<f64>,
    pub readings: Vec<Reading>,
    pub rate_series: Vec<TimeSeriesPoint>,
    pub events: Vec<Event>,
    pub alarm: AlarmConfig,
    pub alarm_fired: bool,
}

impl SessionSnapshot {
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_secs)
    }

    /// Rate recorded alongside the reading at `idx`
    pub fn rate_at(&self, idx: usize) -> f64 {
        self.rate_series.get(idx).map_or(0.0, |p| p.y)
    }
}

/// Everything a reset throws away, kept together so a reset is one assignment
#[derive(Debug, Default)]
struct SessionData {
    status: SessionStatus,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Local>>,
    paused_duration: Duration,
    pause_started_at: Option<Instant>,
    readings: Vec<Reading>,
    rate_series: Vec<TimeSeriesPoint>,
    events: Vec<Event>,
    next_event_id: u32,
    stats: Statistics,
    alarm_fired: bool,
}

pub struct SessionEngine<C: Clock = SystemClock> {
    clock: C,
    upstream: Box<dyn CommandSink>,
    listeners: Vec<Sender<Notification>>,
    rate_window: usize,
    alarm: AlarmConfig,
    data: SessionData,
}

impl SessionEngine<SystemClock> {
    pub fn new(upstream: Box<dyn CommandSink>) -> Self {
        Self::with_clock(SystemClock, upstream)
    }

    /// Engine with no upstream; commands are dropped
    pub fn offline() -> Self {
        Self::new(Box::new(NullSink))
    }
}

impl<C: Clock> SessionEngine<C> {
    pub fn with_clock(clock: C, upstream: Box<dyn CommandSink>) -> Self {
        Self {
            clock,
            upstream,
            listeners: Vec::new(),
            rate_window: DEFAULT_RATE_WINDOW,
            alarm: AlarmConfig::default(),
            data: SessionData::default(),
        }
    }

    pub fn with_rate_window(mut self, window: usize) -> Self {
        self.rate_window = window.max(2);
        self
    }

    pub fn with_alarm(mut self, alarm: AlarmConfig) -> Self {
        self.alarm = alarm;
        self
    }

    pub fn set_upstream(&mut self, upstream: Box<dyn CommandSink>) {
        self.upstream = upstream;
    }

    /// Receive every notification emitted from now on
    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        self.listeners.push(tx);
        rx
    }

    pub fn status(&self) -> SessionStatus {
        self.data.status
    }

    pub fn is_running(&self) -> bool {
        self.data.status == SessionStatus::Running
    }

    pub fn has_started(&self) -> bool {
        self.data.started_at.is_some()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.data.stats
    }

    pub fn readings(&self) -> &[Reading] {
        &self.data.readings
    }

    pub fn rate_series(&self) -> &[TimeSeriesPoint] {
        &self.data.rate_series
    }

    pub fn events(&self) -> &[Event] {
        &self.data.events
    }

    pub fn alarm(&self) -> &AlarmConfig {
        &self.alarm
    }

    pub fn alarm_fired(&self) -> bool {
        self.data.alarm_fired
    }

    pub fn rate_window(&self) -> usize {
        self.rate_window
    }

    /// Session clock: time since the first start minus every paused interval.
    /// Frozen while paused, zero while idle.
    pub fn elapsed(&self) -> Duration {
        let Some(started) = self.data.started_at else {
            return Duration::ZERO;
        };
        let end = match (self.data.status, self.data.pause_started_at) {
            (SessionStatus::Paused, Some(paused_at)) => paused_at,
            _ => self.clock.now(),
        };
        end.saturating_duration_since(started)
            .saturating_sub(self.data.paused_duration)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed_secs())
    }

    /// Periodic display refresh. Never changes state; returns whether the
    /// elapsed display is advancing and needs a redraw.
    pub fn on_tick(&self) -> bool {
        self.is_running()
    }

    pub fn start(&mut self) -> bool {
        let now = self.clock.now();
        match self.data.status {
            SessionStatus::Running => return false,
            SessionStatus::Idle => {
                self.data.started_at = Some(now);
                self.data.started_wall = Some(Local::now());
                info!("session started");
            }
            SessionStatus::Paused => {
                if let Some(paused_at) = self.data.pause_started_at.take() {
                    self.data.paused_duration += now.saturating_duration_since(paused_at);
                }
                info!(
                    "session resumed at {} (paused {:.1}s total)",
                    self.elapsed_label(),
                    self.data.paused_duration.as_secs_f64()
                );
            }
        }
        self.upstream.send(UpstreamCommand::Start);
        self.data.status = SessionStatus::Running;
        self.notify(Notification::StatusChanged(SessionStatus::Running));
        true
    }

    pub fn stop(&mut self) -> bool {
        if self.data.status != SessionStatus::Running {
            return false;
        }
        self.upstream.send(UpstreamCommand::Stop);
        self.data.pause_started_at = Some(self.clock.now());
        self.data.status = SessionStatus::Paused;
        info!("session paused at {}", self.elapsed_label());
        self.notify(Notification::StatusChanged(SessionStatus::Paused));
        true
    }

    /// Single start/pause control
    pub fn toggle(&mut self) -> bool {
        if self.is_running() {
            self.stop()
        } else {
            self.start()
        }
    }

    /// Back to idle with an empty history. The alarm configuration survives;
    /// its fired latch does not.
    pub fn reset(&mut self) {
        self.upstream.send(UpstreamCommand::Reset);
        self.data = SessionData::default();
        info!("session reset");
        self.notify(Notification::SessionReset);
        self.notify(Notification::StatusChanged(SessionStatus::Idle));
    }

    /// Parse one upstream text message and ingest it. Non-numeric messages are
    /// ignored.
    pub fn ingest_message(&mut self, text: &str) -> bool {
        match parse_decimal(text) {
            Some(value) => self.ingest(value),
            None => {
                debug!("ignoring non-numeric upstream message {text:?}");
                false
            }
        }
    }

    pub fn ingest(&mut self, value: f64) -> bool {
        if !self.is_running() || !value.is_finite() {
            return false;
        }

        let t = self.elapsed_secs();
        if let Some(last) = self.data.readings.last() {
            if t <= last.t {
                debug!("dropping reading at {t:.3}s, not after {:.3}s", last.t);
                return false;
            }
        }

        let first = self.data.stats.initial_value.is_none();
        let reading = Reading::new(t, value);
        self.data.readings.push(reading);
        self.data.stats.record(value);
        if first {
            info!("initial value {value:.2}");
        }

        let rate = window_rate(&self.data.readings, self.rate_window);
        self.data.stats.rate = rate;
        self.data.rate_series.push(TimeSeriesPoint::new(t, rate));

        self.evaluate_alarm(value);

        let statistics = self.data.stats.clone();
        self.notify(Notification::ReadingIngested {
            reading,
            statistics,
        });
        true
    }

    fn evaluate_alarm(&mut self, value: f64) {
        if !self.alarm.enabled || self.data.alarm_fired {
            return;
        }
        let Some(initial) = self.data.stats.initial_value else {
            return;
        };
        if !self.alarm.is_triggered(initial, value) {
            return;
        }
        let threshold = self.alarm.threshold_for(initial).unwrap_or(value);
        self.data.alarm_fired = true;
        warn!(
            "alarm fired: {value:.2} <= {threshold:.2} ({} mode)",
            self.alarm.mode
        );
        self.notify(Notification::AlarmFired { value, threshold });
    }

    pub fn mark_event(&mut self) -> Option<Event> {
        if !self.is_running() || !self.has_started() {
            return None;
        }
        self.data.next_event_id += 1;
        let event = Event {
            id: self.data.next_event_id,
            time: self.elapsed_secs(),
            value: self.data.stats.current_value,
            change: self.data.stats.change(),
        };
        self.data.events.push(event.clone());
        info!("event #{} marked at {:.2}s", event.id, event.time);
        self.notify(Notification::EventMarked(event.clone()));
        Some(event)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let stats = &self.data.stats;
        SessionSnapshot {
            status: self.data.status,
            started_at: self.data.started_wall,
            elapsed_secs: self.elapsed_secs(),
            statistics: stats.clone(),
            change: stats.change(),
            change_percent: stats.change_percent(),
            mean: stats.mean(),
            readings: self.data.readings.clone(),
            rate_series: self.data.rate_series.clone(),
            events: self.data.events.clone(),
            alarm: self.alarm.clone(),
            alarm_fired: self.data.alarm_fired,
        }
    }

    pub fn set_alarm_config(&mut self, alarm: AlarmConfig) {
        self.alarm = alarm;
    }

    pub fn set_alarm_enabled(&mut self, enabled: bool) {
        self.alarm.enabled = enabled;
    }

    pub fn set_alarm_mode(&mut self, mode: AlarmMode) {
        self.alarm.mode = mode;
    }

    pub fn set_threshold(&mut self, mode: AlarmMode, value: Option<f64>) {
        self.alarm.set_threshold(mode, value);
    }

    pub fn set_threshold_text(&mut self, mode: AlarmMode, text: &str) {
        self.alarm.set_threshold_text(mode, text);
    }

    fn notify(&mut self, notification: Notification) {
        self.listeners
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
}
