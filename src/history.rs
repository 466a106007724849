use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::Path;
use time_humanize::HumanTime;

use crate::error::Result;
use crate::session::SessionSnapshot;
use crate::util::{format_elapsed, format_optional};

/// One finished session, as kept in the history log
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub started_at: DateTime<Local>,
    pub duration_secs: f64,
    pub initial_value: Option<f64>,
    pub final_value: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub readings: usize,
    pub events: usize,
    pub alarm_fired: bool,
}

impl SessionSummary {
    /// Summaries only exist for sessions that were started and produced data
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Option<Self> {
        let started_at = snapshot.started_at?;
        if snapshot.readings.is_empty() {
            return None;
        }
        let stats = &snapshot.statistics;
        Some(Self {
            started_at,
            duration_secs: snapshot.elapsed_secs,
            initial_value: stats.initial_value,
            final_value: stats.current_value,
            min: stats.min,
            max: stats.max,
            mean: snapshot.mean,
            readings: snapshot.readings.len(),
            events: snapshot.events.len(),
            alarm_fired: snapshot.alarm_fired,
        })
    }

    /// One line for `--history`
    pub fn describe(&self, now: DateTime<Local>) -> String {
        let ago = (now - self.started_at).num_seconds().max(0);
        format!(
            "{} ({})  {}  {} → {} Ω  min {} max {} avg {}  {} readings  {} events{}",
            self.started_at.format("%Y-%m-%d %H:%M"),
            HumanTime::from_seconds(-ago),
            format_elapsed(self.duration_secs),
            format_optional(self.initial_value),
            format_optional(self.final_value),
            format_optional(self.min),
            format_optional(self.max),
            format_optional(self.mean),
            self.readings,
            self.events,
            if self.alarm_fired { "  ALARM" } else { "" }
        )
    }
}

/// SQLite log of finished sessions
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                duration_secs REAL NOT NULL,
                initial_value REAL,
                final_value REAL,
                min_value REAL,
                max_value REAL,
                mean_value REAL,
                readings INTEGER NOT NULL,
                events INTEGER NOT NULL,
                alarm_fired BOOLEAN NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at)",
            [],
        )?;

        Ok(Self { conn })
    }

    pub fn record(&self, summary: &SessionSummary) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sessions
            (started_at, duration_secs, initial_value, final_value, min_value, max_value,
             mean_value, readings, events, alarm_fired)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                summary.started_at.to_rfc3339(),
                summary.duration_secs,
                summary.initial_value,
                summary.final_value,
                summary.min,
                summary.max,
                summary.mean,
                summary.readings as i64,
                summary.events as i64,
                summary.alarm_fired,
            ],
        )?;
        Ok(())
    }

    /// Most recent sessions first
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT started_at, duration_secs, initial_value, final_value, min_value, max_value,
                   mean_value, readings, events, alarm_fired
            FROM sessions
            ORDER BY started_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let started_at: String = row.get(0)?;
            let started_at = DateTime::parse_from_rfc3339(&started_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        0,
                        "started_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(SessionSummary {
                started_at,
                duration_secs: row.get(1)?,
                initial_value: row.get(2)?,
                final_value: row.get(3)?,
                min: row.get(4)?,
                max: row.get(5)?,
                mean: row.get(6)?,
                readings: row.get::<_, i64>(7)?.max(0) as usize,
                events: row.get::<_, i64>(8)?.max(0) as usize,
                alarm_fired: row.get(9)?,
            })
        })?;

        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn summary(started_at: DateTime<Local>, readings: usize) -> SessionSummary {
        SessionSummary {
            started_at,
            duration_secs: 754.2,
            initial_value: Some(512.0),
            final_value: Some(471.5),
            min: Some(470.0),
            max: Some(515.25),
            mean: Some(490.0),
            readings,
            events: 2,
            alarm_fired: true,
        }
    }

    fn at(h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, h, 30, 0).unwrap()
    }

    #[test]
    fn record_and_read_back() {
        let db = HistoryDb::open_in_memory().unwrap();
        let s = summary(at(9), 120);
        db.record(&s).unwrap();

        let recent = db.recent(10).unwrap();
        assert_eq!(recent, vec![s]);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&summary(at(8), 1)).unwrap();
        db.record(&summary(at(10), 3)).unwrap();
        db.record(&summary(at(9), 2)).unwrap();

        let recent = db.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].readings, 3);
        assert_eq!(recent[1].readings, 2);
    }

    #[test]
    fn missing_values_roundtrip_as_none() {
        let db = HistoryDb::open_in_memory().unwrap();
        let mut s = summary(at(11), 1);
        s.mean = None;
        s.min = None;
        db.record(&s).unwrap();
        assert_eq!(db.recent(1).unwrap()[0], s);
    }

    #[test]
    fn clear_removes_everything() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&summary(at(8), 1)).unwrap();
        db.clear().unwrap();
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        let db = HistoryDb::open(&path).unwrap();
        db.record(&summary(at(8), 1)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn describe_mentions_key_figures() {
        let s = summary(at(9), 120);
        let line = s.describe(at(9) + Duration::hours(3));
        assert!(line.starts_with("2026-03-14 09:30"));
        assert!(line.contains("12:34"));
        assert!(line.contains("512.00 → 471.50 Ω"));
        assert!(line.contains("120 readings"));
        assert!(line.contains("ALARM"));
    }
}
