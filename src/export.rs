//! Session export: CSV, plain-text report and JSON, written from a snapshot
//! so exporting never touches the live engine.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use clap::ValueEnum;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Event, SessionSnapshot};
use crate::util::{format_event_time, format_optional};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
pub enum Sex {
    Female,
    Male,
}

/// Optional patient metadata printed at the top of reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub suprailiac_cm: Option<f64>,
    /// Only reported for female patients
    pub last_menstruation: Option<String>,
}

impl PatientInfo {
    pub fn is_empty(&self) -> bool {
        *self == PatientInfo::default()
    }

    fn lines(&self) -> Vec<String> {
        fn or_na<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| String::from("N/A"), |v| v.to_string())
        }

        let mut lines = vec![
            format!("Name: {}", or_na(&self.name)),
            format!("Age: {}", or_na(&self.age)),
            format!("Sex: {}", or_na(&self.sex)),
            format!("Weight: {} kg", or_na(&self.weight_kg)),
            format!("Height: {} m", or_na(&self.height_m)),
            format!("Suprailiac circumference: {} cm", or_na(&self.suprailiac_cm)),
        ];
        if self.sex == Some(Sex::Female) {
            lines.push(format!(
                "Last menstruation: {}",
                or_na(&self.last_menstruation)
            ));
        }
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ExportFormat {
    #[strum(serialize = "CSV")]
    Csv,
    #[strum(serialize = "TXT")]
    Txt,
    #[strum(serialize = "JSON")]
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
        }
    }

    /// Middle part of the file name
    pub fn kind(self) -> &'static str {
        match self {
            ExportFormat::Csv => "data",
            ExportFormat::Txt => "report",
            ExportFormat::Json => "session",
        }
    }

    pub fn file_name(self, at: DateTime<Local>) -> String {
        format!(
            "chidori_{}_{}.{}",
            self.kind(),
            at.format("%Y-%m-%d_%H%M%S"),
            self.extension()
        )
    }
}

/// Readings with their rate, then the events table after a blank line
pub fn write_csv<W: Write>(snapshot: &SessionSnapshot, mut out: W) -> Result<()> {
    {
        let mut wtr = csv::Writer::from_writer(&mut out);
        wtr.write_record(["time_s", "impedance_ohm", "rate_ohm_per_min"])?;
        for (idx, reading) in snapshot.readings.iter().enumerate() {
            wtr.write_record(&[
                format!("{:.2}", reading.t),
                format!("{:.3}", reading.value),
                format!("{:.3}", snapshot.rate_at(idx)),
            ])?;
        }
        wtr.flush()?;
    }

    if snapshot.events.is_empty() {
        return Ok(());
    }

    out.write_all(b"\n")?;
    let mut wtr = csv::Writer::from_writer(&mut out);
    wtr.write_record(["event_id", "time_s", "impedance_ohm", "change_ohm"])?;
    for event in &snapshot.events {
        wtr.write_record(&[
            event.id.to_string(),
            format!("{:.2}", event.time),
            event.value.map_or_else(String::new, |v| format!("{v:.3}")),
            event.change.map_or_else(String::new, |c| format!("{c:.3}")),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn event_line(event: &Event) -> String {
    let value = event
        .value
        .map_or_else(|| String::from("--"), |v| format!("{v:.2}"));
    let change = event
        .change
        .map_or_else(|| String::from("--"), |c| format!("{c:+.2}"));
    format!(
        "Event {}: {} - {} Ω (change: {} Ω)",
        event.id,
        format_event_time(event.time),
        value,
        change
    )
}

/// Plain-text report: optional patient section, statistics, measurements, events
pub fn write_txt<W: Write>(
    snapshot: &SessionSnapshot,
    patient: &PatientInfo,
    mut out: W,
) -> Result<()> {
    let rule = "=".repeat(48);

    writeln!(out, "{rule}")?;
    writeln!(out, "CHIDORI - BIOIMPEDANCE SESSION REPORT")?;
    writeln!(out, "{rule}")?;
    writeln!(out)?;

    if !patient.is_empty() {
        writeln!(out, "PATIENT")?;
        writeln!(out, "{}", patient.lines().iter().join("\n"))?;
        writeln!(out)?;
    }

    let stats = &snapshot.statistics;
    let date = snapshot.started_at.map_or_else(
        || String::from("N/A"),
        |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    let change = match (snapshot.change, snapshot.change_percent) {
        (Some(c), Some(p)) => format!("{c:+.2} Ω ({p:+.2}%)"),
        (Some(c), None) => format!("{c:+.2} Ω"),
        _ => String::from("--"),
    };

    writeln!(out, "SESSION STATISTICS")?;
    writeln!(out, "Date: {date}")?;
    writeln!(out, "Initial value: {} Ω", format_optional(stats.initial_value))?;
    writeln!(out, "Final value: {} Ω", format_optional(stats.current_value))?;
    writeln!(out, "Change: {change}")?;
    writeln!(out, "Minimum: {} Ω", format_optional(stats.min))?;
    writeln!(out, "Maximum: {} Ω", format_optional(stats.max))?;
    writeln!(out, "Average: {} Ω", format_optional(snapshot.mean))?;
    writeln!(out, "Duration: {}", snapshot.elapsed_label())?;
    writeln!(out, "Events: {}", snapshot.events.len())?;
    writeln!(out, "Data points: {}", snapshot.readings.len())?;
    writeln!(
        out,
        "Alarm fired: {}",
        if snapshot.alarm_fired { "yes" } else { "no" }
    )?;
    writeln!(out)?;

    writeln!(out, "MEASUREMENTS")?;
    writeln!(out, "time_s\timpedance_ohm\trate_ohm_per_min")?;
    for (idx, reading) in snapshot.readings.iter().enumerate() {
        writeln!(
            out,
            "{:.2}\t{:.3}\t{:.3}",
            reading.t,
            reading.value,
            snapshot.rate_at(idx)
        )?;
    }

    if !snapshot.events.is_empty() {
        writeln!(out)?;
        writeln!(out, "EVENTS")?;
        writeln!(out, "{}", snapshot.events.iter().map(event_line).join("\n"))?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonExport<'a> {
    patient: &'a PatientInfo,
    snapshot: &'a SessionSnapshot,
}

pub fn write_json<W: Write>(
    snapshot: &SessionSnapshot,
    patient: &PatientInfo,
    out: W,
) -> Result<()> {
    serde_json::to_writer_pretty(out, &JsonExport { patient, snapshot })?;
    Ok(())
}

/// Write one export file into `dir`, returning its path
pub fn export_to_dir(
    snapshot: &SessionSnapshot,
    patient: &PatientInfo,
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format.file_name(Local::now()));
    let mut out = BufWriter::new(File::create(&path)?);

    match format {
        ExportFormat::Csv => write_csv(snapshot, &mut out)?,
        ExportFormat::Txt => write_txt(snapshot, patient, &mut out)?,
        ExportFormat::Json => write_json(snapshot, patient, &mut out)?,
    }
    out.flush()?;

    log::info!("exported {format} to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::SessionEngine;
    use crate::upstream::NullSink;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn recorded_session(values: &[f64], event_after: Option<usize>) -> SessionSnapshot {
        let clock = ManualClock::new();
        let mut engine = SessionEngine::with_clock(clock.clone(), Box::new(NullSink));
        engine.start();
        for (i, &v) in values.iter().enumerate() {
            clock.advance_secs(30.0);
            engine.ingest(v);
            if event_after == Some(i) {
                engine.mark_event();
            }
        }
        engine.snapshot()
    }

    fn csv_text(snapshot: &SessionSnapshot) -> String {
        let mut buf = Vec::new();
        write_csv(snapshot, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn txt_text(snapshot: &SessionSnapshot, patient: &PatientInfo) -> String {
        let mut buf = Vec::new();
        write_txt(snapshot, patient, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn csv_has_one_row_per_reading() {
        let snapshot = recorded_session(&[500.0, 490.0, 485.5], None);
        let text = csv_text(&snapshot);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "time_s,impedance_ohm,rate_ohm_per_min");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "30.00,500.000,0.000");
        assert_eq!(lines[2], "60.00,490.000,-20.000");
    }

    #[test]
    fn csv_appends_events_table() {
        let snapshot = recorded_session(&[500.0, 490.0], Some(1));
        let text = csv_text(&snapshot);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "event_id,time_s,impedance_ohm,change_ohm");
        assert_eq!(lines[5], "1,60.00,490.000,-10.000");
    }

    #[test]
    fn csv_of_empty_session_is_just_the_header() {
        let snapshot = recorded_session(&[], None);
        assert_eq!(csv_text(&snapshot), "time_s,impedance_ohm,rate_ohm_per_min\n");
    }

    #[test]
    fn txt_report_contains_statistics_and_events() {
        let snapshot = recorded_session(&[500.0, 450.0], Some(1));
        let report = txt_text(&snapshot, &PatientInfo::default());

        assert!(!report.contains("PATIENT"));
        assert!(report.contains("Initial value: 500.00 Ω"));
        assert!(report.contains("Final value: 450.00 Ω"));
        assert!(report.contains("Change: -50.00 Ω (-10.00%)"));
        assert!(report.contains("Average: 475.00 Ω"));
        assert!(report.contains("Duration: 01:00"));
        assert!(report.contains("Data points: 2"));
        assert!(report.contains("Event 1: 1:00 - 450.00 Ω (change: -50.00 Ω)"));
    }

    #[test]
    fn txt_patient_section_hides_menstruation_for_male() {
        let snapshot = recorded_session(&[500.0], None);
        let mut patient = PatientInfo {
            name: Some("Ana".into()),
            age: Some(34),
            sex: Some(Sex::Male),
            weight_kg: Some(61.5),
            last_menstruation: Some("2026-03-01".into()),
            ..PatientInfo::default()
        };

        let report = txt_text(&snapshot, &patient);
        assert!(report.contains("Name: Ana"));
        assert!(report.contains("Weight: 61.5 kg"));
        assert!(report.contains("Height: N/A m"));
        assert!(!report.contains("Last menstruation"));

        patient.sex = Some(Sex::Female);
        let report = txt_text(&snapshot, &patient);
        assert!(report.contains("Last menstruation: 2026-03-01"));
    }

    #[test]
    fn json_wraps_patient_and_snapshot() {
        let snapshot = recorded_session(&[500.0, 495.0], None);
        let mut buf = Vec::new();
        write_json(&snapshot, &PatientInfo::default(), &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["snapshot"]["status"], "running");
        assert_eq!(value["snapshot"]["readings"].as_array().unwrap().len(), 2);
        assert!(value["patient"]["name"].is_null());
    }

    #[test]
    fn file_name_uses_kind_and_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap();
        assert_eq!(
            ExportFormat::Csv.file_name(at),
            "chidori_data_2026-03-14_090507.csv"
        );
        assert_eq!(
            ExportFormat::Txt.file_name(at),
            "chidori_report_2026-03-14_090507.txt"
        );
    }

    #[test]
    fn export_to_dir_writes_each_format() {
        let dir = tempdir().unwrap();
        let snapshot = recorded_session(&[500.0, 480.0], Some(0));
        let patient = PatientInfo::default();

        for format in [ExportFormat::Csv, ExportFormat::Txt, ExportFormat::Json] {
            let path = export_to_dir(&snapshot, &patient, format, dir.path()).unwrap();
            assert!(path.starts_with(dir.path()));
            assert_eq!(
                path.extension().and_then(|e| e.to_str()),
                Some(format.extension())
            );
            assert!(fs::metadata(&path).unwrap().len() > 0);
        }
    }
}
