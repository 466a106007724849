use std::io::Cursor;
use std::sync::mpsc;
use std::time::Duration;

use assert_matches::assert_matches;
use chidori::alarm::{AlarmConfig, AlarmMode};
use chidori::clock::ManualClock;
use chidori::runtime::{FixedTicker, MonitorEvent, Runner, TestEventSource};
use chidori::session::{Notification, SessionEngine, SessionStatus};
use chidori::upstream::{spawn_reader, RecordingSink, UpstreamCommand};

// Headless integration using the runtime + SessionEngine without a TTY.
// Upstream lines arrive through the same reader thread the TCP bridge uses.
#[test]
fn headless_stream_is_ingested_until_disconnect() {
    let clock = ManualClock::new();
    let sink = RecordingSink::new();
    let mut engine = SessionEngine::with_clock(clock.clone(), Box::new(sink.clone()));
    let notifications = engine.subscribe();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    engine.start();
    let feed = "512.0\n508.5\nbridge ready\n501.25\n\n497\n";
    let reader = spawn_reader(Cursor::new(feed.as_bytes().to_vec()), tx);

    let mut disconnected = false;
    for _ in 0..200u32 {
        match runner.step() {
            MonitorEvent::Message(line) => {
                clock.advance_secs(1.5);
                engine.ingest_message(&line);
            }
            MonitorEvent::Disconnected => {
                disconnected = true;
                break;
            }
            MonitorEvent::Tick => {
                engine.on_tick();
            }
            _ => {}
        }
    }
    reader.join().unwrap();

    assert!(disconnected, "reader should report the end of the stream");
    let values: Vec<f64> = engine.readings().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![512.0, 508.5, 501.25, 497.0]);
    assert_eq!(engine.statistics().initial_value, Some(512.0));
    assert_eq!(engine.statistics().min, Some(497.0));
    assert!(engine.statistics().rate < 0.0);
    assert_eq!(sink.sent(), vec![UpstreamCommand::Start]);

    let ingested = notifications
        .try_iter()
        .filter(|n| matches!(n, Notification::ReadingIngested { .. }))
        .count();
    assert_eq!(ingested, 4);
}

#[test]
fn headless_pause_drops_readings_and_freezes_clock() {
    let clock = ManualClock::new();
    let mut engine = SessionEngine::with_clock(clock.clone(), Box::new(RecordingSink::new()));

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );

    engine.start();
    clock.advance_secs(10.0);
    tx.send(MonitorEvent::Message("450".into())).unwrap();
    if let MonitorEvent::Message(line) = runner.step() {
        engine.ingest_message(&line);
    }

    engine.stop();
    clock.advance_secs(30.0);
    tx.send(MonitorEvent::Message("440".into())).unwrap();
    if let MonitorEvent::Message(line) = runner.step() {
        assert!(!engine.ingest_message(&line));
    }
    assert_matches!(runner.step(), MonitorEvent::Tick);
    assert!((engine.elapsed_secs() - 10.0).abs() < 1e-9);

    engine.start();
    clock.advance_secs(5.0);
    assert!(engine.ingest(430.0));
    let last = engine.readings().last().unwrap();
    assert!((last.t - 15.0).abs() < 1e-9);
    assert_eq!(engine.status(), SessionStatus::Running);
}

#[test]
fn headless_alarm_fires_once_across_a_stream() {
    let clock = ManualClock::new();
    let mut engine = SessionEngine::with_clock(clock.clone(), Box::new(RecordingSink::new()))
        .with_alarm(AlarmConfig {
            enabled: true,
            mode: AlarmMode::Percent,
            pct_threshold: Some(95.0),
            ..AlarmConfig::default()
        });
    let notifications = engine.subscribe();

    engine.start();
    for value in [600.0, 590.0, 575.0, 569.0, 560.0, 580.0, 550.0] {
        clock.advance_secs(2.0);
        engine.ingest(value);
    }

    let fired: Vec<Notification> = notifications
        .try_iter()
        .filter(|n| matches!(n, Notification::AlarmFired { .. }))
        .collect();
    assert_eq!(
        fired,
        vec![Notification::AlarmFired {
            value: 569.0,
            threshold: 570.0
        }]
    );

    engine.reset();
    assert!(!engine.alarm_fired());
    assert!(engine.alarm().enabled);
}
