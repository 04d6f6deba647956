use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use ppgcore::analysis::filter::{FilterFamily, Response};
use ppgcore::log::create_logger;
use ppgcore::storage::{Session, WindowAction};
use ppgcore::{Analysis, AnalysisConfig, FileAccessError, Parameters};

fn ppg_file(name: &str, rows: usize) -> PathBuf {
    let mut text = String::from("timestamp,IR_adc,Red_adc\n");
    for i in 0..rows {
        let t = i as f64 / 100.0;
        let phase = 2.0 * std::f64::consts::PI * 1.2 * t;
        text.push_str(&format!(
            "{:.2},{:.3},{:.3}\n",
            t,
            800.0 + 80.0 * phase.cos(),
            1000.0 + 100.0 * phase.sin()
        ));
    }
    let path = std::env::temp_dir().join(format!("ppgcore-session-{}-{}.csv", std::process::id(), name));
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn open_guesses_columns_and_default_window() {
    let path = ppg_file("open", 500);
    let session = Session::open(&path, &AnalysisConfig::default()).unwrap();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.total_rows, 500);
    assert_eq!(snapshot.first.as_deref(), Some("Red_adc"));
    assert_eq!(snapshot.second.as_deref(), Some("IR_adc"));
    assert_eq!((snapshot.start_row, snapshot.end_row), (0, 499));
    fs::remove_file(path).unwrap();
}

#[test]
fn window_actions_stay_inside_the_file() {
    let path = ppg_file("nudge", 3000);
    let session = Session::open(&path, &AnalysisConfig::default()).unwrap();

    let moved = session.apply(WindowAction::Set { start: 100, end: 1099 });
    assert_eq!((moved.start_row, moved.end_row), (100, 1099));

    let moved = session.apply(WindowAction::Nudge(1000));
    assert_eq!((moved.start_row, moved.end_row), (1100, 2099));

    let moved = session.apply(WindowAction::Nudge(10_000));
    assert_eq!((moved.start_row, moved.end_row), (2999, 2999));

    let moved = session.apply(WindowAction::Nudge(-10_000));
    assert_eq!((moved.start_row, moved.end_row), (0, 0));

    let moved = session.apply(WindowAction::Set { start: 50, end: 10 });
    assert!(moved.start_row <= moved.end_row);
    fs::remove_file(path).unwrap();
}

#[test]
fn column_selection_is_validated() {
    let path = ppg_file("select", 10);
    let session = Session::open(&path, &AnalysisConfig::default()).unwrap();
    assert!(matches!(
        session.select_columns("Red_adc", "green"),
        Err(FileAccessError::MissingColumn { .. })
    ));
    // a rejected selection leaves the snapshot untouched
    assert_eq!(session.snapshot().second.as_deref(), Some("IR_adc"));

    let swapped = session.select_columns("IR_adc", "Red_adc").unwrap();
    assert_eq!(swapped.first.as_deref(), Some("IR_adc"));
    fs::remove_file(path).unwrap();
}

#[test]
fn readers_never_observe_a_torn_window() {
    let path = ppg_file("threads", 5000);
    let session = Arc::new(Session::open(&path, &AnalysisConfig::default()).unwrap());

    let writer = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            for i in 0..200 {
                let start = (i * 17) % 4000;
                session.apply(WindowAction::Set { start, end: start + 999 });
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                for _ in 0..500 {
                    let snapshot = session.snapshot();
                    let len = snapshot.end_row - snapshot.start_row + 1;
                    assert!(len == 1000 || (snapshot.start_row, snapshot.end_row) == (0, 4999));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    fs::remove_file(path).unwrap();
}

#[test]
fn loaded_window_feeds_the_pipeline() {
    let path = ppg_file("pipeline", 2000);
    let config = AnalysisConfig::default();
    let session = Session::open_with_logger(&path, &config, create_logger("session")).unwrap();
    session.apply(WindowAction::Set { start: 500, end: 1499 });

    let window = session.load_window().unwrap();
    assert_eq!(window.len(), 1000);
    assert_eq!(window.columns, vec!["Red_adc", "IR_adc"]);

    let mut params = Parameters::from_config(&config);
    params.filter.family = FilterFamily::Butterworth;
    params.filter.response = Response::Bandpass;
    let report = Analysis::with_logger(config, create_logger("analysis")).analyze(&window, &params);

    let hr = report.hr_mean.value().unwrap();
    assert!((hr - 72.0).abs() < 72.0 * 0.05, "hr {}", hr);
    let spo2 = report.window_ratio.spo2.value().unwrap();
    assert!((70.0..=100.0).contains(&spo2));
    assert_eq!(report.display.raw[0].times[0], 5.0);
    fs::remove_file(path).unwrap();
}
