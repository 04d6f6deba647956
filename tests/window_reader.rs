use std::fs;
use std::path::PathBuf;

use ppgcore::error::FileAccessError;
use ppgcore::storage::{count_rows, read_header, read_window, write_window};

fn temp_csv(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("ppgcore-{}-{}.csv", std::process::id(), name));
    fs::write(&path, contents).unwrap();
    path
}

fn sample_file(name: &str, rows: usize) -> PathBuf {
    let mut text = String::from("time,red,ir\n");
    for i in 0..rows {
        text.push_str(&format!("{},{},{}\n", i as f64 / 100.0, 1000 + i, 2000 + i));
    }
    temp_csv(name, &text)
}

#[test]
fn reads_only_the_requested_rows() {
    let path = sample_file("range", 50);
    let window = read_window(&path, &["red", "ir"], 10, 19).unwrap();
    assert_eq!(window.len(), 10);
    assert_eq!(window.samples[0][0], 1010.0);
    assert_eq!(window.samples[1][9], 2019.0);
    assert_eq!(window.columns, vec!["red", "ir"]);
    assert_eq!(window.filled_rows, 0);
    fs::remove_file(path).unwrap();
}

#[test]
fn range_is_clamped_to_existing_rows() {
    let path = sample_file("clamp", 20);
    // end before start collapses to a single row
    let single = read_window(&path, &["red"], 5, 2).unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single.samples[0][0], 1005.0);

    let tail = read_window(&path, &["red"], 15, 1000).unwrap();
    assert_eq!(tail.len(), 5);
    assert_eq!(tail.end_row, 19);

    let beyond = read_window(&path, &["red"], 500, 600).unwrap();
    assert!(beyond.is_empty());
    assert_eq!(beyond.end_row, beyond.start_row);
    fs::remove_file(path).unwrap();
}

#[test]
fn missing_values_are_filled_in_place() {
    let path = temp_csv("gaps", "red,ir,note\n1,2,a\n,3,b\n4,x,c\n5,6,\n7,8,d\n");
    let window = read_window(&path, &["red", "ir"], 0, 10).unwrap();
    assert_eq!(window.len(), 5);
    assert_eq!(window.end_row, 4);
    assert_eq!(window.samples[0].to_vec(), vec![1.0, 2.5, 4.0, 5.0, 7.0]);
    assert_eq!(window.samples[1].to_vec(), vec![2.0, 3.0, 4.5, 6.0, 8.0]);
    // only the requested columns count
    assert_eq!(window.filled_rows, 2);
    fs::remove_file(path).unwrap();
}

#[test]
fn samples_after_a_gap_keep_their_row_time() {
    let mut text = String::from("time,red,ir\n");
    for i in 0..20 {
        let red = if i == 12 { String::new() } else { (1000 + i).to_string() };
        text.push_str(&format!("{},{},{}\n", i as f64 / 10.0, red, 2000 + i));
    }
    let path = temp_csv("gap-time", &text);
    let window = read_window(&path, &["red", "ir"], 10, 15).unwrap();
    let times = window.times(10.0);
    assert_eq!(window.len(), 6);
    // row 14 sits four samples in and is stamped with its own time
    assert_eq!(window.samples[0][4], 1014.0);
    assert!((times[4] - 1.4).abs() < 1e-12);
    assert_eq!(window.samples[0][2], 1012.0);
    assert_eq!(window.filled_rows, 1);
    fs::remove_file(path).unwrap();
}

#[test]
fn missing_column_and_missing_file_are_errors() {
    let path = sample_file("missing", 3);
    match read_window(&path, &["red", "green"], 0, 2) {
        Err(FileAccessError::MissingColumn { column, .. }) => assert_eq!(column, "green"),
        other => panic!("unexpected {:?}", other),
    }
    fs::remove_file(&path).unwrap();

    assert!(matches!(
        read_window(&path, &["red"], 0, 2),
        Err(FileAccessError::Unreadable { .. })
    ));
    assert!(count_rows(&path).is_err());
}

#[test]
fn header_and_row_count() {
    let path = sample_file("count", 123);
    assert_eq!(read_header(&path).unwrap(), vec!["time", "red", "ir"]);
    assert_eq!(count_rows(&path).unwrap(), 123);
    fs::remove_file(path).unwrap();

    let empty = temp_csv("header-only", "a,b\n");
    assert_eq!(count_rows(&empty).unwrap(), 0);
    fs::remove_file(empty).unwrap();
}

#[test]
fn exported_window_reads_back() {
    let path = sample_file("export", 30);
    let window = read_window(&path, &["ir", "red"], 3, 7).unwrap();

    let mut out = Vec::new();
    write_window(&window, &mut out).unwrap();
    let copy = temp_csv("export-copy", std::str::from_utf8(&out).unwrap());

    let again = read_window(&copy, &["ir", "red"], 0, 100).unwrap();
    assert_eq!(again.samples, window.samples);
    fs::remove_file(path).unwrap();
    fs::remove_file(copy).unwrap();
}
