use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use slog::{info, warn, Logger};

use super::{count_rows, read_header, read_window, Window};
use crate::config::AnalysisConfig;
use crate::error::FileAccessError;
use crate::log::silent_logger;

/// Everything known about the currently opened source file. Replaced as a
/// whole, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub path: PathBuf,
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub first: Option<String>,
    pub second: Option<String>,
    pub start_row: usize,
    pub end_row: usize,
}

impl SourceSnapshot {
    fn clamped(mut self) -> Self {
        if self.total_rows > 0 {
            let last = self.total_rows - 1;
            self.start_row = self.start_row.min(last);
            self.end_row = self.end_row.clamp(self.start_row, last);
        } else {
            self.end_row = self.end_row.max(self.start_row);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAction {
    Set { start: usize, end: usize },
    /// Moves both ends by the given number of rows.
    Nudge(i64),
}

fn shift(row: usize, delta: i64) -> usize {
    if delta >= 0 {
        row.saturating_add(delta as usize)
    } else {
        row.saturating_sub(delta.unsigned_abs() as usize)
    }
}

const RED_PREFIXES: [&str; 3] = ["r_", "r-", "r "];
const IR_PREFIXES: [&str; 3] = ["i_", "i-", "i "];

fn looks_red(lower: &str) -> bool {
    (lower.contains("red") && !lower.contains("infrared")) || RED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn looks_infrared(lower: &str) -> bool {
    lower.contains("infrared") || lower.starts_with("ir") || IR_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Picks the (red, infrared) columns by name, falling back to the first two
/// columns that are not time stamps, then to the first two columns.
pub fn guess_columns(columns: &[String]) -> (Option<String>, Option<String>) {
    let mut red: Option<String> = None;
    let mut ir: Option<String> = None;

    for column in columns {
        let lower = column.to_lowercase();
        if red.is_none() && looks_red(&lower) {
            red = Some(column.clone());
        } else if ir.is_none() && looks_infrared(&lower) {
            ir = Some(column.clone());
        }
    }

    let pick = |candidates: &[&String], red: &mut Option<String>, ir: &mut Option<String>| {
        if candidates.len() < 2 {
            return;
        }
        let first = red.get_or_insert_with(|| candidates[0].clone()).clone();
        if ir.is_none() {
            let second = if *candidates[1] != first { candidates[1] } else { candidates[0] };
            *ir = Some(second.clone());
        }
    };

    if red.is_none() || ir.is_none() {
        let signal_columns: Vec<&String> = columns
            .iter()
            .filter(|c| c.as_str() != "time" && c.as_str() != "timestamp")
            .collect();
        pick(&signal_columns, &mut red, &mut ir);
    }

    if red.is_none() {
        red = columns.first().cloned();
    }
    if ir.is_none() && columns.len() > 1 {
        let all: Vec<&String> = columns.iter().collect();
        pick(&all, &mut red, &mut ir);
    }
    (red, ir)
}

/// The opened source file and the selected row window. Readers always see a
/// complete snapshot; updates swap in a new one.
pub struct Session {
    state: RwLock<Arc<SourceSnapshot>>,
    logger: Logger,
}

impl Session {
    pub fn open(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<Self, FileAccessError> {
        Self::open_with_logger(path, config, silent_logger())
    }

    pub fn open_with_logger(
        path: impl AsRef<Path>,
        config: &AnalysisConfig,
        logger: Logger,
    ) -> Result<Self, FileAccessError> {
        let path = path.as_ref();
        let total_rows = count_rows(path)?;
        let columns = read_header(path)?;
        let (first, second) = guess_columns(&columns);

        let (start, end) = config.window_rows;
        let snapshot = SourceSnapshot {
            path: path.to_path_buf(),
            total_rows,
            columns,
            first,
            second,
            start_row: start,
            end_row: end.min(total_rows.saturating_sub(1)),
        }
        .clamped();

        info!(logger, "Opened source";
            "path" => %path.display(),
            "rows" => total_rows,
            "first" => ?snapshot.first,
            "second" => ?snapshot.second);

        Ok(Self {
            state: RwLock::new(Arc::new(snapshot)),
            logger,
        })
    }

    pub fn snapshot(&self) -> Arc<SourceSnapshot> {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&SourceSnapshot) -> SourceSnapshot) -> Arc<SourceSnapshot> {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = Arc::new(f(&guard));
        *guard = next.clone();
        next
    }

    /// Moves the row window; the result is clamped to the rows that exist.
    pub fn apply(&self, action: WindowAction) -> Arc<SourceSnapshot> {
        self.update(|current| {
            let (start_row, end_row) = match action {
                WindowAction::Set { start, end } => (start, end),
                WindowAction::Nudge(delta) => (shift(current.start_row, delta), shift(current.end_row, delta)),
            };
            SourceSnapshot {
                start_row,
                end_row,
                ..current.clone()
            }
            .clamped()
        })
    }

    pub fn select_columns(&self, first: &str, second: &str) -> Result<Arc<SourceSnapshot>, FileAccessError> {
        let current = self.snapshot();
        for column in [first, second] {
            if !current.columns.iter().any(|c| c == column) {
                warn!(self.logger, "Unknown column"; "column" => column);
                return Err(FileAccessError::MissingColumn {
                    path: current.path.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(self.update(|current| SourceSnapshot {
            first: Some(first.to_string()),
            second: Some(second.to_string()),
            ..current.clone()
        }))
    }

    /// Reads the selected columns over the current window.
    pub fn load_window(&self) -> Result<Window, FileAccessError> {
        let snapshot = self.snapshot();
        let missing = |what: &str| FileAccessError::MissingColumn {
            path: snapshot.path.clone(),
            column: what.to_string(),
        };
        let first = snapshot.first.as_deref().ok_or_else(|| missing("<first channel>"))?;
        let second = snapshot.second.as_deref().ok_or_else(|| missing("<second channel>"))?;

        let window = read_window(&snapshot.path, &[first, second], snapshot.start_row, snapshot.end_row)?;
        if window.filled_rows > 0 {
            warn!(self.logger, "Filled rows with missing values"; "count" => window.filled_rows);
        }
        info!(self.logger, "Window loaded";
            "start" => window.start_row,
            "end" => window.end_row,
            "samples" => window.len());
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn guesses_by_name_then_position() {
        assert_eq!(
            guess_columns(&names(&["time", "IR_adc", "Red_adc"])),
            (Some("Red_adc".into()), Some("IR_adc".into()))
        );
        assert_eq!(
            guess_columns(&names(&["timestamp", "ch_a", "ch_b"])),
            (Some("ch_a".into()), Some("ch_b".into()))
        );
        assert_eq!(
            guess_columns(&names(&["time", "only"])),
            (Some("time".into()), Some("only".into()))
        );
        assert_eq!(
            guess_columns(&names(&["Infrared", "r_raw"])),
            (Some("r_raw".into()), Some("Infrared".into()))
        );
        assert_eq!(guess_columns(&names(&["single"])), (Some("single".into()), None));
        assert_eq!(guess_columns(&[]), (None, None));
    }

    #[test]
    fn clamping_keeps_window_inside_file() {
        let snapshot = SourceSnapshot {
            path: PathBuf::from("x.csv"),
            total_rows: 100,
            columns: vec![],
            first: None,
            second: None,
            start_row: 250,
            end_row: 10,
        }
        .clamped();
        assert_eq!((snapshot.start_row, snapshot.end_row), (99, 99));
        assert_eq!(shift(5, -10), 0);
        assert_eq!(shift(5, 10), 15);
    }
}
