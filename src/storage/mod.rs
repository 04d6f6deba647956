use std::io;
use std::path::Path;

use csv::{ByteRecord, Reader, ReaderBuilder, StringRecord, Trim, Writer};
use ndarray::{Array1, ArrayView1};

use crate::error::FileAccessError;

mod session;

pub use session::{guess_columns, Session, SourceSnapshot, WindowAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Raw,
    Ac,
}

/// Named samples of one optical channel at sampling rate `fs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelKind,
    pub fs: f64,
    pub samples: Array1<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind, fs: f64, samples: Array1<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            fs,
            samples,
        }
    }

    /// AC counterpart sharing name and time base.
    pub fn with_ac(&self, samples: Array1<f64>) -> Channel {
        debug_assert_eq!(samples.len(), self.samples.len());
        Channel::new(self.name.clone(), ChannelKind::Ac, self.fs, samples)
    }

    pub fn view(&self) -> ArrayView1<f64> {
        self.samples.view()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.fs
    }
}

/// A contiguous row range of the source file, one sample column per
/// requested column and one sample per row. Empty or non-numeric cells are
/// filled from their neighbours in the same column; `filled_rows` counts the
/// rows that needed it. `end_row` is the last row actually read.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub start_row: usize,
    pub end_row: usize,
    pub columns: Vec<String>,
    pub samples: Vec<Array1<f64>>,
    pub filled_rows: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw channels at sampling rate `fs`, in column order.
    pub fn channels(&self, fs: f64) -> Vec<Channel> {
        self.columns
            .iter()
            .zip(&self.samples)
            .map(|(name, samples)| Channel::new(name.clone(), ChannelKind::Raw, fs, samples.clone()))
            .collect()
    }

    /// Seconds since the start of the file for every sample.
    pub fn times(&self, fs: f64) -> Array1<f64> {
        Array1::from_iter((0..self.len()).map(|i| (self.start_row + i) as f64 / fs))
    }
}

fn open(path: &Path) -> Result<Reader<std::fs::File>, FileAccessError> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|source| FileAccessError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

fn headers(reader: &mut Reader<std::fs::File>, path: &Path) -> Result<StringRecord, FileAccessError> {
    reader.headers().cloned().map_err(|source| FileAccessError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Column names from the header row; no data rows are read.
pub fn read_header(path: impl AsRef<Path>) -> Result<Vec<String>, FileAccessError> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    Ok(headers(&mut reader, path)?.iter().map(String::from).collect())
}

/// Number of data rows, header excluded.
pub fn count_rows(path: impl AsRef<Path>) -> Result<usize, FileAccessError> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let mut record = ByteRecord::new();
    let mut rows = 0;
    while reader
        .read_byte_record(&mut record)
        .map_err(|source| FileAccessError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?
    {
        rows += 1;
    }
    Ok(rows)
}

fn parse_cell(cell: Option<&str>) -> Option<f64> {
    cell.and_then(|c| c.parse::<f64>().ok()).filter(|v| v.is_finite())
}

/// Replaces missing samples by linear interpolation between the nearest
/// valid neighbours; gaps at either end take the nearest valid value. A
/// column without any valid sample becomes all zeros.
fn fill_gaps(column: &[Option<f64>]) -> Array1<f64> {
    let mut filled = Array1::zeros(column.len());
    let mut previous: Option<(usize, f64)> = None;
    let mut i = 0;
    while i < column.len() {
        if let Some(v) = column[i] {
            filled[i] = v;
            previous = Some((i, v));
            i += 1;
            continue;
        }
        let gap_end = (i..column.len()).find(|&j| column[j].is_some());
        let next = gap_end.and_then(|j| column[j].map(|v| (j, v)));
        let stop = gap_end.unwrap_or(column.len());
        for k in i..stop {
            filled[k] = match (previous, next) {
                (Some((p, a)), Some((q, b))) => a + (b - a) * (k - p) as f64 / (q - p) as f64,
                (Some((_, a)), None) => a,
                (None, Some((_, b))) => b,
                (None, None) => 0.0,
            };
        }
        i = stop;
    }
    filled
}

/// Reads data rows `start_row..=end_row` (0-based, header excluded) of the
/// named columns. Rows before the window are skipped without being parsed
/// and reading stops after `end_row` or at the end of the file.
pub fn read_window(
    path: impl AsRef<Path>,
    columns: &[&str],
    start_row: usize,
    end_row: usize,
) -> Result<Window, FileAccessError> {
    let path = path.as_ref();
    let end_row = end_row.max(start_row);
    let mut reader = open(path)?;
    let header = headers(&mut reader, path)?;

    let indices = columns
        .iter()
        .map(|&column| {
            header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| FileAccessError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let unreadable = |source| FileAccessError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut skip = ByteRecord::new();
    for _ in 0..start_row {
        if !reader.read_byte_record(&mut skip).map_err(unreadable)? {
            break;
        }
    }

    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); columns.len()];
    let mut record = StringRecord::new();
    let mut rows: usize = 0;
    let mut filled_rows = 0;
    for _ in start_row..=end_row {
        if !reader.read_record(&mut record).map_err(unreadable)? {
            break;
        }
        let mut complete = true;
        for (column, &i) in values.iter_mut().zip(&indices) {
            let cell = parse_cell(record.get(i));
            complete &= cell.is_some();
            column.push(cell);
        }
        if !complete {
            filled_rows += 1;
        }
        rows += 1;
    }

    Ok(Window {
        start_row,
        end_row: start_row + rows.saturating_sub(1),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        samples: values.iter().map(|column| fill_gaps(column)).collect(),
        filled_rows,
    })
}

/// Writes the window as CSV: header row, then one row per sample.
pub fn write_window<W: io::Write>(window: &Window, writer: W) -> Result<(), FileAccessError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(&window.columns)?;
    for row in 0..window.len() {
        writer.write_record(window.samples.iter().map(|s| s[row].to_string()))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
