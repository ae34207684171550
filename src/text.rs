//! Read measurement tables from delimited text.
//!
//! The first line is a header naming the columns. Cells are separated by tabs,
//! commas or semicolons, whichever the header line uses. Empty cells and `nan`
//! read as NaN, so incomplete rows survive loading. They are dropped before
//! fitting by [`SampleTable::finite_rows`].
use std::fs;
use std::io::{self, prelude::*};
use std::path;

use thiserror::Error;

use crate::fitter::{CurveFitEngine, FitError, FitRequest};
use crate::result::FitResult;
use crate::series::FitTarget;
use crate::trim::{TrimError, TrimMask};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Io(#[from] io::Error),
    #[error("The table has no header line")]
    Empty,
    #[error("Missing column {0:?}")]
    MissingColumn(String),
    #[error("Could not parse {value:?} in column {column:?} on line {line} as a number")]
    Parse {
        line: usize,
        column: String,
        value: String,
    },
    #[error(transparent)]
    Trim(#[from] TrimError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// The header names of the three columns to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub time: String,
    pub signal: String,
    pub background: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            time: "Time [ms]".to_string(),
            signal: "Data_".to_string(),
            background: "Background".to_string(),
        }
    }
}

/// The time, signal and background columns of a measurement table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    pub time: Vec<f64>,
    pub signal: Vec<f64>,
    pub background: Vec<f64>,
}

fn detect_delimiter(header: &str) -> char {
    ['\t', ',', ';']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .filter(|d| header.contains(*d))
        .unwrap_or('\t')
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim().trim_matches('"');
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

impl SampleTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Read a table using the default [`ColumnNames`]
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, TableError> {
        Self::from_reader_with(reader, &ColumnNames::default())
    }

    /// Read a table, locating the three columns by their header names.
    ///
    /// Blank lines are skipped. Columns other than the three requested are ignored.
    pub fn from_reader_with<R: BufRead>(
        reader: R,
        columns: &ColumnNames,
    ) -> Result<Self, TableError> {
        let mut lines = reader.lines().enumerate();
        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(TableError::Empty),
            }
        };
        let delimiter = detect_delimiter(&header);
        let names: Vec<&str> = header
            .split(delimiter)
            .map(|s| s.trim().trim_matches('"'))
            .collect();
        let locate = |name: &str| {
            names
                .iter()
                .position(|n| *n == name)
                .ok_or_else(|| TableError::MissingColumn(name.to_string()))
        };
        let wanted = [
            (locate(&columns.time)?, &columns.time),
            (locate(&columns.signal)?, &columns.signal),
            (locate(&columns.background)?, &columns.background),
        ];

        let mut table = SampleTable::default();
        for (i, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(delimiter).collect();
            let mut row = [f64::NAN; 3];
            for (slot, (index, name)) in row.iter_mut().zip(wanted.iter()) {
                let cell = cells.get(*index).copied().unwrap_or("");
                *slot = parse_cell(cell).ok_or_else(|| TableError::Parse {
                    line: i + 1,
                    column: name.to_string(),
                    value: cell.to_string(),
                })?;
            }
            table.time.push(row[0]);
            table.signal.push(row[1]);
            table.background.push(row[2]);
        }
        log::debug!("Read {} rows", table.len());
        Ok(table)
    }

    /// Build a fit request over every row of the table.
    ///
    /// Rows are passed through as they are. [`SampleTable::finite_rows`] drops
    /// incomplete rows first.
    pub fn to_request(&self, target: FitTarget) -> FitRequest<'_> {
        FitRequest::new(&self.time, &self.signal, target, Some(&self.background))
    }

    /// Keep only the rows `mask` keeps
    pub fn trimmed(&self, mask: &TrimMask) -> Result<SampleTable, TrimError> {
        Ok(SampleTable {
            time: mask.apply(&self.time)?,
            signal: mask.apply(&self.signal)?,
            background: mask.apply(&self.background)?,
        })
    }

    /// Keep only the rows whose time, signal and background are all finite.
    ///
    /// The background column counts even when only the raw signal will be fit,
    /// so both fit targets see the same rows.
    pub fn finite_rows(&self) -> SampleTable {
        let mut table = SampleTable::default();
        for ((t, y), b) in self
            .time
            .iter()
            .zip(self.signal.iter())
            .zip(self.background.iter())
        {
            if t.is_finite() && y.is_finite() && b.is_finite() {
                table.time.push(*t);
                table.signal.push(*y);
                table.background.push(*b);
            }
        }
        if table.len() < self.len() {
            log::debug!("Dropped {} incomplete rows", self.len() - table.len());
        }
        table
    }

    /// Fit the complete rows kept by `mask`, or every complete row if there is no mask.
    ///
    /// The mask indexes the rows of this table, before incomplete rows are dropped.
    pub fn fit_with(
        &self,
        engine: &CurveFitEngine,
        target: FitTarget,
        mask: Option<&TrimMask>,
    ) -> Result<FitResult, TableError> {
        let complete = match mask {
            Some(mask) => self.trimmed(mask)?.finite_rows(),
            None => self.finite_rows(),
        };
        Ok(engine.fit(&complete.to_request(target))?)
    }
}

/// Read a [`SampleTable`] from the file at `path` with the default column names
pub fn load_sample_table<P: AsRef<path::Path>>(path: P) -> Result<SampleTable, TableError> {
    let reader = io::BufReader::new(fs::File::open(path)?);
    SampleTable::from_reader(reader)
}
