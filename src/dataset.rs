//! Tabular data: CSV loading and preparation.

use std::fmt;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::error::StageError;

/// One table cell. Numeric-looking text is parsed on load.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Num(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Cell::Empty;
        }
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Num(n),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Cell::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Key used when grouping; numbers drop a trailing `.0`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Num(n) => write!(f, "{n}"),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Empty => Ok(()),
        }
    }
}

/// A column-named, row-major table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    /// Rows shorter than the header are padded with [`Cell::Empty`], longer
    /// ones are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Keep only rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[Cell]) -> bool) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    pub fn head(&self, n: usize) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Project onto the given columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Frame, String> {
        let idx = names
            .iter()
            .map(|n| {
                self.column_index(n)
                    .ok_or_else(|| format!("unknown column `{n}`"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Frame {
            columns: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }

    fn push_column(&mut self, name: &str, values: Vec<Cell>) {
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Up to `n` rows spread evenly over the frame, first row included.
    pub fn sample_rows(&self, n: usize) -> Vec<&[Cell]> {
        let len = self.rows.len();
        if n == 0 || len == 0 {
            return Vec::new();
        }
        let n = n.min(len);
        (0..n).map(|i| self.rows[i * len / n].as_slice()).collect()
    }

    /// Column list with a few example values, for prompts.
    pub fn schema_summary(&self) -> String {
        let mut out = format!("{} rows\ncolumns:\n", self.len());
        for (i, name) in self.columns.iter().enumerate() {
            let samples: Vec<String> = self
                .rows
                .iter()
                .map(|r| r[i].to_string())
                .filter(|s| !s.is_empty())
                .take(3)
                .collect();
            out.push_str(&format!("- {name}: e.g. {}\n", samples.join(", ")));
        }
        out
    }
}

/// Read a CSV file with a header row.
pub fn load_csv(path: &Path) -> Result<Frame, StageError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| StageError::dataset(format!("{}: {e}", path.display())))?;

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(StageError::dataset(format!(
            "{}: missing header row",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::parse).collect());
    }

    debug!(path = %path.display(), rows = rows.len(), columns = columns.len(), "csv loaded");
    Ok(Frame::new(columns, rows))
}

const DATE_SOURCES: [&str; 2] = ["date", "datetime"];

fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    let Cell::Text(s) = cell else {
        return None;
    };
    let head = s.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Derive `year`, `quarter`, `month` and `weekday` from the first date-like
/// source column. Columns that already exist are left alone.
pub fn prepare(mut frame: Frame) -> Frame {
    let Some(idx) = DATE_SOURCES.iter().find_map(|c| frame.column_index(c)) else {
        return frame;
    };

    let dates: Vec<Option<NaiveDate>> = frame.rows.iter().map(|r| parse_date(&r[idx])).collect();
    if dates.iter().all(Option::is_none) {
        return frame;
    }

    let derived: [(&str, fn(NaiveDate) -> Cell); 4] = [
        ("year", |d| Cell::Num(f64::from(d.year()))),
        ("quarter", |d| Cell::Num(f64::from((d.month0() / 3) + 1))),
        ("month", |d| Cell::Num(f64::from(d.month()))),
        ("weekday", |d| Cell::Text(d.weekday().to_string())),
    ];

    for (name, derive) in derived {
        if frame.has_column(name) {
            continue;
        }
        let values = dates
            .iter()
            .map(|d| d.map(derive).unwrap_or(Cell::Empty))
            .collect();
        frame.push_column(name, values);
    }
    frame
}

/// Load a CSV and derive temporal columns.
pub fn load_and_prepare(path: &Path) -> Result<Frame, StageError> {
    let frame = prepare(load_csv(path)?);
    info!(path = %path.display(), rows = frame.len(), "dataset ready");
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn cell_parsing() {
        assert_eq!(Cell::parse(" 38.7 "), Cell::Num(38.7));
        assert_eq!(Cell::parse("Latte"), Cell::Text("Latte".into()));
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse("NaN"), Cell::Text("NaN".into()));
        assert_eq!(Cell::Num(2024.0).to_string(), "2024");
    }

    #[test]
    fn loads_and_derives_dates() {
        let file = write_csv(
            "date,datetime,cash_type,money,coffee_name\n\
             2024-03-01,2024-03-01 10:15:50.520,card,38.7,Latte\n\
             2025-11-30,2025-11-30 18:00:01.000,cash,40,Americano\n",
        );
        let frame = load_and_prepare(file.path()).unwrap();
        assert_eq!(frame.len(), 2);
        let years: Vec<_> = frame.column("year").unwrap().cloned().collect();
        assert_eq!(years, vec![Cell::Num(2024.0), Cell::Num(2025.0)]);
        let quarters: Vec<_> = frame.column("quarter").unwrap().cloned().collect();
        assert_eq!(quarters, vec![Cell::Num(1.0), Cell::Num(4.0)]);
        let weekdays: Vec<_> = frame.column("weekday").unwrap().cloned().collect();
        assert_eq!(weekdays[0], Cell::Text("Fri".into()));
    }

    #[test]
    fn existing_derived_columns_survive() {
        let frame = Frame::new(
            vec!["date".into(), "year".into()],
            vec![vec![Cell::Text("2024-01-05".into()), Cell::Text("FY24".into())]],
        );
        let frame = prepare(frame);
        let years: Vec<_> = frame.column("year").unwrap().cloned().collect();
        assert_eq!(years, vec![Cell::Text("FY24".into())]);
        assert!(frame.has_column("quarter"));
    }

    #[test]
    fn unparseable_dates_leave_frame_untouched() {
        let frame = Frame::new(
            vec!["date".into()],
            vec![vec![Cell::Text("yesterday".into())]],
        );
        let frame = prepare(frame);
        assert_eq!(frame.columns(), ["date"]);
    }

    #[test]
    fn missing_file_is_dataset_error() {
        let err = load_and_prepare(Path::new("/nonexistent/coffee_sales.csv")).unwrap_err();
        assert!(matches!(err, StageError::Dataset(_)));
    }

    #[test]
    fn short_rows_are_padded() {
        let file = write_csv("a,b,c\n1,2\n");
        let frame = load_csv(file.path()).unwrap();
        assert_eq!(frame.rows()[0], vec![Cell::Num(1.0), Cell::Num(2.0), Cell::Empty]);
    }

    #[test]
    fn select_and_head() {
        let frame = Frame::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::Num(1.0), Cell::Num(2.0)],
                vec![Cell::Num(3.0), Cell::Num(4.0)],
            ],
        );
        let picked = frame.select(&["b".into()]).unwrap().head(1);
        assert_eq!(picked.columns(), ["b"]);
        assert_eq!(picked.rows(), [vec![Cell::Num(2.0)]]);
        assert!(frame.select(&["zzz".into()]).is_err());
    }

    #[test]
    fn sample_rows_spread_over_frame() {
        let frame = Frame::new(
            vec!["i".into()],
            (0..10).map(|i| vec![Cell::Num(i as f64)]).collect(),
        );
        let picked: Vec<String> = frame
            .sample_rows(5)
            .iter()
            .map(|r| r[0].to_string())
            .collect();
        assert_eq!(picked, ["0", "2", "4", "6", "8"]);
        assert_eq!(frame.head(2).sample_rows(5).len(), 2);
        assert!(frame.sample_rows(0).is_empty());
    }

    #[test]
    fn schema_summary_lists_columns() {
        let frame = Frame::new(
            vec!["coffee_name".into()],
            vec![vec![Cell::Text("Latte".into())]],
        );
        let summary = frame.schema_summary();
        assert!(summary.contains("1 rows"));
        assert!(summary.contains("- coffee_name: e.g. Latte"));
    }
}
