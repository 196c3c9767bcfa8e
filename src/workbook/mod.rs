pub mod source;

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

pub use source::WorkbookSource;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("failed to decode spreadsheet: {source}")]
    Decode {
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read sheet '{sheet}': {source}")]
    SheetRead {
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read workbook file: {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch workbook: {url}: {source}")]
    SourceFetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("workbook download returned HTTP {status}: {url}")]
    SourceStatus { url: String, status: u16 },
}

/// A single decoded cell. Blank and error cells never become a `CellValue`.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Int(i64),
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Number(v) => f.write_str(&format_number(*v)),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::DateTime(dt) => {
                if dt.time().num_seconds_from_midnight() == 0 {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

/// Shortest round-trip text for a float, switching to exponent form
/// (`1e+21`, `1.5e-7`) outside `1e-6 <= |v| < 1e21`.
fn format_number(v: f64) -> String {
    let magnitude = v.abs();
    if v == 0.0 || !v.is_finite() || (1e-6..1e21).contains(&magnitude) {
        return v.to_string();
    }
    let exp = format!("{v:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// One data row as an ordered field name -> value mapping.
///
/// Only non-blank cells are present, so two rows of the same sheet can carry
/// different key sets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    pub fields: Vec<(String, CellValue)>,
}

impl Row {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(|s| s.rows.len()).sum()
    }
}

/// Decodes spreadsheet bytes (xlsx, xlsm, xls, ods) into row mappings, one
/// entry per sheet in workbook order.
pub fn decode_workbook(bytes: Vec<u8>) -> Result<Workbook, WorkbookError> {
    let mut sheets_reader = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|source| WorkbookError::Decode { source })?;

    let mut sheets = Vec::new();
    for name in sheets_reader.sheet_names() {
        let range = sheets_reader
            .worksheet_range(&name)
            .map_err(|source| WorkbookError::SheetRead {
                sheet: name.clone(),
                source,
            })?;
        let grid: Vec<Vec<Option<CellValue>>> = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();
        tracing::debug!(sheet = %name, grid_rows = grid.len(), "decoded sheet");
        sheets.push(Sheet::new(name, rows_from_grid(&grid)));
    }
    Ok(Workbook { sheets })
}

fn cell_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::Int(v) => Some(CellValue::Int(*v)),
        Data::Float(v) => Some(CellValue::Number(*v)),
        Data::String(v) => Some(CellValue::Text(v.clone())),
        Data::Bool(v) => Some(CellValue::Bool(*v)),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => Some(CellValue::DateTime(dt)),
            None => Some(CellValue::Text(cell.to_string())),
        },
        Data::DurationIso(v) => Some(CellValue::Text(v.clone())),
        // error cells are left out of the row, like blanks
        Data::Error(_) => None,
    }
}

/// Converts a cell grid into row mappings.
///
/// The first grid row names the fields. Blank header cells become `__EMPTY`
/// and repeated names get a `_N` suffix. Every later row keeps only its
/// non-blank cells, and rows with no such cell are dropped.
pub fn rows_from_grid(grid: &[Vec<Option<CellValue>>]) -> Vec<Row> {
    let Some((header_row, data_rows)) = grid.split_first() else {
        return Vec::new();
    };
    let headers = header_names(header_row);

    let mut rows = Vec::new();
    for cells in data_rows {
        let mut row = Row::default();
        for (idx, cell) in cells.iter().enumerate() {
            let Some(value) = cell else {
                continue;
            };
            // cells beyond the header width are unnamed
            let key = match headers.get(idx) {
                Some(h) => h.clone(),
                None => continue,
            };
            row.fields.push((key, value.clone()));
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    rows
}

fn header_names(cells: &[Option<CellValue>]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        let base = match cell {
            Some(v) => v.to_string(),
            None => "__EMPTY".to_string(),
        };
        let mut name = base.clone();
        let mut counter = seen.get(&base).copied().unwrap_or(0);
        if counter > 0 {
            loop {
                name = format!("{base}_{counter}");
                counter += 1;
                if !seen.contains_key(&name) {
                    break;
                }
            }
            seen.insert(base, counter);
        }
        *seen.entry(name.clone()).or_insert(0) += 1;
        out.push(name);
    }
    out
}
