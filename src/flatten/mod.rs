use itertools::Itertools;

use crate::workbook::{Row, Sheet, Workbook};

/// How data rows are lined up against the header line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColumnAlignment {
    /// Header is the union of all row keys in first-seen order and every row
    /// is emitted in header order, blanks for missing keys.
    #[default]
    Header,
    /// Header is the first row's keys and every row is joined in its own key
    /// order. Rows with a different key set end up shifted against the header.
    AsRead,
}

impl ColumnAlignment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "header" | "aligned" => Some(Self::Header),
            "as-read" | "as_read" | "raw" => Some(Self::AsRead),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::AsRead => "as-read",
        }
    }
}

/// Serializes every non-empty sheet into a `<DATA name="...">` block of
/// tab-separated lines. Blocks are separated by one blank line.
pub fn flatten_workbook(workbook: &Workbook, alignment: ColumnAlignment) -> String {
    workbook
        .sheets
        .iter()
        .filter_map(|sheet| flatten_sheet(sheet, alignment))
        .join("\n\n")
}

pub fn flatten_sheet(sheet: &Sheet, alignment: ColumnAlignment) -> Option<String> {
    let first = sheet.rows.first()?;
    let (header, values) = match alignment {
        ColumnAlignment::AsRead => (
            first.keys().join("\t"),
            sheet.rows.iter().map(join_own_order).join("\n"),
        ),
        ColumnAlignment::Header => {
            let columns = header_columns(&sheet.rows);
            (
                columns.iter().join("\t"),
                sheet
                    .rows
                    .iter()
                    .map(|row| join_in_order(row, &columns))
                    .join("\n"),
            )
        }
    };
    Some(format!(
        "<DATA name=\"{}\">\n{}\n{}\n</DATA>",
        sheet.name, header, values
    ))
}

fn join_own_order(row: &Row) -> String {
    row.fields.iter().map(|(_, v)| v.to_string()).join("\t")
}

fn join_in_order(row: &Row, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
        .join("\t")
}

fn header_columns(rows: &[Row]) -> Vec<&str> {
    rows.iter().flat_map(|r| r.keys()).unique().collect()
}
