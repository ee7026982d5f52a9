//! Roster-sheet parsing for bulk student import. Accepts xlsx workbooks or
//! plain CSV; the first column is the student name, the second the roll
//! number. A leading header row is skipped when detected.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("could not read workbook: {0}")]
    Workbook(String),

    #[error("the workbook has no sheets")]
    NoSheet,

    #[error("could not read csv: {0}")]
    Csv(String),

    #[error("unsupported roster format '{0}'; upload .xlsx or .csv")]
    UnsupportedFormat(String),
}

/// One raw row from the uploaded sheet, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterRow {
    /// 1-based data-row number (header excluded)
    pub row: usize,
    pub name: Option<String>,
    pub roll_number: Option<String>,
}

/// Parse an uploaded roster by file extension.
pub fn parse_roster(file_name: &str, bytes: &[u8]) -> Result<Vec<RosterRow>, RosterError> {
    let extension = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "xlsx" => parse_xlsx(bytes),
        "csv" => parse_csv(bytes),
        other => Err(RosterError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_xlsx(bytes: &[u8]) -> Result<Vec<RosterRow>, RosterError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| RosterError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RosterError::NoSheet)?
        .map_err(|e| RosterError::Workbook(e.to_string()))?;

    let mut rows = Vec::new();
    let mut data_row = 0usize;
    for (index, cells) in range.rows().enumerate() {
        let name = cells.first().and_then(normalize_cell);
        let roll_number = cells.get(1).and_then(normalize_cell);

        if index == 0 && is_header(name.as_deref()) {
            continue;
        }
        if name.is_none() && roll_number.is_none() {
            continue;
        }

        data_row += 1;
        rows.push(RosterRow {
            row: data_row,
            name,
            roll_number,
        });
    }

    Ok(rows)
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RosterRow>, RosterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut data_row = 0usize;
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RosterError::Csv(e.to_string()))?;
        let name = record.get(0).and_then(normalize_text);
        let roll_number = record.get(1).and_then(normalize_text);

        if index == 0 && is_header(name.as_deref()) {
            continue;
        }
        if name.is_none() && roll_number.is_none() {
            continue;
        }

        data_row += 1;
        rows.push(RosterRow {
            row: data_row,
            name,
            roll_number,
        });
    }

    Ok(rows)
}

fn is_header(first_cell: Option<&str>) -> bool {
    matches!(
        first_cell.map(str::to_ascii_lowercase).as_deref(),
        Some("name") | Some("student name") | Some("student")
    )
}

fn normalize_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Spreadsheet cells come back typed; roll numbers in particular arrive as
/// floats from Excel and must not render as "12.0".
fn normalize_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => normalize_text(s),
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => normalize_text(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_header_is_parsed() {
        let bytes = b"Name,Roll Number\nAsha Patel,1\nRohan Shah,2\n";
        let rows = parse_roster("roster.csv", bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].name.as_deref(), Some("Asha Patel"));
        assert_eq!(rows[0].roll_number.as_deref(), Some("1"));
        assert_eq!(rows[1].roll_number.as_deref(), Some("2"));
    }

    #[test]
    fn csv_without_header_keeps_first_row() {
        let bytes = b"Asha Patel,1\nRohan Shah,2\n";
        let rows = parse_roster("roster.csv", bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("Asha Patel"));
    }

    #[test]
    fn missing_cells_survive_as_none() {
        let bytes = b"name,roll\n,5\nMeera Iyer,\n";
        let rows = parse_roster("roster.csv", bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, None);
        assert_eq!(rows[0].roll_number.as_deref(), Some("5"));
        assert_eq!(rows[1].name.as_deref(), Some("Meera Iyer"));
        assert_eq!(rows[1].roll_number, None);
    }

    #[test]
    fn blank_lines_are_dropped() {
        let bytes = b"Asha Patel,1\n,\nRohan Shah,2\n";
        let rows = parse_roster("roster.csv", bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].row, 2);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = parse_roster("roster.pdf", b"whatever");
        assert!(matches!(result, Err(RosterError::UnsupportedFormat(_))));
    }

    #[test]
    fn float_roll_numbers_render_as_integers() {
        assert_eq!(normalize_cell(&Data::Float(12.0)).as_deref(), Some("12"));
        assert_eq!(normalize_cell(&Data::Float(12.5)).as_deref(), Some("12.5"));
        assert_eq!(normalize_cell(&Data::Int(7)).as_deref(), Some("7"));
        assert_eq!(normalize_cell(&Data::Empty), None);
        assert_eq!(
            normalize_cell(&Data::String("  A-3 ".to_string())).as_deref(),
            Some("A-3")
        );
    }
}
