use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::record::{NocRecord, Reportable};

/// Absolute row holding the column titles
const HEADER_ROW: u32 = 0;

// 0-based column offsets in the court's NOC/NIBRS sheet
const CODE_COL: u32 = 1;
const DEGREE_COL: u32 = 2;
const DESCRIPTION_COL: u32 = 6;
const REPORTABLE_COL: u32 = 14;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),

    #[error("Workbook has no sheets")]
    NoSheets,

    #[error("Failed to read first sheet: {0}")]
    SheetRead(String),

    #[error("Parser task failed: {0}")]
    Task(String),
}

/// Reader for the court's NOC/NIBRS code list (legacy `.xls`, first sheet only)
pub struct NocParser {
    workbook_path: PathBuf,
}

impl NocParser {
    pub fn new(workbook_path: impl Into<PathBuf>) -> Self {
        Self {
            workbook_path: workbook_path.into(),
        }
    }

    pub fn workbook_path(&self) -> &Path {
        &self.workbook_path
    }

    /// Open the workbook and convert the first sheet into records.
    ///
    /// Synchronous; async callers should wrap this in `spawn_blocking`.
    #[instrument(skip(self), fields(path = %self.workbook_path.display()))]
    pub fn parse(&self) -> Result<Vec<NocRecord>, ParseError> {
        let mut workbook = open_workbook_auto(&self.workbook_path)
            .map_err(|e| ParseError::WorkbookOpen(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ParseError::NoSheets)?
            .map_err(|e| ParseError::SheetRead(e.to_string()))?;

        Ok(Self::records_from_range(&range))
    }

    /// Convert sheet rows into records, skipping the header and any row
    /// missing a code, degree or description.
    ///
    /// Cells are addressed by absolute position, so a sheet whose used area
    /// does not start at A1 still maps column 2 to the code and so on.
    pub fn records_from_range(range: &Range<Data>) -> Vec<NocRecord> {
        let (Some((start_row, _)), Some((end_row, _))) = (range.start(), range.end()) else {
            debug!("Sheet is empty");
            return Vec::new();
        };

        let mut records = Vec::new();
        let mut skipped = 0;
        let first_data_row = start_row.max(HEADER_ROW + 1);

        for row in first_data_row..=end_row {
            let cell = |col: u32| range.get_value((row, col)).filter(|d| !is_blank(d));

            let (Some(code_cell), Some(degree_cell), Some(description_cell)) =
                (cell(CODE_COL), cell(DEGREE_COL), cell(DESCRIPTION_COL))
            else {
                debug!("Row {} is missing a mandatory column, skipping", row);
                skipped += 1;
                continue;
            };

            let Some(code) = cell_code(code_cell) else {
                warn!("Row {} has a non-numeric NOC code {:?}, skipping", row, code_cell);
                skipped += 1;
                continue;
            };

            let reportable = match cell(REPORTABLE_COL) {
                Some(flag) => {
                    let text = cell_text(flag);
                    Reportable::from_flag(&text).unwrap_or_else(|| {
                        warn!(
                            "Row {} has unrecognised reportable flag '{}', treating as N",
                            row, text
                        );
                        Reportable::No
                    })
                }
                None => Reportable::No,
            };

            records.push(NocRecord::new(
                code,
                cell_text(degree_cell),
                cell_text(description_cell),
                reportable,
            ));
        }

        info!(
            "Parsed {} NOC entries ({} rows skipped)",
            records.len(),
            skipped
        );
        records
    }
}

fn is_blank(data: &Data) -> bool {
    match data {
        Data::Empty | Data::Error(_) => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a cell as text; whole-number floats lose their trailing `.0`
fn cell_text(data: &Data) -> String {
    match data {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        other => other.to_string(),
    }
}

fn cell_code(data: &Data) -> Option<i32> {
    match data {
        Data::Int(i) => i32::try_from(*i).ok(),
        Data::Float(f) if f.fract() == 0.0 && *f >= i32::MIN as f64 && *f <= i32::MAX as f64 => {
            Some(*f as i32)
        }
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_code() {
        assert_eq!(cell_code(&Data::Float(13001.0)), Some(13001));
        assert_eq!(cell_code(&Data::Int(55)), Some(55));
        assert_eq!(cell_code(&Data::String(" 200 ".to_string())), Some(200));
        assert_eq!(cell_code(&Data::Float(1.5)), None);
        assert_eq!(cell_code(&Data::String("ABC".to_string())), None);
        assert_eq!(cell_code(&Data::Bool(true)), None);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::String("  Theft ".to_string())), "Theft");
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Int(2)), "2");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Data::Empty));
        assert!(is_blank(&Data::String("   ".to_string())));
        assert!(!is_blank(&Data::Float(0.0)));
    }

    #[test]
    fn test_parser_creation() {
        let parser = NocParser::new("noc.xls");
        assert_eq!(parser.workbook_path(), Path::new("noc.xls"));
    }
}
