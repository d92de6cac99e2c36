mod common;

use calamine::{Data, Range};
use common::{n, noc_sheet, s, SAMPLE_WORKBOOK, SAMPLE_XLS_WORKBOOK};
use noc_sync::parser::{NocParser, ParseError};
use noc_sync::record::{NocRecord, Reportable};

#[test]
fn test_parse_sample_workbook() {
    let records = NocParser::new(SAMPLE_WORKBOOK).parse().unwrap();

    assert_eq!(
        records,
        vec![
            NocRecord::new(100, "A", "Theft", Reportable::No),
            NocRecord::new(200, "B", "Assault", Reportable::Yes),
        ]
    );
}

#[test]
fn test_parse_legacy_xls_workbook() {
    let records = NocParser::new(SAMPLE_XLS_WORKBOOK).parse().unwrap();

    assert_eq!(
        records,
        vec![
            NocRecord::new(100, "A", "Theft", Reportable::No),
            NocRecord::new(200, "B", "Assault", Reportable::Yes),
        ]
    );
}

#[test]
fn test_header_row_is_never_a_record() {
    let range = noc_sheet(&[(n(100.0), s("A"), s("Theft"), Data::Empty)]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records.len(), 1);
    assert!(records.iter().all(|r| r.description() != "Description"));
}

#[test]
fn test_rows_missing_mandatory_columns_are_skipped() {
    let range = noc_sheet(&[
        (Data::Empty, s("A"), s("No code"), s("Y")),
        (n(101.0), Data::Empty, s("No degree"), s("Y")),
        (n(102.0), s("M"), Data::Empty, s("Y")),
        (n(103.0), s("M"), s("   "), s("N")),
        (n(104.0), s("F"), s("Kept"), s("N")),
    ]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records, vec![NocRecord::new(104, "F", "Kept", Reportable::No)]);
}

#[test]
fn test_reportable_defaults_to_n_when_absent() {
    let range = noc_sheet(&[
        (n(1.0), s("A"), s("Blank flag"), Data::Empty),
        (n(2.0), s("A"), s("Y flag"), s("Y")),
        (n(3.0), s("A"), s("Lowercase flag"), s("y")),
        (n(4.0), s("A"), s("N flag"), s("N")),
    ]);
    let flags: Vec<Reportable> = NocParser::records_from_range(&range)
        .iter()
        .map(|r| r.reportable())
        .collect();

    assert_eq!(
        flags,
        vec![Reportable::No, Reportable::Yes, Reportable::Yes, Reportable::No]
    );
}

#[test]
fn test_unrecognised_flag_is_treated_as_n() {
    let range = noc_sheet(&[(n(5.0), s("A"), s("Odd flag"), s("maybe"))]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records[0].reportable(), Reportable::No);
}

#[test]
fn test_non_numeric_code_is_skipped() {
    let range = noc_sheet(&[
        (s("ABC"), s("A"), s("Bad code"), s("Y")),
        (s(" 300 "), s("B"), s("Text code"), s("N")),
        (n(12.5), s("B"), s("Fractional code"), s("N")),
    ]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records, vec![NocRecord::new(300, "B", "Text code", Reportable::No)]);
}

#[test]
fn test_numeric_degree_is_rendered_without_fraction() {
    let range = noc_sheet(&[(n(7.0), n(3.0), s("Numeric degree"), Data::Empty)]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records[0].degree(), "3");
}

#[test]
fn test_source_order_is_preserved() {
    let range = noc_sheet(&[
        (n(900.0), s("A"), s("Last code first"), Data::Empty),
        (n(10.0), s("B"), s("Small code"), Data::Empty),
        (n(500.0), s("C"), s("Middle"), Data::Empty),
    ]);
    let codes: Vec<i32> = NocParser::records_from_range(&range)
        .iter()
        .map(|r| r.code())
        .collect();

    assert_eq!(codes, vec![900, 10, 500]);
}

#[test]
fn test_duplicate_codes_are_kept() {
    let range = noc_sheet(&[
        (n(42.0), s("A"), s("First"), Data::Empty),
        (n(42.0), s("B"), s("Second"), s("Y")),
    ]);
    let records = NocParser::records_from_range(&range);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].code(), records[1].code());
}

#[test]
fn test_header_only_sheet_yields_nothing() {
    let range = noc_sheet(&[]);
    assert!(NocParser::records_from_range(&range).is_empty());
}

#[test]
fn test_empty_range_yields_nothing() {
    let range: Range<Data> = Range::empty();
    assert!(NocParser::records_from_range(&range).is_empty());
}

#[test]
fn test_range_not_starting_at_a1_uses_absolute_columns() {
    // Used area starts at B2: the header row still lives at row 0
    let mut range = Range::new((1, 1), (2, 14));
    range.set_value((1, 1), n(11.0));
    range.set_value((1, 2), s("A"));
    range.set_value((1, 6), s("Offset row"));
    range.set_value((2, 1), n(12.0));
    range.set_value((2, 2), s("B"));
    range.set_value((2, 6), s("Second offset row"));
    range.set_value((2, 14), s("Y"));

    let records = NocParser::records_from_range(&range);

    assert_eq!(
        records,
        vec![
            NocRecord::new(11, "A", "Offset row", Reportable::No),
            NocRecord::new(12, "B", "Second offset row", Reportable::Yes),
        ]
    );
}

#[test]
fn test_missing_file_fails_to_open() {
    let result = NocParser::new("tests/fixtures/does_not_exist.xls").parse();
    assert!(matches!(result, Err(ParseError::WorkbookOpen(_))));
}

#[test]
fn test_corrupt_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noc_nibrs.xls");
    std::fs::write(&path, b"<html>this is not a spreadsheet</html>").unwrap();

    let result = NocParser::new(&path).parse();
    assert!(result.is_err());
}
