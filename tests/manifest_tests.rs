use pretty_assertions::assert_eq;

use collator_pdf::manifest::{
    auto_map_columns, bind_pending_rows, normalize_row, Field, FieldMapping, Priority,
    PENDING_SOURCE,
};
use collator_pdf::range::{expand_rows, parse_page_range};

mod common;
use common::{raw_row, row};

#[test]
fn range_expands_inclusively_and_in_order() {
    assert_eq!(parse_page_range("3-5"), vec![3, 4, 5]);
    assert_eq!(parse_page_range("15"), vec![15]);
    assert_eq!(parse_page_range(" 7 - 9 "), vec![7, 8, 9]);
}

#[test]
fn range_accepts_unicode_dashes() {
    assert_eq!(parse_page_range("3\u{2013}5"), vec![3, 4, 5]);
    assert_eq!(parse_page_range("3\u{2014}5"), vec![3, 4, 5]);
}

#[test]
fn invalid_ranges_yield_nothing() {
    assert_eq!(parse_page_range("5-3"), Vec::<u32>::new());
    assert_eq!(parse_page_range("0"), Vec::<u32>::new());
    assert_eq!(parse_page_range("-2"), Vec::<u32>::new());
    assert_eq!(parse_page_range("abc"), Vec::<u32>::new());
    assert_eq!(parse_page_range("1-2-3"), Vec::<u32>::new());
    assert_eq!(parse_page_range("0-4"), Vec::<u32>::new());
}

#[test]
fn expand_rows_copies_other_fields_and_counts_drops() {
    let rows = vec![
        raw_row(&[("page", "2-4"), ("type", "Swap")]),
        raw_row(&[("page", "bogus"), ("type", "Bond")]),
        raw_row(&[("page", ""), ("type", "Note")]),
        raw_row(&[("page", "7"), ("type", "Swap")]),
    ];

    let (expanded, dropped) = expand_rows(&rows, "page");

    assert_eq!(dropped, 1);
    assert_eq!(expanded.len(), 5);
    let pages: Vec<&str> = expanded.iter().map(|r| r["page"].as_str()).collect();
    assert_eq!(pages, vec!["2", "3", "4", "", "7"]);
    assert_eq!(expanded[0]["type"], "Swap");
    assert_eq!(expanded[2]["type"], "Swap");
    // The empty page reference passes through for downstream validation.
    assert_eq!(expanded[3]["type"], "Note");
}

#[test]
fn auto_mapping_matches_exact_aliases_case_insensitively() {
    let columns: Vec<String> = ["Source File", "PAGE", "Trade Date", "Type", "Notional"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let outcome = auto_map_columns(&columns);

    assert!(outcome.missing.is_empty());
    assert_eq!(outcome.mapping.column(Field::SourceId), Some("Source File"));
    assert_eq!(outcome.mapping.column(Field::PageNumber), Some("PAGE"));
    assert_eq!(outcome.mapping.column(Field::PrimaryDate), Some("Trade Date"));
    assert_eq!(outcome.mapping.column(Field::DocType), Some("Type"));
    assert_eq!(outcome.mapping.column(Field::Value), Some("Notional"));
}

#[test]
fn auto_mapping_falls_back_to_fuzzy_matches() {
    let columns: Vec<String> = ["filename", "Page Numbr", "date", "type"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let outcome = auto_map_columns(&columns);

    assert!(outcome.missing.is_empty());
    assert_eq!(outcome.mapping.column(Field::PageNumber), Some("Page Numbr"));
}

#[test]
fn auto_mapping_reports_missing_required_fields() {
    let columns: Vec<String> = ["quantity", "color"].iter().map(|c| c.to_string()).collect();

    let outcome = auto_map_columns(&columns);

    assert!(outcome.missing.contains(&Field::PageNumber));
    assert!(outcome.missing.contains(&Field::PrimaryDate));
    assert!(outcome.missing.contains(&Field::DocType));
    assert!(outcome.missing.contains(&Field::SourceId));
    assert_eq!(outcome.columns, columns);
}

#[test]
fn normalization_applies_documented_leniency_defaults() {
    let mut mapping = FieldMapping::new();
    mapping
        .set(Field::SourceId, "file")
        .set(Field::PageNumber, "page")
        .set(Field::PrimaryDate, "date")
        .set(Field::DocType, "type")
        .set(Field::Value, "value")
        .set(Field::Priority, "priority");

    let raw = raw_row(&[
        ("file", "a.pdf"),
        ("page", "not-a-number"),
        ("date", ""),
        ("type", ""),
        ("value", "garbage"),
        ("priority", "sometime"),
    ]);
    let row = normalize_row(&raw, &mapping);

    assert_eq!(row.page_number, 1);
    assert_eq!(row.primary_date, "Unknown Date");
    assert_eq!(row.doc_type, "General");
    assert_eq!(row.asset_class, "Other");
    assert_eq!(row.counterparty, "Unknown");
    assert_eq!(row.value, 0.0);
    assert_eq!(row.priority, Priority::Normal);
    assert_eq!(row.id, "");
}

#[test]
fn normalization_parses_well_formed_cells() {
    let mut mapping = FieldMapping::new();
    mapping
        .set(Field::SourceId, "file")
        .set(Field::PageNumber, "page")
        .set(Field::PrimaryDate, "date")
        .set(Field::SettlementDate, "settle")
        .set(Field::DocType, "type")
        .set(Field::Value, "value")
        .set(Field::Priority, "priority");

    let raw = raw_row(&[
        ("file", "a.pdf"),
        ("page", "12"),
        ("date", "2024-03-01"),
        ("settle", "2024-03-03"),
        ("type", "Swap"),
        ("value", "1,250.75"),
        ("priority", "URGENT"),
    ]);
    let row = normalize_row(&raw, &mapping);

    assert_eq!(row.page_number, 12);
    assert_eq!(row.settlement_date, "2024-03-03");
    assert_eq!(row.value, 1250.75);
    assert_eq!(row.priority, Priority::Urgent);
}

#[test]
fn settlement_date_falls_back_to_primary_date() {
    let mut mapping = FieldMapping::new();
    mapping
        .set(Field::SourceId, "file")
        .set(Field::PageNumber, "page")
        .set(Field::PrimaryDate, "date")
        .set(Field::DocType, "type");

    let raw = raw_row(&[
        ("file", "a.pdf"),
        ("page", "1"),
        ("date", "2024-03-01"),
        ("type", "Swap"),
    ]);
    let row = normalize_row(&raw, &mapping);

    assert_eq!(row.settlement_date, "2024-03-01");
}

#[test]
fn unmapped_source_column_yields_pending_sentinel() {
    let mut mapping = FieldMapping::new();
    mapping
        .set(Field::PageNumber, "page")
        .set(Field::PrimaryDate, "date")
        .set(Field::DocType, "type");

    let raw = raw_row(&[("page", "1"), ("date", "2024-01-01"), ("type", "A")]);
    let row = normalize_row(&raw, &mapping);

    assert_eq!(row.source_id, PENDING_SOURCE);
}

#[test]
fn bind_pending_rows_rebinds_only_the_sentinel() {
    let mut rows = vec![row(PENDING_SOURCE, 1), row("known.pdf", 2), row(PENDING_SOURCE, 3)];

    let bound = bind_pending_rows(&mut rows, "single.pdf");

    assert_eq!(bound, 2);
    assert_eq!(rows[0].source_id, "single.pdf");
    assert_eq!(rows[1].source_id, "known.pdf");
    assert_eq!(rows[2].source_id, "single.pdf");

    // A second binding pass finds nothing pending.
    assert_eq!(bind_pending_rows(&mut rows, "other.pdf"), 0);
    assert_eq!(rows[0].source_id, "single.pdf");
}
