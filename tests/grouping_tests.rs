use std::collections::HashSet;

use pretty_assertions::assert_eq;

use collator_pdf::config::GroupStrategy;
use collator_pdf::grouping::{
    compare_rows, group_key, group_rows, sanitize_key, sequence_rows, UNGROUPED_KEY,
};
use collator_pdf::manifest::Priority;
use collator_pdf::schedule::allocate_sequences;

mod common;
use common::row;

fn available(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn group_keys_follow_the_strategy() {
    let mut r = row("a.pdf", 1);
    r.primary_date = "2024-05-01T09:30:00".to_string();
    r.settlement_date = "2024-05-03".to_string();
    r.doc_type = "Swap".to_string();
    r.asset_class = "Rates".to_string();
    r.counterparty = "Acme".to_string();

    assert_eq!(
        group_key(&r, GroupStrategy::DateAndType),
        "2024-05-01T09:30:00_Swap"
    );
    assert_eq!(group_key(&r, GroupStrategy::Date), "2024-05-01T09:30:00");
    assert_eq!(group_key(&r, GroupStrategy::Type), "Swap");
    assert_eq!(
        group_key(&r, GroupStrategy::SettlementDate),
        "Settlement_2024-05-03"
    );
    assert_eq!(group_key(&r, GroupStrategy::DayBucket), "DOCS_2024-05-01");
    assert_eq!(group_key(&r, GroupStrategy::AssetClass), "Rates");
    assert_eq!(group_key(&r, GroupStrategy::Counterparty), "Acme");
    assert_eq!(group_key(&r, GroupStrategy::None), UNGROUPED_KEY);
}

#[test]
fn day_bucket_also_splits_on_space() {
    let mut r = row("a.pdf", 1);
    r.primary_date = "2024-05-01 09:30".to_string();
    assert_eq!(group_key(&r, GroupStrategy::DayBucket), "DOCS_2024-05-01");
}

#[test]
fn keys_sanitize_to_filename_safe_characters() {
    assert_eq!(sanitize_key("2024/05/01 Swap & Co"), "2024_05_01_Swap___Co");
    assert_eq!(sanitize_key("plain-Key_9"), "plain-Key_9");
}

#[test]
fn unavailable_sources_are_skipped_and_counted_once() {
    let rows = vec![row("have.pdf", 1), row("missing.pdf", 1), row("have.pdf", 2)];

    let grouping = group_rows(rows, GroupStrategy::None, &available(&["have.pdf"]));

    assert_eq!(grouping.skipped, 1);
    assert_eq!(
        grouping.missing_sources.iter().collect::<Vec<_>>(),
        vec!["missing.pdf"]
    );
    let all: Vec<_> = grouping.groups[UNGROUPED_KEY]
        .iter()
        .map(|r| r.page_number)
        .collect();
    assert_eq!(all, vec![1, 2]);
}

#[test]
fn sanitized_key_collisions_merge_but_are_recorded() {
    let mut a = row("a.pdf", 1);
    a.doc_type = "Swap/FX".to_string();
    let mut b = row("a.pdf", 2);
    b.doc_type = "Swap&FX".to_string();

    let grouping = group_rows(vec![a, b], GroupStrategy::Type, &available(&["a.pdf"]));

    assert_eq!(grouping.groups.len(), 1);
    assert_eq!(grouping.groups["Swap_FX"].len(), 2);
    assert_eq!(
        grouping.key_collisions,
        vec![("Swap/FX".to_string(), "Swap&FX".to_string())]
    );
}

#[test]
fn sequencer_orders_by_priority_then_dates_then_id_then_page() {
    let mut low = row("a.pdf", 1);
    low.priority = Priority::Low;
    low.primary_date = "2024-01-01".to_string();

    let mut critical_late = row("a.pdf", 2);
    critical_late.priority = Priority::Critical;
    critical_late.primary_date = "2024-12-31".to_string();

    let mut normal = row("a.pdf", 3);
    normal.primary_date = "2024-06-01".to_string();

    let mut rows = vec![low.clone(), critical_late.clone(), normal.clone()];
    sequence_rows(&mut rows, true);
    let pages: Vec<_> = rows.iter().map(|r| r.page_number).collect();
    // Priority dominates the dates.
    assert_eq!(pages, vec![2, 3, 1]);

    let mut rows = vec![low, critical_late, normal];
    sequence_rows(&mut rows, false);
    let pages: Vec<_> = rows.iter().map(|r| r.page_number).collect();
    // Without priority ordering, dates decide.
    assert_eq!(pages, vec![1, 3, 2]);
}

#[test]
fn id_comparison_is_skipped_when_either_side_is_empty() {
    let mut with_id = row("a.pdf", 9);
    with_id.id = "T-100".to_string();
    let without_id = row("a.pdf", 2);

    // Identical dates; the empty id on one side defers to page number.
    assert_eq!(
        compare_rows(&without_id, &with_id, true),
        std::cmp::Ordering::Less
    );

    let mut other_id = with_id.clone();
    other_id.id = "T-050".to_string();
    other_id.page_number = 50;
    assert_eq!(
        compare_rows(&other_id, &with_id, true),
        std::cmp::Ordering::Less
    );
}

#[test]
fn sequencing_is_deterministic_across_shuffles() {
    let mut rows = Vec::new();
    for page in [5u32, 2, 9, 1, 7, 3] {
        let mut r = row("a.pdf", page);
        r.primary_date = format!("2024-0{}-01", (page % 3) + 1);
        r.id = if page % 2 == 0 {
            format!("T-{page}")
        } else {
            String::new()
        };
        rows.push(r);
    }

    let mut once = rows.clone();
    sequence_rows(&mut once, true);

    let mut shuffled = vec![
        rows[3].clone(),
        rows[0].clone(),
        rows[5].clone(),
        rows[1].clone(),
        rows[4].clone(),
        rows[2].clone(),
    ];
    sequence_rows(&mut shuffled, true);

    let a: Vec<_> = once.iter().map(|r| r.page_number).collect();
    let b: Vec<_> = shuffled.iter().map(|r| r.page_number).collect();
    assert_eq!(a, b);
}

#[test]
fn full_key_ties_preserve_relative_order() {
    let twin_a = row("a.pdf", 4);
    let twin_b = row("b.pdf", 4);
    let other = row("c.pdf", 1);

    let mut rows = vec![twin_a.clone(), twin_b.clone(), other];
    sequence_rows(&mut rows, true);

    // Stable sort: the twins keep their input order behind the page-1 row.
    assert_eq!(rows[0].page_number, 1);
    assert_eq!(rows[1].source_id, "a.pdf");
    assert_eq!(rows[2].source_id, "b.pdf");
}

#[test]
fn allocations_are_disjoint_contiguous_and_sorted_by_key() {
    let partitions: Vec<Vec<(&str, usize)>> = vec![
        vec![("zeta", 4), ("alpha", 2), ("mid", 1)],
        vec![("only", 7)],
        vec![("b", 1), ("a", 1), ("d", 3), ("c", 2)],
    ];

    for partition in partitions {
        let mut groups = indexmap::IndexMap::new();
        let mut total = 0usize;
        for (key, size) in &partition {
            groups.insert(key.to_string(), vec![row("s.pdf", 1); *size]);
            total += size;
        }

        let start = 10u64;
        let allocations = allocate_sequences(&groups, start);

        let mut expected_next = start;
        for (key, allocation) in &allocations {
            assert_eq!(
                allocation.start, expected_next,
                "allocation for '{key}' must start where the previous ended"
            );
            expected_next = allocation.end();
        }
        assert_eq!(expected_next, start + total as u64);

        // Sorted-key order, independent of insertion order.
        let keys: Vec<_> = allocations.keys().cloned().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
