use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::GroupStrategy;
use crate::manifest::Row;

static KEY_SANITIZER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9_-]").expect("key sanitizer pattern is valid")
});

/// Group key used when no grouping strategy is selected.
pub const UNGROUPED_KEY: &str = "ALL_DOCUMENTS";

/// Build the raw (unsanitized) group key for a row under a strategy.
pub fn group_key(row: &Row, strategy: GroupStrategy) -> String {
    match strategy {
        GroupStrategy::DateAndType => format!("{}_{}", row.primary_date, row.doc_type),
        GroupStrategy::Date => row.primary_date.clone(),
        GroupStrategy::Type => row.doc_type.clone(),
        GroupStrategy::SettlementDate => format!("Settlement_{}", row.settlement_date),
        GroupStrategy::DayBucket => {
            // Drop any time-of-day portion so one bucket covers the whole day.
            let date_only = row
                .primary_date
                .split(['T', ' '])
                .next()
                .unwrap_or(&row.primary_date);
            format!("DOCS_{date_only}")
        }
        GroupStrategy::AssetClass => row.asset_class.clone(),
        GroupStrategy::Counterparty => row.counterparty.clone(),
        GroupStrategy::None => UNGROUPED_KEY.to_string(),
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` so the key is safe as a
/// file name on all platforms.
pub fn sanitize_key(raw: &str) -> String {
    KEY_SANITIZER.replace_all(raw, "_").into_owned()
}

/// Result of partitioning rows into groups.
#[derive(Debug, Default)]
pub struct Grouping {
    /// Sanitized key → rows in first-seen order.
    pub groups: IndexMap<String, Vec<Row>>,
    /// Rows excluded because their source document was unavailable.
    pub skipped: usize,
    /// Distinct source ids that caused skips.
    pub missing_sources: BTreeSet<String>,
    /// Pairs of distinct raw keys that collided after sanitization. The rows
    /// still merge into one group; the collision is surfaced, not silent.
    pub key_collisions: Vec<(String, String)>,
}

/// Partition rows into named groups under the chosen strategy.
///
/// Rows whose `source_id` is not in `available` are excluded from every group
/// and counted once each. Group insertion order is first-seen order; sorting
/// within a group is [`sequence_rows`]' job, not ours.
pub fn group_rows(
    rows: Vec<Row>,
    strategy: GroupStrategy,
    available: &HashSet<String>,
) -> Grouping {
    let mut grouping = Grouping::default();
    let mut first_raw: HashMap<String, String> = HashMap::new();

    for row in rows {
        if !available.contains(&row.source_id) {
            warn!(source_id = %row.source_id, "skipping row: source not available");
            grouping.skipped += 1;
            grouping.missing_sources.insert(row.source_id.clone());
            continue;
        }

        let raw_key = group_key(&row, strategy);
        let key = sanitize_key(&raw_key);

        match first_raw.get(&key) {
            Some(existing) if *existing != raw_key => {
                let pair = (existing.clone(), raw_key.clone());
                if !grouping.key_collisions.contains(&pair) {
                    warn!(
                        first = %pair.0,
                        second = %pair.1,
                        sanitized = %key,
                        "distinct group keys collide after sanitization; rows will merge"
                    );
                    grouping.key_collisions.push(pair);
                }
            }
            Some(_) => {}
            None => {
                first_raw.insert(key.clone(), raw_key);
            }
        }

        grouping.groups.entry(key).or_default().push(row);
    }

    grouping
}

/// Total order over rows within one group.
///
/// Key tuple, most significant first: priority rank (only when enabled),
/// primary date, settlement date, id (only when both sides are non-empty),
/// and page number as the final tie-break. String keys compare lexically so
/// repeated runs order identically.
pub fn compare_rows(a: &Row, b: &Row, priority_ordering: bool) -> Ordering {
    if priority_ordering {
        let ranks = a.priority.rank().cmp(&b.priority.rank());
        if ranks != Ordering::Equal {
            return ranks;
        }
    }

    let dates = a.primary_date.cmp(&b.primary_date);
    if dates != Ordering::Equal {
        return dates;
    }

    let settlements = a.settlement_date.cmp(&b.settlement_date);
    if settlements != Ordering::Equal {
        return settlements;
    }

    if !a.id.is_empty() && !b.id.is_empty() {
        let ids = a.id.cmp(&b.id);
        if ids != Ordering::Equal {
            return ids;
        }
    }

    a.page_number.cmp(&b.page_number)
}

/// Sort a group's rows in place. Stable, so rows with identical key tuples
/// keep their relative input order.
pub fn sequence_rows(rows: &mut [Row], priority_ordering: bool) {
    rows.sort_by(|a, b| compare_rows(a, b, priority_ordering));
}
