use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::RunConfig;
use crate::manifest::{Priority, Row};
use crate::schedule::SequenceAllocation;
use crate::stamp::format_stamp_text;

/// Date formats tried when building the dataset date range. Cells that match
/// none of them are skipped, not errors.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

pub fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let date_only = raw.split(['T', ' ']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_only, format).ok())
}

/// Aggregate statistics over the normalized dataset, handed to the
/// archiving collaborator alongside the composite documents.
#[derive(Debug, Default, Serialize)]
pub struct DatasetStats {
    pub row_count: usize,
    pub total_value: f64,
    pub categories: BTreeSet<String>,
    pub asset_classes: BTreeSet<String>,
    pub counterparties: BTreeSet<String>,
    pub priority_counts: BTreeMap<Priority, usize>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl DatasetStats {
    pub fn collect(rows: &[Row]) -> Self {
        let mut stats = DatasetStats {
            row_count: rows.len(),
            ..DatasetStats::default()
        };

        for row in rows {
            stats.total_value += row.value;
            if !row.doc_type.is_empty() {
                stats.categories.insert(row.doc_type.clone());
            }
            if !row.asset_class.is_empty() {
                stats.asset_classes.insert(row.asset_class.clone());
            }
            if !row.counterparty.is_empty() {
                stats.counterparties.insert(row.counterparty.clone());
            }
            *stats.priority_counts.entry(row.priority).or_insert(0) += 1;

            if let Some(date) = parse_row_date(&row.primary_date) {
                stats.date_range = match stats.date_range {
                    Some((min, max)) => Some((min.min(date), max.max(date))),
                    None => Some((date, date)),
                };
            }
        }

        stats
    }
}

/// One exported manifest row. Field names render as the spreadsheet headers.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    #[serde(rename = "Sequence Number")]
    pub sequence_id: String,
    #[serde(rename = "Document ID")]
    pub id: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Settlement Date")]
    pub settlement_date: String,
    #[serde(rename = "Type")]
    pub doc_type: String,
    #[serde(rename = "Asset Class")]
    pub asset_class: String,
    #[serde(rename = "Counterparty")]
    pub counterparty: String,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Source File")]
    pub source_id: String,
    #[serde(rename = "Page")]
    pub page_number: u32,
    #[serde(rename = "Priority")]
    pub priority: Priority,
    #[serde(rename = "Group")]
    pub group_key: String,
}

/// Manifest rows for one group, derived from the sequenced rows and the
/// group's actual allocation so the export always matches the numbers
/// stamped on pages.
pub fn manifest_entries(
    key: &str,
    rows: &[Row],
    allocation: SequenceAllocation,
    config: &RunConfig,
) -> Vec<ManifestEntry> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| ManifestEntry {
            sequence_id: format_stamp_text(
                &config.prefix,
                allocation.start + index as u64,
                config.digits,
            ),
            id: row.id.clone(),
            date: row.primary_date.clone(),
            settlement_date: row.settlement_date.clone(),
            doc_type: row.doc_type.clone(),
            asset_class: row.asset_class.clone(),
            counterparty: row.counterparty.clone(),
            value: row.value,
            source_id: row.source_id.clone(),
            page_number: row.page_number,
            priority: row.priority,
            group_key: key.to_string(),
        })
        .collect()
}
