use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

/// One manifest row as read from the input file, keyed by its original
/// column names. Column order is preserved for error reporting.
pub type RawRow = IndexMap<String, String>;

/// Sentinel source id for rows awaiting single-source binding. Rows carrying
/// it must be rebound via [`bind_pending_rows`] before grouping.
pub const PENDING_SOURCE: &str = "__PENDING__";

/// Minimum jaro-winkler similarity for a fuzzy column match.
const FUZZY_MATCH_THRESHOLD: f64 = 0.93;

/// Processing priority carried by a row. Lower rank sorts earlier when
/// priority ordering is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    /// Unknown or empty strings fall back to `Normal`; malformed priority
    /// cells must not abort a batch.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Priority::Critical,
            "urgent" => Priority::Urgent,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{name}")
    }
}

/// One normalized page reference. Created by [`normalize_row`], read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub source_id: String,
    /// 1-based page number within the source document.
    pub page_number: u32,
    pub primary_date: String,
    pub settlement_date: String,
    pub doc_type: String,
    pub asset_class: String,
    pub counterparty: String,
    /// Free-form identifier, may be empty.
    pub id: String,
    pub value: f64,
    pub priority: Priority,
}

/// Semantic fields a manifest column can map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SourceId,
    PageNumber,
    PrimaryDate,
    SettlementDate,
    DocType,
    AssetClass,
    Counterparty,
    DocId,
    Value,
    Priority,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::SourceId,
        Field::PageNumber,
        Field::PrimaryDate,
        Field::SettlementDate,
        Field::DocType,
        Field::AssetClass,
        Field::Counterparty,
        Field::DocId,
        Field::Value,
        Field::Priority,
    ];

    /// Required fields must resolve before normalization can run. Source id
    /// is required too, except in single-source mode where the loading
    /// collaborator rebinds the pending sentinel.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Field::SourceId | Field::PageNumber | Field::PrimaryDate | Field::DocType
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::SourceId => "source file",
            Field::PageNumber => "page number",
            Field::PrimaryDate => "primary date",
            Field::SettlementDate => "settlement date",
            Field::DocType => "document type",
            Field::AssetClass => "asset class",
            Field::Counterparty => "counterparty",
            Field::DocId => "document id",
            Field::Value => "value",
            Field::Priority => "priority",
        }
    }
}

/// Known column-name aliases per field, highest priority first. Matching is
/// case-insensitive on trimmed, NFKC-normalized names.
static COLUMN_ALIASES: Lazy<HashMap<Field, Vec<&'static str>>> = Lazy::new(|| {
    let mut aliases = HashMap::new();
    aliases.insert(
        Field::SourceId,
        vec![
            "source_file",
            "source file",
            "filename",
            "file name",
            "file_name",
            "pdf_file",
            "pdf file",
            "document",
            "source",
        ],
    );
    aliases.insert(
        Field::PageNumber,
        vec![
            "page_number",
            "page number",
            "page",
            "pg",
            "page_num",
            "pagenum",
        ],
    );
    aliases.insert(
        Field::PrimaryDate,
        vec![
            "date",
            "trade_date",
            "trade date",
            "document_date",
            "document date",
            "report_date",
            "report date",
            "created_date",
            "date created",
            "transaction_date",
            "transaction date",
        ],
    );
    aliases.insert(
        Field::SettlementDate,
        vec![
            "settlement_date",
            "settlement date",
            "settle_date",
            "settle date",
            "completion_date",
            "completion date",
            "due_date",
            "due date",
            "maturity_date",
            "maturity date",
        ],
    );
    aliases.insert(
        Field::DocType,
        vec![
            "type",
            "document title",
            "title",
            "trade_type",
            "trade type",
            "document_type",
            "document type",
            "category",
            "classification",
            "doc_type",
            "doctype",
        ],
    );
    aliases.insert(
        Field::AssetClass,
        vec![
            "asset_class",
            "asset class",
            "asset",
            "security_type",
            "security type",
            "instrument",
            "product",
            "asset_type",
            "assettype",
        ],
    );
    aliases.insert(
        Field::Counterparty,
        vec![
            "counterparty",
            "broker",
            "dealer",
            "vendor",
            "supplier",
            "party",
            "firm",
        ],
    );
    aliases.insert(
        Field::DocId,
        vec![
            "id",
            "trade_id",
            "trade id",
            "transaction_id",
            "transaction id",
            "document_id",
            "document id",
            "reference",
            "ref",
            "number",
            "doc_number",
            "docnumber",
        ],
    );
    aliases.insert(
        Field::Value,
        vec![
            "value",
            "trade_value",
            "trade value",
            "amount",
            "notional",
            "principal",
            "price",
            "total",
        ],
    );
    aliases.insert(
        Field::Priority,
        vec!["priority", "urgency", "importance", "level", "urgent"],
    );
    aliases
});

/// Resolved field → column mapping used by [`normalize_row`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    columns: HashMap<Field, String>,
}

impl FieldMapping {
    pub fn new() -> Self {
        FieldMapping::default()
    }

    pub fn set(&mut self, field: Field, column: impl Into<String>) -> &mut Self {
        self.columns.insert(field, column.into());
        self
    }

    pub fn column(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    /// Required fields with no mapped column. An empty result means
    /// normalization can proceed. Source id missing alone signals
    /// single-source mode rather than a hard failure.
    pub fn missing_required(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| field.is_required() && !self.columns.contains_key(field))
            .collect()
    }
}

/// Result of scanning actual column names against the alias table.
#[derive(Debug, Clone)]
pub struct MappingOutcome {
    pub mapping: FieldMapping,
    /// Required fields that could not be auto-mapped; the caller must either
    /// supply a manual mapping or treat a lone missing source id as
    /// single-source mode.
    pub missing: Vec<Field>,
    /// The columns that were scanned, for error reporting.
    pub columns: Vec<String>,
}

fn canonical(name: &str) -> String {
    name.trim().nfkc().collect::<String>().to_lowercase()
}

/// Map actual manifest columns onto semantic fields.
///
/// For each field the prioritized alias list is scanned for an exact
/// (case-insensitive, trimmed) match; first alias with a matching column
/// wins. Fields still unmapped get one fuzzy pass so near-miss headers like
/// `"Page No."` or `"Trade Dates"` resolve without manual intervention.
pub fn auto_map_columns(columns: &[String]) -> MappingOutcome {
    let canonical_columns: Vec<String> = columns.iter().map(|c| canonical(c)).collect();
    let mut mapping = FieldMapping::new();

    for field in Field::ALL {
        let aliases = &COLUMN_ALIASES[&field];

        let exact = aliases.iter().find_map(|alias| {
            canonical_columns
                .iter()
                .position(|col| col == alias)
                .map(|idx| columns[idx].clone())
        });

        if let Some(column) = exact {
            mapping.set(field, column);
            continue;
        }

        let mut best: Option<(f64, usize)> = None;
        for (idx, col) in canonical_columns.iter().enumerate() {
            for alias in aliases {
                let score = jaro_winkler(col, alias);
                if score >= FUZZY_MATCH_THRESHOLD
                    && best.map(|(s, _)| score > s).unwrap_or(true)
                {
                    best = Some((score, idx));
                }
            }
        }
        if let Some((score, idx)) = best {
            debug!(
                field = field.label(),
                column = %columns[idx],
                score,
                "fuzzy column match"
            );
            mapping.set(field, columns[idx].clone());
        }
    }

    let missing = mapping.missing_required();
    if !missing.is_empty() {
        info!(
            missing = ?missing.iter().map(|f| f.label()).collect::<Vec<_>>(),
            "manifest columns left required fields unmapped"
        );
    }

    MappingOutcome {
        mapping,
        missing,
        columns: columns.to_vec(),
    }
}

fn mapped_value<'a>(row: &'a RawRow, mapping: &FieldMapping, field: Field) -> Option<&'a str> {
    mapping
        .column(field)
        .and_then(|column| row.get(column))
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Normalize one raw row onto the internal schema.
///
/// Malformed numeric cells fall back to fixed defaults (`page_number` → 1,
/// `value` → 0.0) rather than aborting the batch; the same policy fills
/// missing descriptive fields with the documented placeholders. A row with
/// no mapped source column gets the pending sentinel for later rebinding.
pub fn normalize_row(row: &RawRow, mapping: &FieldMapping) -> Row {
    let source_id = mapped_value(row, mapping, Field::SourceId)
        .unwrap_or(PENDING_SOURCE)
        .to_string();

    let page_number = mapped_value(row, mapping, Field::PageNumber)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|&p| p >= 1)
        .unwrap_or(1);

    let primary_date = mapped_value(row, mapping, Field::PrimaryDate)
        .unwrap_or("Unknown Date")
        .to_string();

    let settlement_date = mapped_value(row, mapping, Field::SettlementDate)
        .map(str::to_string)
        .or_else(|| mapped_value(row, mapping, Field::PrimaryDate).map(str::to_string))
        .unwrap_or_default();

    let doc_type = mapped_value(row, mapping, Field::DocType)
        .unwrap_or("General")
        .to_string();

    let asset_class = mapped_value(row, mapping, Field::AssetClass)
        .unwrap_or("Other")
        .to_string();

    let counterparty = mapped_value(row, mapping, Field::Counterparty)
        .unwrap_or("Unknown")
        .to_string();

    let id = mapped_value(row, mapping, Field::DocId)
        .unwrap_or_default()
        .to_string();

    let value = mapped_value(row, mapping, Field::Value)
        .and_then(|v| v.replace(',', "").parse::<f64>().ok())
        .unwrap_or(0.0);

    let priority = mapped_value(row, mapping, Field::Priority)
        .map(Priority::parse_lenient)
        .unwrap_or(Priority::Normal);

    Row {
        source_id,
        page_number,
        primary_date,
        settlement_date,
        doc_type,
        asset_class,
        counterparty,
        id,
        value,
        priority,
    }
}

/// Rebind rows tagged with the pending sentinel to a concrete source id.
/// Returns how many rows were rebound. Used by the loading collaborator in
/// single-source mode once the one source document is known.
pub fn bind_pending_rows(rows: &mut [Row], source_id: &str) -> usize {
    let mut bound = 0;
    for row in rows.iter_mut() {
        if row.source_id == PENDING_SOURCE {
            row.source_id = source_id.to_string();
            bound += 1;
        }
    }
    if bound > 0 {
        info!(source_id, bound, "bound pending rows to source");
    }
    bound
}
