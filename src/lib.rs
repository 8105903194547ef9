pub mod archive;
pub mod assemble;
pub mod cache;
pub mod config;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod manifest;
pub mod range;
pub mod report;
pub mod schedule;
pub mod stamp;

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::grouping::group_rows;
use crate::manifest::{normalize_row, Field, FieldMapping, RawRow, Row};
use crate::schedule::{process_groups, ProgressSink, RunOutcome};

/// Expand page ranges and normalize raw rows onto the internal schema.
///
/// Returns the normalized rows plus how many raw rows were dropped for
/// invalid page references. The mapping must already be resolved; a missing
/// source-id column is tolerated (single-source mode, where the loading
/// collaborator rebinds the pending sentinel), any other unmapped required
/// field is an error.
pub fn prepare_rows(
    raw_rows: &[RawRow],
    mapping: &FieldMapping,
) -> Result<(Vec<Row>, usize), PipelineError> {
    let missing: Vec<Field> = mapping
        .missing_required()
        .into_iter()
        .filter(|field| *field != Field::SourceId)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::InvalidConfig(format!(
            "unmapped required fields: {}",
            missing
                .iter()
                .map(|field| field.label())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    let page_column = mapping.column(Field::PageNumber).ok_or_else(|| {
        PipelineError::InvalidConfig("page number column is not mapped".to_string())
    })?;

    let had_ranges = range::has_page_ranges(raw_rows, page_column);
    let (expanded, dropped) = range::expand_rows(raw_rows, page_column);
    if had_ranges {
        info!(
            before = raw_rows.len(),
            after = expanded.len(),
            "expanded page ranges"
        );
    }
    let rows = expanded
        .iter()
        .map(|row| normalize_row(row, mapping))
        .collect();
    Ok((rows, dropped))
}

/// Group normalized rows and drive them through scheduled assembly. Rows
/// must carry fully-resolved source ids by this point.
pub fn process_rows(
    rows: Vec<Row>,
    sources: &HashMap<String, Vec<u8>>,
    config: &RunConfig,
    sink: &dyn ProgressSink,
) -> Result<RunOutcome, PipelineError> {
    config.validate()?;

    info!(rows = rows.len(), strategy = ?config.group_by, "grouping rows");
    let available: HashSet<String> = sources.keys().cloned().collect();
    let grouping = group_rows(rows, config.group_by, &available);

    process_groups(grouping, sources, config, sink)
}

/// Run the full collation pipeline over pre-mapped manifest rows.
pub fn process_manifest(
    raw_rows: &[RawRow],
    mapping: &FieldMapping,
    sources: &HashMap<String, Vec<u8>>,
    config: &RunConfig,
    sink: &dyn ProgressSink,
) -> Result<RunOutcome, PipelineError> {
    // 1. Reject configurations the scheduler cannot honor.
    config.validate()?;

    // 2. Expand page ranges and normalize onto the row schema.
    let (rows, dropped) = prepare_rows(raw_rows, mapping)?;

    // 3. Group, sequence, allocate, and assemble with bounded concurrency.
    let mut outcome = process_rows(rows, sources, config, sink)?;

    // 4. Rows dropped during expansion count toward the skip total.
    outcome.skipped_rows += dropped;
    Ok(outcome)
}
