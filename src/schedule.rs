use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{error, info};
use uuid::Uuid;

use crate::assemble::assemble_group;
use crate::cache::SourceCache;
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::grouping::{sequence_rows, Grouping};
use crate::manifest::Row;
use crate::report::{manifest_entries, ManifestEntry};

/// Observability callbacks at group-completion granularity. Calls have no
/// effect on pipeline behavior.
pub trait ProgressSink: Sync {
    fn on_progress(&self, _percent: u8) {}
    fn on_log(&self, _message: &str) {}
}

/// Default sink: forwards everything to the tracing subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_progress(&self, percent: u8) {
        info!(percent, "run progress");
    }

    fn on_log(&self, message: &str) {
        info!("{message}");
    }
}

/// The contiguous sequence-number range `[start, start + count)` assigned to
/// one group before assembly begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceAllocation {
    pub start: u64,
    pub count: u64,
}

impl SequenceAllocation {
    pub fn end(&self) -> u64 {
        self.start + self.count
    }
}

/// Compute every group's allocation by a running prefix sum over groups in
/// sorted-key order.
///
/// This happens before any group runs, so ranges are pairwise disjoint and
/// jointly exhaust `[start_number, start_number + total_rows)` regardless of
/// the order in which groups finish. Sequence correctness never rests on a
/// shared counter.
pub fn allocate_sequences(
    groups: &IndexMap<String, Vec<Row>>,
    start_number: u64,
) -> BTreeMap<String, SequenceAllocation> {
    let mut keys: Vec<&String> = groups.keys().collect();
    keys.sort();

    let mut allocations = BTreeMap::new();
    let mut next = start_number;
    for key in keys {
        let count = groups[key.as_str()].len() as u64;
        allocations.insert(key.clone(), SequenceAllocation { start: next, count });
        next += count;
    }
    allocations
}

/// A group that failed assembly. Sibling groups were allowed to finish.
#[derive(Debug)]
pub struct GroupFailure {
    pub key: String,
    pub error: PipelineError,
}

/// Everything a run produced. `documents` holds the groups that succeeded,
/// in allocation (sorted-key) order; the run counts as failed when
/// `failures` is non-empty.
pub struct RunOutcome {
    pub run_id: Uuid,
    pub documents: IndexMap<String, Vec<u8>>,
    pub manifest: Vec<ManifestEntry>,
    pub failures: Vec<GroupFailure>,
    pub skipped_rows: usize,
    pub missing_sources: BTreeSet<String>,
    pub key_collisions: Vec<(String, String)>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Drive every group through assembly with bounded concurrency.
///
/// Groups are partitioned into batches of `max_concurrent_groups`; a batch
/// runs in parallel on the rayon pool and completes before the next starts.
/// Each group's worker owns a private [`SourceCache`], cleared around
/// assembly, so peak memory is one batch's distinct sources. A group failure
/// is logged and recorded without cancelling its siblings.
pub fn process_groups(
    mut grouping: Grouping,
    sources: &HashMap<String, Vec<u8>>,
    config: &RunConfig,
    sink: &dyn ProgressSink,
) -> Result<RunOutcome, PipelineError> {
    config.validate()?;
    if grouping.groups.is_empty() {
        return Err(PipelineError::NoGroups);
    }

    let started = Instant::now();
    let run_id = Uuid::new_v4();
    info!(%run_id, groups = grouping.groups.len(), "scheduling run");

    // Deterministic intra-group order, fixed before allocation or dispatch.
    for rows in grouping.groups.values_mut() {
        sequence_rows(rows, config.priority_ordering);
    }

    let allocations = allocate_sequences(&grouping.groups, config.start_number);
    let keys: Vec<String> = allocations.keys().cloned().collect();

    let total_groups = keys.len();
    let completed = AtomicUsize::new(0);
    let mut results: Vec<(String, Result<Vec<u8>, PipelineError>)> =
        Vec::with_capacity(total_groups);

    for batch in keys.chunks(config.max_concurrent_groups) {
        let batch_results: Vec<(String, Result<Vec<u8>, PipelineError>)> = batch
            .par_iter()
            .map(|key| {
                let rows = &grouping.groups[key.as_str()];
                let allocation = allocations[key];

                let mut cache = SourceCache::new();
                cache.clear();
                let result = assemble_group(
                    key,
                    rows,
                    sources,
                    config,
                    allocation.start,
                    &mut cache,
                    sink,
                );
                let cache_stats = cache.stats();
                cache.clear();

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let percent = ((done * 100) as f64 / total_groups as f64).round() as u8;
                sink.on_progress(percent);

                match &result {
                    Ok(bytes) => {
                        info!(
                            key = %key,
                            bytes = bytes.len(),
                            decodes = cache_stats.decodes,
                            cache_hits = cache_stats.hits,
                            "group completed"
                        );
                        sink.on_log(&format!("completed group '{key}'"));
                    }
                    Err(err) => {
                        error!(key = %key, error = %err, "group failed");
                        sink.on_log(&format!("group '{key}' failed: {err}"));
                    }
                }

                (key.clone(), result)
            })
            .collect();
        results.extend(batch_results);
    }

    info!("aggregating run results");
    let mut documents = IndexMap::new();
    let mut manifest = Vec::new();
    let mut failures = Vec::new();

    // par_iter preserves input order, so results are already in allocation
    // order.
    for (key, result) in results {
        match result {
            Ok(bytes) => {
                let allocation = allocations[&key];
                manifest.extend(manifest_entries(
                    &key,
                    &grouping.groups[key.as_str()],
                    allocation,
                    config,
                ));
                documents.insert(key, bytes);
            }
            Err(error) => failures.push(GroupFailure { key, error }),
        }
    }

    let outcome = RunOutcome {
        run_id,
        documents,
        manifest,
        failures,
        skipped_rows: grouping.skipped,
        missing_sources: grouping.missing_sources,
        key_collisions: grouping.key_collisions,
        elapsed: started.elapsed(),
    };
    info!(
        succeeded = outcome.documents.len(),
        failed = outcome.failures.len(),
        skipped_rows = outcome.skipped_rows,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "run aggregated"
    );
    Ok(outcome)
}
