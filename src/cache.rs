use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use lopdf::{Document, ObjectId};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Sources above this page count get a cache-fill log line; they are the
/// ones the cache exists for.
const LARGE_SOURCE_PAGES: u32 = 1000;

/// A decoded source PDF plus its page lookup.
///
/// Identity is `source_id`. Owned by the [`SourceCache`] for the duration of
/// one group's assembly; a given id decodes to the same page count for the
/// life of a run since inputs are never mutated mid-run.
pub struct SourceDocument {
    pub source_id: String,
    pub document: Document,
    /// 1-based page number → page object id.
    pub pages: BTreeMap<u32, ObjectId>,
    pub page_count: u32,
}

/// Decode and hit counters, asserted by the cache-scope tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub decodes: usize,
    pub hits: usize,
}

/// Memoizes decoded source documents within one group's assembly.
///
/// Decoding is the expensive step, proportional to source page count; the
/// cache amortizes it when one source contributes many rows to the same
/// group. The scheduler gives each group's worker a private instance and
/// clears it at group boundaries, so peak memory is bounded by one group's
/// distinct sources rather than every source the run touches.
#[derive(Default)]
pub struct SourceCache {
    documents: HashMap<String, SourceDocument>,
    stats: CacheStats,
}

impl SourceCache {
    pub fn new() -> Self {
        SourceCache::default()
    }

    /// Decode `raw_bytes` on the first request for `source_id`, return the
    /// cached handle on every request after that.
    ///
    /// A decode failure carries the source id and aborts only the group
    /// currently being assembled.
    pub fn acquire(
        &mut self,
        source_id: &str,
        raw_bytes: &[u8],
    ) -> Result<&SourceDocument, PipelineError> {
        match self.documents.entry(source_id.to_string()) {
            Entry::Occupied(entry) => {
                self.stats.hits += 1;
                Ok(entry.into_mut())
            }
            Entry::Vacant(slot) => {
                let document =
                    Document::load_mem(raw_bytes).map_err(|source| PipelineError::SourceDecode {
                        source_id: source_id.to_string(),
                        source,
                    })?;
                let pages = document.get_pages();
                let page_count = pages.len() as u32;
                if page_count > LARGE_SOURCE_PAGES {
                    info!(source_id, page_count, "cached large source document");
                }
                self.stats.decodes += 1;
                Ok(slot.insert(SourceDocument {
                    source_id: source_id.to_string(),
                    document,
                    pages,
                    page_count,
                }))
            }
        }
    }

    /// Drop every held document. Called before and after each group's
    /// assembly; counters survive so callers can report totals.
    pub fn clear(&mut self) {
        if !self.documents.is_empty() {
            debug!(released = self.documents.len(), "clearing source cache");
        }
        self.documents.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
