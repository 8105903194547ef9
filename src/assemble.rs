use std::collections::HashMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::cache::{SourceCache, SourceDocument};
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::manifest::Row;
use crate::schedule::ProgressSink;
use crate::stamp::{self, StampFonts};

/// Groups larger than this emit per-chunk progress messages.
const LARGE_GROUP_ROWS: usize = 500;

/// Page attributes that may live on an ancestor Pages node and must be
/// resolved down onto the copied page.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Builds one composite document by copying pages out of source documents.
///
/// Append-only while assembling; [`CompositeBuilder::finalize`] serializes
/// exactly once, after which the output is immutable. Each source gets its
/// own old-id → new-id remap table so shared objects (fonts, resource
/// dictionaries) are copied once per source per composite.
pub struct CompositeBuilder {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    fonts: StampFonts,
    remaps: HashMap<String, HashMap<ObjectId, ObjectId>>,
}

impl CompositeBuilder {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let fonts = StampFonts::embed(&mut document);
        CompositeBuilder {
            document,
            pages_id,
            page_ids: Vec::new(),
            fonts,
            remaps: HashMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Copy one page (1-based `page_number`) from a source into the
    /// composite and return the new page's id.
    ///
    /// The page dictionary is cloned with `Parent`, `Annots`,
    /// `StructParents`, and `B` stripped; inheritable attributes are
    /// resolved down from the source page tree; every referenced object is
    /// copied transitively through the per-source remap table.
    pub fn append_page(
        &mut self,
        source: &SourceDocument,
        page_number: u32,
    ) -> Result<ObjectId, PipelineError> {
        let src_page_id = *source.pages.get(&page_number).ok_or_else(|| {
            PipelineError::PageOutOfRange {
                source_id: source.source_id.clone(),
                page: page_number,
                page_count: source.page_count,
            }
        })?;

        let src_dict = source.document.get_dictionary(src_page_id)?.clone();
        let mut page = Dictionary::new();
        for (key, value) in src_dict.iter() {
            match key.as_slice() {
                b"Parent" | b"Annots" | b"StructParents" | b"B" => continue,
                _ => {
                    let rewritten = self.rewrite_object(source, value.clone())?;
                    page.set(key.clone(), rewritten);
                }
            }
        }

        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited(&source.document, src_page_id, key) {
                    let rewritten = self.rewrite_object(source, value.clone())?;
                    page.set(key.to_vec(), rewritten);
                }
            }
        }

        page.set("Parent", Object::Reference(self.pages_id));
        let page_id = self.document.add_object(page);
        self.page_ids.push(page_id);
        Ok(page_id)
    }

    pub fn stamp_identifier(
        &mut self,
        page_id: ObjectId,
        config: &RunConfig,
        sequence_number: u64,
    ) -> Result<(), PipelineError> {
        stamp::stamp_identifier(&mut self.document, page_id, &self.fonts, config, sequence_number)
    }

    pub fn stamp_metadata(
        &mut self,
        page_id: ObjectId,
        config: &RunConfig,
        row: &Row,
    ) -> Result<(), PipelineError> {
        stamp::stamp_metadata(&mut self.document, page_id, &self.fonts, config.position, row)
    }

    /// Build the page tree and catalog, compress, and serialize. Consumes
    /// the builder; a composite is serialized exactly once.
    pub fn finalize(mut self) -> Result<Vec<u8>, PipelineError> {
        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        };
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        self.document.compress();

        let mut bytes = Vec::new();
        self.document.save_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Copy a referenced source object into the composite, reusing the remap
    /// entry when it was copied before. The new id is reserved before
    /// descending, which keeps reference cycles from recursing forever.
    fn import_ref(
        &mut self,
        source: &SourceDocument,
        old_id: ObjectId,
    ) -> Result<ObjectId, lopdf::Error> {
        if let Some(new_id) = self
            .remaps
            .get(&source.source_id)
            .and_then(|map| map.get(&old_id))
        {
            return Ok(*new_id);
        }

        let new_id = self.document.new_object_id();
        self.remaps
            .entry(source.source_id.clone())
            .or_default()
            .insert(old_id, new_id);

        // A dangling reference in the source becomes Null rather than
        // failing the whole group.
        let rewritten = match source.document.get_object(old_id) {
            Ok(object) => self.rewrite_object(source, object.clone())?,
            Err(_) => Object::Null,
        };
        self.document.objects.insert(new_id, rewritten);
        Ok(new_id)
    }

    fn rewrite_object(
        &mut self,
        source: &SourceDocument,
        object: Object,
    ) -> Result<Object, lopdf::Error> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.import_ref(source, id)?)),
            Object::Array(items) => {
                let mut rewritten = Vec::with_capacity(items.len());
                for item in items {
                    rewritten.push(self.rewrite_object(source, item)?);
                }
                Ok(Object::Array(rewritten))
            }
            Object::Dictionary(dict) => {
                Ok(Object::Dictionary(self.rewrite_dictionary(source, dict)?))
            }
            Object::Stream(mut stream) => {
                stream.dict = self.rewrite_dictionary(source, stream.dict)?;
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }

    fn rewrite_dictionary(
        &mut self,
        source: &SourceDocument,
        dict: Dictionary,
    ) -> Result<Dictionary, lopdf::Error> {
        let mut rewritten = Dictionary::new();
        for (key, value) in dict.iter() {
            rewritten.set(key.clone(), self.rewrite_object(source, value.clone())?);
        }
        Ok(rewritten)
    }
}

impl Default for CompositeBuilder {
    fn default() -> Self {
        CompositeBuilder::new()
    }
}

/// Walk up the source page tree looking for an inheritable attribute.
fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    loop {
        let dict = document.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
}

/// Assemble one group: copy, stamp, and serialize every row's page in
/// sequenced order. Row `i` gets sequence number `allocation_start + i`.
///
/// Rows are walked in fixed-size chunks purely to bound working set and emit
/// incremental progress; chunk boundaries have no effect on output. Any
/// row-level error aborts the whole group with no partial composite.
pub fn assemble_group(
    key: &str,
    rows: &[Row],
    sources: &HashMap<String, Vec<u8>>,
    config: &RunConfig,
    allocation_start: u64,
    cache: &mut SourceCache,
    sink: &dyn ProgressSink,
) -> Result<Vec<u8>, PipelineError> {
    debug!(key, rows = rows.len(), allocation_start, "assembling group");
    let mut builder = CompositeBuilder::new();

    for (chunk_index, chunk) in rows.chunks(config.rows_per_chunk).enumerate() {
        for (offset, row) in chunk.iter().enumerate() {
            let index = chunk_index * config.rows_per_chunk + offset;
            let raw_bytes = sources.get(&row.source_id).ok_or_else(|| {
                PipelineError::MissingSource {
                    source_id: row.source_id.clone(),
                }
            })?;
            let source = cache.acquire(&row.source_id, raw_bytes)?;
            let page_id = builder.append_page(source, row.page_number)?;

            builder.stamp_identifier(page_id, config, allocation_start + index as u64)?;
            if config.metadata_enabled {
                builder.stamp_metadata(page_id, config, row)?;
            }
        }

        let processed = chunk_index * config.rows_per_chunk + chunk.len();
        if rows.len() > LARGE_GROUP_ROWS && processed < rows.len() {
            sink.on_log(&format!("{key}: {processed}/{} pages", rows.len()));
        }
    }

    builder.finalize()
}
