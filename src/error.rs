use thiserror::Error;

/// Errors raised by the collation pipeline.
///
/// Row-level problems (bad page ranges, unknown source ids) never surface
/// here; they are recovered locally, counted, and reported through the run
/// outcome. This enum covers the failures that abort a group or the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The raw bytes for a source did not parse as a PDF. Fatal to the group
    /// currently being assembled, not to the run.
    #[error("source document '{source_id}' could not be decoded: {source}")]
    SourceDecode {
        source_id: String,
        #[source]
        source: lopdf::Error,
    },

    /// A row referenced a page outside its source document.
    #[error("page {page} is out of range for '{source_id}' ({page_count} pages)")]
    PageOutOfRange {
        source_id: String,
        page: u32,
        page_count: u32,
    },

    /// A row survived grouping but no bytes were supplied for its source.
    #[error("no bytes supplied for source '{source_id}'")]
    MissingSource { source_id: String },

    /// Page copy, stamping, or serialization failed inside the PDF layer.
    #[error("composite assembly failed: {0}")]
    Assembly(#[from] lopdf::Error),

    /// Output packaging failed.
    #[error("archive packaging failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Every row was skipped, so there is nothing to assemble.
    #[error("no groups to process (all rows skipped or input empty)")]
    NoGroups,

    /// Run configuration rejected before scheduling begins.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
