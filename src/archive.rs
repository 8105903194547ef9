use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PipelineError;

/// One named blob headed for the output archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ArchiveEntry {
            name: name.into(),
            bytes,
        }
    }
}

/// Pack named byte blobs into a single ZIP blob (Deflate). This is the full
/// extent of packaging in scope; what goes in and where it lands is the
/// caller's business.
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        writer.write_all(&entry.bytes)?;
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}
