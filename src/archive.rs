//! Zip packaging for multi-file responses.

use anyhow::{Context, Result};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// Builds a deflate-compressed archive in memory.
///
/// Entries keep insertion order and carry a fixed timestamp, so the same
/// entries always produce the same bytes.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
    }

    pub fn add(&mut self, name: &str, content: &[u8]) -> Result<&mut Self> {
        self.writer
            .start_file(name, Self::options())
            .with_context(|| format!("failed to start archive entry {name}"))?;
        self.writer
            .write_all(content)
            .with_context(|| format!("failed to write archive entry {name}"))?;
        Ok(self)
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        let cursor = self.writer.finish().context("failed to finish archive")?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an archive from `(name, content)` pairs in order.
pub fn zip_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Result<Vec<u8>> {
    let mut builder = ArchiveBuilder::new();
    for (name, content) in entries {
        builder.add(name, content)?;
    }
    builder.finish()
}
