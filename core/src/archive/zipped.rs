//! ZIP containers holding stored (uncompressed) entries.
//!
//! Stored entries sit verbatim in the zip file, so they map directly onto the
//! archive table. Compressed entries, directories, and nested paths are skipped.

use std::io::{SeekFrom, Write};

use tracing::{debug, warn};
use zip::read::ZipArchive;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ContentError;
use crate::fs;

use super::Result;
use super::format::{ArchiveFormat, BackingStream, SaveEntry, SaveTarget, TableEntry, TableOfContents};

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFormat;

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["zip", "cbz"]
    }

    fn read_table(&self, stream: &mut dyn BackingStream) -> Result<TableOfContents> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        let mut archive = ZipArchive::new(&mut *stream).map_err(zip_error)?;
        let mut entries = Vec::with_capacity(archive.len());

        for idx in 0..archive.len() {
            let file = archive.by_index_raw(idx).map_err(zip_error)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            if file.compression() != CompressionMethod::Stored {
                warn!(target: "archive", entry = %name, "skipping compressed zip entry");
                continue;
            }
            if let Err(err) = fs::validate_name(&name) {
                debug!(target: "archive", entry = %name, "skipping zip entry: {err}");
                continue;
            }

            let (start, len) = (file.data_start(), file.compressed_size());
            if start.checked_add(len).is_none_or(|end| end > stream_len) {
                return Err(ContentError::corrupt(format!(
                    "zip entry {name:?} runs past the end of the container"
                )));
            }
            entries.push(TableEntry::new(name, start, len));
        }

        Ok(TableOfContents { payload_base: 0, entries })
    }

    fn create(&self, _stream: &mut dyn BackingStream) -> Result<TableOfContents> {
        // A zip's directory lives at its end; nothing to write until the first save.
        Ok(TableOfContents::default())
    }

    fn save(&self, entries: &[SaveEntry<'_>], out: &mut dyn SaveTarget) -> Result<()> {
        let mut zip = ZipWriter::new(&mut *out);
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in entries {
            zip.start_file(entry.name, options).map_err(zip_error)?;
            zip.write_all(entry.data)?;
        }

        let out = zip.finish().map_err(zip_error)?;
        out.flush()?;
        Ok(())
    }
}

fn zip_error(err: ZipError) -> ContentError {
    match err {
        ZipError::Io(source) => source.into(),
        other => ContentError::corrupt(format!("zip: {other}")),
    }
}
