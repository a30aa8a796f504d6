//! The seam between the generic archive table and a concrete container layout.

use std::fmt;
use std::io::{Read, Seek, Write};

use super::Result;

/// Stream an archive is backed by: a file, or any in-memory buffer.
pub trait BackingStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> BackingStream for T {}

/// Destination for [`ArchiveFormat::save`].
pub trait SaveTarget: Write + Seek {}

impl<T: Write + Seek + ?Sized> SaveTarget for T {}

/// One row of a parsed table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: String,
    /// Offset relative to [`TableOfContents::payload_base`].
    pub position: u64,
    pub length: u64,
}

impl TableEntry {
    pub fn new(name: impl Into<String>, position: u64, length: u64) -> Self {
        Self { name: name.into(), position, length }
    }
}

/// Result of reading a container header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOfContents {
    /// Absolute offset of the payload region in the backing stream.
    pub payload_base: u64,
    pub entries: Vec<TableEntry>,
}

/// A live file handed to [`ArchiveFormat::save`], in table order.
#[derive(Debug, Clone, Copy)]
pub struct SaveEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
}

/// A concrete container layout.
///
/// Formats are stateless: everything they learn while reading lands in the
/// returned [`TableOfContents`].
pub trait ArchiveFormat: fmt::Debug + Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Lowercase file extensions this format claims, without dots.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse the table of contents from an existing container.
    fn read_table(&self, stream: &mut dyn BackingStream) -> Result<TableOfContents>;

    /// Write whatever an empty container needs into a fresh, empty stream.
    fn create(&self, stream: &mut dyn BackingStream) -> Result<TableOfContents>;

    /// Write a complete container holding `entries` to `out`.
    fn save(&self, entries: &[SaveEntry<'_>], out: &mut dyn SaveTarget) -> Result<()>;
}
