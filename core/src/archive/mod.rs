//! Archive containers: one backing stream, many named files.
//!
//! An [`Archive`] owns its backing stream and a table mapping upper-cased file
//! names to [`FileDescriptor`]s. The on-disk layout is supplied by an
//! [`ArchiveFormat`]; the table semantics (lookup, open, delete, rename, append)
//! live here and are shared by every format.
//!
//! Deleting or renaming never moves bytes. A deleted file's range stays in the
//! backing stream as dead space until the archive is rewritten with
//! [`Archive::save_to`], which writes only live entries.

mod descriptor;
mod format;
mod pack;
mod zipped;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hashlink::LinkedHashMap;
use regex::RegexBuilder;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::ContentError;
use crate::fs::{self as names, name_key};
use crate::stream::ContentStream;
use crate::types::ArchiveId;

pub use descriptor::FileDescriptor;
pub use format::{ArchiveFormat, BackingStream, SaveEntry, SaveTarget, TableEntry, TableOfContents};
pub use pack::PackFormat;
pub use zipped::ZipFormat;

pub type Result<T> = crate::Result<T>;

/// How the backing file is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// The file must exist.
    #[default]
    Open,
    /// Create a new, empty container, replacing any existing file.
    Create,
    /// Open if present, otherwise create.
    OpenOrCreate,
}

/// Permitted operations on the backing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Read,
    ReadWrite,
}

/// Parameters for [`Archive::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveOptions {
    pub mode: OpenMode,
    pub access: Access,
}

impl ArchiveOptions {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn writable(mode: OpenMode) -> Self {
        Self { mode, access: Access::ReadWrite }
    }
}

/// Picks a built-in format from a container's file extension.
pub fn format_for_path(path: &Path) -> Option<Box<dyn ArchiveFormat>> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let formats: [Box<dyn ArchiveFormat>; 2] = [Box::new(PackFormat), Box::new(ZipFormat)];
    formats.into_iter().find(|format| format.extensions().contains(&ext.as_str()))
}

/// A random-access container of named files.
pub struct Archive {
    id: ArchiveId,
    file_name: String,
    path: Option<PathBuf>,
    format: Box<dyn ArchiveFormat>,
    access: Access,
    stream: Option<Box<dyn BackingStream>>,
    table: LinkedHashMap<String, FileDescriptor>,
    payload_base: u64,
    initialized: bool,
    pending_create: bool,
    dead_bytes: u64,
}

impl Archive {
    /// Open a container file. The table is empty until [`initialize`](Self::initialize).
    pub fn open(
        path: impl AsRef<Path>,
        format: Box<dyn ArchiveFormat>,
        options: ArchiveOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ContentError::invalid_argument(format!("{} has no file name", path.display()))
            })?
            .to_string();

        if options.mode != OpenMode::Open && options.access == Access::Read {
            return Err(ContentError::invalid_argument(
                "creating an archive requires read-write access",
            ));
        }

        let existed = path.is_file();
        let mut open = OpenOptions::new();
        open.read(true).write(options.access == Access::ReadWrite);
        match options.mode {
            OpenMode::Open => {}
            OpenMode::Create => {
                open.create(true).truncate(true);
            }
            OpenMode::OpenOrCreate => {
                open.create(true);
            }
        }
        let file: File = open.open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ContentError::not_found(path.display().to_string()),
            _ => ContentError::io_at(path, err),
        })?;

        let pending_create = match options.mode {
            OpenMode::Open => false,
            OpenMode::Create => true,
            OpenMode::OpenOrCreate => !existed,
        };

        debug!(
            target: "archive",
            path = %path.display(),
            format = format.name(),
            create = pending_create,
            "opened archive"
        );

        let mut archive = Self::from_parts(file_name, Box::new(file), format, options.access);
        archive.path = Some(path.to_path_buf());
        archive.pending_create = pending_create;
        Ok(archive)
    }

    /// Wrap an arbitrary stream, e.g. an in-memory buffer holding a container.
    pub fn from_stream(
        file_name: impl Into<String>,
        stream: impl BackingStream + 'static,
        format: Box<dyn ArchiveFormat>,
        access: Access,
    ) -> Self {
        Self::from_parts(file_name.into(), Box::new(stream), format, access)
    }

    /// Start an empty container on top of an empty stream.
    pub fn create_in(
        file_name: impl Into<String>,
        stream: impl BackingStream + 'static,
        format: Box<dyn ArchiveFormat>,
    ) -> Self {
        let mut archive = Self::from_stream(file_name, stream, format, Access::ReadWrite);
        archive.pending_create = true;
        archive
    }

    fn from_parts(
        file_name: String,
        stream: Box<dyn BackingStream>,
        format: Box<dyn ArchiveFormat>,
        access: Access,
    ) -> Self {
        Self {
            id: ArchiveId::next(),
            file_name,
            path: None,
            format,
            access,
            stream: Some(stream),
            table: LinkedHashMap::new(),
            payload_base: 0,
            initialized: false,
            pending_create: false,
            dead_bytes: 0,
        }
    }

    /// Populate the table from the container's table of contents, or write an
    /// empty container when the archive was created. Runs once.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(ContentError::invalid_argument(format!(
                "archive {} is already initialized",
                self.file_name
            )));
        }
        let stream = self.stream.as_mut().ok_or(ContentError::AlreadyDisposed("archive"))?;
        let toc = if self.pending_create {
            self.format.create(stream.as_mut())?
        } else {
            self.format.read_table(stream.as_mut())?
        };

        let mut table = LinkedHashMap::with_capacity(toc.entries.len());
        for entry in toc.entries {
            let key = name_key(&entry.name);
            if table.contains_key(&key) {
                return Err(ContentError::corrupt(format!(
                    "archive {} lists {:?} twice",
                    self.file_name, entry.name
                )));
            }
            let descriptor = FileDescriptor::new(self.id, entry.name, entry.position, entry.length);
            table.insert(key, descriptor);
        }

        self.table = table;
        self.payload_base = toc.payload_base;
        self.initialized = true;
        self.pending_create = false;
        debug!(
            target: "archive",
            archive = %self.file_name,
            files = self.table.len(),
            "archive initialized"
        );
        Ok(())
    }

    pub fn id(&self) -> ArchiveId {
        self.id
    }

    /// File name the archive is mounted under.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> &dyn ArchiveFormat {
        self.format.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bytes still in the backing stream that no descriptor references anymore.
    pub fn dead_bytes(&self) -> u64 {
        self.dead_bytes
    }

    /// Live descriptors in table order.
    pub fn descriptors(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.table.values()
    }

    pub fn descriptor(&self, name: &str) -> Option<&FileDescriptor> {
        self.table.get(&name_key(name))
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.table.contains_key(&name_key(name))
    }

    /// Read one file into an independent buffer.
    pub fn open_file(&mut self, name: &str) -> Result<ContentStream> {
        self.ensure_live()?;
        let descriptor = self.lookup(name)?.clone();
        self.read_descriptor(&descriptor)
    }

    /// Like [`open_file`](Self::open_file), for a descriptor obtained earlier.
    pub fn open_descriptor(&mut self, descriptor: &FileDescriptor) -> Result<ContentStream> {
        self.ensure_live()?;
        let current = self.verify(descriptor)?.clone();
        self.read_descriptor(&current)
    }

    /// Remove a file from the table. Its bytes stay where they are.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        self.ensure_live()?;
        let key = name_key(name);
        let removed = self
            .table
            .remove(&key)
            .ok_or_else(|| self.missing(name))?;
        self.dead_bytes += removed.length();
        trace!(target: "archive", archive = %self.file_name, file = name, "deleted");
        Ok(true)
    }

    pub fn delete_descriptor(&mut self, descriptor: &FileDescriptor) -> Result<bool> {
        self.ensure_live()?;
        let name = self.verify(descriptor)?.name().to_string();
        self.delete(&name)
    }

    /// Point a new name at an existing file's bytes.
    ///
    /// Returns `false`, changing nothing, when `new_name` is already taken by a
    /// different file. Changing only the case of a name is allowed.
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<bool> {
        self.ensure_live()?;
        let old_key = name_key(name);
        if !self.table.contains_key(&old_key) {
            return Err(self.missing(name));
        }
        names::validate_name(new_name)?;

        let new_key = name_key(new_name);
        if new_key != old_key && self.table.contains_key(&new_key) {
            return Ok(false);
        }

        let Some(old) = self.table.remove(&old_key) else {
            return Err(self.missing(name));
        };
        self.table.insert(new_key, old.renamed(new_name));
        trace!(target: "archive", archive = %self.file_name, from = name, to = new_name, "renamed");
        Ok(true)
    }

    pub fn rename_descriptor(&mut self, descriptor: &FileDescriptor, new_name: &str) -> Result<bool> {
        self.ensure_live()?;
        let name = self.verify(descriptor)?.name().to_string();
        self.rename(&name, new_name)
    }

    /// Descriptors whose name matches `pattern`, a case-insensitive regular
    /// expression searched anywhere in the name.
    pub fn find(&self, pattern: &str) -> Result<Vec<FileDescriptor>> {
        self.ensure_live()?;
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|err| {
            ContentError::invalid_argument(format!("pattern {pattern:?}: {err}"))
        })?;
        Ok(self.table.values().filter(|d| regex.is_match(d.name())).cloned().collect())
    }

    /// Append a new file to the end of the backing stream.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<FileDescriptor> {
        self.ensure_live()?;
        if self.access != Access::ReadWrite {
            return Err(ContentError::invalid_argument(format!(
                "archive {} is read-only",
                self.file_name
            )));
        }
        names::validate_name(name)?;
        let key = name_key(name);
        if self.table.contains_key(&key) {
            return Err(ContentError::conflict(format!(
                "{name:?} already exists in {}",
                self.file_name
            )));
        }

        let payload_base = self.payload_base;
        let stream = self.stream_mut()?;
        let end = stream.seek(SeekFrom::End(0))?;
        stream.write_all(data)?;
        stream.flush()?;

        let position = end.checked_sub(payload_base).ok_or_else(|| {
            ContentError::corrupt("backing stream is shorter than its header")
        })?;
        let descriptor = FileDescriptor::new(self.id, name, position, data.len() as u64);
        self.table.insert(key, descriptor.clone());
        trace!(target: "archive", archive = %self.file_name, file = name, position, "appended");
        Ok(descriptor)
    }

    /// Write a complete container holding only live files, in table order.
    pub fn save_to(&mut self, out: &mut dyn SaveTarget) -> Result<()> {
        self.ensure_live()?;
        let descriptors: Vec<FileDescriptor> = self.table.values().cloned().collect();
        let mut payloads = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            payloads.push(self.read_payload(descriptor)?);
        }
        let entries: Vec<SaveEntry<'_>> = descriptors
            .iter()
            .zip(&payloads)
            .map(|(descriptor, data)| SaveEntry { name: descriptor.name(), data })
            .collect();
        self.format.save(&entries, out)?;
        debug!(
            target: "archive",
            archive = %self.file_name,
            files = entries.len(),
            "saved archive"
        );
        Ok(())
    }

    /// Save to `path` through a temporary file that replaces the target once
    /// fully written.
    pub fn save_to_path(&mut self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|err| ContentError::io_at(parent, err))?;
        self.save_to(tmp.as_file_mut())?;
        tmp.persist(path).map_err(|err| ContentError::io_at(path, err.error))?;
        Ok(())
    }

    /// Release the backing stream and clear the table. Repeated calls are no-ops.
    pub fn dispose(&mut self) {
        if self.stream.take().is_some() {
            self.table.clear();
            debug!(target: "archive", archive = %self.file_name, "archive disposed");
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.stream.is_none() {
            return Err(ContentError::AlreadyDisposed("archive"));
        }
        Ok(())
    }

    fn stream_mut(&mut self) -> Result<&mut Box<dyn BackingStream>> {
        self.stream.as_mut().ok_or(ContentError::AlreadyDisposed("archive"))
    }

    fn missing(&self, name: &str) -> ContentError {
        ContentError::not_found(format!("{name:?} in archive {}", self.file_name))
    }

    fn lookup(&self, name: &str) -> Result<&FileDescriptor> {
        self.table.get(&name_key(name)).ok_or_else(|| self.missing(name))
    }

    /// The stored descriptor, if `descriptor` is exactly it.
    fn verify(&self, descriptor: &FileDescriptor) -> Result<&FileDescriptor> {
        if descriptor.archive() != self.id {
            return Err(ContentError::invalid_argument(format!(
                "descriptor for {:?} belongs to {}, not {}",
                descriptor.name(),
                descriptor.archive(),
                self.id
            )));
        }
        let current = self.lookup(descriptor.name())?;
        if !current.is_identical(descriptor) {
            return Err(ContentError::invalid_argument(format!(
                "descriptor for {:?} is stale",
                descriptor.name()
            )));
        }
        Ok(current)
    }

    fn read_descriptor(&mut self, descriptor: &FileDescriptor) -> Result<ContentStream> {
        let bytes = self.read_payload(descriptor)?;
        trace!(
            target: "archive",
            archive = %self.file_name,
            file = descriptor.name(),
            len = bytes.len(),
            "opened file"
        );
        Ok(ContentStream::from_bytes(descriptor.name(), bytes))
    }

    fn read_payload(&mut self, descriptor: &FileDescriptor) -> Result<Vec<u8>> {
        let offset = self.payload_base + descriptor.position();
        let stream = self.stream_mut()?;
        stream.seek(SeekFrom::Start(offset))?;

        let mut bytes = Vec::with_capacity(descriptor.length() as usize);
        stream.as_mut().take(descriptor.length()).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < descriptor.length() {
            return Err(ContentError::corrupt(format!(
                "{:?} declares {} bytes but only {} are available",
                descriptor.name(),
                descriptor.length(),
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("format", &self.format.name())
            .field("files", &self.table.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
