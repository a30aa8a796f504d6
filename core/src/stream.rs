//! Owned byte streams handed out by archives and the resolver.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::ContentError;

/// A readable stream for one resolved file.
///
/// Archive entries are buffered in memory so every open is independent of the
/// archive's own cursor. Loose files are read through a buffered file handle.
/// Custom readers are accepted as forward-only streams.
pub struct ContentStream {
    name: String,
    inner: Inner,
}

enum Inner {
    Memory(Cursor<Vec<u8>>),
    File { reader: BufReader<File>, len: u64 },
    Forward(Box<dyn Read + Send>),
}

impl ContentStream {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), inner: Inner::Memory(Cursor::new(bytes)) }
    }

    /// Wrap a reader that cannot be repositioned.
    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self { name: name.into(), inner: Inner::Forward(Box::new(reader)) }
    }

    pub(crate) fn open_file(name: impl Into<String>, path: &Path) -> crate::Result<Self> {
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ContentError::not_found(path.display().to_string()),
            _ => ContentError::io_at(path, err),
        })?;
        let len = file.metadata().map_err(|err| ContentError::io_at(path, err))?.len();
        Ok(Self { name: name.into(), inner: Inner::File { reader: BufReader::new(file), len } })
    }

    /// Logical name the stream was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`rewind`](Self::rewind) and [`Seek`] are available.
    pub fn is_seekable(&self) -> bool {
        !matches!(self.inner, Inner::Forward(_))
    }

    /// Total byte length, when known.
    pub fn len(&self) -> Option<u64> {
        match &self.inner {
            Inner::Memory(cursor) => Some(cursor.get_ref().len() as u64),
            Inner::File { len, .. } => Some(*len),
            Inner::Forward(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Reposition to the first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Read everything from the current position to the end.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len().unwrap_or(0) as usize);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for ContentStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Memory(cursor) => cursor.read(buf),
            Inner::File { reader, .. } => reader.read(buf),
            Inner::Forward(reader) => reader.read(buf),
        }
    }
}

impl Seek for ContentStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            Inner::Memory(cursor) => cursor.seek(pos),
            Inner::File { reader, .. } => reader.seek(pos),
            Inner::Forward(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("stream {:?} cannot be repositioned", self.name),
            )),
        }
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner {
            Inner::Memory(_) => "memory",
            Inner::File { .. } => "file",
            Inner::Forward(_) => "forward",
        };
        f.debug_struct("ContentStream")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
