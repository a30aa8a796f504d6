//! Import retry state machine.
//!
//! ```text
//! Resolving ──open──▶ Trying(0) ──ok──▶ Succeeded
//!     │                  │
//!     │ no candidates    │ err, more candidates
//!     ▼                  ▼
//! Exhausted ◀──err── RewindOrReopen(i) ──▶ Trying(i)
//!                 (last candidate failed)
//! ```
//!
//! The machine owns the stream it is working on. A failed attempt rewinds a
//! seekable stream; a forward-only stream is dropped and reopened through the
//! [`StreamSource`]. Every stream the machine opens is dropped exactly once,
//! whichever way the run ends.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{ContentError, PluginFailure};
use crate::fs::extension_of;
use crate::plugin::TypedImporter;
use crate::stream::ContentStream;
use crate::types::ContentType;

use super::Result;

/// Anything that can open (and reopen) a stream by logical name.
pub trait StreamSource {
    fn open_stream(&mut self, name: &str) -> Result<ContentStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Resolving,
    Trying(usize),
    RewindOrReopen(usize),
    Succeeded,
    Exhausted,
}

/// A successful import.
#[derive(Debug)]
pub struct Imported<T> {
    pub value: T,
    /// Name of the importer that produced `value`.
    pub importer: String,
    /// Byte length of the source stream, when known.
    pub source_len: Option<u64>,
}

pub struct ImportMachine<T> {
    name: String,
    state: ImportState,
    importers: Vec<TypedImporter<T>>,
    stream: Option<ContentStream>,
    source_len: Option<u64>,
    failures: Vec<PluginFailure>,
    history: Vec<ImportState>,
    opened: usize,
}

impl<T: 'static> ImportMachine<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ImportState::Resolving,
            importers: Vec::new(),
            stream: None,
            source_len: None,
            failures: Vec::new(),
            history: vec![ImportState::Resolving],
            opened: 0,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Every state visited so far, starting with [`ImportState::Resolving`].
    pub fn history(&self) -> &[ImportState] {
        &self.history
    }

    /// How many streams were opened, including the first.
    pub fn streams_opened(&self) -> usize {
        self.opened
    }

    /// Drive the machine to a terminal state.
    ///
    /// `select` is called once, after the first stream has been opened, with
    /// the name's extension; it returns the candidate importers in order.
    pub fn run<S, F>(&mut self, source: &mut S, select: F) -> Result<Imported<T>>
    where
        S: StreamSource + ?Sized,
        F: FnOnce(Option<&str>) -> Result<Vec<TypedImporter<T>>>,
    {
        let mut select = Some(select);
        loop {
            match self.state {
                ImportState::Resolving => {
                    let stream = source.open_stream(&self.name)?;
                    self.opened += 1;
                    self.source_len = stream.len();
                    self.stream = Some(stream);

                    let Some(select) = select.take() else {
                        return Err(self.abort("candidate importers were already selected"));
                    };
                    match select(extension_of(&self.name)) {
                        Ok(importers) => self.importers = importers,
                        Err(err) => {
                            self.stream = None;
                            return Err(err);
                        }
                    }
                    trace!(
                        target: "resolver",
                        file = %self.name,
                        candidates = self.importers.len(),
                        "import candidates selected"
                    );
                    let next = if self.importers.is_empty() {
                        ImportState::Exhausted
                    } else {
                        ImportState::Trying(0)
                    };
                    self.transition(next);
                }
                ImportState::Trying(index) => {
                    let Some(stream) = self.stream.as_mut() else {
                        self.transition(ImportState::RewindOrReopen(index));
                        continue;
                    };
                    let importer = &self.importers[index];
                    match importer.import(&self.name, stream) {
                        Ok(value) => {
                            let importer = importer.name().to_string();
                            self.transition(ImportState::Succeeded);
                            self.stream = None;
                            debug!(target: "resolver", file = %self.name, importer = %importer, "imported");
                            return Ok(Imported { value, importer, source_len: self.source_len });
                        }
                        Err(error) => {
                            debug!(
                                target: "resolver",
                                file = %self.name,
                                importer = importer.name(),
                                "import attempt failed: {error:#}"
                            );
                            self.failures.push(PluginFailure { plugin: importer.name().to_string(), error });
                            let next = if index + 1 < self.importers.len() {
                                ImportState::RewindOrReopen(index + 1)
                            } else {
                                ImportState::Exhausted
                            };
                            self.transition(next);
                        }
                    }
                }
                ImportState::RewindOrReopen(next) => {
                    let rewound = match self.stream.as_mut() {
                        Some(stream) if stream.is_seekable() => stream.rewind().is_ok(),
                        _ => false,
                    };
                    if !rewound {
                        self.stream = None;
                        let stream = source.open_stream(&self.name)?;
                        self.opened += 1;
                        self.stream = Some(stream);
                    }
                    self.transition(ImportState::Trying(next));
                }
                ImportState::Exhausted => {
                    self.stream = None;
                    return Err(ContentError::UnsupportedContent {
                        name: self.name.clone(),
                        content_type: ContentType::of::<T>().name(),
                        failures: std::mem::take(&mut self.failures),
                    });
                }
                ImportState::Succeeded => {
                    return Err(self.abort("import already succeeded"));
                }
            }
        }
    }

    fn transition(&mut self, next: ImportState) {
        self.state = next;
        self.history.push(next);
    }

    fn abort(&mut self, msg: &str) -> ContentError {
        self.stream = None;
        ContentError::invalid_argument(format!("{msg} for {:?}", self.name))
    }
}

impl<T> fmt::Debug for ImportMachine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportMachine")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("candidates", &self.importers.len())
            .field("failures", &self.failures.len())
            .finish()
    }
}
