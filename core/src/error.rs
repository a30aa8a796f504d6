//! Error taxonomy shared by archives, the plug-in registry, and the resolver.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors surfaced by the content layer.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// A name, extension, path, or pattern is malformed, or an argument does not
    /// belong to the receiver.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A file, descriptor, directory, or archive is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name collides with an existing file or mounted archive.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing stream holds fewer bytes than the table declares, or the table
    /// itself cannot be parsed.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// No importer or exporter accepted the content.
    #[error("unsupported content {name:?} as {content_type}: {}", summarize(.failures))]
    UnsupportedContent {
        name: String,
        content_type: &'static str,
        failures: Vec<PluginFailure>,
    },

    /// The container, registry, or resolver has been torn down.
    #[error("{0} has already been disposed")]
    AlreadyDisposed(&'static str),

    /// Host I/O failure.
    #[error("i/o error{}: {source}", at_path(.path))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },
}

impl ContentError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io_at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: Some(path.into()), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<io::Error> for ContentError {
    fn from(source: io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

/// One plug-in's failure, kept as context on [`ContentError::UnsupportedContent`].
#[derive(Debug)]
pub struct PluginFailure {
    pub plugin: String,
    pub error: anyhow::Error,
}

impl fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.plugin, self.error)
    }
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|path| format!(" on {}", path.display())).unwrap_or_default()
}

fn summarize(failures: &[PluginFailure]) -> String {
    if failures.is_empty() {
        return "no candidate plug-in".to_string();
    }
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
