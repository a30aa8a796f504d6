//! Content loading core: archive containers, a plug-in registry of typed
//! importers and exporters, and a resolver that serves logical names from
//! mounted archives before falling back to loose files.

#![deny(missing_debug_implementations)]

pub mod archive;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fs;
pub mod log;
pub mod plugin;
pub mod resolver;
pub mod services;
pub mod stream;
pub mod types;

pub type Result<T> = std::result::Result<T, ContentError>;

pub use archive::{Archive, ArchiveFormat, ArchiveOptions, FileDescriptor, PackFormat, ZipFormat};
pub use config::ContentConfig;
pub use error::{ContentError, PluginFailure};
pub use plugin::{ContentPlugin, Exporter, Importer, PluginHandle, PluginRegistry, SharedRegistry};
pub use resolver::{ContentResolver, ImportState};
pub use services::ServiceContainer;
pub use stream::ContentStream;
pub use types::{ArchiveId, CacheBudget, ContentType, RegistryOwnership};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
