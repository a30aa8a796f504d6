//! Name resolution across mounted archives and loose files, plus typed
//! import and export through the plug-in registry.
//!
//! A logical name is served by the first mounted archive (in mount order)
//! that holds it. When no archive does, the name is joined onto the base
//! directory and read as a loose file.

mod discovery;
mod import;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashlink::LinkedHashMap;
use tracing::{debug, info, warn};

use crate::archive::{self, Archive, ArchiveOptions, FileDescriptor};
use crate::cache::AssetCache;
use crate::config::ContentConfig;
use crate::error::{ContentError, PluginFailure};
use crate::fs::{extension_of, name_key, validate_path};
use crate::plugin::{PluginRegistry, SharedRegistry};
use crate::services::ServiceContainer;
use crate::stream::ContentStream;
use crate::types::{CacheBudget, ContentType, RegistryOwnership};

pub use discovery::{ArchiveDiscovery, ExtensionDiscovery, NoDiscovery};
pub use import::{ImportMachine, ImportState, Imported, StreamSource};

pub type Result<T> = crate::Result<T>;

#[derive(Debug)]
pub struct ContentResolver {
    base_dir: PathBuf,
    archives: LinkedHashMap<String, Archive>,
    registry: SharedRegistry,
    ownership: RegistryOwnership,
    discovery: Box<dyn ArchiveDiscovery>,
    cache: AssetCache,
    disposed: bool,
}

impl ContentResolver {
    /// Build a resolver rooted at `base_dir`.
    ///
    /// A [`SharedRegistry`] found in `services` is borrowed; otherwise the
    /// resolver creates an empty registry of its own and disposes it on
    /// teardown.
    pub fn new(base_dir: impl Into<PathBuf>, services: &ServiceContainer) -> Result<Self> {
        match services.get::<SharedRegistry>() {
            Some(registry) => {
                Self::build(base_dir.into(), Arc::clone(registry), RegistryOwnership::Borrowed)
            }
            None => Self::build(base_dir.into(), PluginRegistry::shared(), RegistryOwnership::Owned),
        }
    }

    /// Build a resolver around a registry supplied by the caller. The registry
    /// is never disposed by the resolver.
    pub fn with_registry(base_dir: impl Into<PathBuf>, registry: SharedRegistry) -> Result<Self> {
        Self::build(base_dir.into(), registry, RegistryOwnership::Borrowed)
    }

    /// Build from configuration, mounting discovered archives right away when
    /// `mount_on_init` is set.
    pub fn from_config(config: &ContentConfig, services: &ServiceContainer) -> Result<Self> {
        let discovery = ExtensionDiscovery::new(&config.archive_extensions)?;
        for ext in discovery.extensions() {
            if archive::format_for_path(&Path::new("archive").with_extension(ext)).is_none() {
                return Err(ContentError::invalid_argument(format!(
                    "no archive format handles the .{ext} extension"
                )));
            }
        }
        let mut resolver = Self::new(&config.base_dir, services)?
            .with_discovery(discovery)
            .with_cache_budget(CacheBudget { bytes_max: config.cache_budget_bytes });
        if config.mount_on_init {
            resolver.initialize()?;
        }
        Ok(resolver)
    }

    fn build(base_dir: PathBuf, registry: SharedRegistry, ownership: RegistryOwnership) -> Result<Self> {
        if !base_dir.exists() {
            return Err(ContentError::not_found(format!("base directory {}", base_dir.display())));
        }
        if !base_dir.is_dir() {
            return Err(ContentError::invalid_argument(format!(
                "{} is not a directory",
                base_dir.display()
            )));
        }
        debug!(target: "resolver", base = %base_dir.display(), ?ownership, "resolver created");
        Ok(Self {
            base_dir,
            archives: LinkedHashMap::new(),
            registry,
            ownership,
            discovery: Box::new(ExtensionDiscovery::default()),
            cache: AssetCache::new(CacheBudget::default()),
            disposed: false,
        })
    }

    pub fn with_discovery(mut self, discovery: impl ArchiveDiscovery + 'static) -> Self {
        self.discovery = Box::new(discovery);
        self
    }

    pub fn with_cache_budget(mut self, budget: CacheBudget) -> Self {
        self.cache = AssetCache::new(budget);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn ownership(&self) -> RegistryOwnership {
        self.ownership
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Mounted archives in mount order.
    pub fn archives(&self) -> impl Iterator<Item = &Archive> {
        self.archives.values()
    }

    pub fn archive(&self, file_name: &str) -> Option<&Archive> {
        self.archives.get(&name_key(file_name))
    }

    pub fn archive_mut(&mut self, file_name: &str) -> Option<&mut Archive> {
        self.archives.get_mut(&name_key(file_name))
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    /// Mount whatever the discovery strategy finds under the base directory.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_live()?;
        let found = self.discovery.discover(&self.base_dir)?;
        for path in found {
            self.mount(&path)?;
        }
        info!(
            target: "resolver",
            base = %self.base_dir.display(),
            archives = self.archives.len(),
            "resolver initialized"
        );
        Ok(())
    }

    /// Drop every mount and rediscover.
    pub fn reset(&mut self) -> Result<()> {
        self.unload()?;
        self.initialize()
    }

    /// Dispose every mounted archive and forget cached assets.
    pub fn unload(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.release_archives();
        Ok(())
    }

    /// Unload and, when the registry is owned, dispose it. Repeated calls are
    /// no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.release_archives();
        if self.ownership == RegistryOwnership::Owned {
            self.registry.write().dispose();
        }
        self.disposed = true;
        debug!(target: "resolver", base = %self.base_dir.display(), "resolver disposed");
    }

    fn release_archives(&mut self) {
        for (_, mut archive) in self.archives.drain() {
            archive.dispose();
        }
        self.cache.clear();
    }

    /// Open `name` from the first archive holding it, or from disk.
    pub fn open(&mut self, name: &str) -> Result<ContentStream> {
        self.ensure_live()?;
        validate_path(name)?;

        if let Some(archive) = self.archives.values_mut().find(|archive| archive.file_exists(name)) {
            debug!(target: "resolver", file = name, archive = archive.file_name(), "resolved in archive");
            return archive.open_file(name);
        }

        let path = self.base_dir.join(name);
        if !path.is_file() {
            return Err(ContentError::not_found(name));
        }
        debug!(target: "resolver", file = name, path = %path.display(), "resolved on disk");
        ContentStream::open_file(name, &path)
    }

    /// Whether [`open`](Self::open) would find `name`.
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.ensure_live()?;
        validate_path(name)?;
        Ok(self.find(name).is_some() || self.base_dir.join(name).is_file())
    }

    /// First mounted archive holding `name`.
    pub fn find(&self, name: &str) -> Option<&Archive> {
        self.archives.values().find(|archive| archive.file_exists(name))
    }

    /// Every mounted archive holding `name`, in mount order.
    pub fn find_all(&self, name: &str) -> Vec<&Archive> {
        self.archives.values().filter(|archive| archive.file_exists(name)).collect()
    }

    /// Descriptors from every mounted archive whose names match `pattern`.
    pub fn find_matching(&self, pattern: &str) -> Result<Vec<FileDescriptor>> {
        self.ensure_live()?;
        let mut found = Vec::new();
        for archive in self.archives.values() {
            found.extend(archive.find(pattern)?);
        }
        Ok(found)
    }

    /// Import `name` as a `T`, trying each importer registered for `T` and the
    /// name's extension until one succeeds.
    pub fn import<T: 'static>(&mut self, name: &str) -> Result<T> {
        self.import_entry::<T>(name).map(|imported| imported.value)
    }

    /// Cached [`import`](Self::import). Assets are shared until evicted or
    /// until the archives are unloaded.
    pub fn load<T: Send + Sync + 'static>(&mut self, name: &str) -> Result<Arc<T>> {
        self.ensure_live()?;
        if let Some(hit) = self.cache.get::<T>(name) {
            return Ok(hit);
        }
        let imported = self.import_entry::<T>(name)?;
        let value = Arc::new(imported.value);
        let cost = imported.source_len.unwrap_or(0) as usize;
        self.cache.insert(name, Arc::clone(&value), cost);
        Ok(value)
    }

    fn import_entry<T: 'static>(&mut self, name: &str) -> Result<Imported<T>> {
        self.ensure_live()?;
        validate_path(name)?;
        let registry = Arc::clone(&self.registry);
        let mut machine = ImportMachine::<T>::new(name);
        machine.run(self, |extension| registry.read().importers::<T>(extension))
    }

    /// Write `content` in the format implied by `name`'s extension using the
    /// first exporter registered for it.
    pub fn export<T: 'static>(&self, content: &T, name: &str, out: &mut dyn Write) -> Result<()> {
        self.ensure_live()?;
        validate_path(name)?;
        let exporters = self.registry.read().exporters::<T>(extension_of(name))?;
        let Some(exporter) = exporters.first() else {
            return Err(ContentError::UnsupportedContent {
                name: name.to_string(),
                content_type: ContentType::of::<T>().name(),
                failures: Vec::new(),
            });
        };
        exporter.export(content, name, out).map_err(|error| {
            warn!(target: "resolver", file = name, exporter = exporter.name(), "export failed: {error:#}");
            ContentError::UnsupportedContent {
                name: name.to_string(),
                content_type: ContentType::of::<T>().name(),
                failures: vec![PluginFailure { plugin: exporter.name().to_string(), error }],
            }
        })
    }

    /// Mount an archive after the ones already mounted.
    pub fn add_archive(&mut self, archive: Archive) -> Result<()> {
        self.ensure_live()?;
        let key = name_key(archive.file_name());
        if self.archives.contains_key(&key) {
            return Err(ContentError::conflict(format!(
                "an archive named {:?} is already mounted",
                archive.file_name()
            )));
        }
        // The new archive shadows later archives and loose files for its names.
        for descriptor in archive.descriptors() {
            self.cache.invalidate(descriptor.name());
        }
        debug!(target: "resolver", archive = archive.file_name(), files = archive.len(), "mounted");
        self.archives.insert(key, archive);
        Ok(())
    }

    /// Open, initialize, and mount the container at `path`. Relative paths are
    /// taken from the base directory.
    pub fn mount(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_live()?;
        let path = self.base_dir.join(path.as_ref());
        let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        if self.archives.contains_key(&name_key(file_name)) {
            return Err(ContentError::conflict(format!(
                "an archive named {file_name:?} is already mounted"
            )));
        }
        let format = archive::format_for_path(&path).ok_or_else(|| {
            ContentError::invalid_argument(format!("no archive format for {}", path.display()))
        })?;
        let mut archive = Archive::open(&path, format, ArchiveOptions::read_only())?;
        archive.initialize()?;
        self.add_archive(archive)
    }

    /// Unmount and dispose the archive with this file name.
    pub fn remove_archive(&mut self, file_name: &str) -> Result<bool> {
        self.ensure_live()?;
        let Some(mut archive) = self.archives.remove(&name_key(file_name)) else {
            return Ok(false);
        };
        archive.dispose();
        self.cache.clear();
        debug!(target: "resolver", archive = file_name, "unmounted");
        Ok(true)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(ContentError::AlreadyDisposed("content resolver"));
        }
        Ok(())
    }
}

impl StreamSource for ContentResolver {
    fn open_stream(&mut self, name: &str) -> Result<ContentStream> {
        self.open(name)
    }
}

impl Drop for ContentResolver {
    fn drop(&mut self) {
        self.dispose();
    }
}
