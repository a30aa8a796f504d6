//! Catalogue of registered plug-ins, indexed by content type.

use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::ContentError;
use crate::fs::normalize_extension;
use crate::types::ContentType;

use super::{PluginHandle, Result, TypedExporter, TypedImporter};

/// Registry handle passed between resolvers. Whoever creates it decides who
/// disposes it; see [`RegistryOwnership`](crate::types::RegistryOwnership).
pub type SharedRegistry = Arc<RwLock<PluginRegistry>>;

/// Plug-ins indexed by content type, in registration order.
///
/// Every plug-in lives in the by-type index; importer-capable ones are also
/// listed in the importer index. A type's entry disappears with its last
/// plug-in.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    by_type: LinkedHashMap<ContentType, Vec<PluginHandle>>,
    importers: LinkedHashMap<ContentType, Vec<PluginHandle>>,
    disposed: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry wrapped for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Register a plug-in. Returns `false` when the same plug-in instance is
    /// already registered for the handle's content type.
    pub fn add(&mut self, handle: PluginHandle) -> Result<bool> {
        self.ensure_live()?;
        let content_type = handle.content_type();
        let list = self.by_type.entry(content_type).or_insert_with(Vec::new);
        if list.iter().any(|existing| existing.same_plugin(&handle)) {
            return Ok(false);
        }

        debug!(
            target: "plugin",
            plugin = handle.name(),
            content_type = %content_type,
            importer = handle.is_importer(),
            exporter = handle.is_exporter(),
            "registered plug-in"
        );
        list.push(handle.clone());
        if handle.is_importer() {
            self.importers.entry(content_type).or_insert_with(Vec::new).push(handle);
        }
        Ok(true)
    }

    /// Unregister a plug-in from the handle's content type. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, handle: &PluginHandle) -> Result<bool> {
        self.ensure_live()?;
        let content_type = handle.content_type();
        let removed = remove_from(&mut self.by_type, content_type, handle);
        remove_from(&mut self.importers, content_type, handle);
        if removed {
            debug!(target: "plugin", plugin = handle.name(), content_type = %content_type, "removed plug-in");
        }
        Ok(removed)
    }

    /// Importer-capable plug-ins registered for exactly `content_type`.
    pub fn plugins_of(&self, content_type: ContentType) -> Result<Vec<PluginHandle>> {
        self.ensure_live()?;
        Ok(self.importers.get(&content_type).cloned().unwrap_or_default())
    }

    /// Every registered plug-in, of any type, that supports `extension`.
    pub fn plugins_for_extension(&self, extension: &str) -> Result<Vec<PluginHandle>> {
        self.ensure_live()?;
        normalize_extension(extension)?;
        let mut matches = Vec::new();
        for handle in self.by_type.values().flatten() {
            if handle.supports(extension)? {
                matches.push(handle.clone());
            }
        }
        Ok(matches)
    }

    /// Plug-ins of `content_type` (importer-capable) that support `extension`.
    pub fn plugins_for(&self, content_type: ContentType, extension: &str) -> Result<Vec<PluginHandle>> {
        let candidates = self.plugins_of(content_type)?;
        filter_supporting(candidates, Some(extension))
    }

    /// Importers of exactly `T`, optionally restricted to those supporting
    /// `extension`, in registration order.
    pub fn importers<T: 'static>(&self, extension: Option<&str>) -> Result<Vec<TypedImporter<T>>> {
        let candidates = self.plugins_of(ContentType::of::<T>())?;
        let handles = filter_supporting(candidates, extension)?;
        Ok(handles.iter().filter_map(PluginHandle::typed_importer::<T>).collect())
    }

    /// Exporters of exactly `T`, optionally restricted to those supporting
    /// `extension`, in registration order.
    pub fn exporters<T: 'static>(&self, extension: Option<&str>) -> Result<Vec<TypedExporter<T>>> {
        self.ensure_live()?;
        let candidates: Vec<PluginHandle> = self
            .by_type
            .get(&ContentType::of::<T>())
            .map(|list| list.iter().filter(|handle| handle.is_exporter()).cloned().collect())
            .unwrap_or_default();
        let handles = filter_supporting(candidates, extension)?;
        Ok(handles.iter().filter_map(PluginHandle::typed_exporter::<T>).collect())
    }

    /// Content types with at least one registered plug-in, in first-registration order.
    pub fn content_types(&self) -> Vec<ContentType> {
        self.by_type.keys().copied().collect()
    }

    /// Number of registrations across all content types.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Dispose every plug-in once and empty the registry. A plug-in failing to
    /// dispose is logged and does not stop the others. Repeated calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let mut seen: Vec<PluginHandle> = Vec::new();
        for handle in self.by_type.values().flatten() {
            if seen.iter().any(|other| other.same_plugin(handle)) {
                continue;
            }
            if let Err(err) = handle.plugin().dispose() {
                warn!(target: "plugin", plugin = handle.name(), "plug-in dispose failed: {err:#}");
            }
            seen.push(handle.clone());
        }

        self.by_type.clear();
        self.importers.clear();
        debug!(target: "plugin", plugins = seen.len(), "registry disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(ContentError::AlreadyDisposed("plug-in registry"));
        }
        Ok(())
    }
}

fn remove_from(
    index: &mut LinkedHashMap<ContentType, Vec<PluginHandle>>,
    content_type: ContentType,
    handle: &PluginHandle,
) -> bool {
    let Some(list) = index.get_mut(&content_type) else {
        return false;
    };
    let before = list.len();
    list.retain(|existing| !existing.same_plugin(handle));
    let removed = list.len() != before;
    if list.is_empty() {
        index.remove(&content_type);
    }
    removed
}

fn filter_supporting(
    candidates: Vec<PluginHandle>,
    extension: Option<&str>,
) -> Result<Vec<PluginHandle>> {
    let Some(extension) = extension else {
        return Ok(candidates);
    };
    normalize_extension(extension)?;
    let mut matches = Vec::with_capacity(candidates.len());
    for handle in candidates {
        if handle.supports(extension)? {
            matches.push(handle);
        }
    }
    Ok(matches)
}
