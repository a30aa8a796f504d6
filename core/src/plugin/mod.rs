//! Content plug-ins: converters between raw bytes and typed assets.
//!
//! A plug-in declares which file extensions it handles. What it can do for a
//! given Rust type is stated once, when it is wrapped in a [`PluginHandle`]:
//!
//! ```ignore
//! let handle = PluginHandle::builder::<DecodedImage, _>(Arc::new(ImageImporter::default()))
//!     .importer()
//!     .build();
//! registry.add(handle)?;
//! ```
//!
//! The handle records the [`ContentType`] and type-erased import/export entry
//! points, so lookups never inspect plug-in types at runtime.

mod registry;

use std::any::Any;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::fs::normalize_extension;
use crate::stream::ContentStream;
use crate::types::ContentType;

pub use registry::{PluginRegistry, SharedRegistry};

pub type Result<T> = crate::Result<T>;

/// Behaviour common to every plug-in.
pub trait ContentPlugin: Send + Sync + 'static {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Extensions handled by the plug-in, with or without a leading dot.
    fn supported_extensions(&self) -> &[String];

    /// Whether `extension` is handled. Matching ignores case and a leading dot.
    ///
    /// Fails with `InvalidArgument` when `extension` is malformed.
    fn supports(&self, extension: &str) -> Result<bool> {
        let wanted = normalize_extension(extension)?;
        Ok(self
            .supported_extensions()
            .iter()
            .any(|ext| normalize_extension(ext).is_ok_and(|ext| ext == wanted)))
    }

    /// Release anything the plug-in holds. Must tolerate repeated calls.
    fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Decodes bytes into a `T`.
pub trait Importer<T>: ContentPlugin {
    fn import(&self, name: &str, stream: &mut ContentStream) -> anyhow::Result<T>;
}

/// Encodes a `T` into bytes.
pub trait Exporter<T>: ContentPlugin {
    fn export(&self, content: &T, name: &str, out: &mut dyn Write) -> anyhow::Result<()>;
}

type ImportFn<T> = Arc<dyn Fn(&str, &mut ContentStream) -> anyhow::Result<T> + Send + Sync>;
type ExportFn<T> = Arc<dyn Fn(&T, &str, &mut dyn Write) -> anyhow::Result<()> + Send + Sync>;
type Erased = Arc<dyn Any + Send + Sync>;

/// A registered plug-in together with the capabilities it was registered with.
#[derive(Clone)]
pub struct PluginHandle {
    plugin: Arc<dyn ContentPlugin>,
    content_type: ContentType,
    import: Option<Erased>,
    export: Option<Erased>,
}

impl PluginHandle {
    pub fn builder<T: 'static, P: ContentPlugin>(plugin: Arc<P>) -> PluginBuilder<T, P> {
        PluginBuilder { plugin, import: None, export: None, _content: PhantomData }
    }

    /// Shorthand for a plug-in that only imports `T`.
    pub fn importer<T: 'static, P: Importer<T>>(plugin: Arc<P>) -> Self {
        Self::builder::<T, P>(plugin).importer().build()
    }

    /// Shorthand for a plug-in that only exports `T`.
    pub fn exporter<T: 'static, P: Exporter<T>>(plugin: Arc<P>) -> Self {
        Self::builder::<T, P>(plugin).exporter().build()
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn plugin(&self) -> &Arc<dyn ContentPlugin> {
        &self.plugin
    }

    pub fn is_importer(&self) -> bool {
        self.import.is_some()
    }

    pub fn is_exporter(&self) -> bool {
        self.export.is_some()
    }

    pub fn supports(&self, extension: &str) -> Result<bool> {
        self.plugin.supports(extension)
    }

    /// Whether both handles wrap the same plug-in instance.
    pub fn same_plugin(&self, other: &PluginHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.plugin), Arc::as_ptr(&other.plugin))
    }

    pub(crate) fn typed_importer<T: 'static>(&self) -> Option<TypedImporter<T>> {
        let import = self.import.as_ref()?.downcast_ref::<ImportFn<T>>()?;
        Some(TypedImporter { handle: self.clone(), import: Arc::clone(import) })
    }

    pub(crate) fn typed_exporter<T: 'static>(&self) -> Option<TypedExporter<T>> {
        let export = self.export.as_ref()?.downcast_ref::<ExportFn<T>>()?;
        Some(TypedExporter { handle: self.clone(), export: Arc::clone(export) })
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name())
            .field("content_type", &self.content_type)
            .field("import", &self.is_importer())
            .field("export", &self.is_exporter())
            .finish()
    }
}

/// Collects a plug-in's capabilities for content type `T`.
pub struct PluginBuilder<T, P> {
    plugin: Arc<P>,
    import: Option<Erased>,
    export: Option<Erased>,
    _content: PhantomData<fn() -> T>,
}

impl<T: 'static, P: ContentPlugin> PluginBuilder<T, P> {
    pub fn importer(mut self) -> Self
    where
        P: Importer<T>,
    {
        let plugin = Arc::clone(&self.plugin);
        let import: ImportFn<T> = Arc::new(move |name: &str, stream: &mut ContentStream| {
            Importer::<T>::import(plugin.as_ref(), name, stream)
        });
        self.import = Some(Arc::new(import));
        self
    }

    pub fn exporter(mut self) -> Self
    where
        P: Exporter<T>,
    {
        let plugin = Arc::clone(&self.plugin);
        let export: ExportFn<T> = Arc::new(move |content: &T, name: &str, out: &mut dyn Write| {
            Exporter::<T>::export(plugin.as_ref(), content, name, out)
        });
        self.export = Some(Arc::new(export));
        self
    }

    pub fn build(self) -> PluginHandle {
        PluginHandle {
            plugin: self.plugin,
            content_type: ContentType::of::<T>(),
            import: self.import,
            export: self.export,
        }
    }
}

impl<T, P> fmt::Debug for PluginBuilder<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBuilder")
            .field("import", &self.import.is_some())
            .field("export", &self.export.is_some())
            .finish()
    }
}

/// An importer resolved for a concrete content type.
pub struct TypedImporter<T> {
    handle: PluginHandle,
    import: ImportFn<T>,
}

impl<T> TypedImporter<T> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &PluginHandle {
        &self.handle
    }

    pub fn import(&self, name: &str, stream: &mut ContentStream) -> anyhow::Result<T> {
        (self.import)(name, stream)
    }
}

impl<T> Clone for TypedImporter<T> {
    fn clone(&self) -> Self {
        Self { handle: self.handle.clone(), import: Arc::clone(&self.import) }
    }
}

impl<T> fmt::Debug for TypedImporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedImporter").field(&self.name()).finish()
    }
}

/// An exporter resolved for a concrete content type.
pub struct TypedExporter<T> {
    handle: PluginHandle,
    export: ExportFn<T>,
}

impl<T> TypedExporter<T> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> &PluginHandle {
        &self.handle
    }

    pub fn export(&self, content: &T, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
        (self.export)(content, name, out)
    }
}

impl<T> Clone for TypedExporter<T> {
    fn clone(&self) -> Self {
        Self { handle: self.handle.clone(), export: Arc::clone(&self.export) }
    }
}

impl<T> fmt::Debug for TypedExporter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedExporter").field(&self.name()).finish()
    }
}
