//! Bundled plug-ins: raster images and UTF-8 text.

pub mod image;
pub mod text;

use std::sync::Arc;

use crate::plugin::{PluginHandle, PluginRegistry};

pub use self::image::{DecodedImage, ImageDimensions, ImageImporter, PngExporter, decode_image};
pub use self::text::{TextExporter, TextImporter};

/// Plug-ins report failures through `anyhow`; the resolver collects them.
pub type Result<T> = anyhow::Result<T>;

/// Register every bundled plug-in with `registry`, importers before
/// exporters.
pub fn register_defaults(registry: &mut PluginRegistry) -> crate::Result<()> {
    registry.add(PluginHandle::importer::<DecodedImage, _>(Arc::new(ImageImporter::new())))?;
    registry.add(PluginHandle::importer::<String, _>(Arc::new(TextImporter::new())))?;
    registry.add(PluginHandle::exporter::<DecodedImage, _>(Arc::new(PngExporter::new())))?;
    registry.add(PluginHandle::exporter::<String, _>(Arc::new(TextExporter::new())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_images_and_text() {
        let mut registry = PluginRegistry::new();
        register_defaults(&mut registry).unwrap();

        assert_eq!(registry.importers::<DecodedImage>(Some("PNG")).unwrap().len(), 1);
        assert_eq!(registry.importers::<String>(Some("txt")).unwrap().len(), 1);
        assert_eq!(registry.exporters::<DecodedImage>(Some("png")).unwrap().len(), 1);
        assert!(registry.exporters::<DecodedImage>(Some("bmp")).unwrap().is_empty());
        assert_eq!(registry.len(), 4);
    }
}
