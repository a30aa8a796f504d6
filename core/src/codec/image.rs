//! Raster image import and PNG export.

use std::io::{Cursor, Write};

use anyhow::{Context, anyhow, bail};
use image::codecs::png::PngEncoder;
use image::metadata::Orientation;
use image::{
    DynamicImage, ExtendedColorType, ImageDecoder as _, ImageEncoder, ImageFormat, ImageReader,
    RgbaImage,
};
use moxcms::{CmsError, ColorProfile, Layout, TransformOptions};
use tracing::{trace, warn};

use crate::fs::{extension_of, normalize_extension};
use crate::plugin::{ContentPlugin, Exporter, Importer};
use crate::stream::ContentStream;

use super::Result;

const DEFAULT_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "bmp", "tga"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Straight-alpha RGBA8888 pixels, row-major from the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: ImageDimensions,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Decode the first frame of an image.
///
/// The container format comes from `name`'s extension when it is one the
/// `image` crate knows, otherwise it is sniffed from the bytes. EXIF
/// orientation is applied and an embedded ICC profile is converted to sRGB.
pub fn decode_image(name: &str, data: &[u8]) -> Result<DecodedImage> {
    if data.is_empty() {
        bail!("empty image data for {name:?}");
    }

    let reader = match extension_of(name).and_then(ImageFormat::from_extension) {
        Some(format) => ImageReader::with_format(Cursor::new(data), format),
        None => ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("guessing image format")?,
    };

    let mut decoder =
        reader.into_decoder().with_context(|| format!("constructing decoder for {name:?}"))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let icc_profile = decoder.icc_profile().unwrap_or(None);

    let mut image =
        DynamicImage::from_decoder(decoder).with_context(|| format!("decoding image {name:?}"))?;
    if orientation != Orientation::NoTransforms {
        image.apply_orientation(orientation);
    }

    let mut rgba = image.into_rgba8();
    if let Some(profile) = icc_profile {
        if let Err(err) = convert_to_srgb_in_place(&mut rgba, &profile) {
            warn!(target: "codec::image", "skipping ICC conversion for {name:?}: {err}");
        }
    }

    let dimensions = ImageDimensions { width: rgba.width(), height: rgba.height() };
    trace!(
        target: "codec::image",
        file = name,
        width = dimensions.width,
        height = dimensions.height,
        "decoded"
    );
    Ok(DecodedImage { dimensions, pixels: rgba.into_raw() })
}

fn convert_to_srgb_in_place(image: &mut RgbaImage, profile_bytes: &[u8]) -> Result<()> {
    let source = ColorProfile::new_from_slice(profile_bytes)
        .map_err(|err| anyhow!("invalid ICC profile: {err}"))?;
    let srgb = ColorProfile::new_srgb();
    let raw = image.as_mut();

    match source.create_transform_8bit(
        Layout::Rgba,
        &srgb,
        Layout::Rgba,
        TransformOptions::default(),
    ) {
        Ok(transform) => {
            let mut converted = vec![0u8; raw.len()];
            transform
                .transform(&raw[..], &mut converted)
                .map_err(|err| anyhow!("icc transform failed: {err}"))?;
            raw.copy_from_slice(&converted);
            Ok(())
        }
        // Gray and other three-channel-only profiles: convert colour, keep alpha.
        Err(CmsError::InvalidLayout) => {
            let rgb: Vec<u8> = raw.chunks_exact(4).flat_map(|px| px[..3].iter().copied()).collect();
            let mut converted = vec![0u8; rgb.len()];
            let transform = source.create_transform_8bit(
                Layout::Rgb,
                &srgb,
                Layout::Rgb,
                TransformOptions::default(),
            )?;
            transform
                .transform(&rgb, &mut converted)
                .map_err(|err| anyhow!("icc transform failed: {err}"))?;
            for (px, rgb_px) in raw.chunks_exact_mut(4).zip(converted.chunks_exact(3)) {
                px[..3].copy_from_slice(rgb_px);
            }
            Ok(())
        }
        Err(err) => Err(anyhow!("icc transform setup failed: {err}")),
    }
}

/// Imports [`DecodedImage`]s through the `image` crate.
#[derive(Debug, Clone)]
pub struct ImageImporter {
    extensions: Vec<String>,
}

impl ImageImporter {
    pub fn new() -> Self {
        Self { extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect() }
    }

    /// Restrict (or widen) the extensions this importer claims.
    pub fn with_extensions<I, S>(extensions: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { extensions })
    }
}

impl Default for ImageImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentPlugin for ImageImporter {
    fn name(&self) -> &str {
        "image"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Importer<DecodedImage> for ImageImporter {
    fn import(&self, name: &str, stream: &mut ContentStream) -> Result<DecodedImage> {
        let data = stream.read_to_vec().with_context(|| format!("reading {name:?}"))?;
        decode_image(name, &data)
    }
}

/// Writes [`DecodedImage`]s as 8-bit RGBA PNG.
#[derive(Debug, Clone)]
pub struct PngExporter {
    extensions: Vec<String>,
}

impl PngExporter {
    pub fn new() -> Self {
        Self { extensions: vec!["png".to_string()] }
    }
}

impl Default for PngExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentPlugin for PngExporter {
    fn name(&self) -> &str {
        "png"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Exporter<DecodedImage> for PngExporter {
    fn export(&self, content: &DecodedImage, name: &str, out: &mut dyn Write) -> Result<()> {
        let expected = content.width() as usize * content.height() as usize * 4;
        if content.pixels.len() != expected {
            bail!(
                "{name:?}: {}x{} image needs {expected} bytes, has {}",
                content.width(),
                content.height(),
                content.pixels.len()
            );
        }
        PngEncoder::new(out)
            .write_image(&content.pixels, content.width(), content.height(), ExtendedColorType::Rgba8)
            .with_context(|| format!("encoding {name:?} as png"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use moxcms::RenderingIntent;

    fn sample_image() -> RgbaImage {
        ImageBuffer::from_fn(2, 2, |x, y| match (x, y) {
            (0, 0) => Rgba([255, 0, 0, 255]),
            (1, 0) => Rgba([0, 255, 0, 255]),
            (0, 1) => Rgba([0, 0, 255, 255]),
            _ => Rgba([255, 255, 0, 255]),
        })
    }

    fn encode(image: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        let dynamic = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image.clone()).to_rgb8()),
            _ => DynamicImage::ImageRgba8(image.clone()),
        };
        let mut cursor = Cursor::new(Vec::new());
        dynamic.write_to(&mut cursor, format).expect("encode sample");
        cursor.into_inner()
    }

    #[test]
    fn decodes_png_exactly() {
        let bytes = encode(&sample_image(), ImageFormat::Png);
        let decoded = decode_image("sprite.png", &bytes).expect("decode png");

        assert_eq!(decoded.dimensions, ImageDimensions { width: 2, height: 2 });
        assert_eq!(&decoded.pixels[..4], &[255, 0, 0, 255]);
        assert_eq!(&decoded.pixels[12..], &[255, 255, 0, 255]);
    }

    #[test]
    fn decodes_lossy_and_legacy_formats() {
        for (name, format) in [
            ("a.jpg", ImageFormat::Jpeg),
            ("a.webp", ImageFormat::WebP),
            ("a.gif", ImageFormat::Gif),
            ("a.bmp", ImageFormat::Bmp),
            ("a.tga", ImageFormat::Tga),
        ] {
            let bytes = encode(&sample_image(), format);
            let decoded = decode_image(name, &bytes).unwrap_or_else(|err| panic!("{name}: {err:#}"));
            assert_eq!(decoded.pixels.len(), 16, "{name}");
        }
    }

    #[test]
    fn unknown_extension_is_sniffed() {
        let bytes = encode(&sample_image(), ImageFormat::Png);
        let decoded = decode_image("texture.bin", &bytes).expect("sniffed png");
        assert_eq!(decoded.width(), 2);
    }

    #[test]
    fn orientation_rotates_dimensions() {
        let mut image = DynamicImage::ImageRgba8(ImageBuffer::from_fn(2, 1, |x, _| match x {
            0 => Rgba([255, 0, 0, 255]),
            _ => Rgba([0, 255, 0, 255]),
        }));
        image.apply_orientation(Orientation::Rotate90);
        assert_eq!((image.width(), image.height()), (1, 2));
    }

    #[test]
    fn icc_conversion_preserves_alpha() {
        let mut image: RgbaImage = ImageBuffer::from_pixel(1, 1, Rgba([200, 100, 50, 128]));
        let mut profile = ColorProfile::new_display_p3();
        profile.rendering_intent = RenderingIntent::RelativeColorimetric;
        let icc_bytes = profile.encode().expect("encode profile");

        convert_to_srgb_in_place(&mut image, &icc_bytes).expect("icc conversion");

        let pixel = image.get_pixel(0, 0);
        assert_eq!(pixel[3], 128);
        assert_ne!(&pixel.0[..3], &[200, 100, 50]);
    }

    #[test]
    fn rejects_empty_and_corrupt_input() {
        let err = decode_image("empty.png", &[]).unwrap_err();
        assert!(err.to_string().contains("empty image data"));
        assert!(decode_image("broken.bmp", b"BM not really a bitmap").is_err());
    }

    #[test]
    fn png_export_round_trips_pixels() {
        let original = decode_image("a.png", &encode(&sample_image(), ImageFormat::Png)).unwrap();
        let mut out = Vec::new();
        PngExporter::new().export(&original, "out.png", &mut out).unwrap();
        assert_eq!(decode_image("out.png", &out).unwrap(), original);
    }

    #[test]
    fn png_export_checks_buffer_size() {
        let image = DecodedImage {
            dimensions: ImageDimensions { width: 2, height: 2 },
            pixels: vec![0; 3],
        };
        assert!(PngExporter::new().export(&image, "bad.png", &mut Vec::new()).is_err());
    }

    #[test]
    fn importer_extensions_are_configurable() {
        let importer = ImageImporter::with_extensions([".BMP", "tga"]).unwrap();
        assert_eq!(importer.supported_extensions(), ["bmp", "tga"]);
        assert!(importer.supports("TGA").unwrap());
        assert!(!importer.supports("png").unwrap());
    }
}
