use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::tempdir;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use content_core::archive::{Archive, PackFormat};
use content_core::codec::{self, DecodedImage, ImageImporter};
use content_core::plugin::{ContentPlugin, Importer, PluginHandle, PluginRegistry};
use content_core::stream::ContentStream;
use content_core::{ContentConfig, ContentError, ContentResolver, ServiceContainer};

fn png_bytes() -> Vec<u8> {
    let image = image::RgbaImage::from_fn(3, 2, |x, y| {
        image::Rgba([x as u8 * 80, y as u8 * 120, 7, 255])
    });
    let mut cursor = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image).write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn bmp_bytes() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
    let mut cursor = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image).write_to(&mut cursor, image::ImageFormat::Bmp).unwrap();
    cursor.into_inner()
}

fn write_pack(path: &Path, files: &[(&str, &[u8])]) {
    let mut archive = Archive::create_in(
        path.file_name().unwrap().to_string_lossy(),
        Cursor::new(Vec::new()),
        Box::new(PackFormat),
    );
    archive.initialize().unwrap();
    for (name, data) in files {
        archive.add_file(name, data).unwrap();
    }
    archive.save_to_path(path).unwrap();
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(fs::File::create(path).unwrap());
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in files {
        writer.start_file(*name, stored).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

fn default_registry() -> content_core::SharedRegistry {
    let registry = PluginRegistry::shared();
    codec::register_defaults(&mut registry.write()).unwrap();
    registry
}

/// Reads the header, rejects anything, and remembers how far it got.
struct HeaderOnlyBmp {
    extensions: Vec<String>,
    consumed: Mutex<Vec<usize>>,
}

impl ContentPlugin for HeaderOnlyBmp {
    fn name(&self) -> &str {
        "header-only-bmp"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Importer<DecodedImage> for HeaderOnlyBmp {
    fn import(&self, _name: &str, stream: &mut ContentStream) -> anyhow::Result<DecodedImage> {
        let mut header = [0u8; 14];
        std::io::Read::read_exact(stream, &mut header)?;
        self.consumed.lock().push(header.len());
        anyhow::bail!("bitmap header rejected")
    }
}

/// Records the bytes it was handed before decoding them.
struct Recording {
    inner: ImageImporter,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl ContentPlugin for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn supported_extensions(&self) -> &[String] {
        self.inner.supported_extensions()
    }
}

impl Importer<DecodedImage> for Recording {
    fn import(&self, name: &str, stream: &mut ContentStream) -> anyhow::Result<DecodedImage> {
        let data = stream.read_to_vec()?;
        self.seen.lock().push(data.clone());
        codec::decode_image(name, &data)
    }
}

fn bmp_chain() -> (Arc<HeaderOnlyBmp>, Arc<Recording>, content_core::SharedRegistry) {
    let first = Arc::new(HeaderOnlyBmp {
        extensions: vec!["bmp".to_string()],
        consumed: Mutex::new(Vec::new()),
    });
    let second = Arc::new(Recording {
        inner: ImageImporter::with_extensions(["bmp", "tga"]).unwrap(),
        seen: Mutex::new(Vec::new()),
    });
    let registry = PluginRegistry::shared();
    {
        let mut registry = registry.write();
        registry.add(PluginHandle::importer::<DecodedImage, _>(Arc::clone(&first))).unwrap();
        registry.add(PluginHandle::importer::<DecodedImage, _>(Arc::clone(&second))).unwrap();
    }
    (first, second, registry)
}

#[test]
fn readme_on_disk_and_missing_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("readme.txt"), "read me").unwrap();
    let mut services = ServiceContainer::new();
    services.insert(default_registry());

    let config = ContentConfig::default().with_base_dir(dir.path());
    let mut resolver = ContentResolver::from_config(&config, &services).unwrap();

    assert_eq!(resolver.archives().count(), 0);
    assert_eq!(resolver.import::<String>("readme.txt").unwrap(), "read me");
    assert!(resolver.open("missing.txt").unwrap_err().is_not_found());
    assert!(resolver.import::<String>("missing.txt").unwrap_err().is_not_found());
}

#[test]
fn first_mounted_archive_wins() {
    let dir = tempdir().unwrap();
    write_pack(&dir.path().join("a1.cpak"), &[("x.dat", b"from a1".as_slice())]);
    write_pack(&dir.path().join("a2.cpak"), &[("x.dat", b"from a2".as_slice())]);
    fs::write(dir.path().join("x.dat"), "from disk").unwrap();

    let mut resolver = ContentResolver::new(dir.path(), &ServiceContainer::new()).unwrap();
    resolver.initialize().unwrap();

    let mounted: Vec<&str> = resolver.archives().map(|archive| archive.file_name()).collect();
    assert_eq!(mounted, vec!["a1.cpak", "a2.cpak"]);
    assert_eq!(resolver.open("X.DAT").unwrap().read_to_vec().unwrap(), b"from a1");

    resolver.remove_archive("a1.cpak").unwrap();
    assert_eq!(resolver.open("x.dat").unwrap().read_to_vec().unwrap(), b"from a2");

    resolver.unload().unwrap();
    assert_eq!(resolver.open("x.dat").unwrap().read_to_vec().unwrap(), b"from disk");
}

#[test]
fn corrupt_bitmap_falls_through_on_the_rewound_stream() {
    let dir = tempdir().unwrap();
    let mut corrupt = bmp_bytes();
    corrupt.truncate(30);
    fs::write(dir.path().join("broken.bmp"), &corrupt).unwrap();

    let (first, second, registry) = bmp_chain();
    let mut resolver = ContentResolver::with_registry(dir.path(), registry).unwrap();

    let err = resolver.import::<DecodedImage>("broken.bmp").unwrap_err();
    match err {
        ContentError::UnsupportedContent { name, failures, .. } => {
            assert_eq!(name, "broken.bmp");
            let order: Vec<&str> = failures.iter().map(|f| f.plugin.as_str()).collect();
            assert_eq!(order, vec!["header-only-bmp", "recording"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(*first.consumed.lock(), vec![14]);
    assert_eq!(*second.seen.lock(), vec![corrupt]);
}

#[test]
fn valid_bitmap_is_decoded_by_the_second_importer() {
    let dir = tempdir().unwrap();
    write_pack(&dir.path().join("art.cpak"), &[("ok.bmp", bmp_bytes().as_slice())]);

    let (_first, second, registry) = bmp_chain();
    let mut resolver = ContentResolver::with_registry(dir.path(), registry).unwrap();
    resolver.initialize().unwrap();

    let image = resolver.import::<DecodedImage>("ok.bmp").unwrap();
    assert_eq!((image.width(), image.height()), (2, 2));
    assert_eq!(&image.pixels()[..4], &[10, 20, 30, 255]);
    assert_eq!(second.seen.lock().len(), 1);
}

#[test]
fn images_load_from_zip_and_export_as_png() {
    let dir = tempdir().unwrap();
    let png = png_bytes();
    write_zip(&dir.path().join("sprites.zip"), &[("hero.png", png.as_slice())]);

    let registry = default_registry();
    let mut resolver = ContentResolver::with_registry(dir.path(), registry).unwrap();
    resolver.initialize().unwrap();
    assert!(resolver.exists("HERO.PNG").unwrap());

    let first = resolver.load::<DecodedImage>("hero.png").unwrap();
    let again = resolver.load::<DecodedImage>("hero.png").unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(resolver.cache().bytes_used(), png.len());

    let mut exported = Vec::new();
    resolver.export(first.as_ref(), "copy.png", &mut exported).unwrap();
    assert_eq!(codec::decode_image("copy.png", &exported).unwrap(), *first);

    resolver.reset().unwrap();
    assert!(resolver.cache().is_empty());
    assert!(resolver.exists("hero.png").unwrap());
}

#[test]
fn shared_registry_outlives_a_borrowing_resolver() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("note.txt"), "shared").unwrap();
    let registry = default_registry();
    let mut services = ServiceContainer::new();
    services.insert(Arc::clone(&registry));

    let mut first = ContentResolver::new(dir.path(), &services).unwrap();
    let mut second = ContentResolver::new(dir.path(), &services).unwrap();
    assert_eq!(first.import::<String>("note.txt").unwrap(), "shared");

    first.dispose();
    assert!(matches!(first.import::<String>("note.txt"), Err(ContentError::AlreadyDisposed(_))));
    assert_eq!(second.import::<String>("note.txt").unwrap(), "shared");
    assert!(!registry.read().is_disposed());
}

#[test]
fn mounting_an_archive_drops_shadowed_cache_entries() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("note.txt"), "disk").unwrap();
    fs::write(dir.path().join("other.txt"), "kept").unwrap();
    let mut resolver = ContentResolver::with_registry(dir.path(), default_registry()).unwrap();

    assert_eq!(*resolver.load::<String>("note.txt").unwrap(), "disk");
    let other = resolver.load::<String>("other.txt").unwrap();

    let mut archive =
        Archive::create_in("patch.cpak", Cursor::new(Vec::new()), Box::new(PackFormat));
    archive.initialize().unwrap();
    archive.add_file("NOTE.TXT", b"archive").unwrap();
    resolver.add_archive(archive).unwrap();

    assert_eq!(resolver.import::<String>("note.txt").unwrap(), "archive");
    assert_eq!(*resolver.load::<String>("note.txt").unwrap(), "archive");
    assert!(Arc::ptr_eq(&other, &resolver.load::<String>("other.txt").unwrap()));
}

#[test]
fn mounting_twice_conflicts() {
    let dir = tempdir().unwrap();
    write_pack(&dir.path().join("data.cpak"), &[]);
    let mut resolver = ContentResolver::new(dir.path(), &ServiceContainer::new()).unwrap();
    resolver.mount("data.cpak").unwrap();
    assert!(matches!(resolver.mount("DATA.cpak"), Err(ContentError::Conflict(_))));
}
