//! Finding container files to mount when a resolver initializes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ContentError;
use crate::fs::{is_hidden, natural_cmp_path, normalize_extension};

use super::Result;

/// Produces the container paths a resolver mounts on `initialize`, in mount
/// order.
pub trait ArchiveDiscovery: fmt::Debug + Send {
    fn discover(&self, base_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Mounts nothing; archives are added by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscovery;

impl ArchiveDiscovery for NoDiscovery {
    fn discover(&self, _base_dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Every visible file directly under the base directory whose extension is in
/// the list, naturally sorted (`pak2` before `pak10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDiscovery {
    extensions: Vec<String>,
}

impl ExtensionDiscovery {
    pub fn new<I, S>(extensions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for ext in extensions {
            let ext = normalize_extension(ext.as_ref())?;
            if !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        Ok(Self { extensions: normalized })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

impl Default for ExtensionDiscovery {
    fn default() -> Self {
        Self { extensions: vec!["cpak".to_string(), "zip".to_string()] }
    }
}

impl ArchiveDiscovery for ExtensionDiscovery {
    fn discover(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let read_dir = fs::read_dir(base_dir).map_err(|err| ContentError::io_at(base_dir, err))?;

        let mut found = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|err| ContentError::io_at(base_dir, err))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|err| ContentError::io_at(&path, err))?;
            if !file_type.is_file() || is_hidden(&path) || !self.matches(&path) {
                continue;
            }
            found.push(path);
        }

        found.sort_by(|a, b| natural_cmp_path(a, b));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn filters_and_sorts_containers() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in ["pak10.cpak", "pak2.CPAK", "art.zip", ".hidden.zip", "notes.txt"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("nested.zip")).unwrap();

        let found = ExtensionDiscovery::default().discover(root).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["art.zip", "pak2.CPAK", "pak10.cpak"]);
    }

    #[test]
    fn extensions_are_normalized_and_deduplicated() {
        let discovery = ExtensionDiscovery::new([".ZIP", "zip", "cbz"]).unwrap();
        assert_eq!(discovery.extensions(), ["zip", "cbz"]);
        assert!(ExtensionDiscovery::new([" "]).is_err());
    }

    #[test]
    fn no_discovery_mounts_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.cpak"), b"x").unwrap();
        assert!(NoDiscovery.discover(dir.path()).unwrap().is_empty());
    }
}
