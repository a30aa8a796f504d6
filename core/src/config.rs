//! Resolver configuration, loadable from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::CacheBudget;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory loose files are read from and archives are discovered in.
    pub base_dir: PathBuf,
    /// Container extensions mounted on initialize.
    pub archive_extensions: Vec<String>,
    pub cache_budget_bytes: usize,
    /// Run discovery as part of construction.
    pub mount_on_init: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            archive_extensions: vec!["cpak".to_string(), "zip".to_string()],
            cache_budget_bytes: CacheBudget::default().bytes_max,
            mount_on_init: true,
        }
    }
}

impl ContentConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing content configuration")
    }

    /// Read a JSON file. A relative `base_dir` inside it is taken relative to
    /// the file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let mut config = Self::from_json_str(&text)
            .with_context(|| format!("in {}", path.display()))?;
        if config.base_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.base_dir = parent.join(&config.base_dir);
            }
        }
        Ok(config)
    }

    pub fn with_base_dir<P: Into<PathBuf>>(mut self, base_dir: P) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache_budget(mut self, bytes: usize) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    pub fn with_mount_on_init(mut self, mount: bool) -> Self {
        self.mount_on_init = mount;
        self
    }
}
