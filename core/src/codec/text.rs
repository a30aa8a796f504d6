//! UTF-8 text import and export.

use std::io::Write;

use anyhow::Context;

use crate::plugin::{ContentPlugin, Exporter, Importer};
use crate::stream::ContentStream;

use super::Result;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn default_extensions() -> Vec<String> {
    ["txt", "json", "xml", "csv", "ini", "cfg"].iter().map(|ext| ext.to_string()).collect()
}

/// Reads a whole stream as a UTF-8 `String`. Invalid UTF-8 fails the import.
#[derive(Debug, Clone)]
pub struct TextImporter {
    extensions: Vec<String>,
    strip_bom: bool,
}

impl TextImporter {
    pub fn new() -> Self {
        Self { extensions: default_extensions(), strip_bom: true }
    }

    /// Keep a leading byte-order mark in the imported text.
    pub fn keep_bom(mut self) -> Self {
        self.strip_bom = false;
        self
    }
}

impl Default for TextImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentPlugin for TextImporter {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Importer<String> for TextImporter {
    fn import(&self, name: &str, stream: &mut ContentStream) -> Result<String> {
        let mut bytes = stream.read_to_vec().with_context(|| format!("reading {name:?}"))?;
        if self.strip_bom && bytes.starts_with(UTF8_BOM) {
            bytes.drain(..UTF8_BOM.len());
        }
        String::from_utf8(bytes).with_context(|| format!("{name:?} is not valid UTF-8"))
    }
}

#[derive(Debug, Clone)]
pub struct TextExporter {
    extensions: Vec<String>,
}

impl TextExporter {
    pub fn new() -> Self {
        Self { extensions: default_extensions() }
    }
}

impl Default for TextExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentPlugin for TextExporter {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }
}

impl Exporter<String> for TextExporter {
    fn export(&self, content: &String, name: &str, out: &mut dyn Write) -> Result<()> {
        out.write_all(content.as_bytes()).with_context(|| format!("writing {name:?}"))?;
        out.flush()?;
        Ok(())
    }
}
