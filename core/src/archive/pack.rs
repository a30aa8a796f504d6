//! Native `CPAK` container: header-first table followed by the payload region.
//!
//! ```text
//! magic   b"CPAK"
//! version u16 (1)
//! count   u32
//! count x { name_len u16, name [u8; name_len], position u64, length u64 }
//! payload
//! ```
//!
//! All integers are little endian. Positions are relative to the first payload
//! byte, which immediately follows the table.

use std::io::{self, SeekFrom, Write};

use crate::error::ContentError;
use crate::fs;

use super::Result;
use super::format::{ArchiveFormat, BackingStream, SaveEntry, SaveTarget, TableEntry, TableOfContents};

const MAGIC: &[u8; 4] = b"CPAK";
const VERSION: u16 = 1;
const HEADER_LEN: u64 = 4 + 2 + 4;
const ENTRY_FIXED_LEN: u64 = 2 + 8 + 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct PackFormat;

impl ArchiveFormat for PackFormat {
    fn name(&self) -> &'static str {
        "cpak"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cpak"]
    }

    fn read_table(&self, stream: &mut dyn BackingStream) -> Result<TableOfContents> {
        let stream_len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        read_exact(stream, &mut magic, "header")?;
        if &magic != MAGIC {
            return Err(ContentError::corrupt(format!("bad magic {magic:?}, expected CPAK")));
        }
        let version = read_u16(stream)?;
        if version != VERSION {
            return Err(ContentError::corrupt(format!("unsupported pack version {version}")));
        }

        let count = read_u32(stream)?;
        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        let mut table_len = HEADER_LEN;
        for index in 0..count {
            let name_len = read_u16(stream)?;
            let mut raw = vec![0u8; name_len as usize];
            read_exact(stream, &mut raw, "entry name")?;
            let name = String::from_utf8(raw)
                .map_err(|_| ContentError::corrupt(format!("entry {index} name is not UTF-8")))?;
            fs::validate_name(&name)
                .map_err(|err| ContentError::corrupt(format!("entry {index}: {err}")))?;
            let position = read_u64(stream)?;
            let length = read_u64(stream)?;
            table_len += ENTRY_FIXED_LEN + name_len as u64;
            entries.push(TableEntry { name, position, length });
        }

        let payload_len = stream_len.saturating_sub(table_len);
        for entry in &entries {
            let end = entry.position.checked_add(entry.length);
            if end.is_none_or(|end| end > payload_len) {
                return Err(ContentError::corrupt(format!(
                    "entry {:?} spans past the end of the payload region",
                    entry.name
                )));
            }
        }

        Ok(TableOfContents { payload_base: table_len, entries })
    }

    fn create(&self, stream: &mut dyn BackingStream) -> Result<TableOfContents> {
        stream.seek(SeekFrom::Start(0))?;
        write_header(stream, 0)?;
        stream.flush()?;
        Ok(TableOfContents { payload_base: HEADER_LEN, entries: Vec::new() })
    }

    fn save(&self, entries: &[SaveEntry<'_>], out: &mut dyn SaveTarget) -> Result<()> {
        let count = u32::try_from(entries.len())
            .map_err(|_| ContentError::invalid_argument("too many entries for a pack"))?;
        write_header(out, count)?;

        let mut position = 0u64;
        for entry in entries {
            let name_len = u16::try_from(entry.name.len()).map_err(|_| {
                ContentError::invalid_argument(format!("entry name {:?} is too long", entry.name))
            })?;
            out.write_all(&name_len.to_le_bytes())?;
            out.write_all(entry.name.as_bytes())?;
            out.write_all(&position.to_le_bytes())?;
            out.write_all(&(entry.data.len() as u64).to_le_bytes())?;
            position += entry.data.len() as u64;
        }
        for entry in entries {
            out.write_all(entry.data)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn write_header<W: Write + ?Sized>(out: &mut W, count: u32) -> io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())
}

fn read_exact(stream: &mut dyn BackingStream, buf: &mut [u8], what: &str) -> Result<()> {
    stream.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => ContentError::corrupt(format!("truncated pack {what}")),
        _ => err.into(),
    })
}

fn read_u16(stream: &mut dyn BackingStream) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(stream, &mut buf, "table")?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(stream: &mut dyn BackingStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(stream, &mut buf, "table")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(stream: &mut dyn BackingStream) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(stream, &mut buf, "table")?;
    Ok(u64::from_le_bytes(buf))
}
