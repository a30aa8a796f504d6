//! Shared data structures exchanged between archives, plug-ins, and the resolver.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier for the Rust type a plug-in produces or consumes.
///
/// Resolved once when a plug-in is registered; lookups compare identifiers only.
#[derive(Clone, Copy)]
pub struct ContentType {
    id: TypeId,
    name: &'static str,
}

impl ContentType {
    pub fn of<T: 'static>() -> Self {
        Self { id: TypeId::of::<T>(), name: short_type_name(type_name::<T>()) }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human readable type name, without its module path.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ContentType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ContentType {}

impl Hash for ContentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentType").field(&self.name).finish()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    // Generic arguments keep their paths; only the outer path is trimmed.
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Identity of one archive instance. Descriptors point back to their archive
/// through this value instead of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveId(u64);

impl ArchiveId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archive#{}", self.0)
    }
}

/// Byte budget for the imported-asset cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheBudget {
    pub bytes_max: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self { bytes_max: 256 * 1024 * 1024 }
    }
}

/// Whether a resolver disposes its plug-in registry on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOwnership {
    /// Created by the resolver; disposed with it.
    Owned,
    /// Supplied by the environment; left alone.
    Borrowed,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sprite;

    #[test]
    fn content_type_compares_by_type_identity() {
        assert_eq!(ContentType::of::<Sprite>(), ContentType::of::<Sprite>());
        assert_ne!(ContentType::of::<Sprite>(), ContentType::of::<String>());
        assert_eq!(ContentType::of::<Sprite>().name(), "Sprite");
        assert_eq!(ContentType::of::<Vec<u8>>().name(), "Vec<u8>");
    }

    #[test]
    fn archive_ids_are_unique() {
        let a = ArchiveId::next();
        let b = ArchiveId::next();
        assert_ne!(a, b);
    }
}
