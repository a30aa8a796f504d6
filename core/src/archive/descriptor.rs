use std::hash::{Hash, Hasher};

use crate::fs::name_key;
use crate::types::ArchiveId;

/// Location of one logical file inside a specific archive instance.
///
/// Descriptors are values: renaming or deleting a file replaces the table entry,
/// so a descriptor held across such a change becomes stale rather than updated.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    archive: ArchiveId,
    name: String,
    length: u64,
    position: u64,
}

impl FileDescriptor {
    pub(crate) fn new(archive: ArchiveId, name: impl Into<String>, position: u64, length: u64) -> Self {
        Self { archive, name: name.into(), length, position }
    }

    pub fn archive(&self) -> ArchiveId {
        self.archive
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored byte count.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Offset from the start of the archive's payload region.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Same slot under another name.
    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        Self { name: name.into(), ..self.clone() }
    }

    /// Exact match, including the name's case. Used to detect stale descriptors.
    pub(crate) fn is_identical(&self, other: &Self) -> bool {
        self.archive == other.archive
            && self.position == other.position
            && self.length == other.length
            && self.name == other.name
    }
}

impl PartialEq for FileDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.archive == other.archive
            && self.position == other.position
            && self.length == other.length
            && (self.name == other.name || name_key(&self.name) == name_key(&other.name))
    }
}

impl Eq for FileDescriptor {}

impl Hash for FileDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.archive.hash(state);
        self.position.hash(state);
        self.length.hash(state);
        name_key(&self.name).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_ignores_name_case_only() {
        let archive = ArchiveId::next();
        let a = FileDescriptor::new(archive, "Hero.png", 0, 10);
        let b = FileDescriptor::new(archive, "HERO.PNG", 0, 10);
        assert_eq!(a, b);
        assert!(!a.is_identical(&b));

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        assert_ne!(a, FileDescriptor::new(archive, "Hero.png", 1, 10));
        assert_ne!(a, FileDescriptor::new(ArchiveId::next(), "Hero.png", 0, 10));
    }
}
