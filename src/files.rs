// src/files.rs

//! File registry shared by script parsing and graph construction.
//!
//! Every file a submission script mentions is interned exactly once; nodes
//! refer to files by [`FileIndex`]. Lifetime (permanent vs temporary) and
//! direction (input vs output) travel with the descriptor so the scheduler
//! can stage inputs and archive temporaries without re-parsing anything.

use crate::graph::LocalId;

/// Index into a [`FileRegistry`].
pub type FileIndex = usize;

/// Direction and lifetime of a registered file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// User-supplied input that outlives the batch.
    PermanentInput = 1,
    /// Result the user asked for; survives batch close.
    PermanentOutput = 2,
    /// Intermediate input produced by an earlier node.
    TemporaryInput = 3,
    /// Intermediate output consumed by a later node; archived on close.
    TemporaryOutput = 4,
}

impl FileKind {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::PermanentInput),
            2 => Some(Self::PermanentOutput),
            3 => Some(Self::TemporaryInput),
            4 => Some(Self::TemporaryOutput),
            _ => None,
        }
    }

    pub fn is_output(self) -> bool {
        matches!(self, Self::PermanentOutput | Self::TemporaryOutput)
    }

    pub fn is_temporary(self) -> bool {
        matches!(self, Self::TemporaryInput | Self::TemporaryOutput)
    }
}

/// One file as seen by the job graph.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// On-disk name (within `subdirectory` when set).
    pub name: String,
    /// Logical name the executing application knows the file by.
    pub alias: String,
    pub kind: FileKind,
    /// Relative directory holding the physical file, if not the batch root.
    pub subdirectory: Option<String>,
    /// Node that produces this file, for temporary inputs.
    pub parent: Option<LocalId>,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            kind,
            subdirectory: None,
            parent: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_subdirectory(mut self, dir: impl Into<String>) -> Self {
        self.subdirectory = Some(dir.into());
        self
    }

    pub fn with_parent(mut self, parent: LocalId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Path of the physical file relative to the working directory.
    pub fn relative_path(&self) -> String {
        match &self.subdirectory {
            Some(dir) => format!("{dir}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Arena of all files referenced by one batch.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<FileDescriptor>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: FileDescriptor) -> FileIndex {
        self.files.push(file);
        self.files.len() - 1
    }

    pub fn get(&self, idx: FileIndex) -> Option<&FileDescriptor> {
        self.files.get(idx)
    }

    pub fn get_mut(&mut self, idx: FileIndex) -> Option<&mut FileDescriptor> {
        self.files.get_mut(idx)
    }

    /// Find a file by name, searching newest first so that re-registered
    /// names (segment continuations) resolve to the latest incarnation.
    pub fn find_by_name(&self, name: &str) -> Option<FileIndex> {
        self.files.iter().rposition(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileIndex, &FileDescriptor)> {
        self.files.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut reg = FileRegistry::new();
        let a = reg.insert(FileDescriptor::new("topo.top", FileKind::PermanentInput));
        let b = reg.insert(FileDescriptor::new("run.traj", FileKind::PermanentOutput));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(a).unwrap().name, "topo.top");
        assert!(reg.get(b).unwrap().kind.is_output());
    }

    #[test]
    fn find_prefers_latest_registration() {
        let mut reg = FileRegistry::new();
        reg.insert(FileDescriptor::new("run.rst", FileKind::PermanentOutput));
        let newer = reg.insert(
            FileDescriptor::new("run.rst", FileKind::TemporaryOutput).with_parent(3),
        );
        assert_eq!(reg.find_by_name("run.rst"), Some(newer));
    }

    #[test]
    fn kind_codes_round_trip() {
        for kind in [
            FileKind::PermanentInput,
            FileKind::PermanentOutput,
            FileKind::TemporaryInput,
            FileKind::TemporaryOutput,
        ] {
            assert_eq!(FileKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(FileKind::from_code(9), None);
    }
}
