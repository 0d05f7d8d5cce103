use crate::document::{DocPath, Patch};
use crate::error::Result;

/// How a patch treats a missing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the document if absent, then apply the patch (set with merge).
    Merge,
    /// Fail with `NotFound` if the document is absent.
    Update,
    /// Fail with `AlreadyExists` if the document is present.
    Create,
}

/// Writes committed together: either all apply or none do.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) writes: Vec<(DocPath, Patch, WriteMode)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_merge(&mut self, path: DocPath, patch: Patch) -> &mut Self {
        self.writes.push((path, patch, WriteMode::Merge));
        self
    }

    pub fn create(&mut self, path: DocPath, patch: Patch) -> &mut Self {
        self.writes.push((path, patch, WriteMode::Create));
        self
    }

    pub fn update(&mut self, path: DocPath, patch: Patch) -> &mut Self {
        self.writes.push((path, patch, WriteMode::Update));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn single(path: DocPath, patch: Patch, mode: WriteMode) -> Self {
        Self {
            writes: vec![(path, patch, mode)],
        }
    }

    /// Check every path and field path before anything is written.
    pub(crate) fn validate(&self) -> Result<()> {
        for (path, patch, _) in &self.writes {
            path.validate()?;
            patch.validate()?;
        }
        Ok(())
    }
}
