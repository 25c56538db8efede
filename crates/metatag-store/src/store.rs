//! Store contracts.
//!
//! Paths handed to a [`MetadataStore`] are relative to the collection root;
//! the empty path addresses the whole collection.

use crate::StoreError;
use metatag_spec::MetadataOps;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-entity metadata: key → distinct values in insertion order.
pub type MetadataRecord = BTreeMap<String, Vec<String>>;

/// Store response for one entity of a `set` batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOutcome {
    pub success: bool,
    /// Path relative to the collection root.
    pub file: PathBuf,
}

/// What a collection can hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Supports per-component metadata.
    #[default]
    Annotated,
    /// Plain collection without component metadata.
    Plain,
}

impl CollectionKind {
    pub fn supports_metadata(self) -> bool {
        matches!(self, CollectionKind::Annotated)
    }
}

/// Multi-valued key/value store of one collection.
pub trait MetadataStore: Send + Sync {
    /// Apply `ops` to every entity addressed by `paths` as one batch.
    ///
    /// Unknown entities are reported with `success: false`; an `Err` means
    /// nothing of the batch was applied.
    fn set(
        &self,
        paths: &[PathBuf],
        ops: &MetadataOps,
        recursive: bool,
    ) -> Result<Vec<SetOutcome>, StoreError>;

    /// Current metadata of every file addressed by `paths`.
    fn get(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, MetadataRecord)>, StoreError>;
}

/// Opens the store of a collection.
pub trait StoreBackend: Send + Sync {
    /// `Ok(None)` when the collection kind has no component metadata.
    fn open(&self, collection: &Path) -> Result<Option<Box<dyn MetadataStore>>, StoreError>;
}
