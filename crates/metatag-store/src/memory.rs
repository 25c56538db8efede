//! In-process collection hierarchy and metadata store.
//!
//! Collections are registered by absolute path; files belong to the
//! innermost registered collection above them. The backend is also its own
//! [`PathAnnotator`].

use crate::annotate::{annotate_paths, DiscoveryRequest, EntityDescriptor, EntityKind, EntityState};
use crate::annotate::{Hierarchy, PathAnnotator};
use crate::store::{CollectionKind, MetadataRecord, MetadataStore, SetOutcome, StoreBackend};
use crate::table::RecordTable;
use crate::StoreError;
use metatag_spec::MetadataOps;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryCollection {
    kind: CollectionKind,
    state: EntityState,
    table: RecordTable,
    unavailable: bool,
}

type Collections = Arc<RwLock<BTreeMap<PathBuf, MemoryCollection>>>;

/// Shared in-memory hierarchy; clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    collections: Collections,
}

fn innermost(collections: &BTreeMap<PathBuf, MemoryCollection>, path: &Path) -> Option<PathBuf> {
    collections
        .iter()
        .filter(|(root, c)| c.state == EntityState::Present && path.starts_with(root))
        .max_by_key(|(root, _)| root.components().count())
        .map(|(root, _)| root.clone())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&self, root: impl Into<PathBuf>, kind: CollectionKind) {
        self.collections.write().insert(
            root.into(),
            MemoryCollection {
                kind,
                ..Default::default()
            },
        );
    }

    /// Register a nested collection that is known but not available.
    pub fn add_absent_collection(&self, root: impl Into<PathBuf>) {
        self.collections.write().insert(
            root.into(),
            MemoryCollection {
                state: EntityState::Absent,
                ..Default::default()
            },
        );
    }

    /// Register a file (absolute path) in its innermost collection.
    pub fn add_file(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let mut collections = self.collections.write();
        let root = innermost(&collections, path)
            .ok_or_else(|| StoreError::UnknownCollection(path.to_path_buf()))?;
        let rel = path.strip_prefix(&root).unwrap_or(path).to_path_buf();
        if let Some(collection) = collections.get_mut(&root) {
            collection.table.insert_file(&rel);
        }
        Ok(())
    }

    /// Current record of a file (absolute path).
    pub fn record(&self, path: impl AsRef<Path>) -> Option<MetadataRecord> {
        let path = path.as_ref();
        let collections = self.collections.read();
        let root = innermost(&collections, path)?;
        let rel = path.strip_prefix(&root).ok()?;
        collections.get(&root)?.table.record(rel).cloned()
    }

    /// Make every store call of a collection fail as a whole.
    pub fn set_unavailable(&self, root: impl AsRef<Path>, unavailable: bool) {
        if let Some(collection) = self.collections.write().get_mut(root.as_ref()) {
            collection.unavailable = unavailable;
        }
    }
}

impl Hierarchy for MemoryBackend {
    fn collection_of(&self, path: &Path) -> Result<Option<PathBuf>, StoreError> {
        Ok(innermost(&self.collections.read(), path))
    }

    fn kind_of(&self, path: &Path) -> Result<Option<EntityKind>, StoreError> {
        let collections = self.collections.read();
        if let Some(collection) = collections.get(path) {
            if collection.state == EntityState::Present {
                return Ok(Some(EntityKind::Collection));
            }
        }
        let Some(root) = innermost(&collections, path) else {
            return Ok(None);
        };
        let rel = path.strip_prefix(&root).unwrap_or(path);
        let table = &collections[&root].table;
        if table.record(rel).is_some() {
            return Ok(Some(EntityKind::File));
        }
        let holds_collection = collections
            .keys()
            .any(|other| other != path && other.starts_with(path));
        if table.contains(rel) || holds_collection {
            return Ok(Some(EntityKind::Directory));
        }
        Ok(None)
    }

    fn subcollections(
        &self,
        collection: &Path,
    ) -> Result<Vec<(PathBuf, usize, EntityState)>, StoreError> {
        let collections = self.collections.read();
        let below: Vec<&PathBuf> = collections
            .keys()
            .filter(|root| root.as_path() != collection && root.starts_with(collection))
            .collect();
        Ok(below
            .iter()
            .map(|root| {
                let depth = below.iter().filter(|other| root.starts_with(other)).count();
                ((*root).clone(), depth, collections[*root].state)
            })
            .collect())
    }
}

impl PathAnnotator for MemoryBackend {
    fn annotate(&self, request: &DiscoveryRequest) -> Result<Vec<EntityDescriptor>, StoreError> {
        annotate_paths(self, request)
    }
}

impl StoreBackend for MemoryBackend {
    fn open(&self, collection: &Path) -> Result<Option<Box<dyn MetadataStore>>, StoreError> {
        let collections = self.collections.read();
        let entry = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_path_buf()))?;
        if !entry.kind.supports_metadata() {
            return Ok(None);
        }
        Ok(Some(Box::new(MemoryStore {
            collections: Arc::clone(&self.collections),
            root: collection.to_path_buf(),
        })))
    }
}

struct MemoryStore {
    collections: Collections,
    root: PathBuf,
}

impl MetadataStore for MemoryStore {
    fn set(
        &self,
        paths: &[PathBuf],
        ops: &MetadataOps,
        recursive: bool,
    ) -> Result<Vec<SetOutcome>, StoreError> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(&self.root)
            .ok_or_else(|| StoreError::UnknownCollection(self.root.clone()))?;
        if collection.unavailable {
            return Err(StoreError::Unavailable(self.root.display().to_string()));
        }
        Ok(collection.table.apply(paths, ops, recursive))
    }

    fn get(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, MetadataRecord)>, StoreError> {
        let collections = self.collections.read();
        let collection = collections
            .get(&self.root)
            .ok_or_else(|| StoreError::UnknownCollection(self.root.clone()))?;
        if collection.unavailable {
            return Err(StoreError::Unavailable(self.root.display().to_string()));
        }
        Ok(collection.table.query(paths))
    }
}
