//! Filesystem collections.
//!
//! A collection is a directory holding a `.metatag/` control directory:
//!
//! ```text
//! dataset/
//!   .metatag/
//!     config.json      {"kind": "annotated" | "plain"}
//!     metadata.json    {"sub/file.txt": {"tag": ["urgent"]}}
//!   sub/file.txt
//!   nested/            another collection (has its own .metatag/)
//! ```
//!
//! Files of a collection are the regular files below it, excluding the
//! control directory and nested collections.

use crate::annotate::{annotate_paths, DiscoveryRequest, EntityDescriptor, EntityKind, EntityState};
use crate::annotate::{Hierarchy, PathAnnotator};
use crate::store::{CollectionKind, MetadataRecord, MetadataStore, SetOutcome, StoreBackend};
use crate::table::RecordTable;
use crate::StoreError;
use metatag_spec::MetadataOps;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the per-collection control directory.
pub const CONTROL_DIR: &str = ".metatag";
const CONFIG_FILE: &str = "config.json";
const METADATA_FILE: &str = "metadata.json";

pub fn is_collection(dir: &Path) -> bool {
    dir.join(CONTROL_DIR).is_dir()
}

// ============================================================================
// Collection Configuration
// ============================================================================

/// Contents of `.metatag/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub kind: CollectionKind,
}

impl CollectionConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONTROL_DIR).join(CONFIG_FILE)
    }

    /// `Ok(None)` when `root` is not a collection. A control directory
    /// without a config file is an annotated collection.
    pub fn load(root: &Path) -> Result<Option<Self>, StoreError> {
        if !is_collection(root) {
            return Ok(None);
        }
        let path = Self::path(root);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Some(Self::default())),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| StoreError::InvalidConfig {
                path,
                message: err.to_string(),
            })
    }

    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(root.join(CONTROL_DIR))?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(root), json)?;
        Ok(())
    }
}

/// Turn `root` into a collection of the given kind.
pub fn init_collection(root: &Path, kind: CollectionKind) -> Result<CollectionConfig, StoreError> {
    fs::create_dir_all(root)?;
    let config = CollectionConfig { kind };
    config.save(root)?;
    tracing::debug!(root = %root.display(), ?kind, "initialized collection");
    Ok(config)
}

fn collection_files(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        entry.file_name() != CONTROL_DIR && !is_collection(entry.path())
    });
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    Ok(files)
}

// ============================================================================
// JSON File Store
// ============================================================================

/// Metadata store persisted in `.metatag/metadata.json`.
pub struct JsonFileStore {
    root: PathBuf,
    table: RwLock<RecordTable>,
}

impl JsonFileStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let mut table = RecordTable::new();
        for file in collection_files(root)? {
            table.insert_file(&file);
        }

        let metadata_path = root.join(CONTROL_DIR).join(METADATA_FILE);
        if metadata_path.exists() {
            let text = fs::read_to_string(&metadata_path)?;
            let stored: BTreeMap<String, MetadataRecord> = serde_json::from_str(&text)?;
            for (name, record) in stored {
                let path = PathBuf::from(&name);
                if table.record(&path).is_some() {
                    table.insert_record(&path, record);
                } else {
                    tracing::debug!(file = %name, "dropping metadata of vanished file");
                }
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            table: RwLock::new(table),
        })
    }

    fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
        let dir = self.root.join(CONTROL_DIR);
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(&table.non_empty_records())?;
        let tmp = dir.join(format!("{METADATA_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, dir.join(METADATA_FILE))?;
        Ok(())
    }
}

impl MetadataStore for JsonFileStore {
    fn set(
        &self,
        paths: &[PathBuf],
        ops: &MetadataOps,
        recursive: bool,
    ) -> Result<Vec<SetOutcome>, StoreError> {
        let mut table = self.table.write();
        let mut next = table.clone();
        let outcomes = next.apply(paths, ops, recursive);
        if outcomes.iter().any(|o| o.success) {
            self.persist(&next)?;
        }
        *table = next;
        Ok(outcomes)
    }

    fn get(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, MetadataRecord)>, StoreError> {
        Ok(self.table.read().query(paths))
    }
}

// ============================================================================
// Backend + Annotator
// ============================================================================

/// Opens [`JsonFileStore`]s for on-disk collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackend;

impl StoreBackend for FsBackend {
    fn open(&self, collection: &Path) -> Result<Option<Box<dyn MetadataStore>>, StoreError> {
        match CollectionConfig::load(collection)? {
            None => Err(StoreError::UnknownCollection(collection.to_path_buf())),
            Some(config) if !config.kind.supports_metadata() => Ok(None),
            Some(_) => Ok(Some(Box::new(JsonFileStore::open(collection)?))),
        }
    }
}

/// Annotates paths by looking at the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAnnotator;

impl Hierarchy for FsAnnotator {
    fn collection_of(&self, path: &Path) -> Result<Option<PathBuf>, StoreError> {
        Ok(path
            .ancestors()
            .find(|dir| is_collection(dir))
            .map(Path::to_path_buf))
    }

    fn kind_of(&self, path: &Path) -> Result<Option<EntityKind>, StoreError> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if meta.is_file() {
            return Ok(Some(EntityKind::File));
        }
        if is_collection(path) {
            return Ok(Some(EntityKind::Collection));
        }
        Ok(Some(EntityKind::Directory))
    }

    fn subcollections(
        &self,
        collection: &Path,
    ) -> Result<Vec<(PathBuf, usize, EntityState)>, StoreError> {
        let walker = WalkDir::new(collection)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| entry.file_type().is_dir() && entry.file_name() != CONTROL_DIR);
        let mut out = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !is_collection(entry.path()) {
                continue;
            }
            let depth = entry
                .path()
                .ancestors()
                .take_while(|dir| *dir != collection)
                .filter(|dir| is_collection(dir))
                .count();
            out.push((entry.path().to_path_buf(), depth, EntityState::Present));
        }
        Ok(out)
    }
}

impl PathAnnotator for FsAnnotator {
    fn annotate(&self, request: &DiscoveryRequest) -> Result<Vec<EntityDescriptor>, StoreError> {
        annotate_paths(self, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::entry_name;
    use metatag_spec::SpecValue;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn files_skip_control_dir_and_nested_collections() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        init_collection(root, CollectionKind::Annotated).unwrap();
        init_collection(&root.join("nested"), CollectionKind::Annotated).unwrap();
        touch(&root.join("a.txt"));
        touch(&root.join("sub/b.txt"));
        touch(&root.join("nested/c.txt"));

        let mut files: Vec<String> = collection_files(root)
            .unwrap()
            .iter()
            .map(|p| entry_name(p))
            .collect();
        files.sort();
        assert_eq!(files, vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn config_defaults_and_plain_collections() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        assert_eq!(CollectionConfig::load(root).unwrap(), None);

        fs::create_dir_all(root.join(CONTROL_DIR)).unwrap();
        assert_eq!(
            CollectionConfig::load(root).unwrap(),
            Some(CollectionConfig::default())
        );

        init_collection(root, CollectionKind::Plain).unwrap();
        assert!(FsBackend.open(root).unwrap().is_none());

        fs::write(CollectionConfig::path(root), "{not json").unwrap();
        assert!(matches!(
            CollectionConfig::load(root),
            Err(StoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn metadata_survives_reopen() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        init_collection(root, CollectionKind::Annotated).unwrap();
        touch(&root.join("a.txt"));

        let mut ops = MetadataOps::default();
        ops.add.insert("tag".into(), SpecValue::List(vec!["urgent".into()]));
        let store = JsonFileStore::open(root).unwrap();
        let outcomes = store.set(&[PathBuf::from("a.txt")], &ops, true).unwrap();
        assert!(outcomes[0].success);

        let reopened = JsonFileStore::open(root).unwrap();
        let rows = reopened.get(&[PathBuf::new()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1["tag"], vec!["urgent".to_string()]);
    }

    #[test]
    fn annotator_classifies_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        init_collection(root, CollectionKind::Annotated).unwrap();
        init_collection(&root.join("one"), CollectionKind::Annotated).unwrap();
        init_collection(&root.join("one/two"), CollectionKind::Plain).unwrap();
        touch(&root.join("f.txt"));

        let a = FsAnnotator;
        assert_eq!(a.kind_of(&root.join("f.txt")).unwrap(), Some(EntityKind::File));
        assert_eq!(a.kind_of(&root.join("one")).unwrap(), Some(EntityKind::Collection));
        assert_eq!(a.kind_of(&root.join("nope")).unwrap(), None);
        assert_eq!(
            a.collection_of(&root.join("one/two/x")).unwrap(),
            Some(root.join("one/two"))
        );

        let mut subs = a.subcollections(root).unwrap();
        subs.sort();
        assert_eq!(
            subs,
            vec![
                (root.join("one"), 1, EntityState::Present),
                (root.join("one/two"), 2, EntityState::Present),
            ]
        );
    }
}
