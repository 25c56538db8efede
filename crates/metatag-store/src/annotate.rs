//! Path annotation: turning requested paths into entity descriptors.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Directory,
    Collection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    #[default]
    Present,
    /// Known to the parent collection but not available locally.
    Absent,
}

/// One annotated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub path: PathBuf,
    /// `None` when the path does not exist.
    pub kind: Option<EntityKind>,
    /// Innermost collection containing the path (a collection contains itself).
    pub collection: Option<PathBuf>,
    pub state: EntityState,
    /// Set when annotation already decided the outcome (e.g. missing path).
    pub status: Option<crate::OutcomeStatus>,
    pub message: Option<String>,
    /// The caller asked for this path explicitly.
    pub raw_input: bool,
}

impl EntityDescriptor {
    pub fn new(path: PathBuf, kind: EntityKind, collection: PathBuf, raw_input: bool) -> Self {
        Self {
            path,
            kind: Some(kind),
            collection: Some(collection),
            state: EntityState::Present,
            status: None,
            message: None,
            raw_input,
        }
    }

    pub fn failed(path: PathBuf, kind: Option<EntityKind>, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            collection: None,
            state: EntityState::Present,
            status: Some(crate::OutcomeStatus::Error),
            message: Some(message.into()),
            raw_input: true,
        }
    }
}

/// What to annotate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Reference collection; relative paths resolve against it.
    pub root: PathBuf,
    /// Requested paths; empty means `root` itself.
    pub paths: Vec<PathBuf>,
    /// Descend into nested collections.
    pub recursive: bool,
    /// Maximum nesting depth when recursive (`None` = unlimited).
    pub recursion_limit: Option<usize>,
}

pub trait PathAnnotator: Send + Sync {
    fn annotate(&self, request: &DiscoveryRequest) -> Result<Vec<EntityDescriptor>, StoreError>;
}

/// Read-only view of a collection hierarchy.
pub trait Hierarchy {
    /// Innermost collection containing `path`.
    fn collection_of(&self, path: &Path) -> Result<Option<PathBuf>, StoreError>;

    /// Kind of an existing path, `None` if it does not exist.
    fn kind_of(&self, path: &Path) -> Result<Option<EntityKind>, StoreError>;

    /// Collections below `collection`, with their nesting depth relative to
    /// it (1 = direct child).
    fn subcollections(
        &self,
        collection: &Path,
    ) -> Result<Vec<(PathBuf, usize, EntityState)>, StoreError>;
}

/// Annotate the requested paths against a hierarchy.
pub fn annotate_paths<H: Hierarchy + ?Sized>(
    hierarchy: &H,
    request: &DiscoveryRequest,
) -> Result<Vec<EntityDescriptor>, StoreError> {
    let requested: Vec<PathBuf> = if request.paths.is_empty() {
        vec![request.root.clone()]
    } else {
        request
            .paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { request.root.join(p) })
            .collect()
    };

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for path in requested {
        if !seen.insert(path.clone()) {
            continue;
        }
        let Some(kind) = hierarchy.kind_of(&path)? else {
            out.push(EntityDescriptor::failed(path, None, "path does not exist"));
            continue;
        };
        let Some(collection) = hierarchy.collection_of(&path)? else {
            out.push(EntityDescriptor::failed(
                path,
                Some(kind),
                "path not associated with any collection",
            ));
            continue;
        };
        out.push(EntityDescriptor::new(
            path.clone(),
            kind,
            collection.clone(),
            true,
        ));

        if !request.recursive || kind == EntityKind::File {
            continue;
        }
        for (sub, depth, state) in hierarchy.subcollections(&collection)? {
            if !sub.starts_with(&path) || sub == path {
                continue;
            }
            if request.recursion_limit.is_some_and(|limit| depth > limit) {
                continue;
            }
            if !seen.insert(sub.clone()) {
                continue;
            }
            let mut descriptor =
                EntityDescriptor::new(sub.clone(), EntityKind::Collection, sub, false);
            descriptor.state = state;
            out.push(descriptor);
        }
    }
    Ok(out)
}

/// Group annotated paths by their containing collection.
///
/// Descriptors without a collection are left out.
pub fn group_by_collection(
    descriptors: Vec<EntityDescriptor>,
) -> BTreeMap<PathBuf, Vec<EntityDescriptor>> {
    let mut groups: BTreeMap<PathBuf, Vec<EntityDescriptor>> = BTreeMap::new();
    for descriptor in descriptors {
        if let Some(collection) = descriptor.collection.clone() {
            groups.entry(collection).or_default().push(descriptor);
        }
    }
    groups
}
