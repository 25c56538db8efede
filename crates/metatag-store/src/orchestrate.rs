//! Setting and querying metadata across a collection hierarchy.
//!
//! Validation of every operation class happens before the first store call;
//! after that, failures are reported per entity and never abort sibling
//! entities or other collections.

use crate::annotate::{
    group_by_collection, DiscoveryRequest, EntityDescriptor, EntityKind, EntityState,
    PathAnnotator,
};
use crate::store::{MetadataRecord, MetadataStore, StoreBackend};
use crate::StoreError;
use metatag_spec::{MetadataOps, OperationArgs, SpecError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `action` field of every outcome.
pub const ACTION: &str = "metadata";

// ============================================================================
// Request / Outcome
// ============================================================================

/// One invocation: which paths, and what to do to them.
#[derive(Debug, Clone, Default)]
pub struct MetadataRequest {
    /// Reference collection; relative paths resolve against it.
    pub dataset: PathBuf,
    /// Empty means the reference collection itself.
    pub paths: Vec<PathBuf>,
    pub args: OperationArgs,
    pub recursive: bool,
    pub recursion_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Error,
    Impossible,
}

/// Result record for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub action: String,
    pub path: PathBuf,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refds: Option<PathBuf>,
}

impl Outcome {
    fn new(path: PathBuf, kind: Option<EntityKind>, status: OutcomeStatus, refds: &Path) -> Self {
        Self {
            action: ACTION.to_string(),
            path,
            kind,
            status,
            message: None,
            metadata: None,
            refds: Some(refds.to_path_buf()),
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("path annotation failed: {0}")]
    Annotation(#[source] StoreError),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs metadata requests against an annotator and a store backend.
pub struct Metadata<'a> {
    annotator: &'a dyn PathAnnotator,
    backend: &'a dyn StoreBackend,
}

fn absolute(collection: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        collection.to_path_buf()
    } else {
        collection.join(rel)
    }
}

impl<'a> Metadata<'a> {
    pub fn new(annotator: &'a dyn PathAnnotator, backend: &'a dyn StoreBackend) -> Self {
        Self { annotator, backend }
    }

    pub fn run(&self, request: &MetadataRequest) -> Result<Vec<Outcome>, MetadataError> {
        let ops = MetadataOps::build(&request.args)?;
        let refds = request.dataset.as_path();

        let descriptors = self
            .annotator
            .annotate(&DiscoveryRequest {
                root: request.dataset.clone(),
                paths: request.paths.clone(),
                recursive: request.recursive,
                recursion_limit: request.recursion_limit,
            })
            .map_err(MetadataError::Annotation)?;

        let mut outcomes = Vec::new();
        let mut to_process = Vec::new();
        for descriptor in descriptors {
            if let Some(status) = descriptor.status {
                let mut outcome = Outcome::new(descriptor.path, descriptor.kind, status, refds);
                outcome.message = descriptor.message;
                outcomes.push(outcome);
                continue;
            }
            if descriptor.kind == Some(EntityKind::Collection)
                && descriptor.state == EntityState::Absent
            {
                tracing::debug!(path = %descriptor.path.display(), "skipping absent collection");
                continue;
            }
            to_process.push(descriptor);
        }

        for (collection, content) in group_by_collection(to_process) {
            let content: Vec<EntityDescriptor> = content
                .into_iter()
                .filter(|d| d.kind != Some(EntityKind::Collection) || d.path == collection)
                .collect();
            self.process_collection(&collection, &content, &ops, refds, &mut outcomes);
        }
        Ok(outcomes)
    }

    fn process_collection(
        &self,
        collection: &Path,
        content: &[EntityDescriptor],
        ops: &MetadataOps,
        refds: &Path,
        outcomes: &mut Vec<Outcome>,
    ) {
        tracing::debug!(
            collection = %collection.display(),
            entities = content.len(),
            "processing collection"
        );
        let store = match self.backend.open(collection) {
            Ok(Some(store)) => store,
            Ok(None) => {
                tracing::warn!(
                    collection = %collection.display(),
                    "collection has no component metadata support"
                );
                for d in content.iter().filter(|d| d.raw_input) {
                    outcomes.push(
                        Outcome::new(d.path.clone(), d.kind, OutcomeStatus::Impossible, refds)
                            .with_message(format!(
                                "collection {} has no component metadata support",
                                collection.display()
                            )),
                    );
                }
                return;
            }
            Err(err) => {
                tracing::warn!(
                    collection = %collection.display(),
                    error = %err,
                    "cannot open store"
                );
                for d in content {
                    outcomes.push(
                        Outcome::new(d.path.clone(), d.kind, OutcomeStatus::Error, refds)
                            .with_message(format!("cannot open metadata store: {err}")),
                    );
                }
                return;
            }
        };

        let mut paths: Vec<PathBuf> = content
            .iter()
            .map(|d| {
                d.path
                    .strip_prefix(collection)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| d.path.clone())
            })
            .collect();

        if !ops.is_empty() {
            match self.apply(store.as_ref(), collection, content, &paths, ops, refds, outcomes) {
                Some(modified) => paths = modified,
                None => return,
            }
        }
        if paths.is_empty() {
            return;
        }

        // Reported metadata always comes from the store, never from `set`.
        match store.get(&paths) {
            Ok(rows) => {
                for (file, metadata) in rows {
                    let mut outcome = Outcome::new(
                        absolute(collection, &file),
                        Some(EntityKind::File),
                        OutcomeStatus::Ok,
                        refds,
                    );
                    outcome.metadata = Some(metadata);
                    outcomes.push(outcome);
                }
            }
            Err(err) => {
                tracing::warn!(
                    collection = %collection.display(),
                    error = %err,
                    "querying metadata failed"
                );
                for rel in &paths {
                    outcomes.push(
                        Outcome::new(absolute(collection, rel), None, OutcomeStatus::Error, refds)
                            .with_message(format!("querying metadata failed: {err}")),
                    );
                }
            }
        }
    }

    /// Run the mutation batch; returns the successfully modified paths, or
    /// `None` when the whole batch failed.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        store: &dyn MetadataStore,
        collection: &Path,
        content: &[EntityDescriptor],
        paths: &[PathBuf],
        ops: &MetadataOps,
        refds: &Path,
        outcomes: &mut Vec<Outcome>,
    ) -> Option<Vec<PathBuf>> {
        let responses = match store.set(paths, ops, true) {
            Ok(responses) => responses,
            Err(err) => {
                tracing::warn!(
                    collection = %collection.display(),
                    error = %err,
                    "setting metadata failed"
                );
                for d in content {
                    outcomes.push(
                        Outcome::new(d.path.clone(), d.kind, OutcomeStatus::Error, refds)
                            .with_message(format!("setting metadata failed: {err}")),
                    );
                }
                return None;
            }
        };

        let mut modified = Vec::new();
        for response in responses {
            if response.success {
                modified.push(response.file);
                continue;
            }
            let path = absolute(collection, &response.file);
            tracing::warn!(path = %path.display(), "setting metadata failed");
            let kind = content.iter().find(|d| d.path == path).and_then(|d| d.kind);
            outcomes.push(
                Outcome::new(path, kind, OutcomeStatus::Error, refds)
                    .with_message("setting metadata failed"),
            );
        }
        Some(modified)
    }
}
