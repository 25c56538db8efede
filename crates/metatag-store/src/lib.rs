//! Metatag stores and orchestration
//!
//! Applies canonical metadata operations to entities inside a hierarchy of
//! collections:
//!
//! ```text
//! ┌──────────────┐  descriptors   ┌────────────────────┐
//! │ PathAnnotator│───────────────►│                    │
//! └──────────────┘                │    Metadata::run   │   outcomes
//!                                 │  (one batch per    │──────────►
//! ┌──────────────┐  set / get     │   collection)      │
//! │ StoreBackend │◄──────────────►│                    │
//! └──────────────┘                └────────────────────┘
//!        │
//!        ├── MemoryBackend  (in-process, also annotates)
//!        └── FsBackend      (.metatag/metadata.json per collection)
//! ```
//!
//! ## Key Features
//!
//! - **Batched**: one `set` and one `get` call per collection
//! - **Authoritative reads**: reported metadata always comes from a query
//!   after the mutation, never from the mutation response
//! - **Per-entity failures**: a failing entity never aborts its siblings

pub mod annotate;
pub mod fs;
pub mod memory;
pub mod orchestrate;
pub mod store;
pub mod table;


pub use annotate::{
    annotate_paths, group_by_collection, DiscoveryRequest, EntityDescriptor, EntityKind,
    EntityState, Hierarchy, PathAnnotator,
};
pub use fs::{init_collection, CollectionConfig, FsAnnotator, FsBackend, JsonFileStore};
pub use memory::MemoryBackend;
pub use orchestrate::{Metadata, MetadataError, MetadataRequest, Outcome, OutcomeStatus};
pub use store::{CollectionKind, MetadataRecord, MetadataStore, SetOutcome, StoreBackend};
pub use table::RecordTable;

use std::path::PathBuf;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("unknown collection: {}", .0.display())]
    UnknownCollection(PathBuf),

    #[error("invalid collection config at {}: {message}", path.display())]
    InvalidConfig { path: PathBuf, message: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
