//! Metadata specification normalizer and tag merge engine
//!
//! Turns user-facing metadata arguments into the canonical operation set a
//! multi-valued key/value store understands:
//!
//! ```text
//!   raw argument (JSON / CLI groups)
//!            │  argspec::RawSpec::from_json / from_groups
//!            ▼
//!   RawSpec ── Empty | Mapping | Entries
//!            │  argspec::normalize        (keys validated, lower-cased)
//!            ▼
//!   NormalizedSpec { tags, mapping }
//!            │  reconcile::reconcile      (bare tags → mapping["tag"])
//!            ▼
//!   ops::MetadataOps { reset, add, init, remove, purge }
//! ```
//!
//! Everything in this crate is pure: no I/O, no shared state.

pub mod argspec;
pub mod key;
pub mod ops;
pub mod reconcile;

pub use argspec::{normalize, Entry, Mapping, NormalizedSpec, RawSpec, RawValue, SpecValue};
pub use key::{validate_key, KeyValidator, KEY_PATTERN};
pub use ops::{MetadataOps, OperationArgs, OperationClass};
pub use reconcile::{reconcile, TAG_KEY};

// ============================================================================
// Errors
// ============================================================================

/// Rejection of a metadata specification. Both variants are raised before
/// any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("invalid metadata specification, {0}")]
    InvalidSpecification(String),

    #[error("invalid metadata key \"{key}\", must match pattern {pattern}")]
    InvalidKey { key: String, pattern: &'static str },
}
