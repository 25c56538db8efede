//! Folding bare tags into the reserved `tag` key.

use crate::argspec::{Mapping, SpecValue};

/// Reserved multi-valued key that bare entries are shorthand for.
pub const TAG_KEY: &str = "tag";

/// Merge `tags` into `mapping[TAG_KEY]`.
///
/// Explicit `tag` values come first, bare tags after them. The key is only
/// written when the merged list is non-empty.
pub fn reconcile(tags: Vec<String>, mut mapping: Mapping) -> Mapping {
    let mut merged = mapping
        .remove(TAG_KEY)
        .map(SpecValue::into_values)
        .unwrap_or_default();
    merged.extend(tags);
    if !merged.is_empty() {
        mapping.insert(TAG_KEY.to_string(), SpecValue::List(merged));
    }
    mapping
}
