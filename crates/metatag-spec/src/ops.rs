//! The canonical operation set handed to a metadata store.

use crate::argspec::{normalize, Mapping, RawSpec};
use crate::key::validate_key;
use crate::reconcile::reconcile;
use crate::SpecError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Independent classes of metadata mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Replace a key's values.
    Reset,
    /// Append values.
    Add,
    /// Set values only where the key is absent.
    Init,
    /// Drop individual values.
    Remove,
}

impl OperationClass {
    pub const ALL: [OperationClass; 4] = [
        OperationClass::Remove,
        OperationClass::Reset,
        OperationClass::Add,
        OperationClass::Init,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationClass::Reset => "reset",
            OperationClass::Add => "add",
            OperationClass::Init => "init",
            OperationClass::Remove => "remove",
        }
    }
}

// ============================================================================
// Raw arguments
// ============================================================================

/// Raw, per-class arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationArgs {
    pub reset: RawSpec,
    pub add: RawSpec,
    pub init: RawSpec,
    pub remove: RawSpec,
    /// Keys whose entry is dropped entirely.
    pub purge: RawSpec,
}

impl OperationArgs {
    pub fn get(&self, class: OperationClass) -> &RawSpec {
        match class {
            OperationClass::Reset => &self.reset,
            OperationClass::Add => &self.add,
            OperationClass::Init => &self.init,
            OperationClass::Remove => &self.remove,
        }
    }

    fn slot(&mut self, class: OperationClass) -> &mut RawSpec {
        match class {
            OperationClass::Reset => &mut self.reset,
            OperationClass::Add => &mut self.add,
            OperationClass::Init => &mut self.init,
            OperationClass::Remove => &mut self.remove,
        }
    }

    /// Parse `{"add": ..., "init": ..., "remove": ..., "reset": ..., "purge": ...}`.
    ///
    /// Every field is optional and takes any shape [`RawSpec::from_json`]
    /// accepts.
    pub fn from_json(value: &Value) -> Result<Self, SpecError> {
        let Value::Object(fields) = value else {
            return Err(SpecError::InvalidSpecification(
                "operation document must be an object".to_string(),
            ));
        };
        let mut args = OperationArgs::default();
        for (name, field) in fields {
            let spec = RawSpec::from_json(field)?;
            match name.as_str() {
                "purge" => args.purge = spec,
                other => {
                    let class = OperationClass::ALL
                        .into_iter()
                        .find(|c| c.as_str() == other)
                        .ok_or_else(|| {
                            SpecError::InvalidSpecification(format!(
                                "unknown operation \"{other}\""
                            ))
                        })?;
                    *args.slot(class) = spec;
                }
            }
        }
        Ok(args)
    }

    pub fn is_empty(&self) -> bool {
        OperationClass::ALL
            .into_iter()
            .all(|class| self.get(class).is_empty())
            && self.purge.is_empty()
    }
}

// ============================================================================
// Canonical operations
// ============================================================================

/// Validated, tag-merged mappings for every class plus the purge list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOps {
    pub reset: Mapping,
    pub add: Mapping,
    pub init: Mapping,
    pub remove: Mapping,
    pub purge: Vec<String>,
}

impl MetadataOps {
    /// Normalize and reconcile every class.
    ///
    /// All classes are validated before anything is returned, so a bad key
    /// in one class never results in a partially built operation set.
    pub fn build(args: &OperationArgs) -> Result<Self, SpecError> {
        let mut ops = MetadataOps::default();
        for class in OperationClass::ALL {
            let normalized = normalize(args.get(class))?;
            *ops.mapping_mut(class) = reconcile(normalized.tags, normalized.mapping);
        }
        ops.purge = purge_keys(&args.purge)?;

        for class in OperationClass::ALL {
            tracing::debug!(
                class = class.as_str(),
                items = ?ops.mapping(class),
                "will apply metadata items"
            );
        }
        tracing::debug!(keys = ?ops.purge, "will purge metadata keys");
        Ok(ops)
    }

    pub fn mapping(&self, class: OperationClass) -> &Mapping {
        match class {
            OperationClass::Reset => &self.reset,
            OperationClass::Add => &self.add,
            OperationClass::Init => &self.init,
            OperationClass::Remove => &self.remove,
        }
    }

    fn mapping_mut(&mut self, class: OperationClass) -> &mut Mapping {
        match class {
            OperationClass::Reset => &mut self.reset,
            OperationClass::Add => &mut self.add,
            OperationClass::Init => &mut self.init,
            OperationClass::Remove => &mut self.remove,
        }
    }

    /// `true` when applying these operations cannot change anything.
    pub fn is_empty(&self) -> bool {
        OperationClass::ALL
            .into_iter()
            .all(|class| self.mapping(class).is_empty())
            && self.purge.is_empty()
    }
}

/// Every entry of a purge argument names a key; values are ignored.
fn purge_keys(spec: &RawSpec) -> Result<Vec<String>, SpecError> {
    let normalized = normalize(spec)?;
    let mut keys: Vec<String> = Vec::new();
    let named = normalized
        .tags
        .iter()
        .map(|tag| validate_key(tag))
        .chain(normalized.mapping.into_keys().map(Ok));
    for key in named {
        let key = key?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argspec::SpecValue;
    use serde_json::json;

    fn args(value: Value) -> OperationArgs {
        OperationArgs::from_json(&value).unwrap()
    }

    fn list(values: &[&str]) -> SpecValue {
        SpecValue::List(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn empty_invocation_builds_empty_ops() {
        let ops = MetadataOps::build(&OperationArgs::default()).unwrap();
        assert!(ops.is_empty());
        assert!(OperationArgs::default().is_empty());
    }

    #[test]
    fn tags_stay_within_their_class() {
        let ops = MetadataOps::build(&args(json!({
            "remove": ["gone"],
            "add": [["fresh"], ["status", "draft"]],
            "init": {"seed": null},
            "reset": [["tag", "only"]],
        })))
        .unwrap();

        assert_eq!(ops.remove["tag"], list(&["gone"]));
        assert_eq!(ops.add["tag"], list(&["fresh"]));
        assert_eq!(ops.add["status"], list(&["draft"]));
        assert_eq!(ops.init["tag"], list(&["seed"]));
        assert_eq!(ops.reset["tag"], list(&["only"]));

        for class in [OperationClass::Add, OperationClass::Init, OperationClass::Reset] {
            let tags = ops.mapping(class)[crate::TAG_KEY].values();
            assert!(!tags.contains(&"gone".to_string()), "{class:?} leaked remove tag");
        }
    }

    #[test]
    fn explicit_and_bare_remove_tags_merge() {
        let ops = MetadataOps::build(&args(json!({
            "remove": [["tag", "a"], "b"],
        })))
        .unwrap();
        assert_eq!(ops.remove["tag"], list(&["a", "b"]));
        assert!(ops.add.is_empty());
    }

    #[test]
    fn invalid_key_in_any_class_fails_the_whole_build() {
        let err = MetadataOps::build(&args(json!({
            "add": [["ok", "1"]],
            "init": [["bad key", "2"]],
        })))
        .unwrap_err();
        assert!(matches!(err, SpecError::InvalidKey { .. }));
    }

    #[test]
    fn purge_collects_validated_unique_keys() {
        let ops = MetadataOps::build(&args(json!({
            "purge": ["Color", ["size"], ["color", "ignored"]],
        })))
        .unwrap();
        assert_eq!(ops.purge, vec!["color", "size"]);
        assert!(!ops.is_empty());

        let err = MetadataOps::build(&args(json!({"purge": ["not valid"]}))).unwrap_err();
        assert!(matches!(err, SpecError::InvalidKey { .. }));
    }

    #[test]
    fn reset_with_empty_value_list_never_clears_the_key() {
        let ops = MetadataOps::build(&OperationArgs {
            reset: RawSpec::Entries(vec![crate::Entry::KeyValues {
                key: "size".to_string(),
                values: Vec::new(),
            }]),
            ..Default::default()
        })
        .unwrap();
        assert!(!ops.reset.contains_key("size"));
        assert_eq!(ops.reset["tag"], list(&["size"]));
    }

    #[test]
    fn operation_document_rejects_unknown_fields_and_non_objects() {
        assert!(OperationArgs::from_json(&json!({"append": ["x"]})).is_err());
        assert!(OperationArgs::from_json(&json!(["x"])).is_err());
    }
}
