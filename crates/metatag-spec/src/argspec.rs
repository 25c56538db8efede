//! Metadata argument specifications.
//!
//! A caller may describe one operation class in several shapes:
//!
//! - a mapping `{"key": value, "tagname": null}`; entries without a value are
//!   bare tags named by their key,
//! - a list of entries `[["tagname"], ["key", "v1", "v2"], "tagname"]`, which
//!   is what repeated `--add KEY [VAL...]` flags produce,
//! - nothing at all.
//!
//! The loose input is parsed exactly once into [`RawSpec`]; [`normalize`]
//! then only ever sees the closed union.

use crate::key::validate_key;
use crate::SpecError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Canonical values
// ============================================================================

/// A metadata value as supplied by the caller: one string or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Scalar(String),
    List(Vec<String>),
}

impl SpecValue {
    pub fn values(&self) -> &[String] {
        match self {
            SpecValue::Scalar(value) => std::slice::from_ref(value),
            SpecValue::List(values) => values,
        }
    }

    pub fn into_values(self) -> Vec<String> {
        match self {
            SpecValue::Scalar(value) => vec![value],
            SpecValue::List(values) => values,
        }
    }
}

/// Validated key → value(s) for one operation class.
pub type Mapping = BTreeMap<String, SpecValue>;

/// Output of [`normalize`]: bare tags in input order plus the key mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSpec {
    pub tags: Vec<String>,
    pub mapping: Mapping,
}

// ============================================================================
// Raw argument union
// ============================================================================

/// Value side of a mapping-form entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// The key is a bare tag.
    NoValue,
    Scalar(String),
    List(Vec<String>),
}

/// One element of a list-form argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Tag(String),
    KeyValues { key: String, values: Vec<String> },
}

impl Entry {
    /// `[tag]` is a tag, `[key, v1, ...]` a key with values.
    pub fn from_sequence(mut items: Vec<String>) -> Result<Self, SpecError> {
        match items.len() {
            0 => Err(SpecError::InvalidSpecification("something weird".to_string())),
            1 => Ok(Entry::Tag(items.remove(0))),
            _ => {
                let key = items.remove(0);
                Ok(Entry::KeyValues { key, values: items })
            }
        }
    }
}

/// A parsed, not yet validated, argument for one operation class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawSpec {
    #[default]
    Empty,
    /// Mapping form, in input order.
    Mapping(Vec<(String, RawValue)>),
    Entries(Vec<Entry>),
}

impl RawSpec {
    /// Parse an optional JSON argument; `None` means no operation.
    pub fn from_optional_json(value: Option<&Value>) -> Result<Self, SpecError> {
        match value {
            Some(value) => Self::from_json(value),
            None => Ok(RawSpec::Empty),
        }
    }

    /// Parse a JSON argument. Falsy values (`null`, `""`, `0`, `false`,
    /// `[]`, `{}`) request nothing.
    pub fn from_json(value: &Value) -> Result<Self, SpecError> {
        if is_falsy(value) {
            return Ok(RawSpec::Empty);
        }
        match value {
            Value::Object(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (key, value) in map {
                    entries.push((key.clone(), raw_value_from_json(key, value)?));
                }
                Ok(RawSpec::Mapping(entries))
            }
            Value::Array(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    entries.push(entry_from_json(item)?);
                }
                Ok(RawSpec::Entries(entries))
            }
            _ => Err(SpecError::InvalidSpecification(
                "must be a dict or sequence".to_string(),
            )),
        }
    }

    /// Parse command line groups, one per flag occurrence
    /// (`--add KEY [VAL...]`).
    pub fn from_groups<I>(groups: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let entries = groups
            .into_iter()
            .map(Entry::from_sequence)
            .collect::<Result<Vec<_>, _>>()?;
        if entries.is_empty() {
            return Ok(RawSpec::Empty);
        }
        Ok(RawSpec::Entries(entries))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawSpec::Empty => true,
            RawSpec::Mapping(entries) => entries.is_empty(),
            RawSpec::Entries(entries) => entries.is_empty(),
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn raw_value_from_json(key: &str, value: &Value) -> Result<RawValue, SpecError> {
    if is_falsy(value) {
        return Ok(RawValue::NoValue);
    }
    if let Some(text) = scalar_text(value) {
        return Ok(RawValue::Scalar(text));
    }
    match value {
        Value::Array(items) => {
            let values = items
                .iter()
                .map(|item| {
                    scalar_text(item).ok_or_else(|| {
                        SpecError::InvalidSpecification(format!(
                            "values of \"{key}\" must be strings"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RawValue::List(values))
        }
        _ => Err(SpecError::InvalidSpecification(format!(
            "unsupported value for \"{key}\""
        ))),
    }
}

fn entry_from_json(item: &Value) -> Result<Entry, SpecError> {
    if let Some(text) = scalar_text(item) {
        return Ok(Entry::Tag(text));
    }
    match item {
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|v| {
                    scalar_text(v).ok_or_else(|| {
                        SpecError::InvalidSpecification(
                            "entries must only contain strings".to_string(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Entry::from_sequence(items)
        }
        _ => Err(SpecError::InvalidSpecification(
            "entry must be a string or sequence".to_string(),
        )),
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Split a raw argument into bare tags and a validated key mapping.
///
/// Bare tags coming from a mapping are carried verbatim; only keys that end
/// up in the mapping are validated. A key given an empty list of values is a
/// bare tag named by the key, so the mapping never holds an empty list.
pub fn normalize(spec: &RawSpec) -> Result<NormalizedSpec, SpecError> {
    let mut out = NormalizedSpec::default();
    match spec {
        RawSpec::Empty => {}
        RawSpec::Mapping(entries) => {
            for (key, value) in entries {
                match value {
                    RawValue::NoValue => out.tags.push(key.clone()),
                    RawValue::List(vs) if vs.is_empty() => out.tags.push(key.clone()),
                    RawValue::Scalar(v) => {
                        out.mapping.insert(validate_key(key)?, SpecValue::Scalar(v.clone()));
                    }
                    RawValue::List(vs) => {
                        out.mapping.insert(validate_key(key)?, SpecValue::List(vs.clone()));
                    }
                }
            }
        }
        RawSpec::Entries(entries) => {
            for entry in entries {
                match entry {
                    Entry::Tag(tag) => out.tags.push(tag.clone()),
                    Entry::KeyValues { key, values } if values.is_empty() => {
                        out.tags.push(key.clone())
                    }
                    Entry::KeyValues { key, values } => {
                        out.mapping.insert(validate_key(key)?, SpecValue::List(values.clone()));
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(value: Value) -> Result<NormalizedSpec, SpecError> {
        normalize(&RawSpec::from_json(&value)?)
    }

    fn list(values: &[&str]) -> SpecValue {
        SpecValue::List(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn nothing_normalizes_to_nothing() {
        let empty = NormalizedSpec::default();
        assert_eq!(normalize(&RawSpec::from_optional_json(None).unwrap()).unwrap(), empty);
        assert_eq!(norm(json!(null)).unwrap(), empty);
        assert_eq!(norm(json!([])).unwrap(), empty);
        assert_eq!(norm(json!({})).unwrap(), empty);
        assert_eq!(norm(json!("")).unwrap(), empty);
    }

    #[test]
    fn mapping_with_falsy_value_is_a_tag_named_by_key() {
        let out = norm(json!({"color": "", "mood": "happy"})).unwrap();
        assert_eq!(out.tags, vec!["color".to_string()]);
        assert_eq!(out.mapping.len(), 1);
        assert_eq!(out.mapping["mood"], SpecValue::Scalar("happy".to_string()));

        let out = norm(json!({"a": null, "b": [], "c": 0, "d": false})).unwrap();
        assert_eq!(out.tags, vec!["a", "b", "c", "d"]);
        assert!(out.mapping.is_empty());
    }

    #[test]
    fn mapping_tags_are_not_key_validated() {
        let out = norm(json!({"Not A Key!": null, "Mood": ["ok", "fine"]})).unwrap();
        assert_eq!(out.tags, vec!["Not A Key!"]);
        assert_eq!(out.mapping["mood"], list(&["ok", "fine"]));
    }

    #[test]
    fn list_of_lists_splits_tags_and_keys() {
        let out = norm(json!([["urgent"], ["color", "red", "blue"]])).unwrap();
        assert_eq!(out.tags, vec!["urgent"]);
        assert_eq!(out.mapping.len(), 1);
        assert_eq!(out.mapping["color"], list(&["red", "blue"]));
    }

    #[test]
    fn bare_scalars_in_a_list_are_tags() {
        let out = norm(json!(["draft", ["Owner", "me"], "final"])).unwrap();
        assert_eq!(out.tags, vec!["draft", "final"]);
        assert_eq!(out.mapping["owner"], list(&["me"]));
    }

    #[test]
    fn empty_inner_sequence_is_rejected() {
        let err = RawSpec::from_json(&json!([[]])).unwrap_err();
        assert!(matches!(err, SpecError::InvalidSpecification(ref m) if m == "something weird"));
    }

    #[test]
    fn non_container_is_rejected() {
        let err = RawSpec::from_json(&json!("tag")).unwrap_err();
        assert_eq!(
            err,
            SpecError::InvalidSpecification("must be a dict or sequence".to_string())
        );
        assert!(RawSpec::from_json(&json!(42)).is_err());
    }

    #[test]
    fn invalid_key_in_list_form_is_rejected() {
        let err = norm(json!([["co lor", "red"]])).unwrap_err();
        assert!(matches!(err, SpecError::InvalidKey { ref key, .. } if key == "co lor"));
    }

    #[test]
    fn empty_value_lists_become_tags_named_by_key() {
        let mapping = RawSpec::Mapping(vec![
            ("color".to_string(), RawValue::List(Vec::new())),
            ("mood".to_string(), RawValue::Scalar("happy".to_string())),
        ]);
        let out = normalize(&mapping).unwrap();
        assert_eq!(out.tags, vec!["color"]);
        assert!(!out.mapping.contains_key("color"));

        let entries = RawSpec::Entries(vec![Entry::KeyValues {
            key: "size".to_string(),
            values: Vec::new(),
        }]);
        let out = normalize(&entries).unwrap();
        assert_eq!(out.tags, vec!["size"]);
        assert!(out.mapping.is_empty());
    }

    #[test]
    fn later_duplicate_key_wins() {
        let out = norm(json!([["k", "a"], ["K", "b"]])).unwrap();
        assert_eq!(out.mapping["k"], list(&["b"]));
    }

    #[test]
    fn groups_parse_like_list_entries() {
        let spec = RawSpec::from_groups(vec![
            vec!["status".to_string(), "draft".to_string()],
            vec!["urgent".to_string()],
        ])
        .unwrap();
        let out = normalize(&spec).unwrap();
        assert_eq!(out.tags, vec!["urgent"]);
        assert_eq!(out.mapping["status"], list(&["draft"]));

        assert_eq!(RawSpec::from_groups(Vec::new()).unwrap(), RawSpec::Empty);
        assert!(RawSpec::from_groups(vec![Vec::new()]).is_err());
    }

    #[test]
    fn scalar_and_list_values_expose_their_strings() {
        assert_eq!(SpecValue::Scalar("x".into()).values(), ["x".to_string()]);
        assert_eq!(list(&["a", "b"]).into_values(), vec!["a", "b"]);
    }
}
