//! Multi-valued key/value table shared by the reference stores.
//!
//! Mutation order for one entity is fixed: reset, add, init, remove, purge.

use crate::store::{MetadataRecord, SetOutcome};
use metatag_spec::{Mapping, MetadataOps};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

/// `/`-joined name of a collection-relative path; the root is `""`.
pub fn entry_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Known files of one collection and their records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    files: BTreeMap<String, MetadataRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; an existing record is kept.
    pub fn insert_file(&mut self, path: &Path) {
        self.files.entry(entry_name(path)).or_default();
    }

    /// Register a file with a known record.
    pub fn insert_record(&mut self, path: &Path, record: MetadataRecord) {
        self.files.insert(entry_name(path), record);
    }

    pub fn record(&self, path: &Path) -> Option<&MetadataRecord> {
        self.files.get(&entry_name(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files carrying at least one key, for persistence.
    pub fn non_empty_records(&self) -> BTreeMap<&str, &MetadataRecord> {
        self.files
            .iter()
            .filter(|(_, record)| !record.is_empty())
            .map(|(name, record)| (name.as_str(), record))
            .collect()
    }

    /// `true` if `path` is a known file or a directory above one.
    pub fn contains(&self, path: &Path) -> bool {
        !self.matching(&entry_name(path), true).is_empty()
    }

    fn matching(&self, target: &str, recursive: bool) -> Vec<String> {
        if self.files.contains_key(target) {
            return vec![target.to_string()];
        }
        if !recursive {
            return Vec::new();
        }
        let prefix = if target.is_empty() {
            String::new()
        } else {
            format!("{target}/")
        };
        self.files
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Apply `ops` to every file addressed by `paths`.
    ///
    /// Each file is mutated and reported at most once per batch.
    pub fn apply(
        &mut self,
        paths: &[PathBuf],
        ops: &MetadataOps,
        recursive: bool,
    ) -> Vec<SetOutcome> {
        let mut outcomes = Vec::new();
        let mut seen = BTreeSet::new();
        for path in paths {
            let targets = self.matching(&entry_name(path), recursive);
            if targets.is_empty() {
                outcomes.push(SetOutcome {
                    success: false,
                    file: path.clone(),
                });
                continue;
            }
            for name in targets {
                if !seen.insert(name.clone()) {
                    continue;
                }
                if let Some(record) = self.files.get_mut(&name) {
                    apply_ops(record, ops);
                }
                outcomes.push(SetOutcome {
                    success: true,
                    file: PathBuf::from(name),
                });
            }
        }
        outcomes
    }

    /// Records of every file addressed by `paths`, directories expanded.
    pub fn query(&self, paths: &[PathBuf]) -> Vec<(PathBuf, MetadataRecord)> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for path in paths {
            for name in self.matching(&entry_name(path), true) {
                if seen.insert(name.clone()) {
                    let record = self.files[&name].clone();
                    out.push((PathBuf::from(name), record));
                }
            }
        }
        out
    }
}

fn distinct_push(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

fn reset_entries(record: &mut MetadataRecord, mapping: &Mapping) {
    for (key, value) in mapping {
        let mut values = Vec::new();
        for v in value.values() {
            distinct_push(&mut values, v);
        }
        record.insert(key.clone(), values);
    }
}

/// Apply one operation set to one record.
pub fn apply_ops(record: &mut MetadataRecord, ops: &MetadataOps) {
    reset_entries(record, &ops.reset);

    for (key, value) in &ops.add {
        let values = record.entry(key.clone()).or_default();
        for v in value.values() {
            distinct_push(values, v);
        }
    }

    let absent: Mapping = ops
        .init
        .iter()
        .filter(|(key, _)| record.get(*key).map_or(true, |values| values.is_empty()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    reset_entries(record, &absent);

    for (key, value) in &ops.remove {
        if let Some(values) = record.get_mut(key) {
            values.retain(|v| !value.values().contains(v));
        }
    }

    for key in &ops.purge {
        record.remove(key);
    }

    record.retain(|_, values| !values.is_empty());
}
