//! Terminal rendering of metadata outcomes.

use colored::Colorize;
use metatag_spec::TAG_KEY;
use metatag_store::{Outcome, OutcomeStatus};
use std::path::Path;

/// Outcome path relative to its reference collection.
fn display_path(outcome: &Outcome) -> String {
    let path: &Path = match &outcome.refds {
        Some(refds) => outcome.path.strip_prefix(refds).unwrap_or(&outcome.path),
        None => &outcome.path,
    };
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}

/// `path: key1,key2 [tag1,tag2]`; `-` when the entity has no metadata.
pub fn summary_line(outcome: &Outcome) -> String {
    let path = display_path(outcome);
    let Some(metadata) = &outcome.metadata else {
        return path;
    };

    let keys: Vec<&str> = metadata
        .keys()
        .filter(|key| key.as_str() != TAG_KEY)
        .map(String::as_str)
        .collect();
    let mut line = format!("{path}:");
    if !keys.is_empty() {
        line.push(' ');
        line.push_str(&keys.join(","));
    }
    match metadata.get(TAG_KEY) {
        Some(tags) => line.push_str(&format!(" [{}]", tags.join(","))),
        None if keys.is_empty() => line.push_str(" -"),
        None => {}
    }
    line
}

pub fn print_outcome(outcome: &Outcome) {
    match outcome.status {
        OutcomeStatus::Ok => println!("{}", summary_line(outcome)),
        OutcomeStatus::Error | OutcomeStatus::Impossible => {
            let label = if outcome.status == OutcomeStatus::Error {
                "error".red().bold()
            } else {
                "impossible".yellow().bold()
            };
            eprintln!(
                "{} {}: {}",
                label,
                display_path(outcome).bold(),
                outcome.message.as_deref().unwrap_or("unknown failure")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metatag_store::{EntityKind, MetadataRecord};
    use std::path::PathBuf;

    fn ok(path: &str, metadata: &[(&str, &[&str])]) -> Outcome {
        let record: MetadataRecord = metadata
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect();
        serde_json::from_value(serde_json::json!({
            "action": "metadata",
            "path": path,
            "type": "file",
            "status": "ok",
            "metadata": record,
            "refds": "/ds",
        }))
        .unwrap()
    }

    #[test]
    fn keys_then_tags() {
        let outcome = ok(
            "/ds/sub/a.txt",
            &[("tag", &["urgent", "final"]), ("status", &["draft"]), ("owner", &["me"])],
        );
        assert_eq!(outcome.kind, Some(EntityKind::File));
        assert_eq!(summary_line(&outcome), "sub/a.txt: owner,status [urgent,final]");
    }

    #[test]
    fn empty_metadata_renders_dash() {
        assert_eq!(summary_line(&ok("/ds/a.txt", &[])), "a.txt: -");
        assert_eq!(summary_line(&ok("/ds/a.txt", &[("k", &["v"])])), "a.txt: k");
    }

    #[test]
    fn paths_outside_refds_stay_absolute() {
        let mut outcome = ok("/other/a.txt", &[]);
        outcome.metadata = None;
        assert_eq!(summary_line(&outcome), PathBuf::from("/other/a.txt").display().to_string());
    }
}
