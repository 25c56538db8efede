//! Metatag CLI
//!
//! Command-line interface for:
//! - Setting and querying key/value metadata and tags of files (`meta`)
//! - Turning a directory into a collection (`init`)
//!
//! Log verbosity is controlled with `METATAG_LOG` (e.g. `METATAG_LOG=debug`).

use anyhow::{bail, Context, Result};
use clap::{ArgAction, ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use metatag_spec::{OperationArgs, RawSpec};
use metatag_store::{
    init_collection, CollectionKind, FsAnnotator, FsBackend, Metadata, MetadataRequest,
};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

mod render;

#[derive(Parser)]
#[command(name = "metatag")]
#[command(author, version, about = "Metatag: key/value metadata and tags for files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set and query metadata of files in a collection.
    ///
    /// Without any operation flag the current metadata is reported.
    Meta(MetaArgs),

    /// Initialize a collection.
    Init {
        /// Directory to initialize (created if missing)
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Create a collection without component metadata support
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Args, Debug)]
struct MetaArgs {
    /// Files or directories to operate on (default: the collection root)
    paths: Vec<PathBuf>,

    /// Reference collection
    #[arg(short = 'd', long, default_value = ".")]
    dataset: PathBuf,

    /// Add values to KEY; a lone KEY adds a tag
    #[arg(short = 'a', long, num_args = 1.., action = ArgAction::Append, value_name = "KEY")]
    add: Vec<String>,

    /// Like --add, but only for keys without any value yet
    #[arg(short = 'i', long, num_args = 1.., action = ArgAction::Append, value_name = "KEY")]
    init: Vec<String>,

    /// Remove values from KEY; a lone KEY removes a tag
    #[arg(long, num_args = 1.., action = ArgAction::Append, value_name = "KEY")]
    remove: Vec<String>,

    /// Replace all values of KEY; a lone KEY replaces the tag list.
    /// To drop a key entirely use --purge; a lone --reset KEY does not do that
    #[arg(long, num_args = 1.., action = ArgAction::Append, value_name = "KEY")]
    reset: Vec<String>,

    /// Drop KEY with all its values
    #[arg(long, action = ArgAction::Append, value_name = "KEY")]
    purge: Vec<String>,

    /// Read operations from a JSON document
    /// (`{"add": ..., "init": ..., "remove": ..., "reset": ..., "purge": ...}`)
    #[arg(long, conflicts_with_all = ["add", "init", "remove", "reset", "purge"])]
    spec_file: Option<PathBuf>,

    /// Also operate on nested collections
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Maximum nesting depth with --recursive
    #[arg(short = 'R', long, value_name = "LEVELS", requires = "recursive")]
    recursion_limit: Option<usize>,

    /// Print one JSON outcome per line
    #[arg(long)]
    json: bool,

    #[arg(skip)]
    groups: FlagGroups,
}

/// Values of each class flag, one group per flag occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FlagGroups {
    reset: Vec<Vec<String>>,
    add: Vec<Vec<String>>,
    init: Vec<Vec<String>>,
    remove: Vec<Vec<String>>,
}

fn occurrences(matches: &ArgMatches, id: &str) -> Vec<Vec<String>> {
    matches
        .get_occurrences::<String>(id)
        .map(|occurrences| occurrences.map(|values| values.cloned().collect()).collect())
        .unwrap_or_default()
}

impl FlagGroups {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            reset: occurrences(matches, "reset"),
            add: occurrences(matches, "add"),
            init: occurrences(matches, "init"),
            remove: occurrences(matches, "remove"),
        }
    }
}

impl Cli {
    /// Parse arguments, keeping `--add KEY VAL...` occurrences apart.
    fn parse_grouped<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        if let (Commands::Meta(meta), Some(sub)) =
            (&mut cli.command, matches.subcommand_matches("meta"))
        {
            meta.groups = FlagGroups::from_matches(sub);
        }
        Ok(cli)
    }
}

impl MetaArgs {
    fn operation_args(&self) -> Result<OperationArgs> {
        if let Some(path) = &self.spec_file {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            return Ok(OperationArgs::from_json(&value)?);
        }
        tracing::debug!(
            add = ?self.add,
            init = ?self.init,
            remove = ?self.remove,
            reset = ?self.reset,
            "class flag values"
        );
        Ok(OperationArgs {
            reset: RawSpec::from_groups(self.groups.reset.clone())?,
            add: RawSpec::from_groups(self.groups.add.clone())?,
            init: RawSpec::from_groups(self.groups.init.clone())?,
            remove: RawSpec::from_groups(self.groups.remove.clone())?,
            purge: RawSpec::from_groups(self.purge.iter().map(|key| vec![key.clone()]))?,
        })
    }

    fn request(&self) -> Result<MetadataRequest> {
        let dataset = fs::canonicalize(&self.dataset)
            .with_context(|| format!("no such collection: {}", self.dataset.display()))?;
        let cwd = env::current_dir().context("cannot determine current directory")?;
        Ok(MetadataRequest {
            dataset,
            paths: self.paths.iter().map(|p| resolve(&cwd, p)).collect(),
            args: self.operation_args()?,
            recursive: self.recursive,
            recursion_limit: self.recursion_limit,
        })
    }
}

/// Absolute form of `path`; missing paths are kept so they can be reported.
fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| cwd.join(path))
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("METATAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse_grouped(env::args_os()).unwrap_or_else(|err| err.exit());

    match cli.command {
        Commands::Meta(args) => cmd_meta(&args),
        Commands::Init { dir, plain } => cmd_init(&dir, plain),
    }
}

fn cmd_meta(args: &MetaArgs) -> Result<()> {
    let request = args.request()?;
    let outcomes = Metadata::new(&FsAnnotator, &FsBackend)
        .run(&request)
        .context("metadata request failed")?;

    for outcome in &outcomes {
        if args.json {
            println!("{}", serde_json::to_string(outcome)?);
        } else {
            render::print_outcome(outcome);
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        bail!("{failed} of {} entities failed", outcomes.len());
    }
    Ok(())
}

fn cmd_init(dir: &Path, plain: bool) -> Result<()> {
    let kind = if plain {
        CollectionKind::Plain
    } else {
        CollectionKind::Annotated
    };
    init_collection(dir, kind)
        .with_context(|| format!("failed to initialize {}", dir.display()))?;
    println!(
        "{} {:?} collection at {}",
        "initialized".green().bold(),
        kind,
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metatag_spec::Entry;
    use tempfile::tempdir;

    fn meta(args: &[&str]) -> MetaArgs {
        let cli = Cli::parse_grouped(["metatag", "meta"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Meta(args) => args,
            Commands::Init { .. } => panic!("expected meta"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repeated_flags_become_entries() {
        let args = meta(&["-a", "status", "draft", "-a", "urgent", "--purge", "color", "f.txt"]);
        assert_eq!(args.paths, vec![PathBuf::from("f.txt")]);

        let ops = args.operation_args().unwrap();
        assert_eq!(
            ops.add,
            RawSpec::Entries(vec![
                Entry::KeyValues {
                    key: "status".into(),
                    values: vec!["draft".into()],
                },
                Entry::Tag("urgent".into()),
            ])
        );
        assert_eq!(ops.purge, RawSpec::Entries(vec![Entry::Tag("color".into())]));
        assert!(ops.init.is_empty());
    }

    #[test]
    fn reset_help_points_to_purge() {
        let cmd = Cli::command();
        let meta = cmd.find_subcommand("meta").unwrap();
        let reset = meta.get_arguments().find(|a| a.get_id() == "reset").unwrap();
        assert!(reset.get_help().unwrap().to_string().contains("--purge"));
    }

    #[test]
    fn spec_file_conflicts_with_class_flags() {
        let parsed = Cli::try_parse_from([
            "metatag", "meta", "--spec-file", "ops.json", "--add", "urgent",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn spec_file_is_parsed_as_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ops.json");
        fs::write(&path, r#"{"add": {"color": "red", "urgent": null}, "purge": ["size"]}"#)
            .unwrap();

        let args = meta(&["--spec-file", path.to_str().unwrap()]);
        let ops = args.operation_args().unwrap();
        assert!(matches!(ops.add, RawSpec::Mapping(ref entries) if entries.len() == 2));
        assert!(!ops.purge.is_empty());
    }

    #[test]
    fn missing_paths_resolve_against_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(resolve(cwd, Path::new("no/such/file")), PathBuf::from("/work/no/such/file"));
    }
}
