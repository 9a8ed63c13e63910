//! gh-label-maker CLI
//!
//! Command line tool for making, clearing and dumping GitHub repository labels

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser};
use colored::Colorize;

use gh_label_maker::{
    config::{
        default_credential_providers, load_definitions_from_file, resolve_access_token,
        resolve_definition_files, validate_dump_path,
    },
    sync::{SyncOperation, SyncResult},
    GitHubClient, LabelDefinition, LabelSyncer, SessionConfig,
};

/// gh-label-maker CLI
#[derive(Parser, Debug)]
#[command(
    name = "gh-label-maker",
    version,
    about = "Make GitHub labels from JSON definitions, clear them, or dump them to a file",
    long_about = "Make GitHub labels from definitions in a JSON file or a directory of files, \
    clear all labels of a repository, or dump its current labels to a JSON file. \
    The access token is read from --token, GITHUB_ACCESS_TOKEN, GITHUB_TOKEN, or a .token file."
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["clear_labels", "dump_labels_to", "make_labels_from"])
))]
struct Cli {
    /// GitHub repository owner (user or organization)
    #[arg(short = 'o', long)]
    owner: String,

    /// GitHub repository name
    #[arg(short = 'r', long)]
    repository: String,

    /// GitHub personal access token
    #[arg(short = 't', long)]
    token: Option<String>,

    /// GitHub API base URL (for GitHub Enterprise)
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,

    /// Delete all labels
    #[arg(short = 'c', long)]
    clear_labels: bool,

    /// Dump existing labels to the given JSON file
    #[arg(short = 'd', long, value_name = "FILE")]
    dump_labels_to: Option<PathBuf>,

    /// Make labels from definitions in a JSON file or a directory of files
    #[arg(short = 'm', long, value_name = "PATH")]
    make_labels_from: Option<PathBuf>,

    /// Keep existing labels instead of clearing them before making
    #[arg(
        short = 'a',
        long,
        requires = "make_labels_from",
        conflicts_with_all = ["clear_labels", "dump_labels_to"]
    )]
    append: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// The single action a run performs
#[derive(Debug, PartialEq)]
enum Action {
    Clear,
    Dump(PathBuf),
    Make { source: PathBuf, append: bool },
}

impl Cli {
    fn action(&self) -> Action {
        if let Some(path) = &self.dump_labels_to {
            Action::Dump(path.clone())
        } else if let Some(source) = &self.make_labels_from {
            Action::Make {
                source: source.clone(),
                append: self.append,
            }
        } else {
            Action::Clear
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let access_token = resolve_access_token(&default_credential_providers(cli.token.clone()))?;
    let config = SessionConfig {
        access_token,
        owner: cli.owner.clone(),
        repository: cli.repository.clone(),
        api_base: cli.api_url.clone(),
        verbose: cli.verbose,
    };

    // Local preconditions are checked before touching the repository
    let action = cli.action();
    let definitions = match &action {
        Action::Make { source, .. } => Some(load_definitions(source, cli.verbose)?),
        Action::Dump(path) => {
            validate_dump_path(path)?;
            None
        }
        Action::Clear => None,
    };

    if cli.verbose {
        println!(
            "{} Connecting to repository: {}",
            "•".blue(),
            config.full_name().cyan()
        );
    }

    let client = GitHubClient::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.full_name()))?;
    let syncer = LabelSyncer::new(client, cli.verbose);

    match action {
        Action::Clear => {
            syncer
                .clear_labels()
                .await
                .context("Failed to clear labels")?;
            println!("{} All labels deleted", "✓".green());
        }
        Action::Dump(path) => {
            let count = syncer
                .dump_labels(&path)
                .await
                .with_context(|| format!("Failed to dump labels to {}", path.display()))?;
            if count == 0 {
                println!("{} No labels found, nothing to dump", "!".yellow());
            } else {
                println!(
                    "{} {} labels dumped to: {}",
                    "✓".green(),
                    count,
                    path.display().to_string().cyan()
                );
            }
        }
        Action::Make { append, .. } => {
            let definitions = definitions.unwrap_or_default();
            let result = syncer
                .make_labels(&definitions, append)
                .await
                .context("Failed to make labels")?;
            display_make_result(&result, cli.verbose);
        }
    }

    Ok(())
}

/// Install the stderr log subscriber, honouring RUST_LOG
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load definitions from every file a make source resolves to, in order
fn load_definitions(source: &Path, verbose: bool) -> anyhow::Result<Vec<LabelDefinition>> {
    let files = resolve_definition_files(source)?;
    if files.is_empty() {
        anyhow::bail!("No definition files found in {}", source.display());
    }

    let mut definitions = Vec::new();
    for file in files {
        if verbose {
            println!(
                "{} Reading labels from: {}",
                "•".blue(),
                file.display().to_string().cyan()
            );
        }
        let labels = load_definitions_from_file(&file)
            .with_context(|| format!("Failed to load definitions from {}", file.display()))?;
        definitions.extend(labels);
    }

    Ok(definitions)
}

/// Display make results
fn display_make_result(result: &SyncResult, verbose: bool) {
    if result.has_changes() {
        println!("\n{} Labels made:", "✓".green());
    } else {
        println!("\n{} No labels to make", "✓".green());
    }

    println!("  Created: {}", result.created.to_string().green());
    println!("  Updated: {}", result.updated.to_string().yellow());
    println!("  Renamed: {}", result.renamed.to_string().blue());

    if verbose {
        println!("\nDetailed operations:");
        for (i, operation) in result.operations.iter().enumerate() {
            let prefix = format!("  {}.", i + 1);
            match operation {
                SyncOperation::Create { label } => {
                    println!(
                        "{} Create label: {} ({})",
                        prefix,
                        label.name.cyan(),
                        label.color
                    );
                }
                SyncOperation::Update {
                    current_name,
                    label,
                } if operation.is_rename() => {
                    println!(
                        "{} Rename label: {} -> {} ({})",
                        prefix,
                        current_name.cyan(),
                        label.name.cyan(),
                        label.color
                    );
                }
                SyncOperation::Update { label, .. } => {
                    println!(
                        "{} Update label: {} ({})",
                        prefix,
                        label.name.cyan(),
                        label.color
                    );
                }
            }
        }
    }
}
