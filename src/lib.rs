//! # gh-label-maker
//!
//! Make, update, clear and dump GitHub repository labels from JSON definitions
//!
//! ## Features
//! - Create or update labels from definition files, renaming by old name
//! - Clear every label of a repository
//! - Dump current labels to a JSON file
//! - Repositories owned by the authenticated user or one of their organizations

/// Log a progress event at info level when verbose, debug otherwise
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod error;
pub mod github;
pub mod sync;

pub use config::{LabelDefinition, SessionConfig};
pub use error::{Error, Result};
pub use github::{GitHubClient, LabelService, RemoteLabel};
pub use sync::LabelSyncer;

/// Create or update a repository's labels from definitions
///
/// Opens a session, then runs [`LabelSyncer::make_labels`].
///
/// # Examples
///
/// ```rust,no_run
/// use gh_label_maker::{LabelDefinition, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> gh_label_maker::Result<()> {
///     let config = SessionConfig::new("your_github_token", "owner", "repo");
///     let labels = vec![LabelDefinition::new("bug", "#fc2929")?];
///
///     let result = gh_label_maker::make_repository_labels(&config, &labels, true).await?;
///
///     println!("Created {}, updated {}", result.created, result.updated);
///     Ok(())
/// }
/// ```
pub async fn make_repository_labels(
    config: &SessionConfig,
    labels: &[LabelDefinition],
    append: bool,
) -> Result<sync::SyncResult> {
    let client = GitHubClient::connect(config).await?;
    let syncer = LabelSyncer::new(client, config.verbose);
    syncer.make_labels(labels, append).await
}
