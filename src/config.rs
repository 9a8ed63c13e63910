//! Configuration Management
//!
//! Label definitions, session settings, credential discovery and
//! definition file loading

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variables searched for an access token, in order
pub const TOKEN_ENV_VARS: &[&str] = &["GITHUB_ACCESS_TOKEN", "GITHUB_TOKEN"];

/// Name of the local credential file
pub const TOKEN_FILE_NAME: &str = ".token";

/// Definition file extensions accepted when reading a directory
pub const DEFINITION_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Label Definition
///
/// Represents a declared GitHub label, as read from a definitions file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelDefinition {
    /// Label name
    pub name: String,

    /// Label color (6-digit hex code, optional # prefix)
    pub color: String,

    /// Label description
    ///
    /// `None` leaves the description unset on GitHub, which is distinct
    /// from `Some("")`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of an existing label to rename into `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,

    /// Alternative spelling of `old_name`; `old_name` wins if both are set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_name: Option<String>,
}

impl LabelDefinition {
    /// Create a new label definition
    ///
    /// # Arguments
    /// - `name`: Label name
    /// - `color`: Label color (6-digit hex code, optional # prefix)
    ///
    /// # Errors
    /// Returns an error if the name is empty or the color format is invalid
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Result<Self> {
        let label = Self {
            name: name.into(),
            color: color.into(),
            description: None,
            old_name: None,
            current_name: None,
        };

        label.validate()?;
        Ok(label)
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the name of the existing label to rename
    pub fn renaming(mut self, old_name: impl Into<String>) -> Self {
        self.old_name = Some(old_name.into());
        self
    }

    /// Validate label definition
    ///
    /// # Errors
    /// - If the name is empty
    /// - If the color is not 6 hex digits (after stripping an optional #)
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::label_validation("Label name cannot be empty"));
        }

        if !is_valid_hex_color(strip_hash(&self.color)) {
            return Err(Error::InvalidLabelColor(self.color.clone()));
        }

        Ok(())
    }

    /// Color as sent to GitHub (no # prefix)
    pub fn normalized_color(&self) -> &str {
        strip_hash(&self.color)
    }

    /// Name of the existing label this definition targets
    ///
    /// `old_name`, else `current_name`, else `name` itself.
    pub fn resolved_old_name(&self) -> &str {
        self.old_name
            .as_deref()
            .or(self.current_name.as_deref())
            .unwrap_or(&self.name)
    }

    /// Whether this definition renames an existing label
    pub fn is_rename(&self) -> bool {
        self.resolved_old_name() != self.name
    }
}

/// Strip a single leading `#` from a color
pub fn strip_hash(color: &str) -> &str {
    color.strip_prefix('#').unwrap_or(color)
}

/// Prefix a color with `#` unless it already has one
pub fn add_hash(color: &str) -> String {
    format!("#{}", strip_hash(color))
}

/// Either one definition or a list of them, as allowed in definition files
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefinitionSet {
    Many(Vec<LabelDefinition>),
    One(LabelDefinition),
}

impl From<DefinitionSet> for Vec<LabelDefinition> {
    fn from(set: DefinitionSet) -> Self {
        match set {
            DefinitionSet::Many(labels) => labels,
            DefinitionSet::One(label) => vec![label],
        }
    }
}

/// Session Configuration
///
/// Everything needed to open a session against one repository
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// GitHub access token
    pub access_token: String,

    /// Repository owner (user or organization login)
    pub owner: String,

    /// Repository name
    pub repository: String,

    /// GitHub API base URL (public GitHub if None)
    pub api_base: Option<String>,

    /// Emit progress at info level instead of debug
    pub verbose: bool,
}

impl SessionConfig {
    /// Create a session configuration for public GitHub
    pub fn new(
        access_token: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            owner: owner.into(),
            repository: repository.into(),
            api_base: None,
            verbose: false,
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    /// - If access token is empty
    /// - If owner or repository name is empty
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(Error::config_validation("Access token is required"));
        }

        if self.owner.trim().is_empty() {
            return Err(Error::config_validation("Repository owner is required"));
        }

        if self.repository.trim().is_empty() || self.repository.contains('/') {
            return Err(Error::config_validation(format!(
                "Invalid repository name: '{}'",
                self.repository
            )));
        }

        Ok(())
    }

    /// "owner/repo" form used in messages
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repository)
    }
}

/// A source an access token may come from
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialProvider {
    /// Value given on the command line
    Explicit(Option<String>),

    /// Environment variable
    Env(String),

    /// First line of a file
    File(PathBuf),
}

impl CredentialProvider {
    /// Fetch a non-empty token from this provider
    pub fn fetch(&self) -> Option<String> {
        let raw = match self {
            CredentialProvider::Explicit(token) => token.clone(),
            CredentialProvider::Env(name) => std::env::var(name).ok(),
            CredentialProvider::File(path) => std::fs::read_to_string(path)
                .ok()
                .and_then(|content| content.lines().next().map(str::to_string)),
        }?;

        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    fn describe(&self) -> String {
        match self {
            CredentialProvider::Explicit(_) => "--token".to_string(),
            CredentialProvider::Env(name) => format!("{name} env var"),
            CredentialProvider::File(path) => path.display().to_string(),
        }
    }
}

/// Credential providers in precedence order
///
/// Explicit flag, then [`TOKEN_ENV_VARS`], then a [`TOKEN_FILE_NAME`] file in
/// the working directory and next to the executable.
pub fn default_credential_providers(explicit: Option<String>) -> Vec<CredentialProvider> {
    let mut providers = vec![CredentialProvider::Explicit(explicit)];
    providers.extend(
        TOKEN_ENV_VARS
            .iter()
            .map(|name| CredentialProvider::Env(name.to_string())),
    );
    providers.push(CredentialProvider::File(PathBuf::from(TOKEN_FILE_NAME)));

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        providers.push(CredentialProvider::File(dir.join(TOKEN_FILE_NAME)));
    }

    providers
}

/// Resolve an access token from the first provider that yields one
///
/// # Errors
/// Returns a configuration error if no provider yields a token
pub fn resolve_access_token(providers: &[CredentialProvider]) -> Result<String> {
    if let Some(token) = providers.iter().find_map(CredentialProvider::fetch) {
        return Ok(token);
    }

    let searched: Vec<String> = providers.iter().map(CredentialProvider::describe).collect();
    Err(Error::config_validation(format!(
        "GitHub access token is required. Searched: {}",
        searched.join(", ")
    )))
}

/// Parse label definitions from a content string, detecting format by path extension
///
/// The content may hold a single definition or an array of them.
///
/// # Errors
/// If parsing or validation fails, if the content holds no definitions,
/// or if the extension is unsupported
pub fn parse_definitions_from_content(content: &str, path: &Path) -> Result<Vec<LabelDefinition>> {
    let set: DefinitionSet = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)?,
        _ => {
            return Err(Error::config_validation(format!(
                "Definition file must be .json, .yaml, or .yml: {}",
                path.display()
            )));
        }
    };

    let labels: Vec<LabelDefinition> = set.into();
    if labels.is_empty() {
        return Err(Error::config_validation(format!(
            "No label definitions in {}",
            path.display()
        )));
    }

    for label in &labels {
        label.validate()?;
    }

    Ok(labels)
}

/// Load label definitions from a file
///
/// # Errors
/// If file reading, parsing, or validation fails
pub fn load_definitions_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<LabelDefinition>> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Definition file not found: {}", path.display()),
        )
        .into());
    }

    let content = std::fs::read_to_string(path)?;
    parse_definitions_from_content(&content, path)
}

/// Resolve the definition files a make source refers to
///
/// A file resolves to itself. A directory resolves to the definition files
/// directly inside it, sorted by file name.
///
/// # Errors
/// If the path is neither a file nor a directory, or the directory cannot be read
pub fn resolve_definition_files<P: AsRef<Path>>(source: P) -> Result<Vec<PathBuf>> {
    let source = source.as_ref();

    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }

    if !source.is_dir() {
        return Err(Error::config_validation(format!(
            "Definitions source is neither a file nor a directory: {}",
            source.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let path = entry?.path();
        let is_definition = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| DEFINITION_EXTENSIONS.contains(&ext));
        if path.is_file() && is_definition {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Check that a dump target is a JSON file path
///
/// # Errors
/// Returns a configuration error unless the path ends in `.json`
pub fn validate_dump_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(()),
        _ => Err(Error::config_validation(format!(
            "Dump file must be a .json file: {}",
            path.display()
        ))),
    }
}

/// Validate hex color code
///
/// # Arguments
/// - `color`: Color code (6-digit hex without #)
fn is_valid_hex_color(color: &str) -> bool {
    color.len() == 6 && color.chars().all(|c| c.is_ascii_hexdigit())
}
