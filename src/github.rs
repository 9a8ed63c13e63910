//! GitHub API Client
//!
//! Session establishment and the label repository adapter

use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{add_hash, LabelDefinition, SessionConfig};
use crate::error::{Error, Result};

/// Page size used for listing endpoints
const PER_PAGE: u8 = 100;

/// Encode a string for use in URL path segments (RFC 3986 with UTF-8 support)
///
/// Only unreserved characters (A-Z, a-z, 0-9, -, ., _, ~) are left unencoded.
fn encode_path_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            // RFC 3986 unreserved characters
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => c.to_string(),
            // Everything else gets percent-encoded as UTF-8 bytes
            _ => c
                .to_string()
                .bytes()
                .map(|b| format!("%{:02X}", b))
                .collect::<String>(),
        })
        .collect()
}

/// Remote Label
///
/// A label as held by GitHub, normalized for local use: the color carries a
/// `#` prefix and an unset description is `None`. Serializes in dump order
/// (name, color, description if set).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteLabel {
    /// Label name
    pub name: String,

    /// Label color (`#` + 6-digit hexadecimal)
    pub color: String,

    /// Label description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<RemoteLabel> for LabelDefinition {
    fn from(label: RemoteLabel) -> Self {
        LabelDefinition {
            name: label.name,
            color: label.color,
            description: label.description,
            old_name: None,
            current_name: None,
        }
    }
}

/// Label as returned by the GitHub API
#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
    color: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<WireLabel> for RemoteLabel {
    fn from(label: WireLabel) -> Self {
        RemoteLabel {
            name: label.name,
            color: add_hash(&label.color),
            description: label.description,
        }
    }
}

/// Request body for creating a label
#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Request body for editing a label
#[derive(Debug, Serialize)]
struct UpdateLabelRequest<'a> {
    new_name: &'a str,
    color: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl<'a> CreateLabelRequest<'a> {
    fn new(label: &'a LabelDefinition) -> Self {
        Self {
            name: &label.name,
            color: label.normalized_color(),
            description: label.description.as_deref(),
        }
    }
}

impl<'a> UpdateLabelRequest<'a> {
    fn new(label: &'a LabelDefinition) -> Self {
        Self {
            new_name: &label.name,
            color: label.normalized_color(),
            description: label.description.as_deref(),
        }
    }
}

/// A user or organization login
#[derive(Debug, Deserialize)]
struct Account {
    login: String,
}

/// The parts of a repository the session needs
#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    name: String,
    owner: Account,
}

#[derive(Debug, Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

/// Fetch every page of a listing endpoint, stopping at the first empty page
async fn get_all_pages<T: DeserializeOwned>(octocrab: &Octocrab, route: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let params = PageParams {
            per_page: PER_PAGE,
            page,
        };
        let batch: Vec<T> = octocrab.get(route, Some(&params)).await?;

        if batch.is_empty() {
            break;
        }

        items.extend(batch);
        page += 1;
    }

    Ok(items)
}

/// Label Service
///
/// Find/create/edit/delete/list operations on one repository's labels.
/// "Not found" is a negative result for lookups, never an error.
#[allow(async_fn_in_trait)]
pub trait LabelService {
    /// Look up a label by exact name
    async fn find_label(&self, name: &str) -> Result<Option<RemoteLabel>>;

    /// Create a label from a definition
    async fn create_label(&self, label: &LabelDefinition) -> Result<RemoteLabel>;

    /// Rename, recolor and redescribe the label named `old_name`
    ///
    /// Returns `None` if no such label exists. Never creates a label.
    async fn edit_label(
        &self,
        old_name: &str,
        label: &LabelDefinition,
    ) -> Result<Option<RemoteLabel>>;

    /// Delete a label, returning whether it existed
    async fn delete_label(&self, name: &str) -> Result<bool>;

    /// List every label in GitHub's order
    async fn list_labels(&self) -> Result<Vec<RemoteLabel>>;

    /// Delete every label
    ///
    /// Not transactional: a failure partway leaves the remaining labels.
    async fn clear_all(&self) -> Result<()> {
        for label in self.list_labels().await? {
            self.delete_label(&label.name).await?;
        }
        Ok(())
    }
}

/// GitHub API Client
///
/// An authenticated session bound to a single repository
pub struct GitHubClient {
    octocrab: Octocrab,
    owner: String,
    repo: String,
    verbose: bool,
}

impl GitHubClient {
    /// Authenticate and resolve the target repository
    ///
    /// If `config.owner` is one of the authenticated user's organizations the
    /// repository is resolved under that organization, otherwise under the
    /// authenticated user.
    ///
    /// # Errors
    /// - `AuthenticationFailed` if the token does not resolve to a user
    /// - `RepositoryNotFound` if the repository does not resolve
    /// - `GitHubApi` for any other API failure
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Octocrab::builder().personal_token(config.access_token.clone());
        if let Some(base) = &config.api_base {
            builder = builder.base_uri(base.as_str())?;
        }
        let octocrab = builder.build()?;

        let user: Account = octocrab
            .get("/user", None::<&()>)
            .await
            .map_err(|_| Error::AuthenticationFailed)?;
        progress!(config.verbose, login = %user.login, "authorized to GitHub");

        match get_rate_limit(&octocrab).await {
            Ok(rate) => progress!(
                config.verbose,
                limit = rate.limit,
                remaining = rate.remaining,
                reset_at = %rate.reset_at,
                "rate limit"
            ),
            Err(e) => warn!(error = %e, "could not read rate limit"),
        }

        let orgs: Vec<Account> = get_all_pages(&octocrab, "/user/orgs").await?;
        let owner = match orgs
            .into_iter()
            .find(|org| org.login.eq_ignore_ascii_case(&config.owner))
        {
            Some(org) => org.login,
            None => {
                if !user.login.eq_ignore_ascii_case(&config.owner) {
                    warn!(
                        owner = %config.owner,
                        login = %user.login,
                        "owner is not one of your organizations, using authenticated user"
                    );
                }
                user.login
            }
        };

        let route = format!("/repos/{owner}/{}", encode_path_segment(&config.repository));
        let repository: RepositoryInfo = match octocrab.get(route, None::<&()>).await {
            Ok(repository) => repository,
            Err(e) => {
                let err = Error::GitHubApi(e);
                return Err(if err.is_not_found() {
                    Error::RepositoryNotFound(format!("{owner}/{}", config.repository))
                } else {
                    err
                });
            }
        };
        let full_name = format!("{}/{}", repository.owner.login, repository.name);
        progress!(config.verbose, repository = %full_name, "connected to repository");

        Ok(Self {
            octocrab,
            owner: repository.owner.login,
            repo: repository.name,
            verbose: config.verbose,
        })
    }

    /// Resolved repository owner
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Resolved repository name
    pub fn repository(&self) -> &str {
        &self.repo
    }

    fn labels_route(&self) -> String {
        format!("/repos/{}/{}/labels", self.owner, self.repo)
    }

    fn label_route(&self, name: &str) -> String {
        format!("{}/{}", self.labels_route(), encode_path_segment(name))
    }
}

impl LabelService for GitHubClient {
    async fn find_label(&self, name: &str) -> Result<Option<RemoteLabel>> {
        // An empty segment would address the listing endpoint
        if name.is_empty() {
            progress!(self.verbose, "label '' not found");
            return Ok(None);
        }

        let result: std::result::Result<WireLabel, _> =
            self.octocrab.get(self.label_route(name), None::<&()>).await;

        match result.map_err(Error::GitHubApi) {
            Ok(label) => Ok(Some(label.into())),
            Err(e) if e.is_not_found() => {
                progress!(self.verbose, label = %name, "label not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_label(&self, label: &LabelDefinition) -> Result<RemoteLabel> {
        progress!(self.verbose, label = %label.name, "adding label");

        let created: WireLabel = self
            .octocrab
            .post(self.labels_route(), Some(&CreateLabelRequest::new(label)))
            .await?;

        Ok(created.into())
    }

    async fn edit_label(
        &self,
        old_name: &str,
        label: &LabelDefinition,
    ) -> Result<Option<RemoteLabel>> {
        let result: std::result::Result<WireLabel, _> = self
            .octocrab
            .patch(self.label_route(old_name), Some(&UpdateLabelRequest::new(label)))
            .await;

        match result.map_err(Error::GitHubApi) {
            Ok(edited) => {
                progress!(self.verbose, from = %old_name, to = %label.name, "edited label");
                Ok(Some(edited.into()))
            }
            Err(e) if e.is_not_found() => {
                progress!(self.verbose, label = %old_name, "label not found to edit");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_label(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }

        // The raw delete does not map error statuses, so map them here
        let response = self
            .octocrab
            ._delete(self.label_route(name), None::<&()>)
            .await?;

        match octocrab::map_github_error(response)
            .await
            .map_err(Error::GitHubApi)
        {
            Ok(_) => {
                progress!(self.verbose, label = %name, "deleted label");
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                progress!(self.verbose, label = %name, "label not found to delete");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_labels(&self) -> Result<Vec<RemoteLabel>> {
        let labels: Vec<WireLabel> = get_all_pages(&self.octocrab, &self.labels_route()).await?;
        Ok(labels.into_iter().map(RemoteLabel::from).collect())
    }
}

/// Rate Limit Information
///
/// Represents GitHub API rate limit status
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    /// Hourly limit
    pub limit: u32,

    /// Remaining usage count
    pub remaining: u32,

    /// Reset time
    pub reset_at: chrono::DateTime<chrono::Utc>,
}

async fn get_rate_limit(octocrab: &Octocrab) -> Result<RateLimitInfo> {
    let rate_limit = octocrab.ratelimit().get().await?;

    Ok(RateLimitInfo {
        limit: rate_limit.resources.core.limit as u32,
        remaining: rate_limit.resources.core.remaining as u32,
        reset_at: chrono::DateTime::from_timestamp(rate_limit.resources.core.reset as i64, 0)
            .unwrap_or_else(chrono::Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("bug"), "bug");
        assert_eq!(encode_path_segment("feature-request"), "feature-request");
        assert_eq!(
            encode_path_segment("good first issue"),
            "good%20first%20issue"
        );
        assert_eq!(encode_path_segment("バグ"), "%E3%83%90%E3%82%B0");
        assert_eq!(
            encode_path_segment("test-label_v1.2~alpha"),
            "test-label_v1.2~alpha"
        );
        assert_eq!(encode_path_segment("test/label"), "test%2Flabel");
        assert_eq!(encode_path_segment(""), "");
    }

    #[test]
    fn test_wire_label_normalization() {
        let wire: WireLabel =
            serde_json::from_str(r#"{"id":1,"name":"bug","color":"fc2929","description":null}"#)
                .unwrap();
        let label = RemoteLabel::from(wire);
        assert_eq!(label.color, "#fc2929");
        assert_eq!(label.description, None);

        let wire: WireLabel =
            serde_json::from_str(r#"{"name":"bug","color":"fc2929","description":""}"#).unwrap();
        assert_eq!(RemoteLabel::from(wire).description.as_deref(), Some(""));
    }

    #[test]
    fn test_remote_label_serialization_order() {
        let label = RemoteLabel {
            name: "bug".to_string(),
            color: "#fc2929".to_string(),
            description: None,
        };
        assert_eq!(
            serde_json::to_string(&label).unwrap(),
            r##"{"name":"bug","color":"#fc2929"}"##
        );

        let label = RemoteLabel {
            description: Some("Confirmed defect".to_string()),
            ..label
        };
        assert_eq!(
            serde_json::to_string(&label).unwrap(),
            r##"{"name":"bug","color":"#fc2929","description":"Confirmed defect"}"##
        );
    }

    #[test]
    fn test_request_bodies_strip_hash_and_omit_unset_description() {
        let label = LabelDefinition::new("bug", "#fc2929").unwrap();
        assert_eq!(
            serde_json::to_value(CreateLabelRequest::new(&label)).unwrap(),
            serde_json::json!({"name": "bug", "color": "fc2929"})
        );

        let label = label.with_description("");
        assert_eq!(
            serde_json::to_value(UpdateLabelRequest::new(&label)).unwrap(),
            serde_json::json!({"new_name": "bug", "color": "fc2929", "description": ""})
        );
    }

    #[test]
    fn test_remote_label_to_definition() {
        let label = RemoteLabel {
            name: "bug".to_string(),
            color: "#fc2929".to_string(),
            description: Some("Something isn't working".to_string()),
        };

        let definition: LabelDefinition = label.into();
        assert!(definition.validate().is_ok());
        assert_eq!(definition.normalized_color(), "fc2929");
        assert!(!definition.is_rename());
    }
}
