//! Label Synchronization Functionality
//!
//! Clear, make/update and dump operations composed over a [`LabelService`]

use std::path::Path;

use crate::config::{validate_dump_path, LabelDefinition};
use crate::error::Result;
use crate::github::{LabelService, RemoteLabel};

/// Label operation applied during a make run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    /// A label was created
    Create { label: RemoteLabel },

    /// An existing label was edited in place (renamed if the names differ)
    Update {
        current_name: String,
        label: RemoteLabel,
    },
}

impl SyncOperation {
    /// Whether this operation renamed a label
    pub fn is_rename(&self) -> bool {
        matches!(self, SyncOperation::Update { current_name, label } if *current_name != label.name)
    }
}

/// Synchronization result
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Applied operations, in definition order
    pub operations: Vec<SyncOperation>,

    /// Number of labels created
    pub created: u32,

    /// Number of labels updated (renames included)
    pub updated: u32,

    /// Number of updates that renamed a label
    pub renamed: u32,
}

impl SyncResult {
    /// Add an operation and update statistics
    pub fn add_operation(&mut self, operation: SyncOperation) {
        match &operation {
            SyncOperation::Create { .. } => self.created += 1,
            SyncOperation::Update { .. } => {
                self.updated += 1;
                if operation.is_rename() {
                    self.renamed += 1;
                }
            }
        }
        self.operations.push(operation);
    }

    /// Whether any label was touched
    pub fn has_changes(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Get total number of operations
    pub fn total_operations(&self) -> u32 {
        self.created + self.updated
    }
}

/// Label Synchronization Engine
///
/// Drives one repository's labels towards a set of definitions. Every
/// remote call completes before the next one starts.
pub struct LabelSyncer<S> {
    service: S,
    verbose: bool,
}

impl<S: LabelService> LabelSyncer<S> {
    /// Create a new label synchronization engine
    pub fn new(service: S, verbose: bool) -> Self {
        Self { service, verbose }
    }

    /// The underlying label service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Delete every label in the repository
    ///
    /// # Errors
    /// Returns the first API error; labels deleted before it stay deleted
    pub async fn clear_labels(&self) -> Result<()> {
        progress!(self.verbose, "deleting all labels");
        self.service.clear_all().await
    }

    /// Create or update labels from definitions
    ///
    /// Unless `append` is set, all existing labels are deleted first. Each
    /// definition then edits the label named by its resolved old name (or,
    /// failing that, by its own name) and is created if neither exists.
    ///
    /// Definitions are validated before any change is made. Processing is
    /// fail-fast: the first API error aborts the remaining definitions.
    ///
    /// # Errors
    /// Returns a validation error or the first API error
    pub async fn make_labels(
        &self,
        definitions: &[LabelDefinition],
        append: bool,
    ) -> Result<SyncResult> {
        for definition in definitions {
            definition.validate()?;
        }

        if !append {
            self.clear_labels().await?;
        }

        let mut result = SyncResult::default();
        for definition in definitions {
            let operation = self.apply_definition(definition).await?;
            result.add_operation(operation);
        }

        Ok(result)
    }

    /// Edit the label a definition targets, creating it if absent
    async fn apply_definition(&self, definition: &LabelDefinition) -> Result<SyncOperation> {
        let old_name = definition.resolved_old_name();

        if let Some(label) = self.service.edit_label(old_name, definition).await? {
            return Ok(SyncOperation::Update {
                current_name: old_name.to_string(),
                label,
            });
        }

        // A rename applied by an earlier run leaves only the new name behind
        if definition.is_rename() {
            if let Some(label) = self.service.edit_label(&definition.name, definition).await? {
                return Ok(SyncOperation::Update {
                    current_name: definition.name.clone(),
                    label,
                });
            }
        }

        let label = self.service.create_label(definition).await?;
        Ok(SyncOperation::Create { label })
    }

    /// Current labels, in GitHub's order
    pub async fn current_labels(&self) -> Result<Vec<RemoteLabel>> {
        self.service.list_labels().await
    }

    /// Write the current labels to a JSON file
    ///
    /// Nothing is written when the repository has no labels.
    ///
    /// # Returns
    /// Number of labels written
    ///
    /// # Errors
    /// If the path is not a `.json` file, the API call fails, or the file
    /// cannot be written
    pub async fn dump_labels<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        validate_dump_path(path)?;

        let labels = self.current_labels().await?;
        if labels.is_empty() {
            progress!(self.verbose, "no labels found, nothing to dump");
            return Ok(0);
        }

        progress!(self.verbose, path = %path.display(), "dumping labels");
        let content = serde_json::to_string_pretty(&labels)?;
        std::fs::write(path, content)?;

        Ok(labels.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::add_hash;
    use crate::error::Error;

    /// Label store behaving like a GitHub repository's labels
    #[derive(Default)]
    struct MemoryLabels {
        labels: Mutex<Vec<RemoteLabel>>,
        rejected_name: Option<String>,
    }

    impl MemoryLabels {
        fn with_labels(labels: &[(&str, &str)]) -> Self {
            let labels = labels
                .iter()
                .map(|(name, color)| RemoteLabel {
                    name: name.to_string(),
                    color: color.to_string(),
                    description: None,
                })
                .collect();
            Self {
                labels: Mutex::new(labels),
                rejected_name: None,
            }
        }

        fn snapshot(&self) -> Vec<RemoteLabel> {
            self.labels.lock().unwrap().clone()
        }
    }

    impl LabelService for MemoryLabels {
        async fn find_label(&self, name: &str) -> Result<Option<RemoteLabel>> {
            let labels = self.labels.lock().unwrap();
            Ok(labels.iter().find(|label| label.name == name).cloned())
        }

        async fn create_label(&self, label: &LabelDefinition) -> Result<RemoteLabel> {
            if self.rejected_name.as_deref() == Some(label.name.as_str()) {
                return Err(Error::label_validation("rejected by remote"));
            }

            let mut labels = self.labels.lock().unwrap();
            if labels.iter().any(|existing| existing.name == label.name) {
                return Err(Error::label_validation("already_exists"));
            }

            let created = RemoteLabel {
                name: label.name.clone(),
                color: add_hash(&label.color),
                description: label.description.clone(),
            };
            labels.push(created.clone());
            Ok(created)
        }

        async fn edit_label(
            &self,
            old_name: &str,
            label: &LabelDefinition,
        ) -> Result<Option<RemoteLabel>> {
            let mut labels = self.labels.lock().unwrap();
            let Some(existing) = labels.iter_mut().find(|l| l.name == old_name) else {
                return Ok(None);
            };

            existing.name = label.name.clone();
            existing.color = add_hash(&label.color);
            if label.description.is_some() {
                existing.description = label.description.clone();
            }
            Ok(Some(existing.clone()))
        }

        async fn delete_label(&self, name: &str) -> Result<bool> {
            let mut labels = self.labels.lock().unwrap();
            let before = labels.len();
            labels.retain(|label| label.name != name);
            Ok(labels.len() < before)
        }

        async fn list_labels(&self) -> Result<Vec<RemoteLabel>> {
            Ok(self.snapshot())
        }
    }

    fn definitions(json: &str) -> Vec<LabelDefinition> {
        crate::config::parse_definitions_from_content(json, Path::new("labels.json")).unwrap()
    }

    fn as_json(labels: &[RemoteLabel]) -> serde_json::Value {
        serde_json::to_value(labels).unwrap()
    }

    #[test]
    fn test_sync_result_counters() {
        let label = RemoteLabel {
            name: "bug".to_string(),
            color: "#ff0000".to_string(),
            description: None,
        };
        let mut result = SyncResult::default();
        assert!(!result.has_changes());

        result.add_operation(SyncOperation::Create {
            label: label.clone(),
        });
        result.add_operation(SyncOperation::Update {
            current_name: "bug".to_string(),
            label: label.clone(),
        });
        result.add_operation(SyncOperation::Update {
            current_name: "defect".to_string(),
            label,
        });

        assert_eq!(result.created, 1);
        assert_eq!(result.updated, 2);
        assert_eq!(result.renamed, 1);
        assert_eq!(result.total_operations(), 3);
        assert!(result.has_changes());
    }

    #[tokio::test]
    async fn test_clear_then_dump_writes_nothing() {
        let syncer = LabelSyncer::new(MemoryLabels::with_labels(&[("bug", "#fc2929")]), false);
        syncer.clear_labels().await.unwrap();
        // Clearing an empty set is a no-op
        syncer.clear_labels().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        assert_eq!(syncer.dump_labels(&path).await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_make_replaces_existing_labels() {
        let syncer =
            LabelSyncer::new(MemoryLabels::with_labels(&[("wontfix", "#ffffff")]), false);

        let result = syncer
            .make_labels(&definitions(r#"[{"name":"bug","color":"fc2929"}]"#), false)
            .await
            .unwrap();

        assert_eq!(result.created, 1);
        assert_eq!(
            as_json(&syncer.current_labels().await.unwrap()),
            serde_json::json!([{"name": "bug", "color": "#fc2929"}])
        );
    }

    #[tokio::test]
    async fn test_make_then_dump_preserves_input_order() {
        let syncer = LabelSyncer::new(
            MemoryLabels::with_labels(&[("bug", "#000000"), ("old", "#111111")]),
            false,
        );
        let input = r##"[
            {"name":"question","color":"#cc317c","description":"Further information is requested"},
            {"name":"bug","color":"fc2929"},
            {"name":"feature","color":"#00ff00","description":""}
        ]"##;
        syncer.make_labels(&definitions(input), false).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        assert_eq!(syncer.dump_labels(&path).await.unwrap(), 3);

        let dumped: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            dumped,
            serde_json::json!([
                {"name": "question", "color": "#cc317c", "description": "Further information is requested"},
                {"name": "bug", "color": "#fc2929"},
                {"name": "feature", "color": "#00ff00", "description": ""}
            ])
        );
    }

    #[tokio::test]
    async fn test_append_renames_in_place() {
        let syncer = LabelSyncer::new(MemoryLabels::with_labels(&[("bug", "#fc2929")]), false);

        let result = syncer
            .make_labels(
                &definitions(
                    r##"[{"old_name":"bug","name":"defect","color":"#ff0000","description":"Confirmed defect"}]"##,
                ),
                true,
            )
            .await
            .unwrap();

        assert_eq!(result.renamed, 1);
        assert_eq!(
            as_json(&syncer.current_labels().await.unwrap()),
            serde_json::json!([
                {"name": "defect", "color": "#ff0000", "description": "Confirmed defect"}
            ])
        );
    }

    #[tokio::test]
    async fn test_append_preserves_unnamed_labels() {
        let syncer = LabelSyncer::new(
            MemoryLabels::with_labels(&[("bug", "#fc2929"), ("wontfix", "#ffffff")]),
            false,
        );
        let input = r##"[
            {"name":"bug","color":"#ff0000"},
            {"current_name":"feature","name":"support","color":"#000000"}
        ]"##;

        let result = syncer.make_labels(&definitions(input), true).await.unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.created, 1);

        assert_eq!(
            as_json(&syncer.current_labels().await.unwrap()),
            serde_json::json!([
                {"name": "bug", "color": "#ff0000"},
                {"name": "wontfix", "color": "#ffffff"},
                {"name": "support", "color": "#000000"}
            ])
        );
    }

    #[tokio::test]
    async fn test_repeated_rename_converges() {
        let syncer = LabelSyncer::new(MemoryLabels::with_labels(&[("bug", "#fc2929")]), false);
        let input = definitions(r##"[{"old_name":"bug","name":"defect","color":"#ff0000"}]"##);

        syncer.make_labels(&input, true).await.unwrap();
        let second = syncer.make_labels(&input, true).await.unwrap();

        assert_eq!(
            second.operations,
            vec![SyncOperation::Update {
                current_name: "defect".to_string(),
                label: RemoteLabel {
                    name: "defect".to_string(),
                    color: "#ff0000".to_string(),
                    description: None,
                },
            }]
        );
        assert_eq!(syncer.current_labels().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_missing_label_does_not_create() {
        let service = MemoryLabels::default();
        let definition = LabelDefinition::new("bug", "fc2929").unwrap();

        assert_eq!(service.edit_label("bug", &definition).await.unwrap(), None);
        assert!(service.find_label("bug").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let service = MemoryLabels::with_labels(&[("bug", "#fc2929")]);
        assert!(service.delete_label("bug").await.unwrap());
        assert!(!service.delete_label("bug").await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_definitions() {
        let service = MemoryLabels {
            rejected_name: Some("question".to_string()),
            ..MemoryLabels::default()
        };
        let syncer = LabelSyncer::new(service, false);
        let input = r##"[
            {"name":"bug","color":"fc2929"},
            {"name":"question","color":"cc317c"},
            {"name":"feature","color":"00ff00"}
        ]"##;

        assert!(syncer.make_labels(&definitions(input), true).await.is_err());

        let names: Vec<String> = syncer
            .service()
            .snapshot()
            .into_iter()
            .map(|label| label.name)
            .collect();
        assert_eq!(names, vec!["bug"]);
    }

    #[tokio::test]
    async fn test_invalid_definition_aborts_before_clearing() {
        let syncer = LabelSyncer::new(MemoryLabels::with_labels(&[("bug", "#fc2929")]), false);
        let mut invalid = LabelDefinition::new("feature", "00ff00").unwrap();
        invalid.color = "green".to_string();

        let err = syncer.make_labels(&[invalid], false).await.unwrap_err();
        assert!(matches!(err, Error::InvalidLabelColor(_)));
        assert_eq!(syncer.service().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_dump_round_trips_into_definitions() {
        let syncer = LabelSyncer::new(MemoryLabels::default(), true);
        let input = definitions(
            r##"[{"name":"bug","color":"fc2929","description":"Something isn't working"}]"##,
        );
        syncer.make_labels(&input, false).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        syncer.dump_labels(&path).await.unwrap();

        let reloaded = crate::config::load_definitions_from_file(&path).unwrap();
        assert_eq!(reloaded[0].name, "bug");
        assert_eq!(reloaded[0].color, "#fc2929");
        assert_eq!(
            reloaded[0].description.as_deref(),
            Some("Something isn't working")
        );

        let dumped: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<&String> = dumped[0].keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn test_dump_rejects_non_json_path() {
        let syncer = LabelSyncer::new(MemoryLabels::with_labels(&[("bug", "#fc2929")]), false);
        let err = syncer.dump_labels("labels.yaml").await.unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }
}
