//! Project lifecycle: create, rename, delete and replace-file over the record
//! store and file vault, plus the insight and suggestion relays.
//!
//! Every mutation is one `load_all` followed by one `save_all`. Mutations on
//! one manager are serialized by an async mutex; separate processes sharing
//! the same document are not, and the last writer wins.

use std::sync::Arc;

use quarry_core::error::{QuarryError, Result};
use quarry_core::insight::{insight_prompt, SUGGESTION_PROMPT};
use quarry_core::project::validate_name;
use quarry_core::{Project, QuarryConfig};
use quarry_gateway::{AnalysisGateway, HttpAnalysisGateway};
use quarry_vault::{FileSource, FileVault, RecordStore, SourceOrigin};
use tokio::sync::Mutex;

pub struct ProjectManager {
    store: RecordStore,
    vault: FileVault,
    gateway: Arc<dyn AnalysisGateway>,
    write_lock: Mutex<()>,
}

impl ProjectManager {
    pub fn new(store: RecordStore, vault: FileVault, gateway: Arc<dyn AnalysisGateway>) -> Self {
        Self {
            store,
            vault,
            gateway,
            write_lock: Mutex::new(()),
        }
    }

    /// Wire a manager to the configured document, vault and analysis service.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Upstream`] if the HTTP client cannot be built.
    pub fn from_config(config: &QuarryConfig) -> Result<Self> {
        let gateway = HttpAnalysisGateway::new(&config.analysis)?;
        Ok(Self::new(
            RecordStore::new(&config.database),
            FileVault::from_config(config),
            Arc::new(gateway),
        ))
    }

    pub fn vault(&self) -> &FileVault {
        &self.vault
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// All records, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::Store`] if the document cannot be read.
    pub async fn list(&self) -> Result<Vec<Project>> {
        self.store.load_all().await
    }

    /// # Errors
    ///
    /// Returns [`QuarryError::NotFound`] if no record has this id.
    pub async fn get(&self, id: &str) -> Result<Project> {
        self.store
            .load_all()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| QuarryError::project_not_found(id))
    }

    /// Copy the source into the vault and append a new record for it.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::InvalidArgument`] for a blank name or no source
    /// - [`QuarryError::SourceNotFound`] if the source file does not exist
    /// - [`QuarryError::OutsideBoundary`] if a caller path escapes the root
    pub async fn create(&self, name: &str, source: Option<FileSource>) -> Result<Project> {
        let name = validate_name(name)?;
        let source = source.ok_or_else(|| {
            QuarryError::InvalidArgument("Project name and dataFile are required.".to_string())
        })?;

        let file_location = self.prepare_source(&source).await?;
        let project = Project::new(name, file_location);

        let persisted = {
            let _guard = self.write_lock.lock().await;
            let mut projects = self.store.load_all().await?;
            projects.push(project.clone());
            self.store.save_all(&projects).await
        };
        if let Err(e) = persisted {
            self.vault
                .remove(&project.file_location)
                .await
                .log(&project.file_location);
            return Err(e);
        }

        tracing::info!(
            project_id = %project.id,
            name = %project.name,
            file_location = %project.file_location,
            "created project"
        );
        Ok(project)
    }

    /// # Errors
    ///
    /// - [`QuarryError::InvalidArgument`] for a blank name
    /// - [`QuarryError::NotFound`] if no record has this id
    pub async fn rename(&self, id: &str, name: &str) -> Result<Project> {
        let name = validate_name(name)?;

        let _guard = self.write_lock.lock().await;
        let mut projects = self.store.load_all().await?;
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| QuarryError::project_not_found(id))?;
        project.name = name.to_string();
        let updated = project.clone();
        self.store.save_all(&projects).await?;

        tracing::info!(project_id = %id, name = %updated.name, "renamed project");
        Ok(updated)
    }

    /// Remove the record, then delete its vault file on a best-effort basis.
    /// Returns the removed record.
    ///
    /// # Errors
    ///
    /// Returns [`QuarryError::NotFound`] if no record has this id; the store
    /// is left untouched.
    pub async fn delete(&self, id: &str) -> Result<Project> {
        let removed = {
            let _guard = self.write_lock.lock().await;
            let mut projects = self.store.load_all().await?;
            let index = projects
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| QuarryError::project_not_found(id))?;
            let removed = projects.remove(index);
            self.store.save_all(&projects).await?;
            removed
        };

        tracing::info!(project_id = %id, "deleted project");
        self.vault
            .remove(&removed.file_location)
            .await
            .log(&removed.file_location);
        Ok(removed)
    }

    /// Point the record at a new file, then delete the old one on a
    /// best-effort basis.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::InvalidArgument`] if no source is given
    /// - [`QuarryError::NotFound`] for an unknown id
    /// - [`QuarryError::SourceNotFound`] if the source file does not exist
    /// - [`QuarryError::OutsideBoundary`] if a caller path escapes the root
    pub async fn replace_file(&self, id: &str, source: Option<FileSource>) -> Result<Project> {
        let source = source.ok_or_else(|| {
            QuarryError::InvalidArgument(
                "A new file is required to update the project.".to_string(),
            )
        })?;

        let (updated, old_location) = {
            let _guard = self.write_lock.lock().await;
            let mut projects = self.store.load_all().await?;
            let index = projects
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| QuarryError::project_not_found(id))?;

            let new_location = self.prepare_source(&source).await?;
            let old_location =
                std::mem::replace(&mut projects[index].file_location, new_location);
            let updated = projects[index].clone();
            if let Err(e) = self.store.save_all(&projects).await {
                self.vault
                    .remove(&updated.file_location)
                    .await
                    .log(&updated.file_location);
                return Err(e);
            }
            (updated, old_location)
        };

        tracing::info!(
            project_id = %id,
            file_location = %updated.file_location,
            "replaced project file"
        );
        if old_location != updated.file_location {
            self.vault.remove(&old_location).await.log(&old_location);
        }
        Ok(updated)
    }

    /// Ask the analysis service about the project's file.
    ///
    /// The file's contents are not read here; only its stored location is
    /// forwarded.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::InvalidArgument`] for a blank prompt
    /// - [`QuarryError::NotFound`] if no record has this id
    /// - [`QuarryError::Upstream`] if the analysis call fails
    pub async fn insight(&self, id: &str, prompt: &str) -> Result<serde_json::Value> {
        if prompt.trim().is_empty() {
            return Err(QuarryError::InvalidArgument(
                "A prompt is required.".to_string(),
            ));
        }
        let project = self.get(id).await?;
        let answer = self
            .gateway
            .analyze(&project.file_location, &insight_prompt(prompt))
            .await?;
        Ok(answer)
    }

    /// Ask the analysis service for eight suggested questions.
    ///
    /// # Errors
    ///
    /// - [`QuarryError::NotFound`] if no record has this id
    /// - [`QuarryError::Upstream`] if the analysis call fails
    pub async fn suggestions(&self, id: &str) -> Result<serde_json::Value> {
        let project = self.get(id).await?;
        let answer = self
            .gateway
            .analyze(&project.file_location, SUGGESTION_PROMPT)
            .await?;
        Ok(answer)
    }

    /// Staged uploads were written by us and skip the containment check.
    async fn prepare_source(&self, source: &FileSource) -> Result<String> {
        let resolved = self.vault.resolve_candidate_source(source).await?;
        if resolved.origin == SourceOrigin::Caller {
            self.vault.enforce_containment(&resolved.path).await?;
        }
        self.vault.materialize(&resolved).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::{BoundaryPolicy, ErrorKind, UpstreamError};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct StubGateway {
        calls: StdMutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl StubGateway {
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisGateway for StubGateway {
        async fn analyze(
            &self,
            file_location: &str,
            prompt: &str,
        ) -> std::result::Result<serde_json::Value, UpstreamError> {
            self.calls
                .lock()
                .unwrap()
                .push((file_location.to_string(), prompt.to_string()));
            if self.fail {
                return Err(UpstreamError::Transport("connection refused".to_string()));
            }
            Ok(json!({
                "Generate_SQL": "SELECT SUM(total) FROM demo;",
                "Result_in_csv": "total\n42",
                "Key_insight": "Totals are small.",
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: std::path::PathBuf,
        gateway: Arc<StubGateway>,
        manager: ProjectManager,
    }

    fn fixture_with(gateway: StubGateway) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Backend");
        std::fs::create_dir_all(root.join("files")).unwrap();
        std::fs::write(root.join("files").join("demo.csv"), "region,total\nnorth,1\n").unwrap();
        std::fs::write(root.join("other.csv"), "region,total\nsouth,2\n").unwrap();

        let gateway = Arc::new(gateway);
        let manager = ProjectManager::new(
            RecordStore::new(root.join("database.json")),
            FileVault::new(&root, "files", BoundaryPolicy::Enforce),
            gateway.clone(),
        );
        Fixture {
            _dir: dir,
            root,
            gateway,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StubGateway::default())
    }

    fn path_source(raw: &str) -> Option<FileSource> {
        Some(FileSource::Path(raw.to_string()))
    }

    fn vault_file_exists(f: &Fixture, location: &str) -> bool {
        f.manager.vault().locate(location).is_file()
    }

    #[tokio::test]
    async fn create_then_list_contains_record_with_existing_file() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales Q1", path_source("./files/demo.csv"))
            .await
            .unwrap();

        assert_eq!(project.name, "Sales Q1");
        assert!(project.file_location.starts_with("./files/"));
        assert!(project.file_location.ends_with("-demo.csv"));

        let listed = f.manager.list().await.unwrap();
        let matching: Vec<_> = listed.iter().filter(|p| p.name == "Sales Q1").collect();
        assert_eq!(matching.len(), 1);
        assert!(vault_file_exists(&f, &matching[0].file_location));
    }

    #[tokio::test]
    async fn create_rejects_blank_name_even_with_valid_file() {
        let f = fixture();
        let err = f
            .manager
            .create("   ", path_source("./files/demo.csv"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(f.manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_a_source() {
        let f = fixture();
        let err = f.manager.create("Sales", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn create_with_missing_file_is_source_not_found() {
        let f = fixture();
        let err = f
            .manager
            .create("Sales", path_source("./files/missing.csv"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        assert!(!f.root.join("database.json").exists());
    }

    #[tokio::test]
    async fn create_outside_root_is_rejected() {
        let f = fixture();
        let outside = f.root.parent().unwrap().join("outside.csv");
        std::fs::write(&outside, "a\n1").unwrap();

        let err = f
            .manager
            .create("Sales", path_source(outside.to_str().unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideBoundary);
    }

    #[tokio::test]
    async fn uploads_are_accepted_when_vault_lives_outside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("Backend");
        let shared = dir.path().join("shared-files");
        std::fs::create_dir_all(&root).unwrap();
        let manager = ProjectManager::new(
            RecordStore::new(root.join("database.json")),
            FileVault::new(&root, &shared, BoundaryPolicy::Enforce),
            Arc::new(StubGateway::default()),
        );

        let staged = manager
            .vault()
            .stage_upload("sales.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        let project = manager
            .create("Uploaded", Some(FileSource::Uploaded(staged.clone())))
            .await
            .unwrap();

        assert_eq!(manager.vault().locate(&project.file_location), staged);
        assert_eq!(std::fs::read_dir(&shared).unwrap().count(), 1);

        let outside = dir.path().join("loose.csv");
        std::fs::write(&outside, "a\n1\n").unwrap();
        let err = manager
            .replace_file(&project.id, path_source(outside.to_str().unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutsideBoundary);
    }

    #[tokio::test]
    async fn list_is_idempotent() {
        let f = fixture();
        f.manager
            .create("A", path_source("./files/demo.csv"))
            .await
            .unwrap();
        f.manager
            .create("B", path_source("other.csv"))
            .await
            .unwrap();
        let first = f.manager.list().await.unwrap();
        let second = f.manager.list().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn rename_updates_name_and_rejects_blank() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();

        let err = f.manager.rename(&project.id, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(f.manager.get(&project.id).await.unwrap().name, "Sales");

        let renamed = f.manager.rename(&project.id, "Revenue").await.unwrap();
        assert_eq!(renamed.name, "Revenue");
        assert_eq!(renamed.file_location, project.file_location);
        assert_eq!(f.manager.get(&project.id).await.unwrap().name, "Revenue");

        let err = f.manager.rename("nope", "X").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_record_and_file() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        assert!(vault_file_exists(&f, &project.file_location));

        f.manager.delete(&project.id).await.unwrap();

        assert!(f.manager.list().await.unwrap().is_empty());
        assert!(!vault_file_exists(&f, &project.file_location));
        assert!(f.root.join("files").join("demo.csv").exists());
    }

    #[tokio::test]
    async fn delete_unknown_id_leaves_store_unchanged() {
        let f = fixture();
        f.manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        let before = std::fs::read(f.manager.store().path()).unwrap();

        let err = f.manager.delete("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(std::fs::read(f.manager.store().path()).unwrap(), before);
    }

    #[tokio::test]
    async fn delete_succeeds_when_file_already_gone() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        std::fs::remove_file(f.manager.vault().locate(&project.file_location)).unwrap();

        f.manager.delete(&project.id).await.unwrap();
        assert!(f.manager.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_file_swaps_location_and_removes_old() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();

        let updated = f
            .manager
            .replace_file(&project.id, path_source("other.csv"))
            .await
            .unwrap();

        assert_ne!(updated.file_location, project.file_location);
        assert_eq!(
            std::fs::read_to_string(f.manager.vault().locate(&updated.file_location)).unwrap(),
            "region,total\nsouth,2\n"
        );
        assert!(!vault_file_exists(&f, &project.file_location));
        assert_eq!(
            f.manager.get(&project.id).await.unwrap().file_location,
            updated.file_location
        );
    }

    #[tokio::test]
    async fn replace_file_with_own_location_keeps_new_copy() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();

        let updated = f
            .manager
            .replace_file(&project.id, path_source(&project.file_location))
            .await
            .unwrap();

        assert_ne!(updated.file_location, project.file_location);
        assert!(vault_file_exists(&f, &updated.file_location));
    }

    #[tokio::test]
    async fn replace_file_validates_before_touching_anything() {
        let f = fixture();
        let err = f.manager.replace_file("nope", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f
            .manager
            .replace_file("nope", path_source("other.csv"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let stored: Vec<_> = std::fs::read_dir(f.root.join("files")).unwrap().collect();
        assert_eq!(stored.len(), 1, "only the seed file should exist");

        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        let err = f
            .manager
            .replace_file(&project.id, path_source("./files/missing.csv"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceNotFound);
        assert_eq!(f.manager.get(&project.id).await.unwrap(), project);
        assert_eq!(std::fs::read_dir(f.root.join("files")).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn insight_forwards_location_and_contract_prompt() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales Q1", path_source("./files/demo.csv"))
            .await
            .unwrap();

        let answer = f.manager.insight(&project.id, "show totals").await.unwrap();
        for key in ["Generate_SQL", "Result_in_csv", "Key_insight"] {
            assert!(answer.get(key).is_some(), "missing {key}");
        }

        let calls = f.gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, project.file_location);
        assert!(calls[0].1.starts_with("show totals "));
        assert!(calls[0].1.contains("Result_in_csv"));
    }

    #[tokio::test]
    async fn insight_validates_prompt_and_id() {
        let f = fixture();
        let err = f.manager.insight("nope", " ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = f.manager.insight("nope", "show totals").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn insight_upstream_failure_is_upstream_error() {
        let f = fixture_with(StubGateway {
            fail: true,
            ..StubGateway::default()
        });
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        let err = f.manager.insight(&project.id, "totals").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn suggestions_for_unknown_id_never_calls_upstream() {
        let f = fixture();
        let err = f.manager.suggestions("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(f.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn suggestions_send_fixed_prompt() {
        let f = fixture();
        let project = f
            .manager
            .create("Sales", path_source("./files/demo.csv"))
            .await
            .unwrap();
        f.manager.suggestions(&project.id).await.unwrap();
        let calls = f.gateway.calls();
        assert_eq!(calls[0].1, SUGGESTION_PROMPT);
    }

    #[tokio::test]
    async fn concurrent_creates_are_not_lost() {
        let f = Arc::new(fixture());
        let mut handles = Vec::new();
        for i in 0..8 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.manager
                    .create(&format!("P{i}"), path_source("./files/demo.csv"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(f.manager.list().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn legacy_backslash_location_is_deleted() {
        let f = fixture();
        let staged = f.manager.vault().stage_upload("old.csv", b"x").await.unwrap();
        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        let legacy = Project {
            id: "legacy".to_string(),
            name: "Old".to_string(),
            file_location: format!(".\\files\\{name}"),
        };
        f.manager.store().save_all(&[legacy]).await.unwrap();

        f.manager.delete("legacy").await.unwrap();
        assert!(!staged.exists());
    }
}
