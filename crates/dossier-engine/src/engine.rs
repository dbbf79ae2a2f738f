use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use dossier_gate::ProjectLockGate;
use dossier_ledger::{
    ActivationCause, ActivationOutcome, AuditAction, AuditEntry, FileMeta, GroupDirectory,
    ProcessingUpdate, Project, RecordStore, Version, VersionLedger,
};
use dossier_store::{ArtifactFormat, BlobStore, BlobTarget, CommittedBlob};
use dossier_types::{GroupId, ProcessingStatus, ProjectId, ProjectStatus, VersionId};

use crate::config::{EngineConfig, ValidationMode};
use crate::error::{EngineError, EngineResult};
use crate::hook::ValidationHook;
use crate::upload::{TempUpload, UploadReceipt, UploadRequest};

/// The upload and activation workflow over a record store and a blob store.
///
/// Cheap to clone; clones share the same stores and hook. No in-process
/// lock serializes uploads: concurrent uploads to one group are kept
/// consistent by the record store's atomic primitives alone.
#[derive(Clone)]
pub struct VersioningEngine {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    gate: ProjectLockGate,
    directory: GroupDirectory,
    ledger: VersionLedger,
    hook: Arc<dyn ValidationHook>,
    config: EngineConfig,
}

impl VersioningEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        hook: Arc<dyn ValidationHook>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gate: ProjectLockGate::new(store.clone()),
            directory: GroupDirectory::new(store.clone()),
            ledger: VersionLedger::new(store.clone()),
            store,
            blobs,
            hook,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    // ---- projects ----

    pub fn create_project(&self, owner: &str) -> EngineResult<Project> {
        let project = Project::new(owner, Utc::now());
        self.store.insert_project(&project)?;
        info!(project = %project.id, owner, "created project");
        Ok(project)
    }

    pub fn project(&self, project_id: &ProjectId) -> EngineResult<Project> {
        self.store
            .get_project(project_id)?
            .ok_or_else(|| EngineError::NotFound(format!("project {project_id}")))
    }

    /// Lock or unlock a project. Locked projects accept no uploads or
    /// activations; reads are unaffected.
    pub fn set_project_locked(&self, project_id: &ProjectId, locked: bool) -> EngineResult<Project> {
        let status = if locked {
            ProjectStatus::Locked
        } else {
            ProjectStatus::Open
        };
        let project = self.store.set_project_status(project_id, status, Utc::now())?;
        info!(project = %project_id, %status, "project status changed");
        Ok(project)
    }

    // ---- write path ----

    /// Accept one uploaded file as the next version of its discipline's
    /// group and make it active.
    ///
    /// Intake and lock failures return before any shared state is touched.
    /// A failed blob commit gives the reserved number back when no later
    /// upload has reserved past it. The staged file is removed on every
    /// failure path.
    pub async fn upload(&self, request: UploadRequest) -> EngineResult<UploadReceipt> {
        let mut staged = TempUpload::new(&request.temp_path);

        self.gate.assert_writable(&request.project_id)?;
        let format = self
            .config
            .intake
            .inspect(staged.path(), &request.original_name)?;

        let group = self
            .directory
            .resolve_or_create(&request.project_id, &request.discipline, Utc::now())?;
        let number = self.ledger.reserve_next_version(&group.id)?;

        let target = BlobTarget {
            project_id: request.project_id,
            discipline: request.discipline.clone(),
            version_number: number,
        };
        let blob = match self
            .commit_blob(staged.path(), target, &request.original_name, format)
            .await
        {
            Ok(blob) => blob,
            Err(e) => {
                warn!(group = %group.id, version = number, error = %e, "blob commit failed");
                if let Err(release) = self.ledger.release_version(&group.id, number) {
                    warn!(group = %group.id, version = number, error = %release, "could not release reservation");
                }
                return Err(e);
            }
        };
        staged.disarm();

        let now = Utc::now();
        let version = Version {
            id: VersionId::new(),
            group_id: group.id,
            project_id: request.project_id,
            discipline: request.discipline.clone(),
            number,
            file: FileMeta {
                original_name: request.original_name.clone(),
                stored_name: blob.stored_name,
                stored_path: blob.final_path,
                size: blob.size,
                mime_type: format.mime_type().to_string(),
                digest: blob.digest,
            },
            uploaded_by: request.actor.clone(),
            upload_reason: request.reason.clone(),
            is_active: false,
            processing_status: ProcessingStatus::Queued,
            result: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.ledger.record_version(&version) {
            error!(
                path = %version.file.stored_path.display(),
                error = %e,
                "blob committed but version record failed; blob is unreferenced"
            );
            return Err(e.into());
        }

        let outcome = self
            .ledger
            .set_active_version(&group.id, &version.id, ActivationCause::Upload, now)?;

        // Audit failures are logged only; the version is already live.
        let mut entries = vec![AuditEntry::new(AuditAction::UploadVersion, &request.actor, &version, now)];
        if let ActivationOutcome::Activated { .. } = outcome {
            entries.push(AuditEntry::new(AuditAction::ActivateVersion, &request.actor, &version, now));
        }
        for entry in &entries {
            if let Err(e) = self.ledger.audit(entry) {
                error!(version_id = %version.id, action = ?entry.action, error = %e, "could not append audit entry");
            }
        }

        info!(
            project = %request.project_id,
            discipline = %request.discipline,
            version = number,
            digest = %version.file.digest.short_hex(),
            active = outcome.is_active(),
            "uploaded version"
        );

        let version = match self.config.validation_mode {
            ValidationMode::Inline => match self.run_validation(&version.id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(version_id = %version.id, error = %e, "validation could not run");
                    self.ledger.get_version(&version.id)?
                }
            },
            ValidationMode::Background => {
                let current = self.ledger.get_version(&version.id)?;
                let engine = self.clone();
                let version_id = version.id;
                tokio::spawn(async move {
                    if let Err(e) = engine.run_validation(&version_id).await {
                        warn!(%version_id, error = %e, "background validation could not run");
                    }
                });
                current
            }
        };

        Ok(UploadReceipt::from(&version))
    }

    async fn commit_blob(
        &self,
        temp_path: &Path,
        target: BlobTarget,
        original_name: &str,
        format: ArtifactFormat,
    ) -> EngineResult<CommittedBlob> {
        let blobs = self.blobs.clone();
        let temp_path = temp_path.to_path_buf();
        let original_name = original_name.to_string();
        tokio::task::spawn_blocking(move || blobs.commit(&temp_path, &target, &original_name, format))
            .await
            .map_err(|e| EngineError::Internal(format!("blob commit task failed: {e}")))?
            .map_err(EngineError::StorageFailure)
    }

    /// Explicitly make `version_id` the active version of `group_id`
    /// (rollback or roll-forward).
    pub fn activate(&self, group_id: &GroupId, version_id: &VersionId, actor: &str) -> EngineResult<Version> {
        let group = self.directory.get(group_id)?;
        self.gate.assert_writable(&group.project_id)?;

        let outcome = self.ledger.activate(group_id, version_id, Utc::now())?;
        let version = self.ledger.get_version(version_id)?;
        if let ActivationOutcome::Activated { previous } = outcome {
            self.ledger
                .audit(&AuditEntry::new(AuditAction::ActivateVersion, actor, &version, Utc::now()))?;
            info!(group = %group_id, version = version.number, ?previous, actor, "activated version");
        }
        Ok(version)
    }

    /// Run the validation hook again for an existing version.
    pub async fn revalidate(&self, version_id: &VersionId, actor: &str) -> EngineResult<Version> {
        let version = self.ledger.get_version(version_id)?;
        self.ledger
            .audit(&AuditEntry::new(AuditAction::RevalidateVersion, actor, &version, Utc::now()))?;
        self.run_validation(version_id).await
    }

    /// Mark a queued or processing version as failed.
    pub fn mark_failed(&self, version_id: &VersionId, reason: &str, actor: &str) -> EngineResult<Version> {
        let version = self
            .ledger
            .transition(version_id, &ProcessingUpdate::failed(reason, Utc::now()))?;
        self.ledger
            .audit(&AuditEntry::new(AuditAction::FailVersion, actor, &version, Utc::now()))?;
        info!(%version_id, reason, "marked version failed");
        Ok(version)
    }

    /// Versions still queued or processing after `max_age`.
    pub fn stuck_versions(&self, max_age: Duration) -> EngineResult<Vec<Version>> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| EngineError::Internal(format!("age out of range: {e}")))?;
        Ok(self.ledger.stuck_versions(Utc::now() - max_age)?)
    }

    /// Fail every stuck version, returning the ones that were changed.
    pub fn fail_stuck(&self, max_age: Duration, reason: &str, actor: &str) -> EngineResult<Vec<Version>> {
        let mut failed = Vec::new();
        for version in self.stuck_versions(max_age)? {
            match self.mark_failed(&version.id, reason, actor) {
                Ok(v) => failed.push(v),
                // Finished between listing and marking.
                Err(EngineError::Ledger(e)) => debug!(version_id = %version.id, error = %e, "skipped"),
                Err(e) => return Err(e),
            }
        }
        Ok(failed)
    }

    async fn run_validation(&self, version_id: &VersionId) -> EngineResult<Version> {
        let version = self
            .ledger
            .transition(version_id, &ProcessingUpdate::processing(Utc::now()))?;
        let update = match self.hook.review(&version).await {
            Ok(outcome) => ProcessingUpdate::done(outcome, Utc::now()),
            Err(e) => {
                warn!(%version_id, error = %e, "validation failed");
                ProcessingUpdate::failed(e.to_string(), Utc::now())
            }
        };
        Ok(self.ledger.transition(version_id, &update)?)
    }

    // ---- read path ----

    pub fn version(&self, version_id: &VersionId) -> EngineResult<Version> {
        Ok(self.ledger.get_version(version_id)?)
    }

    /// Versions of a group, newest number first.
    pub fn group_versions(&self, group_id: &GroupId) -> EngineResult<Vec<Version>> {
        self.directory.get(group_id)?;
        Ok(self.ledger.list_group_versions(group_id)?)
    }

    /// Versions of a project across disciplines, newest upload first.
    pub fn project_versions(&self, project_id: &ProjectId) -> EngineResult<Vec<Version>> {
        self.project(project_id)?;
        Ok(self.ledger.list_project_versions(project_id)?)
    }

    pub fn audit_trail(&self, version_id: &VersionId) -> EngineResult<Vec<AuditEntry>> {
        Ok(self.ledger.audit_trail(version_id)?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::hook::{AcceptAllHook, DigestCheckHook};
    use dossier_ledger::{
        ActivationRequest, Constraint, ConstraintSet, Group, LedgerError, LedgerResult,
        LocalRecordStore, RepairBatch,
    };
    use dossier_repair::Repairer;
    use dossier_store::{BlobError, BlobResult, FsBlobStore};
    use dossier_types::{ContentDigest, Discipline, ReviewOutcome, Timestamp};

    struct Fixture {
        dir: TempDir,
        store: Arc<LocalRecordStore>,
        blobs: Arc<FsBlobStore>,
        engine: VersioningEngine,
        project: Project,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(AcceptAllHook), ValidationMode::Inline)
    }

    fn fixture_with(hook: Arc<dyn ValidationHook>, mode: ValidationMode) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("staging")).unwrap();
        let store = Arc::new(LocalRecordStore::new());
        let blobs = Arc::new(FsBlobStore::open(dir.path().join("blobs")).unwrap());
        let config = EngineConfig {
            validation_mode: mode,
            ..EngineConfig::default()
        };
        let engine = VersioningEngine::new(store.clone(), blobs.clone(), hook, config);
        let project = engine.create_project("owner@example.com").unwrap();
        Fixture {
            dir,
            store,
            blobs,
            engine,
            project,
        }
    }

    fn pdf(tag: &str) -> Vec<u8> {
        format!("%PDF-1.7\n% {tag}\n%%EOF\n").into_bytes()
    }

    impl Fixture {
        fn stage(&self, body: &[u8]) -> PathBuf {
            let file = tempfile::Builder::new()
                .suffix(".upload")
                .tempfile_in(self.dir.path().join("staging"))
                .unwrap();
            std::fs::write(file.path(), body).unwrap();
            file.into_temp_path().keep().unwrap()
        }

        fn request(&self, discipline: &str, name: &str, body: &[u8]) -> UploadRequest {
            UploadRequest {
                project_id: self.project.id,
                discipline: Discipline::new(discipline).unwrap(),
                temp_path: self.stage(body),
                original_name: name.into(),
                actor: "architect@example.com".into(),
                reason: Some("resubmission".into()),
            }
        }

        async fn upload(&self, discipline: &str, body: &[u8]) -> UploadReceipt {
            self.engine
                .upload(self.request(discipline, "Villa Plan.pdf", body))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn first_upload_creates_group_with_active_v1() {
        let fx = fixture();
        let body = pdf("first");
        let req = fx.request("villa_plan", "Villa Plan.pdf", &body);
        let staged = req.temp_path.clone();
        let receipt = fx.engine.upload(req).await.unwrap();

        assert_eq!(receipt.version_number, 1);
        assert!(receipt.is_active);
        assert_eq!(receipt.processing_status, ProcessingStatus::Done);
        assert_eq!(receipt.digest, ContentDigest::of_bytes(&body));
        assert!(!staged.exists());

        let version = fx.engine.version(&receipt.version_id).unwrap();
        assert_eq!(version.upload_reason.as_deref(), Some("resubmission"));
        assert_eq!(version.file.mime_type, "application/pdf");
        assert_eq!(fx.blobs.read(&version.file.stored_path).unwrap(), body);

        let actions: Vec<AuditAction> = fx
            .engine
            .audit_trail(&receipt.version_id)
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::UploadVersion, AuditAction::ActivateVersion]);
    }

    #[tokio::test]
    async fn second_upload_becomes_active() {
        let fx = fixture();
        let v1 = fx.upload("villa_plan", &pdf("one")).await;
        let v2 = fx.upload("villa_plan", &pdf("two")).await;
        assert_eq!(v1.group_id, v2.group_id);
        assert_eq!(v2.version_number, 2);

        let versions = fx.engine.group_versions(&v1.group_id).unwrap();
        assert_eq!(versions.iter().map(|v| v.number).collect::<Vec<_>>(), vec![2, 1]);
        assert!(versions[0].is_active);
        assert!(!versions[1].is_active);
        assert_eq!(
            fx.store.get_group(&v1.group_id).unwrap().unwrap().current_version,
            2
        );
    }

    #[tokio::test]
    async fn explicit_activation_rolls_back() {
        let fx = fixture();
        let v1 = fx.upload("villa_plan", &pdf("one")).await;
        let v2 = fx.upload("villa_plan", &pdf("two")).await;

        let active = fx.engine.activate(&v1.group_id, &v1.version_id, "reviewer").unwrap();
        assert_eq!(active.id, v1.version_id);
        assert!(active.is_active);
        assert!(!fx.engine.version(&v2.version_id).unwrap().is_active);
        let trail = fx.engine.audit_trail(&v1.version_id).unwrap();
        assert_eq!(trail.last().unwrap().actor, "reviewer");
    }

    #[tokio::test]
    async fn locked_project_refuses_writes_but_not_reads() {
        let fx = fixture();
        let v1 = fx.upload("villa_plan", &pdf("one")).await;
        fx.engine.set_project_locked(&fx.project.id, true).unwrap();

        let req = fx.request("structural", "frame.pdf", &pdf("blocked"));
        let staged = req.temp_path.clone();
        let err = fx.engine.upload(req).await.unwrap_err();
        assert!(matches!(err, EngineError::LockedProject(id) if id == fx.project.id));
        assert!(!staged.exists());
        assert_eq!(fx.store.list_groups().unwrap().len(), 1);
        assert_eq!(fx.blobs.list().unwrap().len(), 1);

        let err = fx.engine.activate(&v1.group_id, &v1.version_id, "x").unwrap_err();
        assert!(matches!(err, EngineError::LockedProject(_)));
        assert_eq!(fx.engine.project_versions(&fx.project.id).unwrap().len(), 1);

        fx.engine.set_project_locked(&fx.project.id, false).unwrap();
        fx.upload("structural", &pdf("after")).await;
    }

    #[tokio::test]
    async fn invalid_format_touches_nothing() {
        let fx = fixture();
        for (name, body) in [
            ("plan.pdf", b"not a pdf".to_vec()),
            ("plan.exe", pdf("exe")),
            ("plan.pdf", Vec::new()),
        ] {
            let req = fx.request("villa_plan", name, &body);
            let staged = req.temp_path.clone();
            let err = fx.engine.upload(req).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidFormat(_)), "{name}: {err}");
            assert!(!staged.exists());
        }
        assert!(fx.store.list_groups().unwrap().is_empty());
        assert!(fx.blobs.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let fx = fixture();
        let mut req = fx.request("villa_plan", "plan.pdf", &pdf("x"));
        req.project_id = ProjectId::new();
        let err = fx.engine.upload(req).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    /// Blob store whose commits always fail.
    struct FailingBlobs;

    impl BlobStore for FailingBlobs {
        fn commit(&self, _: &Path, _: &BlobTarget, _: &str, _: ArtifactFormat) -> BlobResult<CommittedBlob> {
            Err(BlobError::Io(std::io::Error::other("disk full")))
        }
        fn read(&self, path: &Path) -> BlobResult<Vec<u8>> {
            Err(BlobError::NotFound(path.to_path_buf()))
        }
        fn exists(&self, _: &Path) -> BlobResult<bool> {
            Ok(false)
        }
        fn verify(&self, path: &Path, _: &ContentDigest) -> BlobResult<()> {
            Err(BlobError::NotFound(path.to_path_buf()))
        }
        fn list(&self) -> BlobResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn storage_failure_releases_the_reservation() {
        let fx = fixture();
        let engine = VersioningEngine::new(
            fx.store.clone(),
            Arc::new(FailingBlobs),
            Arc::new(AcceptAllHook),
            EngineConfig::default(),
        );
        let req = fx.request("villa_plan", "plan.pdf", &pdf("x"));
        let staged = req.temp_path.clone();
        let err = engine.upload(req).await.unwrap_err();
        assert!(matches!(err, EngineError::StorageFailure(_)));
        assert!(err.is_retryable());
        assert!(!staged.exists());

        let group = fx.store.list_groups().unwrap().remove(0);
        assert_eq!(group.current_version, 0);
        assert!(fx.store.list_versions().unwrap().is_empty());

        // The next good upload takes number 1.
        assert_eq!(fx.upload("villa_plan", &pdf("ok")).await.version_number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_number_densely_with_one_active() {
        let fx = fixture();
        let requests: Vec<UploadRequest> = (0..8)
            .map(|i| fx.request("villa_plan", "plan.pdf", &pdf(&format!("c{i}"))))
            .collect();
        let handles: Vec<_> = requests
            .into_iter()
            .map(|req| {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.upload(req).await.unwrap() })
            })
            .collect();
        let mut numbers = Vec::new();
        for h in handles {
            numbers.push(h.await.unwrap().version_number);
        }
        numbers.sort();
        assert_eq!(numbers, (1..=8).collect::<Vec<u64>>());

        let group = fx.store.list_groups().unwrap();
        assert_eq!(group.len(), 1);
        let versions = fx.engine.group_versions(&group[0].id).unwrap();
        let active: Vec<u64> = versions.iter().filter(|v| v.is_active).map(|v| v.number).collect();
        assert_eq!(active, vec![8]);
    }

    /// Fails until switched on.
    struct FlakyHook {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl ValidationHook for FlakyHook {
        async fn review(&self, version: &Version) -> EngineResult<ReviewOutcome> {
            if self.healthy.load(Ordering::SeqCst) {
                AcceptAllHook.review(version).await
            } else {
                Err(EngineError::Internal("review service unavailable".into()))
            }
        }
    }

    #[tokio::test]
    async fn hook_failure_is_recorded_and_revalidation_recovers() {
        let hook = Arc::new(FlakyHook { healthy: AtomicBool::new(false) });
        let fx = fixture_with(hook.clone(), ValidationMode::Inline);
        let receipt = fx.upload("villa_plan", &pdf("x")).await;
        assert_eq!(receipt.processing_status, ProcessingStatus::Failed);
        assert!(receipt.is_active);
        let failed = fx.engine.version(&receipt.version_id).unwrap();
        assert!(failed.failure_reason.unwrap().contains("unavailable"));

        hook.healthy.store(true, Ordering::SeqCst);
        let done = fx.engine.revalidate(&receipt.version_id, "ops").await.unwrap();
        assert_eq!(done.processing_status, ProcessingStatus::Done);
        assert!(done.failure_reason.is_none());
        assert_eq!(done.file, failed.file);
    }

    #[tokio::test]
    async fn background_validation_completes_after_upload_returns() {
        let fx = fixture_with(Arc::new(AcceptAllHook), ValidationMode::Background);
        let receipt = fx.upload("villa_plan", &pdf("bg")).await;
        assert_eq!(receipt.processing_status, ProcessingStatus::Queued);

        let mut status = receipt.processing_status;
        for _ in 0..200 {
            status = fx.engine.version(&receipt.version_id).unwrap().processing_status;
            if status == ProcessingStatus::Done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, ProcessingStatus::Done);
    }

    /// Never finishes.
    struct HangingHook;

    #[async_trait]
    impl ValidationHook for HangingHook {
        async fn review(&self, _version: &Version) -> EngineResult<ReviewOutcome> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stuck_versions_can_be_failed() {
        let fx = fixture_with(Arc::new(HangingHook), ValidationMode::Background);
        let receipt = fx.upload("villa_plan", &pdf("stuck")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(fx.engine.stuck_versions(Duration::from_secs(3600)).unwrap().is_empty());
        let stuck = fx.engine.stuck_versions(Duration::ZERO).unwrap();
        assert_eq!(stuck.iter().map(|v| v.id).collect::<Vec<_>>(), vec![receipt.version_id]);

        let failed = fx.engine.fail_stuck(Duration::ZERO, "validator timeout", "ops").unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].processing_status, ProcessingStatus::Failed);
        assert!(fx.engine.stuck_versions(Duration::ZERO).unwrap().is_empty());
        // The version itself survives and stays active.
        assert!(fx.engine.version(&receipt.version_id).unwrap().is_active);
    }

    #[tokio::test]
    async fn activating_another_groups_version_is_not_found() {
        let fx = fixture();
        let plan = fx.upload("villa_plan", &pdf("plan")).await;
        let frame = fx.upload("structural", &pdf("frame")).await;
        let err = fx
            .engine
            .activate(&plan.group_id, &frame.version_id, "x")
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(fx.engine.version(&frame.version_id).unwrap().is_active);
        assert!(fx.engine.version(&plan.version_id).unwrap().is_active);
    }

    #[tokio::test]
    async fn digest_check_hook_approves_intact_blobs() {
        let dir_blobs = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::open(dir_blobs.path()).unwrap());
        let hook = DigestCheckHook::new(blobs.clone());
        let fx = fixture_with(Arc::new(AcceptAllHook), ValidationMode::Inline);
        let receipt = fx.upload("villa_plan", &pdf("intact")).await;
        let version = fx.engine.version(&receipt.version_id).unwrap();

        // Different root: the blob is outside this store's tree.
        assert!(hook.review(&version).await.is_err());

        let own = DigestCheckHook::new(fx.blobs.clone());
        let outcome = own.review(&version).await.unwrap();
        assert!(outcome.decision.is_approved());
        assert_eq!(outcome.details["digest"], receipt.digest.to_hex());
    }

    #[tokio::test]
    async fn upload_after_repairing_a_gap_takes_the_next_dense_number() {
        let fx = fixture();
        let a = fx.upload("villa_plan", &pdf("a")).await;
        // A failed commit whose reservation could not be given back.
        fx.store.increment_version_counter(&a.group_id).unwrap();
        let b = fx.upload("villa_plan", &pdf("b")).await;
        assert_eq!(b.version_number, 3);

        let report = Repairer::new(fx.store.clone()).run(false).unwrap();
        assert_eq!(report.resequenced_groups, 1);
        assert!(report.after.unwrap().is_valid());
        assert_eq!(fx.engine.version(&b.version_id).unwrap().number, 2);

        // v3's directory still holds b's blob; new uploads land beside it.
        for expected in 3..=5 {
            let next = fx.upload("villa_plan", &pdf(&format!("n{expected}"))).await;
            assert_eq!(next.version_number, expected);
            assert!(next.is_active);
        }
        let numbers: Vec<u64> = fx
            .engine
            .group_versions(&a.group_id)
            .unwrap()
            .iter()
            .map(|v| v.number)
            .collect();
        assert_eq!(numbers, vec![5, 4, 3, 2, 1]);
        assert_eq!(fx.blobs.list().unwrap().len(), 5);
        let b = fx.engine.version(&b.version_id).unwrap();
        fx.blobs.verify(&b.file.stored_path, &b.file.digest).unwrap();
    }

    #[tokio::test]
    async fn upload_after_repairing_counter_drift_takes_the_next_dense_number() {
        let fx = fixture();
        let a = fx.upload("villa_plan", &pdf("a")).await;
        fx.upload("villa_plan", &pdf("b")).await;
        for _ in 0..3 {
            fx.store.increment_version_counter(&a.group_id).unwrap();
        }

        let report = Repairer::new(fx.store.clone()).run(false).unwrap();
        assert_eq!(report.counters_reset, 1);
        assert_eq!(fx.store.get_group(&a.group_id).unwrap().unwrap().current_version, 2);

        let next = fx.upload("villa_plan", &pdf("c")).await;
        assert_eq!(next.version_number, 3);
        assert!(next.is_active);
        assert!(Repairer::new(fx.store.clone()).diagnose().unwrap().is_valid());
    }

    /// Record store whose audit log rejects every append.
    struct AuditDownStore {
        inner: LocalRecordStore,
    }

    impl RecordStore for AuditDownStore {
        fn insert_project(&self, project: &Project) -> LedgerResult<()> {
            self.inner.insert_project(project)
        }
        fn get_project(&self, id: &ProjectId) -> LedgerResult<Option<Project>> {
            self.inner.get_project(id)
        }
        fn list_projects(&self) -> LedgerResult<Vec<Project>> {
            self.inner.list_projects()
        }
        fn set_project_status(&self, id: &ProjectId, status: ProjectStatus, at: Timestamp) -> LedgerResult<Project> {
            self.inner.set_project_status(id, status, at)
        }
        fn upsert_group(&self, project_id: &ProjectId, discipline: &Discipline, at: Timestamp) -> LedgerResult<Group> {
            self.inner.upsert_group(project_id, discipline, at)
        }
        fn insert_group(&self, group: &Group) -> LedgerResult<()> {
            self.inner.insert_group(group)
        }
        fn touch_group(&self, id: &GroupId, at: Timestamp) -> LedgerResult<Group> {
            self.inner.touch_group(id, at)
        }
        fn get_group(&self, id: &GroupId) -> LedgerResult<Option<Group>> {
            self.inner.get_group(id)
        }
        fn find_group(&self, project_id: &ProjectId, discipline: &Discipline) -> LedgerResult<Option<Group>> {
            self.inner.find_group(project_id, discipline)
        }
        fn list_groups(&self) -> LedgerResult<Vec<Group>> {
            self.inner.list_groups()
        }
        fn increment_version_counter(&self, id: &GroupId) -> LedgerResult<u64> {
            self.inner.increment_version_counter(id)
        }
        fn release_version_counter(&self, id: &GroupId, number: u64) -> LedgerResult<bool> {
            self.inner.release_version_counter(id, number)
        }
        fn insert_version(&self, version: &Version) -> LedgerResult<()> {
            self.inner.insert_version(version)
        }
        fn get_version(&self, id: &VersionId) -> LedgerResult<Option<Version>> {
            self.inner.get_version(id)
        }
        fn versions_for_group(&self, id: &GroupId) -> LedgerResult<Vec<Version>> {
            self.inner.versions_for_group(id)
        }
        fn versions_for_project(&self, id: &ProjectId) -> LedgerResult<Vec<Version>> {
            self.inner.versions_for_project(id)
        }
        fn list_versions(&self) -> LedgerResult<Vec<Version>> {
            self.inner.list_versions()
        }
        fn activate_version(&self, request: &ActivationRequest) -> LedgerResult<ActivationOutcome> {
            self.inner.activate_version(request)
        }
        fn update_processing(&self, id: &VersionId, update: &ProcessingUpdate) -> LedgerResult<Version> {
            self.inner.update_processing(id, update)
        }
        fn append_audit(&self, _: &AuditEntry) -> LedgerResult<()> {
            Err(LedgerError::Persistence("audit log unavailable".into()))
        }
        fn audit_entries(&self) -> LedgerResult<Vec<AuditEntry>> {
            self.inner.audit_entries()
        }
        fn constraints(&self) -> LedgerResult<ConstraintSet> {
            self.inner.constraints()
        }
        fn install_constraint(&self, constraint: Constraint) -> LedgerResult<bool> {
            self.inner.install_constraint(constraint)
        }
        fn apply_repair(&self, batch: &RepairBatch) -> LedgerResult<()> {
            self.inner.apply_repair(batch)
        }
    }

    #[tokio::test]
    async fn audit_failure_still_leaves_the_upload_active() {
        let fx = fixture();
        let store = Arc::new(AuditDownStore {
            inner: LocalRecordStore::new(),
        });
        let engine = VersioningEngine::new(
            store.clone(),
            fx.blobs.clone(),
            Arc::new(AcceptAllHook),
            EngineConfig::default(),
        );
        let project = engine.create_project("owner@example.com").unwrap();
        let mut req = fx.request("villa_plan", "plan.pdf", &pdf("x"));
        req.project_id = project.id;

        let receipt = engine.upload(req).await.unwrap();
        assert_eq!(receipt.version_number, 1);
        assert!(receipt.is_active);
        assert!(engine.version(&receipt.version_id).unwrap().is_active);
        assert!(store.audit_entries().unwrap().is_empty());
    }
}
