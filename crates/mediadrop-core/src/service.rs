//! The task service: one entry point per operation exposed over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::delivery::{self, ServedFile};
use crate::detector::{self, TaskProgress};
use crate::error::TaskError;
use crate::launcher::{Extractor, ExtractorConfig};
use crate::probe::MediaInfo;
use crate::record::{self, Outcome};
use crate::storage::DownloadRoot;
use crate::supervisor::{Supervisor, TaskRegistry};
use crate::types::{ArtifactPolicy, MediaKind, TaskId, TaskRecord, TaskStatus};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub download_root: PathBuf,
    pub extractor: ExtractorConfig,
    /// Wall-clock limit per extraction; `None` lets it run indefinitely.
    pub task_timeout: Option<Duration>,
    pub probe_timeout: Duration,
    pub artifact_policy: ArtifactPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            download_root: std::env::temp_dir().join("smd_downloads"),
            extractor: ExtractorConfig::default(),
            task_timeout: None,
            probe_timeout: Duration::from_secs(60),
            artifact_policy: ArtifactPolicy::default(),
        }
    }
}

/// Reply to a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submitted {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

#[derive(Debug)]
pub struct TaskService {
    root: DownloadRoot,
    extractor: Extractor,
    supervisor: Supervisor,
    probe_timeout: Duration,
    policy: ArtifactPolicy,
}

impl TaskService {
    pub fn new(config: ServiceConfig) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        Self {
            root: DownloadRoot::new(config.download_root),
            extractor: Extractor::new(config.extractor),
            supervisor: Supervisor::new(registry, config.task_timeout),
            probe_timeout: config.probe_timeout,
            policy: config.artifact_policy,
        }
    }

    pub fn root(&self) -> &DownloadRoot {
        &self.root
    }

    /// Create the downloads root if needed.
    pub async fn init(&self) -> Result<(), TaskError> {
        self.root.ensure().await
    }

    /// Start downloading `url` into a fresh task directory.
    ///
    /// The record is written before the process starts, so the supervisor
    /// always has a record to finish.
    pub async fn submit(&self, url: &str, kind: MediaKind) -> Result<Submitted, TaskError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TaskError::InvalidUrl);
        }

        let (task_id, dir) = self.root.allocate(None).await?;
        let rec = TaskRecord::new(task_id.clone(), url, kind);
        record::write(&dir, &rec).await?;

        let child = match self.extractor.spawn(url, kind, &dir) {
            Ok(child) => child,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "extractor failed to launch");
                let outcome = Outcome {
                    status: TaskStatus::Error,
                    exit_code: None,
                    error: Some("failed to start extractor".into()),
                };
                if let Err(err) = record::finish(&dir, outcome).await {
                    warn!(task_id = %task_id, error = %err, "failed to record launch failure");
                }
                return Err(e);
            }
        };
        self.supervisor.watch(&task_id, dir, child)?;

        info!(task_id = %task_id, %url, %kind, "task submitted");
        Ok(Submitted { task_id, status: rec.status })
    }

    pub async fn poll(&self, raw_task_id: &str) -> Result<TaskProgress, TaskError> {
        let (task_id, dir) = self.root.locate(raw_task_id)?;
        let live = self.supervisor.registry().percent(&task_id);
        detector::inspect(&dir, self.policy, live).await
    }

    pub async fn open(&self, raw_task_id: &str, raw_file: &str) -> Result<ServedFile, TaskError> {
        delivery::resolve(&self.root, raw_task_id, raw_file).await
    }

    /// Ask a running task to stop. `Ok(false)` means nothing was running.
    pub fn cancel(&self, raw_task_id: &str) -> Result<bool, TaskError> {
        let task_id = TaskId::parse(raw_task_id)?;
        let registry = self.supervisor.registry();
        let pid = registry.pid(&task_id);
        let cancelled = registry.cancel(&task_id);
        if cancelled {
            info!(task_id = %task_id, pid, "cancel requested");
        }
        Ok(cancelled)
    }

    pub async fn probe(&self, url: &str) -> Result<MediaInfo, TaskError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TaskError::InvalidUrl);
        }
        self.extractor.probe(url, self.probe_timeout).await
    }

    /// Number of extractors currently supervised.
    pub fn running(&self) -> usize {
        self.supervisor.registry().len()
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use crate::testing::fake_extractor;
    use tracing_test::traced_test;

    fn service(tmp: &tempfile::TempDir, script: &str) -> TaskService {
        let program = fake_extractor(tmp.path(), script);
        TaskService::new(ServiceConfig {
            download_root: tmp.path().join("downloads"),
            extractor: ExtractorConfig { program, ..ExtractorConfig::default() },
            ..ServiceConfig::default()
        })
    }

    async fn settle(service: &TaskService, id: &str) -> TaskProgress {
        for _ in 0..200 {
            let progress = service.poll(id).await.unwrap();
            if service.running() == 0 && progress.status != TaskStatus::Downloading {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("task {id} did not settle");
    }

    #[tokio::test]
    async fn submit_then_download_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(&tmp, "printf 'media-bytes' > video.mp4");

        let submitted = service
            .submit("  https://youtube.com/watch?v=abc ", MediaKind::Video)
            .await
            .unwrap();
        let id = submitted.task_id.as_str().to_owned();
        assert!(id.starts_with("dl_"));
        assert!(id[3..].bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_'));
        assert_eq!(submitted.status, TaskStatus::Downloading);

        let progress = settle(&service, &id).await;
        assert_eq!(progress.status, TaskStatus::Complete);
        assert_eq!(progress.filename.as_deref(), Some("video.mp4"));

        let served = service.open(&id, "video.mp4").await.unwrap();
        assert_eq!(served.len, "media-bytes".len() as u64);
        assert_eq!(std::fs::read(&served.path).unwrap(), b"media-bytes");

        let rec = record::read(&service.root().dir_of(&submitted.task_id)).await.unwrap().unwrap();
        assert_eq!(rec.url, "https://youtube.com/watch?v=abc");
    }

    #[tokio::test]
    async fn empty_url_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(&tmp, "exit 0");
        assert!(matches!(
            service.submit("   ", MediaKind::Audio).await,
            Err(TaskError::InvalidUrl)
        ));
        assert!(!service.root().path().exists());
    }

    #[tokio::test]
    async fn launch_failure_is_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let service = TaskService::new(ServiceConfig {
            download_root: tmp.path().join("downloads"),
            extractor: ExtractorConfig {
                program: tmp.path().join("missing-ytdlp"),
                ..ExtractorConfig::default()
            },
            ..ServiceConfig::default()
        });

        let err = service.submit("https://example.com/v", MediaKind::Video).await.unwrap_err();
        assert!(matches!(err, TaskError::Launch { .. }));

        let dirs: Vec<_> = std::fs::read_dir(service.root().path()).unwrap().collect();
        assert_eq!(dirs.len(), 1);
        let name = dirs[0].as_ref().unwrap().file_name().into_string().unwrap();
        let progress = service.poll(&name).await.unwrap();
        assert_eq!(progress.status, TaskStatus::Error);
        assert_eq!(progress.error.as_deref(), Some("failed to start extractor"));
    }

    #[tokio::test]
    async fn failed_extraction_reports_error() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(&tmp, "echo 'ERROR: Video unavailable' >&2\nexit 1");

        let submitted = service.submit("https://example.com/v", MediaKind::Video).await.unwrap();
        let progress = settle(&service, submitted.task_id.as_str()).await;
        assert_eq!(progress.status, TaskStatus::Error);
        assert_eq!(progress.error.as_deref(), Some("ERROR: Video unavailable"));
    }

    #[tokio::test]
    #[traced_test]
    async fn cancel_stops_a_running_task() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(&tmp, "echo '[download]  10.0% of 5MiB'\nexec sleep 30");

        let submitted = service.submit("https://example.com/v", MediaKind::Video).await.unwrap();
        let id = submitted.task_id.as_str().to_owned();

        let mut percent = None;
        for _ in 0..200 {
            percent = service.poll(&id).await.unwrap().percent;
            if percent == Some(10.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(percent, Some(10.0));

        let pid = service.supervisor.registry().pid(&submitted.task_id).unwrap();
        assert!(service.cancel(&id).unwrap());
        assert!(logs_contain(&format!("pid={pid}")));
        let progress = settle(&service, &id).await;
        assert_eq!(progress.status, TaskStatus::Error);
        assert_eq!(progress.error.as_deref(), Some("cancelled"));
        assert!(!service.cancel(&id).unwrap());
    }

    #[tokio::test]
    async fn unknown_and_invalid_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(&tmp, "exit 0");
        assert_eq!(
            service.poll("dl_0000000000000000").await.unwrap(),
            TaskProgress::not_found()
        );
        assert!(matches!(service.poll("../etc").await, Err(TaskError::InvalidTaskId)));
        assert!(matches!(service.cancel("nope"), Err(TaskError::InvalidTaskId)));
    }
}
