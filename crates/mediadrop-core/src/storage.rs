//! Per-task directories under a single downloads root.
//!
//! The directory of a task is `<root>/<task_id>` and nothing else; ids are
//! validated before they ever reach a path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::TaskError;
use crate::types::TaskId;

/// Attempts at finding an unused generated id before giving up.
const ALLOCATE_ATTEMPTS: usize = 4;

/// The shared downloads root. Task directories inside it are exclusive.
#[derive(Debug, Clone)]
pub struct DownloadRoot {
    root: PathBuf,
}

impl DownloadRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the root (mode 0700) if it does not exist yet.
    pub async fn ensure(&self) -> Result<(), TaskError> {
        private_dir_builder(true).create(&self.root).await?;
        Ok(())
    }

    /// Directory of an already validated id. Pure path arithmetic.
    pub fn dir_of(&self, id: &TaskId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Validate `raw` and return its directory without creating anything.
    pub fn locate(&self, raw: &str) -> Result<(TaskId, PathBuf), TaskError> {
        let id = TaskId::parse(raw)?;
        let dir = self.dir_of(&id);
        Ok((id, dir))
    }

    /// Allocate a task directory.
    ///
    /// With `None` a fresh id is generated and its directory must not exist
    /// yet; a collision regenerates. With `Some(raw)` the id is validated and
    /// the directory created if absent.
    pub async fn allocate(&self, raw: Option<&str>) -> Result<(TaskId, PathBuf), TaskError> {
        if let Some(raw) = raw {
            let (id, dir) = self.locate(raw)?;
            self.ensure().await?;
            private_dir_builder(false)
                .create(&dir)
                .await
                .or_else(|e| match e.kind() {
                    ErrorKind::AlreadyExists => Ok(()),
                    _ => Err(e),
                })?;
            return Ok((id, dir));
        }

        self.ensure().await?;
        for _ in 0..ALLOCATE_ATTEMPTS {
            let id = TaskId::generate();
            let dir = self.dir_of(&id);
            match private_dir_builder(false).create(&dir).await {
                Ok(()) => {
                    debug!(task_id = %id, dir = %dir.display(), "task directory created");
                    return Ok((id, dir));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(task_id = %id, "generated task id collided; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TaskError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not allocate an unused task id",
        )))
    }
}

fn private_dir_builder(recursive: bool) -> tokio::fs::DirBuilder {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
}
