//! Infers a task's status from its record and directory contents.
//!
//! Evaluated fresh on every poll and never writes anything.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::TaskError;
use crate::record::{self, RECORD_FILE, RECORD_TMP_FILE};
use crate::types::{ArtifactPolicy, TaskStatus};

/// Role of a single file inside a task directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// The state record or its scratch copy.
    Record,
    /// A download still being written (`.part`, `.ytdl`, fragments).
    Partial,
    /// Post-processing input that will be merged or converted away.
    Intermediate,
    /// A finished output.
    Artifact,
}

/// Classify a file name found in a task directory.
pub fn classify(name: &str) -> FileClass {
    if name == RECORD_FILE || name == RECORD_TMP_FILE {
        return FileClass::Record;
    }
    if name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag") {
        return FileClass::Partial;
    }
    if name.contains(".temp.") || is_format_fragment(name) {
        return FileClass::Intermediate;
    }
    FileClass::Artifact
}

/// `Title.f137.mp4`: a single-format stream waiting to be merged.
fn is_format_fragment(name: &str) -> bool {
    let segments: Vec<&str> = name.split('.').collect();
    if segments.len() < 3 {
        return false;
    }
    segments[1..segments.len() - 1].iter().any(|seg| {
        seg.strip_prefix('f')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Answer to a single poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgress {
    pub status: TaskStatus,
    /// Known only while downloading or processing.
    pub percent: Option<f32>,
    /// The selected final artifact, when complete.
    pub filename: Option<String>,
    /// Every artifact in name order.
    pub artifacts: Vec<String>,
    pub error: Option<String>,
}

impl TaskProgress {
    pub fn not_found() -> Self {
        Self::with_status(TaskStatus::NotFound)
    }

    fn with_status(status: TaskStatus) -> Self {
        Self { status, percent: None, filename: None, artifacts: Vec::new(), error: None }
    }
}

#[derive(Debug, Default)]
struct Listing {
    /// Artifacts sorted by name, with their sizes.
    artifacts: Vec<(String, u64)>,
    partials: usize,
    intermediates: usize,
}

/// The extractor renames and deletes files while we list; an entry that is
/// gone by the time we look at it is simply skipped.
fn vanished(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::NotFound
}

async fn scan(dir: &Path, policy: ArtifactPolicy) -> Result<Listing, TaskError> {
    let mut listing = Listing::default();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_type().await {
            Ok(ft) if ft.is_file() => {}
            Ok(_) => continue,
            Err(e) if vanished(&e) => continue,
            Err(e) => return Err(e.into()),
        }
        let Ok(name) = entry.file_name().into_string() else {
            debug!(dir = %dir.display(), "skipping non UTF-8 file name");
            continue;
        };
        match classify(&name) {
            FileClass::Record => {}
            FileClass::Partial => listing.partials += 1,
            FileClass::Intermediate => listing.intermediates += 1,
            FileClass::Artifact => {
                // Sizes only matter when choosing the largest artifact.
                let len = match policy {
                    ArtifactPolicy::First => 0,
                    ArtifactPolicy::Largest => match entry.metadata().await {
                        Ok(meta) => meta.len(),
                        Err(e) if vanished(&e) => continue,
                        Err(e) => return Err(e.into()),
                    },
                };
                listing.artifacts.push((name, len));
            }
        }
    }
    listing.artifacts.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(listing)
}

/// Pick the surfaced artifact according to `policy`.
pub fn select_artifact(artifacts: &[(String, u64)], policy: ArtifactPolicy) -> Option<&str> {
    let chosen = match policy {
        ArtifactPolicy::First => artifacts.first(),
        ArtifactPolicy::Largest => {
            artifacts
                .iter()
                .fold(None, |best: Option<&(String, u64)>, item| match best {
                    Some(b) if b.1 >= item.1 => Some(b),
                    _ => Some(item),
                })
        }
    };
    chosen.map(|(name, _)| name.as_str())
}

/// Inspect `dir` and report the task status.
///
/// `live_percent` is `Some` while the registry knows a running extractor for
/// this task; without it the directory contents alone decide.
pub async fn inspect(
    dir: &Path,
    policy: ArtifactPolicy,
    live_percent: Option<f32>,
) -> Result<TaskProgress, TaskError> {
    let Some(rec) = record::read(dir).await? else {
        return Ok(TaskProgress::not_found());
    };
    let listing = scan(dir, policy).await?;
    let artifacts: Vec<String> = listing.artifacts.iter().map(|(n, _)| n.clone()).collect();
    let selected = select_artifact(&listing.artifacts, policy).map(str::to_owned);

    let progress = match rec.status {
        TaskStatus::Error => TaskProgress {
            error: Some(rec.error.unwrap_or_else(|| "extraction failed".into())),
            artifacts,
            ..TaskProgress::with_status(TaskStatus::Error)
        },
        TaskStatus::Complete => match selected {
            Some(name) => TaskProgress {
                filename: Some(name),
                artifacts,
                ..TaskProgress::with_status(TaskStatus::Complete)
            },
            None => TaskProgress {
                error: Some("extractor exited without producing a file".into()),
                ..TaskProgress::with_status(TaskStatus::Error)
            },
        },
        _ => match live_percent {
            Some(percent) => {
                let settling = listing.partials == 0
                    && (!listing.artifacts.is_empty() || listing.intermediates > 0);
                let status = if settling {
                    TaskStatus::Processing
                } else {
                    TaskStatus::Downloading
                };
                TaskProgress {
                    percent: Some(percent),
                    artifacts,
                    ..TaskProgress::with_status(status)
                }
            }
            None => match selected {
                Some(name) => TaskProgress {
                    filename: Some(name),
                    artifacts,
                    ..TaskProgress::with_status(TaskStatus::Complete)
                },
                None if listing.intermediates > 0 && listing.partials == 0 => TaskProgress {
                    percent: Some(0.0),
                    ..TaskProgress::with_status(TaskStatus::Processing)
                },
                None => TaskProgress {
                    percent: Some(0.0),
                    ..TaskProgress::with_status(TaskStatus::Downloading)
                },
            },
        },
    };
    Ok(progress)
}
