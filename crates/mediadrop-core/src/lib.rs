//! Download task orchestration: task directories, extractor processes,
//! completion detection and safe file delivery.

pub mod delivery;
pub mod detector;
pub mod error;
pub mod launcher;
pub mod probe;
pub mod progress;
pub mod record;
pub mod service;
pub mod storage;
pub mod supervisor;
pub mod types;

#[cfg(all(test, unix))]
mod testing;

pub use delivery::ServedFile;
pub use detector::TaskProgress;
pub use error::TaskError;
pub use launcher::{Extractor, ExtractorConfig};
pub use probe::{FormatInfo, MediaInfo};
pub use service::{ServiceConfig, Submitted, TaskService};
pub use storage::DownloadRoot;
pub use types::{ArtifactPolicy, MediaKind, TaskId, TaskRecord, TaskStatus};
