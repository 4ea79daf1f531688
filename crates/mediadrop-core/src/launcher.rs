//! Builds and starts the external extractor (yt-dlp) for one task.
//!
//! Arguments are always passed as a vector, never through a shell, and the URL
//! is placed after `--` so that it can never be read as an option.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::TaskError;
use crate::types::MediaKind;

/// Static description of how the extractor is invoked.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Path or name of the extractor executable.
    pub program: PathBuf,
    /// Cookie jar handed to every run when the file exists at launch time.
    pub cookies_file: Option<PathBuf>,
    /// Output template, relative to the task directory.
    pub output_template: String,
    /// `-f` selector used for [`MediaKind::Video`].
    pub video_format: String,
    /// Target codec for [`MediaKind::Audio`].
    pub audio_format: String,
    /// Target bitrate for [`MediaKind::Audio`].
    pub audio_quality: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            cookies_file: None,
            output_template: "%(title)s.%(ext)s".into(),
            video_format: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".into(),
            audio_format: "mp3".into(),
            audio_quality: "192K".into(),
        }
    }
}

/// Launches extractor processes described by an [`ExtractorConfig`].
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Cookie file arguments, only when the file is present right now.
    pub(crate) fn cookie_args(&self) -> Vec<OsString> {
        match &self.config.cookies_file {
            Some(path) if path.is_file() => vec!["--cookies".into(), path.into()],
            _ => Vec::new(),
        }
    }

    /// Argument vector for downloading `url` as `kind` into `dir`.
    pub fn build_args(&self, url: &str, kind: MediaKind, dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--newline".into()];
        match kind {
            MediaKind::Video => {
                args.push("-f".into());
                args.push(self.config.video_format.clone().into());
            }
            MediaKind::Audio => {
                args.push("-x".into());
                args.push("--audio-format".into());
                args.push(self.config.audio_format.clone().into());
                args.push("--audio-quality".into());
                args.push(self.config.audio_quality.clone().into());
            }
        }
        args.extend(self.cookie_args());
        args.push("-o".into());
        args.push(dir.join(&self.config.output_template).into_os_string());
        args.push("--".into());
        args.push(url.into());
        args
    }

    /// Start the extractor without waiting for it.
    ///
    /// stdin is closed; stdout and stderr are piped so a supervisor can
    /// follow progress and keep a diagnostic tail. The child is not killed
    /// when its handle is dropped.
    pub fn spawn(&self, url: &str, kind: MediaKind, dir: &Path) -> Result<Child, TaskError> {
        let args = self.build_args(url, kind, dir);
        debug!(program = %self.config.program.display(), ?args, "spawning extractor");

        let child = Command::new(&self.config.program)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| TaskError::Launch {
                program: self.config.program.clone(),
                source,
            })?;

        info!(pid = ?child.id(), %kind, dir = %dir.display(), "extractor started");
        Ok(child)
    }
}
