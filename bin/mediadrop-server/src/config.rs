//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use mediadrop_core::{ArtifactPolicy, ExtractorConfig, ServiceConfig};

/// Runtime configuration for mediadrop-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// Root holding one directory per task (default: `<tmp>/smd_downloads`).
    pub download_dir: PathBuf,

    /// Extractor executable (default: `yt-dlp` from `PATH`).
    pub ytdlp_path: PathBuf,

    /// Cookie jar passed to the extractor when the file exists.
    pub cookies_file: Option<PathBuf>,

    /// Per-task wall clock limit in seconds; `0` disables it.
    pub task_timeout_secs: u64,

    /// Limit for `POST /v1/info` in seconds.
    pub probe_timeout_secs: u64,

    /// Which artifact a completed poll reports.
    pub artifact_policy: ArtifactPolicy,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily rolling log file, in addition to stdout.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("MEDIADROP_BIND", "0.0.0.0:3000"),
            download_dir: env_opt("MEDIADROP_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("smd_downloads")),
            ytdlp_path: PathBuf::from(env_or("MEDIADROP_YTDLP", "yt-dlp")),
            cookies_file: env_opt("MEDIADROP_COOKIES_FILE").map(PathBuf::from),
            task_timeout_secs: parse_env("MEDIADROP_TASK_TIMEOUT_SECS", 0),
            probe_timeout_secs: parse_env("MEDIADROP_PROBE_TIMEOUT_SECS", 60),
            artifact_policy: parse_env("MEDIADROP_ARTIFACT_POLICY", ArtifactPolicy::First),
            cors_allowed_origins: env_opt("MEDIADROP_CORS_ORIGINS"),
            enable_swagger: flag("MEDIADROP_ENABLE_SWAGGER", true),
            log_level: env_or("MEDIADROP_LOG", "info"),
            log_json: flag("MEDIADROP_LOG_JSON", false),
            log_dir: env_opt("MEDIADROP_LOG_DIR").map(PathBuf::from),
        }
    }

    /// The part of the configuration the task service cares about.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            download_root: self.download_dir.clone(),
            extractor: ExtractorConfig {
                program: self.ytdlp_path.clone(),
                cookies_file: self.cookies_file.clone(),
                ..ExtractorConfig::default()
            },
            task_timeout: (self.task_timeout_secs > 0)
                .then(|| Duration::from_secs(self.task_timeout_secs)),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            artifact_policy: self.artifact_policy,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
