use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script into `dir` that stands in for yt-dlp.
pub(crate) fn fake_extractor(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("fake-ytdlp");
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}
