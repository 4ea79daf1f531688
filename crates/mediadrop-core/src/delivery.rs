//! Safe resolution of a requested file inside a task directory.
//!
//! The canonical path of the file must sit directly inside the canonical task
//! directory. Anything else is refused before the file is opened for reading.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::error::TaskError;
use crate::record::{RECORD_FILE, RECORD_TMP_FILE};
use crate::storage::DownloadRoot;
use crate::types::TaskId;

/// Bytes inspected when sniffing the content type.
const SNIFF_LEN: usize = 512;

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// A file cleared for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ServedFile {
    pub task_id: TaskId,
    /// Canonical path of the file.
    pub path: PathBuf,
    pub filename: String,
    pub len: u64,
    pub content_type: String,
}

impl ServedFile {
    pub fn content_disposition(&self) -> String {
        content_disposition(&self.filename)
    }
}

/// Percent-encode a URL component the way `rawurlencode` does.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// `attachment` disposition with a legacy-safe name and a UTF-8 `filename*`.
pub fn content_disposition(filename: &str) -> String {
    let legacy: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{legacy}\"; filename*=UTF-8''{}",
        encode_component(filename)
    )
}

fn has_traversal(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}

fn has_separator(name: &str) -> bool {
    name.contains(['/', '\\'])
}

/// Reduce a requested name to a bare file name.
///
/// Parent-directory segments, in the raw or percent-decoded form, are a
/// traversal attempt. Other directory parts are stripped.
///
/// A name whose percent-decoding yields a separator is refused with
/// `AccessDenied` even when a file with that literal name exists, so an
/// artifact literally named `a%2Fb.mp4` cannot be served. Other literal
/// `%` sequences pass through untouched.
pub fn sanitize_filename(raw: &str) -> Result<String, TaskError> {
    if raw.is_empty() || raw.contains('\0') {
        return Err(TaskError::InvalidFilename);
    }
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    if has_traversal(raw)
        || has_traversal(&decoded)
        || (decoded != raw && (has_separator(&decoded) || decoded.contains('\0')))
    {
        return Err(TaskError::AccessDenied);
    }
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    match base {
        "" | "." => Err(TaskError::InvalidFilename),
        ".." => Err(TaskError::AccessDenied),
        name => Ok(name.to_owned()),
    }
}

/// Resolve `raw_filename` inside the directory of `raw_task_id`.
pub async fn resolve(
    root: &DownloadRoot,
    raw_task_id: &str,
    raw_filename: &str,
) -> Result<ServedFile, TaskError> {
    let (task_id, dir) = root.locate(raw_task_id)?;
    let filename = sanitize_filename(raw_filename).inspect_err(|e| {
        if matches!(e, TaskError::AccessDenied) {
            warn!(task_id = %task_id, requested = %raw_filename, "path traversal attempt rejected");
        }
    })?;
    if filename == RECORD_FILE || filename == RECORD_TMP_FILE {
        return Err(TaskError::not_found(filename));
    }

    let base_dir = canonical(&dir, "task").await?;
    let path = canonical(&base_dir.join(&filename), &filename).await?;
    if path.parent() != Some(base_dir.as_path()) {
        warn!(
            task_id = %task_id,
            requested = %filename,
            resolved = %path.display(),
            "resolved file escapes its task directory"
        );
        return Err(TaskError::AccessDenied);
    }

    let meta = tokio::fs::metadata(&path).await?;
    if !meta.is_file() {
        return Err(TaskError::not_found(filename));
    }
    let content_type = detect_content_type(&path).await?;

    Ok(ServedFile { task_id, path, filename, len: meta.len(), content_type })
}

async fn canonical(path: &Path, what: &str) -> Result<PathBuf, TaskError> {
    match tokio::fs::canonicalize(path).await {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(TaskError::not_found(what)),
        Err(e) => Err(e.into()),
    }
}

/// Content type from the leading bytes, then from the name, then a default.
pub async fn detect_content_type(path: &Path) -> Result<String, TaskError> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    tokio::fs::File::open(path)
        .await?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await?;
    let sniffed = sniff(&head).map(str::to_owned);
    Ok(sniffed.unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_owned()
    }))
}

/// Magic-number detection for the formats an extractor usually produces.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some(match &head[8..12] {
            b"M4A " | b"M4B " => "audio/mp4",
            b"qt  " => "video/quicktime",
            _ => "video/mp4",
        });
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let probe = &head[..head.len().min(64)];
        return Some(if probe.windows(4).any(|w| w == b"webm") {
            "video/webm"
        } else {
            "video/x-matroska"
        });
    }
    if head.starts_with(b"RIFF") && head.len() >= 12 {
        match &head[8..12] {
            b"WAVE" => return Some("audio/wav"),
            b"WEBP" => return Some("image/webp"),
            b"AVI " => return Some("video/x-msvideo"),
            _ => {}
        }
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if head.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if head.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if head.starts_with(b"ID3") {
        return Some("audio/mpeg");
    }
    if head.len() >= 2 && head[0] == 0xFF {
        if head[1] & 0xF6 == 0xF0 {
            return Some("audio/aac");
        }
        if head[1] & 0xE0 == 0xE0 {
            return Some("audio/mpeg");
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record;
    use crate::types::{MediaKind, TaskRecord};
    use tracing_test::traced_test;

    const MP4_HEAD: &[u8] = b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00isomiso2avc1mp41";

    async fn setup(files: &[(&str, &[u8])]) -> (tempfile::TempDir, DownloadRoot, TaskId) {
        let tmp = tempfile::tempdir().unwrap();
        let root = DownloadRoot::new(tmp.path().join("downloads"));
        let (id, dir) = root.allocate(None).await.unwrap();
        record::write(&dir, &TaskRecord::new(id.clone(), "u", MediaKind::Video))
            .await
            .unwrap();
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
        (tmp, root, id)
    }

    #[test]
    fn sanitize_rejects_traversal() {
        for raw in [
            "../../etc/passwd",
            "..",
            "..\\..\\windows\\win.ini",
            "a/../b",
            "%2e%2e%2fetc%2fpasswd",
            "..%2f..%2fetc%2fpasswd",
            "%2e%2e",
            "video%2fmp4",
        ] {
            assert!(
                matches!(sanitize_filename(raw), Err(TaskError::AccessDenied)),
                "{raw:?} should be denied"
            );
        }
    }

    #[test]
    fn sanitize_strips_directories_and_rejects_empty() {
        assert_eq!(sanitize_filename("sub/video.mp4").unwrap(), "video.mp4");
        assert_eq!(sanitize_filename("video.mp4").unwrap(), "video.mp4");
        assert_eq!(sanitize_filename("Ünïcode title.mp4").unwrap(), "Ünïcode title.mp4");
        for raw in ["", ".", "dir/", "a\0b"] {
            assert!(
                matches!(sanitize_filename(raw), Err(TaskError::InvalidFilename)),
                "{raw:?} should be invalid"
            );
        }
    }

    #[test]
    fn disposition_carries_both_names() {
        assert_eq!(
            content_disposition("my \"clip\" é.mp4"),
            concat!(
                "attachment; filename=\"my _clip_ _.mp4\"; ",
                "filename*=UTF-8''my%20%22clip%22%20%C3%A9.mp4"
            )
        );
    }

    #[test]
    fn sniffs_common_media() {
        assert_eq!(sniff(MP4_HEAD), Some("video/mp4"));
        assert_eq!(sniff(b"\x00\x00\x00\x20ftypM4A \x00\x00"), Some("audio/mp4"));
        assert_eq!(sniff(b"ID3\x04\x00"), Some("audio/mpeg"));
        assert_eq!(sniff(&[0xFF, 0xFB, 0x90, 0x00]), Some("audio/mpeg"));
        assert_eq!(sniff(&[0xFF, 0xF1, 0x50, 0x80]), Some("audio/aac"));
        let webm = b"\x1a\x45\xdf\xa3\x9f\x42\x86\x81\x01\x42\x82\x84webm";
        assert_eq!(sniff(webm), Some("video/webm"));
        assert_eq!(sniff(b"RIFF\x00\x00\x00\x00WAVEfmt "), Some("audio/wav"));
        assert_eq!(sniff(b"plain text"), None);
    }

    #[tokio::test]
    async fn resolves_existing_file_with_sniffed_type() {
        let (_tmp, root, id) = setup(&[("video.mp4", MP4_HEAD)]).await;
        let file = resolve(&root, id.as_str(), "video.mp4").await.unwrap();
        assert_eq!(file.filename, "video.mp4");
        assert_eq!(file.len, MP4_HEAD.len() as u64);
        assert_eq!(file.content_type, "video/mp4");
        assert!(file.path.is_absolute());
    }

    #[tokio::test]
    async fn falls_back_to_extension_then_octet_stream() {
        let (_tmp, root, id) = setup(&[("notes.txt", b"hello"), ("blob", b"\x01\x02")]).await;
        let txt = resolve(&root, id.as_str(), "notes.txt").await.unwrap();
        assert_eq!(txt.content_type, "text/plain");
        let blob = resolve(&root, id.as_str(), "blob").await.unwrap();
        assert_eq!(blob.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_tmp, root, id) = setup(&[("video.mp4", b"v")]).await;
        let err = resolve(&root, id.as_str(), "nope.mp4").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (_tmp, root, _id) = setup(&[]).await;
        let err = resolve(&root, "dl_doesnotexist", "video.mp4").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_task_id_is_rejected_first() {
        let (_tmp, root, _id) = setup(&[]).await;
        let err = resolve(&root, "../dl_x", "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidTaskId));
    }

    #[tokio::test]
    #[traced_test]
    async fn traversal_is_denied_and_logged() {
        let (_tmp, root, id) = setup(&[("video.mp4", b"v")]).await;
        let err = resolve(&root, id.as_str(), "../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, TaskError::AccessDenied));
        assert!(logs_contain("path traversal attempt rejected"));
    }

    #[tokio::test]
    async fn literal_percent_names() {
        let (_tmp, root, id) = setup(&[
            ("clip%2Fpart.mp4", MP4_HEAD),
            ("clip%5Cpart.mp4", MP4_HEAD),
            ("50% off.mp4", MP4_HEAD),
        ])
        .await;
        for name in ["clip%2Fpart.mp4", "clip%5Cpart.mp4"] {
            let err = resolve(&root, id.as_str(), name).await.unwrap_err();
            assert!(matches!(err, TaskError::AccessDenied), "{name:?} should be denied");
        }
        let served = resolve(&root, id.as_str(), "50% off.mp4").await.unwrap();
        assert_eq!(served.filename, "50% off.mp4");
    }

    #[tokio::test]
    async fn state_record_is_not_served() {
        let (_tmp, root, id) = setup(&[]).await;
        let err = resolve(&root, id.as_str(), "task.json").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn directory_entry_is_not_found() {
        let (_tmp, root, id) = setup(&[]).await;
        std::fs::create_dir(root.dir_of(&id).join("sub")).unwrap();
        let err = resolve(&root, id.as_str(), "sub").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_denied() {
        let (tmp, root, id) = setup(&[]).await;
        let secret = tmp.path().join("secret.txt");
        std::fs::write(&secret, b"top secret").unwrap();
        std::os::unix::fs::symlink(&secret, root.dir_of(&id).join("video.mp4")).unwrap();

        let err = resolve(&root, id.as_str(), "video.mp4").await.unwrap_err();
        assert!(matches!(err, TaskError::AccessDenied));
    }

    #[tokio::test]
    async fn other_tasks_files_are_invisible() {
        let (_tmp, root, a) = setup(&[("a-only.mp4", b"a")]).await;
        let (b, dir_b) = root.allocate(None).await.unwrap();
        record::write(&dir_b, &TaskRecord::new(b.clone(), "u", MediaKind::Video))
            .await
            .unwrap();

        assert!(resolve(&root, a.as_str(), "a-only.mp4").await.is_ok());
        let err = resolve(&root, b.as_str(), "a-only.mp4").await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }
}
