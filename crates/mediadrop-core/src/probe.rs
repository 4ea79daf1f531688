//! Metadata lookup through `yt-dlp --dump-json`.

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::launcher::Extractor;

const MAX_TITLE: usize = 200;
const MAX_DESCRIPTION: usize = 500;
const MAX_OUTPUT_EXCERPT: usize = 400;

/// One video-bearing format offered by the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: u64,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: f64,
    pub format_note: String,
}

/// Summary of a media URL, suitable for showing before a download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub duration: f64,
    pub author: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub formats: Vec<FormatInfo>,
    pub url: String,
    pub platform: &'static str,
    pub upload_date: String,
    pub is_photo: bool,
}

/// Host substrings, checked in order; the first match names the platform.
const PLATFORMS: &[(&str, &[&str])] = &[
    ("tiktok", &["tiktok.com"]),
    ("douyin", &["douyin.com"]),
    ("youtube", &["youtube.com", "youtu.be"]),
    ("instagram", &["instagram.com"]),
    ("facebook", &["facebook.com", "fb.watch", "fb.com"]),
    ("twitter", &["twitter.com", "x.com"]),
    ("pinterest", &["pinterest.com", "pin.it"]),
    ("kuaishou", &["kuaishou.com", "kwai.com"]),
    ("sora", &["sora.com"]),
    ("xiaohongshu", &["xiaohongshu.com", "xhslink.com"]),
    ("threads", &["threads.net"]),
    ("linkedin", &["linkedin.com"]),
    ("reddit", &["reddit.com", "redd.it"]),
    ("bilibili", &["bilibili.com", "b23.tv"]),
    ("weibo", &["weibo.com", "weibo.cn"]),
    ("lemon8", &["lemon8"]),
    ("zhihu", &["zhihu.com"]),
    ("wechat", &["weixin.qq.com", "mp.weixin"]),
    ("pipixia", &["pipix.com", "pipixia"]),
];

/// Name the social platform a URL points at, or `"unknown"`.
pub fn detect_platform(url: &str) -> &'static str {
    let u = url.to_lowercase();
    PLATFORMS
        .iter()
        .find(|(name, needles)| {
            needles.iter().any(|n| u.contains(n))
                || (*name == "sora" && u.contains("openai.com") && u.contains("sora"))
        })
        .map(|(name, _)| *name)
        .unwrap_or("unknown")
}

/// The last stdout line that is a JSON object with a `title`.
pub fn parse_dump(output: &str) -> Option<Value> {
    output
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .find(|v| v.get("title").is_some_and(|t| !t.is_null()))
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn u64_field(v: &Value, key: &str) -> u64 {
    v.get(key)
        .and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}

fn head(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Build a [`MediaInfo`] out of a `--dump-json` document.
pub fn summarize(info: &Value, url: &str) -> MediaInfo {
    let formats = info
        .get("formats")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|f| f.get("vcodec").and_then(Value::as_str).unwrap_or("none") != "none")
                .map(|f| FormatInfo {
                    format_id: str_field(f, "format_id").unwrap_or_default(),
                    ext: str_field(f, "ext").unwrap_or_else(|| "mp4".into()),
                    resolution: str_field(f, "resolution").unwrap_or_else(|| "N/A".into()),
                    filesize: u64_field(f, "filesize"),
                    has_video: true,
                    has_audio: f.get("acodec").and_then(Value::as_str).unwrap_or("none") != "none",
                    quality: f.get("quality").and_then(Value::as_f64).unwrap_or(0.0),
                    format_note: str_field(f, "format_note").unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let thumbnail = str_field(info, "thumbnail")
        .filter(|t| !t.is_empty())
        .or_else(|| {
            info.get("thumbnails")
                .and_then(Value::as_array)
                .and_then(|list| list.last())
                .and_then(|t| str_field(t, "url"))
        })
        .unwrap_or_default();

    let duration = info.get("duration").and_then(Value::as_f64).unwrap_or(0.0);

    MediaInfo {
        title: head(&str_field(info, "title").unwrap_or_else(|| "Video".into()), MAX_TITLE),
        description: head(&str_field(info, "description").unwrap_or_default(), MAX_DESCRIPTION),
        thumbnail,
        duration,
        author: str_field(info, "uploader")
            .or_else(|| str_field(info, "channel"))
            .unwrap_or_else(|| "Unknown".into()),
        view_count: u64_field(info, "view_count"),
        like_count: u64_field(info, "like_count"),
        comment_count: u64_field(info, "comment_count"),
        formats,
        url: url.to_owned(),
        platform: detect_platform(url),
        upload_date: str_field(info, "upload_date").unwrap_or_default(),
        is_photo: duration == 0.0,
    }
}

impl Extractor {
    /// Ask the extractor for metadata about `url` without downloading it.
    pub async fn probe(&self, url: &str, timeout: Duration) -> Result<MediaInfo, TaskError> {
        let mut cmd = Command::new(&self.config().program);
        cmd.args(["--dump-json", "--no-playlist"])
            .args(self.cookie_args())
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(program = %self.config().program.display(), %url, "probing media metadata");

        let child = cmd.spawn().map_err(|source| TaskError::Launch {
            program: self.config().program.clone(),
            source,
        })?;
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                TaskError::Probe(format!(
                    "metadata probe timed out after {}s",
                    timeout.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_dump(&stdout) {
            Some(info) => Ok(summarize(&info, url)),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("{stdout}{stderr}");
                warn!(%url, status = %output.status, "metadata probe produced no usable output");
                Err(TaskError::Probe(format!(
                    "Could not parse yt-dlp output: {}",
                    head(combined.trim(), MAX_OUTPUT_EXCERPT)
                )))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[cfg(unix)]
    use crate::testing::fake_extractor;
    use serde_json::json;

    #[test]
    fn detects_platforms() {
        assert_eq!(detect_platform("https://www.youtube.com/watch?v=abc"), "youtube");
        assert_eq!(detect_platform("https://youtu.be/abc"), "youtube");
        assert_eq!(detect_platform("https://vm.TikTok.com/x"), "tiktok");
        assert_eq!(detect_platform("https://x.com/user/status/1"), "twitter");
        assert_eq!(detect_platform("https://openai.com/sora/p/1"), "sora");
        assert_eq!(detect_platform("https://b23.tv/abc"), "bilibili");
        assert_eq!(detect_platform("https://example.org/clip"), "unknown");
    }

    #[test]
    fn earlier_hosts_win_over_openai_sora() {
        assert_eq!(
            detect_platform("https://youtube.com/watch?v=1&ref=openai.com/sora"),
            "youtube"
        );
        assert_eq!(
            detect_platform("https://www.tiktok.com/@openai/video/1?q=sora"),
            "tiktok"
        );
        assert_eq!(detect_platform("https://sora.com/g/abc"), "sora");
        assert_eq!(
            detect_platform("https://www.reddit.com/r/openai.com_sora"),
            "sora"
        );
    }

    #[test]
    fn parse_dump_takes_last_titled_line() {
        let out = "WARNING: something\n{\"title\":\"first\"}\n{\"id\":1}\n{\"title\":\"last\"}\n";
        assert_eq!(parse_dump(out).unwrap()["title"], "last");
        assert!(parse_dump("ERROR: nope\n").is_none());
        assert!(parse_dump("{\"title\":null}").is_none());
    }

    #[test]
    fn summarize_maps_fields() {
        let info = json!({
            "title": "t".repeat(300),
            "description": "d",
            "thumbnails": [{"url": "https://i/1.jpg"}, {"url": "https://i/2.jpg"}],
            "duration": 12.5,
            "channel": "chan",
            "view_count": 10,
            "like_count": 2.0,
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a"},
                {"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a",
                 "resolution": "640x360", "filesize": 1234, "quality": 1, "format_note": "360p"},
                {"format_id": "137", "vcodec": "avc1"}
            ],
            "upload_date": "20260101"
        });
        let summary = summarize(&info, "https://youtube.com/watch?v=abc");

        assert_eq!(summary.title.chars().count(), MAX_TITLE);
        assert_eq!(summary.thumbnail, "https://i/2.jpg");
        assert_eq!(summary.author, "chan");
        assert_eq!(summary.view_count, 10);
        assert_eq!(summary.like_count, 2);
        assert_eq!(summary.comment_count, 0);
        assert_eq!(summary.platform, "youtube");
        assert!(!summary.is_photo);
        assert_eq!(summary.formats.len(), 2);
        assert_eq!(summary.formats[0].format_id, "18");
        assert!(summary.formats[0].has_audio);
        assert_eq!(summary.formats[0].filesize, 1234);
        assert_eq!(summary.formats[1].ext, "mp4");
        assert_eq!(summary.formats[1].resolution, "N/A");
        assert!(!summary.formats[1].has_audio);
    }

    #[test]
    fn summarize_defaults_for_photo_posts() {
        let summary = summarize(&json!({"title": "pic"}), "https://instagram.com/p/1");
        assert!(summary.is_photo);
        assert_eq!(summary.author, "Unknown");
        assert_eq!(summary.platform, "instagram");
        assert!(summary.formats.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_reports_unparseable_output() {
        use crate::launcher::ExtractorConfig;

        let tmp = tempfile::tempdir().unwrap();
        let script = fake_extractor(tmp.path(), "echo 'ERROR: Unsupported URL' >&2\nexit 1");

        let extractor =
            Extractor::new(ExtractorConfig { program: script, ..ExtractorConfig::default() });
        let err = extractor
            .probe("https://example.org/x", Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            TaskError::Probe(msg) => assert!(msg.contains("ERROR: Unsupported URL"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_parses_dump() {
        use crate::launcher::ExtractorConfig;

        let tmp = tempfile::tempdir().unwrap();
        let script = fake_extractor(
            tmp.path(),
            "echo 'progress noise'\necho '{\"title\":\"Clip\",\"duration\":3,\"uploader\":\"me\"}'",
        );

        let extractor =
            Extractor::new(ExtractorConfig { program: script, ..ExtractorConfig::default() });
        let info = extractor
            .probe("https://youtu.be/abc", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(info.title, "Clip");
        assert_eq!(info.author, "me");
        assert_eq!(info.platform, "youtube");
    }
}
