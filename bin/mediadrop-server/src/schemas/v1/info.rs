use mediadrop_core::{FormatInfo, MediaInfo};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FormatResponse {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub filesize: u64,
    pub has_video: bool,
    pub has_audio: bool,
    pub quality: f64,
    pub format_note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    /// Seconds; `0` for photo posts.
    pub duration: f64,
    pub author: String,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub formats: Vec<FormatResponse>,
    pub url: String,
    pub platform: String,
    pub upload_date: String,
    pub is_photo: bool,
}

impl From<FormatInfo> for FormatResponse {
    fn from(f: FormatInfo) -> Self {
        Self {
            format_id: f.format_id,
            ext: f.ext,
            resolution: f.resolution,
            filesize: f.filesize,
            has_video: f.has_video,
            has_audio: f.has_audio,
            quality: f.quality,
            format_note: f.format_note,
        }
    }
}

impl From<MediaInfo> for InfoResponse {
    fn from(info: MediaInfo) -> Self {
        Self {
            title: info.title,
            description: info.description,
            thumbnail: info.thumbnail,
            duration: info.duration,
            author: info.author,
            view_count: info.view_count,
            like_count: info.like_count,
            comment_count: info.comment_count,
            formats: info.formats.into_iter().map(Into::into).collect(),
            url: info.url,
            platform: info.platform.to_owned(),
            upload_date: info.upload_date,
            is_photo: info.is_photo,
        }
    }
}
