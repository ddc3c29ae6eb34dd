use serde::{Deserialize, Serialize};

/// Caller-supplied description of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    /// Origin allowed to write to the transfer URL from a browser
    pub cors_origin: String,
}

impl VideoMetadata {
    /// Metadata derived from a file name, the way uploads without an explicit
    /// title are described.
    pub fn from_filename(filename: &str, cors_origin: impl Into<String>) -> Self {
        let stem = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(filename);
        Self {
            title: stem.to_string(),
            description: format!("Upload of {}", filename),
            cors_origin: cors_origin.into(),
        }
    }
}

/// MIME type for a video file name, defaulting to `video/mp4`.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        "m4v" => "video/x-m4v",
        "3gp" => "video/3gpp",
        "ts" => "video/mp2t",
        _ => "video/mp4",
    }
}
