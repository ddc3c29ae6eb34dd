use serde::{Deserialize, Serialize};

/// One playable rendition of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackFile {
    pub url: String,
    /// Quality label as reported by the provider (e.g. "hd", "sd", "auto")
    pub quality: String,
    pub width: u32,
    pub height: u32,
    pub content_type: String,
}

/// Ordered set of playable variants for a ready asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackDescriptor {
    pub files: Vec<PlaybackFile>,
}

impl PlaybackDescriptor {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The `hd` rendition if present, otherwise the first one.
    pub fn best(&self) -> Option<&PlaybackFile> {
        self.files
            .iter()
            .find(|f| f.quality.eq_ignore_ascii_case("hd"))
            .or_else(|| self.files.first())
    }
}
