use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::provider_types::ProviderKind;

/// A transcoded asset that can be played back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayableAsset {
    pub asset_id: String,
    /// Duration in seconds, when the backend reports it
    pub duration: Option<f64>,
    /// Embeddable HTML snippet for the player
    pub embed_html: String,
    /// Canonical playback link
    pub link: String,
}

/// Normalized processing state of a remote asset.
///
/// Each provider maps its own status vocabulary onto these phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum AssetPhase {
    Uploading,
    Processing,
    Ready(PlayableAsset),
    Errored { detail: String },
}

impl AssetPhase {
    pub fn name(&self) -> &'static str {
        match self {
            AssetPhase::Uploading => "uploading",
            AssetPhase::Processing => "processing",
            AssetPhase::Ready(_) => "ready",
            AssetPhase::Errored { .. } => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssetPhase::Ready(_) | AssetPhase::Errored { .. })
    }
}

impl Display for AssetPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

/// Snapshot of remote processing state, re-fetched on every poll.
///
/// `session_id` and `asset_id` are distinct for providers that mint the asset
/// only after ingesting the upload; `asset_id` is `None` until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatus {
    pub provider: ProviderKind,
    pub session_id: String,
    pub asset_id: Option<String>,
    #[serde(flatten)]
    pub phase: AssetPhase,
    /// Status string exactly as the backend reported it
    pub provider_status: String,
}

impl AssetStatus {
    pub fn playable(&self) -> Option<&PlayableAsset> {
        match &self.phase {
            AssetPhase::Ready(asset) => Some(asset),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.phase {
            AssetPhase::Errored { detail } => Some(detail),
            _ => None,
        }
    }
}

/// Summary of a hosted video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub status: String,
    pub created_at: Option<String>,
    pub embed_html: Option<String>,
    pub link: Option<String>,
    pub provider: ProviderKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: Option<u64>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub has_next: bool,
}

/// First page of a provider's video listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoList {
    pub videos: Vec<VideoAsset>,
    pub pagination: Pagination,
    pub provider: ProviderKind,
}

/// Result of a delete call. Deleting an absent asset is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

impl DeleteOutcome {
    pub fn is_success(&self) -> bool {
        true
    }
}
