use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::VideoError;

/// Video hosting backends
///
/// Defined in core because it's persisted in upload sessions and used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mux,
    Vimeo,
}

impl ProviderKind {
    /// Every provider the registry can construct.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Mux, ProviderKind::Vimeo];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mux => "mux",
            ProviderKind::Vimeo => "vimeo",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mux" => Ok(ProviderKind::Mux),
            "vimeo" => Ok(ProviderKind::Vimeo),
            _ => Err(VideoError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// How a provider accepts file bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Byte-range resumable writes; every response confirms an offset.
    Resumable,
    /// One authenticated request carrying the whole payload.
    WholeFile,
}
