use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::{VideoError, VideoResult};
use crate::provider_types::ProviderKind;

/// Identity of a source file: name, size and last-modified time.
///
/// A resumed session must be fed a file with the same fingerprint as the one
/// it was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFingerprint {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
}

impl Display for FileFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} ({} bytes, modified {})",
            self.name, self.size, self.last_modified
        )
    }
}

/// One in-flight or resumable transfer.
///
/// Serialized with the camelCase field names of the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Provider-assigned session handle
    pub session_id: String,
    /// Provider-assigned target for chunk writes
    pub transfer_url: String,
    pub total_size: u64,
    /// Bytes the backend has confirmed; only ever moves forward
    pub acknowledged_offset: u64,
    pub provider: ProviderKind,
    pub file_fingerprint: FileFingerprint,
    /// Title the upload was started with
    #[serde(default)]
    pub display_name: Option<String>,
    /// Last time the record was written
    pub timestamp: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        provider: ProviderKind,
        session_id: impl Into<String>,
        transfer_url: impl Into<String>,
        file_fingerprint: FileFingerprint,
        display_name: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            transfer_url: transfer_url.into(),
            total_size: file_fingerprint.size,
            acknowledged_offset: 0,
            provider,
            file_fingerprint,
            display_name,
            timestamp: Utc::now(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.acknowledged_offset)
    }

    pub fn is_transfer_complete(&self) -> bool {
        self.acknowledged_offset >= self.total_size
    }

    /// Percentage of bytes acknowledged (0-100)
    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        self.acknowledged_offset as f64 / self.total_size as f64 * 100.0
    }

    /// Record a backend-confirmed offset.
    ///
    /// The offset must move forward and stay within `total_size`. Returns the
    /// number of newly acknowledged bytes.
    pub fn advance(&mut self, confirmed: u64) -> VideoResult<u64> {
        if confirmed > self.total_size {
            return Err(VideoError::InvalidResponse {
                provider: self.provider,
                message: format!(
                    "confirmed offset {} exceeds total size {}",
                    confirmed, self.total_size
                ),
            });
        }
        if confirmed <= self.acknowledged_offset {
            return Err(VideoError::InvalidResponse {
                provider: self.provider,
                message: format!(
                    "confirmed offset {} does not advance past {}",
                    confirmed, self.acknowledged_offset
                ),
            });
        }

        let advanced = confirmed - self.acknowledged_offset;
        self.acknowledged_offset = confirmed;
        self.timestamp = Utc::now();
        Ok(advanced)
    }

    /// Move the offset forward to what the backend reports it already holds.
    ///
    /// Offsets behind the acknowledged one are ignored. Returns true if the
    /// session changed.
    pub fn reconcile(&mut self, backend_offset: u64) -> bool {
        let target = backend_offset.min(self.total_size);
        if target > self.acknowledged_offset {
            self.acknowledged_offset = target;
            self.timestamp = Utc::now();
            true
        } else {
            false
        }
    }
}
