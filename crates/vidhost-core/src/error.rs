//! Error types module
//!
//! Every failure surfaced by the provider clients, the transfer engine and the
//! status poller is a `VideoError`. The variant is the error *kind* and is
//! preserved unchanged as it propagates up to the orchestrator's caller.

use std::io;

use crate::provider_types::ProviderKind;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like lookups before an asset exists
    Debug,
    /// Warning level - for recoverable issues like timeouts
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to a caller.
pub trait ErrorMetadata {
    /// HTTP status code a routing layer should answer with
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "FILE_MISMATCH")
    fn error_code(&self) -> &'static str;

    /// Whether the caller may retry the same operation later
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the caller
    fn suggested_action(&self) -> Option<&'static str>;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Unsupported video provider: {0}")]
    UnsupportedProvider(String),

    #[error("{provider} rejected upload session ({status}): {body}")]
    RemoteRejected {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{provider} rejected transfer ({status}): {body}")]
    TransferRejected {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("Transfer failed after {attempts} attempts at offset {offset}")]
    TransferFailed {
        attempts: u32,
        offset: u64,
        #[source]
        source: Box<VideoError>,
    },

    #[error("File does not match the persisted session: expected {expected}, got {actual}")]
    FileMismatch { expected: String, actual: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Processing of {id} did not finish within {waited_secs}s")]
    ProcessingTimeout { id: String, waited_secs: u64 },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type used across the workspace
pub type VideoResult<T> = Result<T, VideoError>;

impl From<serde_json::Error> for VideoError {
    fn from(err: serde_json::Error) -> Self {
        VideoError::SessionStore(format!("JSON error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn video_error_static_metadata(
    err: &VideoError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        VideoError::UnsupportedProvider(_) => (
            "UNSUPPORTED_PROVIDER",
            false,
            Some("Use one of the supported providers"),
            LogLevel::Debug,
        ),
        VideoError::RemoteRejected { .. } => (
            "REMOTE_REJECTED",
            false,
            Some("Check provider credentials and quota"),
            LogLevel::Error,
        ),
        VideoError::TransferRejected { .. } => (
            "TRANSFER_REJECTED",
            true,
            Some("Resume the upload from the persisted session"),
            LogLevel::Warn,
        ),
        VideoError::TransferFailed { .. } => (
            "TRANSFER_FAILED",
            true,
            Some("Resume the upload from the persisted session"),
            LogLevel::Error,
        ),
        VideoError::FileMismatch { .. } => (
            "FILE_MISMATCH",
            false,
            Some("Start a new upload for this file"),
            LogLevel::Warn,
        ),
        VideoError::NotFound(_) => (
            "NOT_FOUND",
            true,
            Some("Verify the id or retry later"),
            LogLevel::Debug,
        ),
        VideoError::NotReady(_) => (
            "NOT_READY",
            true,
            Some("Retry once processing has finished"),
            LogLevel::Debug,
        ),
        VideoError::RemoteUnavailable(_) => (
            "REMOTE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            LogLevel::Warn,
        ),
        VideoError::ProcessingFailed(_) => (
            "PROCESSING_FAILED",
            false,
            Some("Upload a different file"),
            LogLevel::Error,
        ),
        VideoError::ProcessingTimeout { .. } => (
            "PROCESSING_TIMEOUT",
            true,
            Some("Poll the status again later"),
            LogLevel::Warn,
        ),
        VideoError::InvalidResponse { .. } => (
            "INVALID_RESPONSE",
            false,
            Some("Contact support if this error persists"),
            LogLevel::Error,
        ),
        VideoError::InvalidState(_) => (
            "INVALID_STATE",
            false,
            Some("Check the order of operations"),
            LogLevel::Warn,
        ),
        VideoError::SessionStore(_) => (
            "SESSION_STORE_ERROR",
            true,
            Some("Check the session store location"),
            LogLevel::Error,
        ),
        VideoError::Configuration(_) => (
            "CONFIGURATION_ERROR",
            false,
            Some("Check environment configuration"),
            LogLevel::Error,
        ),
        VideoError::Io(_) => (
            "IO_ERROR",
            false,
            Some("Check that the file is readable"),
            LogLevel::Error,
        ),
    }
}

impl VideoError {
    /// Whether the transfer engine may retry the failed call.
    ///
    /// Only transport failures and 5xx-class (plus 408/429) rejections qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            VideoError::RemoteUnavailable(_) => true,
            VideoError::TransferRejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Whether a persisted session should be discarded after this failure.
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            VideoError::FileMismatch { .. } | VideoError::ProcessingFailed(_)
        )
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            VideoError::UnsupportedProvider(_) => "UnsupportedProvider",
            VideoError::RemoteRejected { .. } => "RemoteRejected",
            VideoError::TransferRejected { .. } => "TransferRejected",
            VideoError::TransferFailed { .. } => "TransferFailed",
            VideoError::FileMismatch { .. } => "FileMismatch",
            VideoError::NotFound(_) => "NotFound",
            VideoError::NotReady(_) => "NotReady",
            VideoError::RemoteUnavailable(_) => "RemoteUnavailable",
            VideoError::ProcessingFailed(_) => "ProcessingFailed",
            VideoError::ProcessingTimeout { .. } => "ProcessingTimeout",
            VideoError::InvalidResponse { .. } => "InvalidResponse",
            VideoError::InvalidState(_) => "InvalidState",
            VideoError::SessionStore(_) => "SessionStore",
            VideoError::Configuration(_) => "Configuration",
            VideoError::Io(_) => "Io",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for VideoError {
    fn http_status_code(&self) -> u16 {
        match self {
            VideoError::UnsupportedProvider(_) => 400,
            VideoError::RemoteRejected { status, .. } => *status,
            VideoError::TransferRejected { status, .. } => *status,
            VideoError::TransferFailed { .. } => 502,
            VideoError::FileMismatch { .. } => 409,
            VideoError::NotFound(_) => 404,
            VideoError::NotReady(_) => 409,
            VideoError::RemoteUnavailable(_) => 503,
            VideoError::ProcessingFailed(_) => 500,
            VideoError::ProcessingTimeout { .. } => 408,
            VideoError::InvalidResponse { .. } => 502,
            VideoError::InvalidState(_) => 409,
            VideoError::SessionStore(_) => 500,
            VideoError::Configuration(_) => 500,
            VideoError::Io(_) => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        video_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        video_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        video_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        video_error_static_metadata(self).3
    }
}
