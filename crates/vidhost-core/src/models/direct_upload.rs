use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UploadSession;
use crate::provider_types::ProviderKind;

/// How a third party writes the file to an upload URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadInstructions {
    /// HTTP method to use against the upload URL
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub note: String,
}

/// An upload session handed out for someone else to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectUpload {
    pub upload_id: String,
    pub upload_url: String,
    pub instructions: UploadInstructions,
    /// Seconds the holder has to start sending bytes
    pub timeout_secs: u64,
    pub status: String,
    pub provider: ProviderKind,
}

impl DirectUpload {
    pub fn new(
        session: &UploadSession,
        instructions: UploadInstructions,
        timeout_secs: u64,
    ) -> Self {
        Self {
            upload_id: session.session_id.clone(),
            upload_url: session.transfer_url.clone(),
            instructions,
            timeout_secs,
            status: "created".to_string(),
            provider: session.provider,
        }
    }
}
