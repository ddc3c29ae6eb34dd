//! Response handling shared by the provider clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use vidhost_core::{ProviderKind, VideoError, VideoResult};

pub(crate) fn build_client(timeout: Duration) -> VideoResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VideoError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Transport-level failures (connect, reset, timeout) are always transient.
pub(crate) fn transport_error(provider: ProviderKind, err: reqwest::Error) -> VideoError {
    VideoError::RemoteUnavailable(format!("{} request failed: {}", provider, err))
}

pub(crate) async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

/// Map a failed lookup response onto the shared error kinds.
pub(crate) async fn lookup_error(
    provider: ProviderKind,
    id: &str,
    response: Response,
) -> VideoError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return VideoError::NotFound(format!("{} video {}", provider, id));
    }

    let body = error_body(response).await;
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        VideoError::RemoteUnavailable(format!("{} returned {}: {}", provider, status, body))
    } else {
        VideoError::RemoteRejected {
            provider,
            status: status.as_u16(),
            body,
        }
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: ProviderKind,
    response: Response,
) -> VideoResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| VideoError::InvalidResponse {
            provider,
            message: format!("Failed to parse response: {}", e),
        })
}
