//! Processing-status poller
//!
//! Waits for a remote asset to become playable:
//! `Waiting -> Ready | Errored | TimedOut`. Each iteration sleeps one interval
//! and then fetches the status; the whole wait runs under a single deadline,
//! so the loop always terminates.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use vidhost_core::models::{AssetPhase, AssetStatus, PlayableAsset};
use vidhost_core::{UploadConfig, VideoError, VideoResult};
use vidhost_providers::ProviderClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Ready,
    Errored,
    TimedOut,
}

#[derive(Debug)]
pub struct StatusPoller {
    provider: Arc<dyn ProviderClient>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
    state: PollState,
}

impl StatusPoller {
    pub fn new(provider: Arc<dyn ProviderClient>, interval: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            interval,
            timeout,
            cancel: CancellationToken::new(),
            state: PollState::Waiting,
        }
    }

    pub fn from_config(provider: Arc<dyn ProviderClient>, upload: &UploadConfig) -> Self {
        Self::new(provider, upload.poll_interval(), upload.poll_timeout())
    }

    /// Stop the wait early when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Single status fetch, outside the wait loop
    pub async fn poll_once(&self, id: &str) -> VideoResult<AssetStatus> {
        self.provider.fetch_status(id).await
    }

    /// Wait until `id` is playable.
    ///
    /// Fails with `ProcessingFailed` when the backend reports an error phase
    /// and `ProcessingTimeout` when the deadline passes first. Transient
    /// `RemoteUnavailable` lookups are logged and polled again; any other
    /// lookup error ends the wait.
    pub async fn wait_until_ready(&mut self, id: &str) -> VideoResult<PlayableAsset> {
        self.state = PollState::Waiting;
        tracing::info!(
            provider = %self.provider.kind(),
            id = %id,
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Waiting for processing"
        );

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(VideoError::InvalidState(format!(
                    "status polling for {} was cancelled",
                    id
                )));
            }
            outcome = tokio::time::timeout(self.timeout, self.poll_loop(id)) => outcome,
        };

        match outcome {
            Ok(Ok(asset)) => {
                self.state = PollState::Ready;
                tracing::info!(id = %id, asset_id = %asset.asset_id, "Asset ready");
                Ok(asset)
            }
            Ok(Err(e)) => {
                if matches!(e, VideoError::ProcessingFailed(_)) {
                    self.state = PollState::Errored;
                }
                Err(e)
            }
            Err(_) => {
                self.state = PollState::TimedOut;
                tracing::warn!(
                    id = %id,
                    waited_secs = self.timeout.as_secs(),
                    "Processing did not finish in time"
                );
                Err(VideoError::ProcessingTimeout {
                    id: id.to_string(),
                    waited_secs: self.timeout.as_secs(),
                })
            }
        }
    }

    async fn poll_loop(&self, id: &str) -> VideoResult<PlayableAsset> {
        loop {
            tokio::time::sleep(self.interval).await;

            let status = match self.provider.fetch_status(id).await {
                Ok(status) => status,
                Err(e @ VideoError::RemoteUnavailable(_)) => {
                    tracing::warn!(id = %id, error = %e, "Status lookup failed, polling again");
                    continue;
                }
                Err(e) => return Err(e),
            };

            tracing::debug!(
                id = %id,
                asset_id = ?status.asset_id,
                phase = %status.phase,
                provider_status = %status.provider_status,
                "Polled status"
            );

            match status.phase {
                AssetPhase::Ready(asset) => return Ok(asset),
                AssetPhase::Errored { detail } => {
                    return Err(VideoError::ProcessingFailed(detail));
                }
                AssetPhase::Uploading | AssetPhase::Processing => {}
            }
        }
    }
}
