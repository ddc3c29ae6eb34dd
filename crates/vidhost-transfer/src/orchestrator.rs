//! End-to-end upload: transfer, then wait until playable.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use vidhost_core::models::{DirectUpload, PlayableAsset, UploadSession, VideoMetadata};
use vidhost_core::{ProviderKind, UploadConfig, VideoError, VideoResult};
use vidhost_providers::{ProviderClient, ProviderRegistry};

use crate::engine::{PauseHandle, ProgressCallback, TransferEngine, TransferOutcome};
use crate::poller::StatusPoller;
use crate::retry::RetryPolicy;
use crate::session_store::SessionStore;
use crate::source::VideoFile;

/// A playable asset produced by an upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub provider: ProviderKind,
    pub session_id: String,
    pub asset_id: String,
    pub playback_link: String,
    pub embed_html: String,
    pub duration: Option<f64>,
}

impl UploadResult {
    fn new(session: &UploadSession, asset: PlayableAsset) -> Self {
        Self {
            provider: session.provider,
            session_id: session.session_id.clone(),
            asset_id: asset.asset_id,
            playback_link: asset.link,
            embed_html: asset.embed_html,
            duration: asset.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Ready(UploadResult),
    /// Paused at a chunk boundary; resume with `resume_and_wait`
    Paused(UploadSession),
}

/// Sequences `TransferEngine` and `StatusPoller` over the registry's clients.
///
/// The persisted session survives every failure except `FileMismatch` and
/// `ProcessingFailed`, and is cleared once the asset is playable.
pub struct UploadOrchestrator {
    registry: ProviderRegistry,
    store: Arc<dyn SessionStore>,
    settings: UploadConfig,
    pause: PauseHandle,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl UploadOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn SessionStore>,
        settings: UploadConfig,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
            pause: PauseHandle::new(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Pause flag shared with every engine this orchestrator creates
    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    /// Token that ends any status wait started by this orchestrator
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn transfer_engine(&self, provider: Arc<dyn ProviderClient>) -> TransferEngine {
        let engine = TransferEngine::new(
            provider,
            self.store.clone(),
            self.settings.chunk_size_bytes,
            RetryPolicy::from_config(&self.settings),
        )
        .with_pause_handle(self.pause.clone());

        match &self.progress {
            Some(progress) => engine.with_progress(progress.clone()),
            None => engine,
        }
    }

    pub fn status_poller(&self, provider: Arc<dyn ProviderClient>) -> StatusPoller {
        StatusPoller::from_config(provider, &self.settings).with_cancellation(self.cancel.clone())
    }

    /// Upload `file` to `provider_name` and wait until it is playable.
    pub async fn upload_and_wait(
        &self,
        file: &VideoFile,
        metadata: &VideoMetadata,
        provider_name: &str,
    ) -> VideoResult<UploadOutcome> {
        let provider = self.registry.resolve(provider_name).await?;
        let mut engine = self.transfer_engine(provider.clone());

        engine.start(file, metadata).await?;
        self.complete(engine, provider, file).await
    }

    /// Create and persist a session for `file` without sending any bytes.
    ///
    /// The returned link tells a third party how to write the file to the
    /// backend; the session can later be resumed or waited on from here.
    pub async fn create_link(
        &self,
        file: &VideoFile,
        metadata: &VideoMetadata,
        provider_name: &str,
    ) -> VideoResult<DirectUpload> {
        let provider = self.registry.resolve(provider_name).await?;
        let mut engine = self.transfer_engine(provider.clone());

        let session = engine.start(file, metadata).await?;
        let link = DirectUpload::new(
            &session,
            provider.upload_instructions(&session),
            self.settings.direct_upload_timeout_secs,
        );
        tracing::info!(
            provider = %link.provider,
            upload_id = %link.upload_id,
            method = %link.instructions.method,
            "Direct upload link created"
        );
        Ok(link)
    }

    /// Continue the persisted upload with `file` and wait until it is playable.
    ///
    /// A session whose bytes were all acknowledged before the interruption
    /// goes straight to the status wait.
    pub async fn resume_and_wait(&self, file: &VideoFile) -> VideoResult<UploadOutcome> {
        let persisted = self
            .store
            .load()
            .await?
            .ok_or_else(|| VideoError::NotFound("no pending upload session".to_string()))?;

        let provider = self.registry.get(persisted.provider).await?;
        let mut engine = self.transfer_engine(provider.clone());

        engine.resume(file, persisted).await?;
        self.complete(engine, provider, file).await
    }

    /// Wait for an already uploaded session or asset id.
    pub async fn wait_for(&self, provider_name: &str, id: &str) -> VideoResult<PlayableAsset> {
        let provider = self.registry.resolve(provider_name).await?;
        self.status_poller(provider).wait_until_ready(id).await
    }

    /// Drop the persisted session, if any, without touching the remote side.
    pub async fn abandon(&self) -> VideoResult<Option<UploadSession>> {
        let pending = self.store.load().await?;
        self.store.clear().await?;
        if let Some(session) = &pending {
            tracing::info!(session_id = %session.session_id, "Pending upload abandoned");
        }
        Ok(pending)
    }

    async fn complete(
        &self,
        mut engine: TransferEngine,
        provider: Arc<dyn ProviderClient>,
        file: &VideoFile,
    ) -> VideoResult<UploadOutcome> {
        let session = match engine.run(file).await {
            Ok(TransferOutcome::Completed(session)) => session,
            Ok(TransferOutcome::Paused(session)) => return Ok(UploadOutcome::Paused(session)),
            Err(e) => return Err(self.discard_if_invalid(e).await),
        };

        let mut poller = self.status_poller(provider);
        match poller.wait_until_ready(&session.session_id).await {
            Ok(asset) => {
                engine.finish().await?;
                Ok(UploadOutcome::Ready(UploadResult::new(&session, asset)))
            }
            Err(e) => Err(self.discard_if_invalid(e).await),
        }
    }

    /// Clear the persisted record when the failure makes resuming pointless.
    async fn discard_if_invalid(&self, err: VideoError) -> VideoError {
        if err.invalidates_session() {
            if let Err(clear_err) = self.store.clear().await {
                tracing::warn!(error = %clear_err, "Failed to clear persisted session");
            } else {
                tracing::info!(error = %err, "Persisted session discarded");
            }
        }
        err
    }
}
