//! Resumable transfer engine
//!
//! State machine driving one upload session:
//!
//! ```text
//! Idle -> SessionCreated -> Transferring <-> Paused
//!                               |
//!                               +-> Completed
//! (any active state) -> Failed
//! ```
//!
//! Chunks are sent strictly in offset order, one at a time, always starting at
//! the last backend-confirmed offset. The session record is persisted after
//! every acknowledgment so a crash loses at most one chunk of work. The record
//! is not cleared on completion: that happens in `finish` once the asset is
//! playable.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use vidhost_core::models::{UploadSession, VideoMetadata};
use vidhost_core::{TransferMode, VideoError, VideoResult};
use vidhost_providers::{ByteProgress, ProviderClient};

use crate::retry::RetryPolicy;
use crate::session_store::SessionStore;
use crate::source::VideoFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    SessionCreated,
    Transferring,
    Paused,
    Completed,
    Failed,
}

/// Progress snapshot delivered to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes confirmed by the backend, or handed to the transport during a
    /// whole-file transfer
    pub acknowledged: u64,
    pub total: u64,
    /// Throughput since this run started
    pub bytes_per_sec: f64,
}

impl TransferProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.acknowledged as f64 * 100.0 / self.total as f64
    }
}

pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Advisory pause flag, checked between chunks.
///
/// Clones share the flag, so a signal handler can hold one while the engine
/// runs. A chunk already in flight is never aborted.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    requested: Arc<AtomicBool>,
}

impl PauseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Every byte is acknowledged; the record is still persisted
    Completed(UploadSession),
    /// Stopped at a chunk boundary; the record holds the last acknowledged offset
    Paused(UploadSession),
}

impl TransferOutcome {
    pub fn session(&self) -> &UploadSession {
        match self {
            TransferOutcome::Completed(session) | TransferOutcome::Paused(session) => session,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed(_))
    }
}

pub struct TransferEngine {
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn SessionStore>,
    chunk_size: u64,
    retry: RetryPolicy,
    state: TransferState,
    session: Option<UploadSession>,
    pause: PauseHandle,
    progress: Option<ProgressCallback>,
}

impl Debug for TransferEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TransferEngine")
            .field("provider", &self.provider.kind())
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .field("state", &self.state)
            .field("session", &self.session)
            .finish()
    }
}

impl TransferEngine {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        store: Arc<dyn SessionStore>,
        chunk_size: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            chunk_size: chunk_size.max(1),
            retry,
            state: TransferState::Idle,
            session: None,
            pause: PauseHandle::default(),
            progress: None,
        }
    }

    /// Share an externally held pause flag
    pub fn with_pause_handle(mut self, pause: PauseHandle) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    /// Request a pause; takes effect before the next chunk is sent.
    pub fn pause(&self) {
        self.pause.pause();
    }

    /// Create a remote session for `file` and persist it.
    pub async fn start(
        &mut self,
        file: &VideoFile,
        metadata: &VideoMetadata,
    ) -> VideoResult<UploadSession> {
        self.expect_state(&[TransferState::Idle], "start")?;
        // A request made from here on applies to this session
        self.pause.reset();

        if file.size() == 0 {
            return Err(VideoError::InvalidState(format!("{} is empty", file.name())));
        }

        let session = match self
            .provider
            .create_session(metadata, file.fingerprint())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.state = TransferState::Failed;
                return Err(e);
            }
        };
        self.state = TransferState::SessionCreated;

        if let Err(e) = self.store.save(&session).await {
            self.state = TransferState::Failed;
            return Err(e);
        }

        tracing::info!(
            provider = %session.provider,
            session_id = %session.session_id,
            file = %file.fingerprint(),
            "Transfer started"
        );

        self.session = Some(session.clone());
        self.state = TransferState::Transferring;
        Ok(session)
    }

    /// Continue a persisted session with `file`.
    ///
    /// A fingerprint mismatch clears the persisted record and fails with
    /// `FileMismatch` without sending any bytes.
    pub async fn resume(
        &mut self,
        file: &VideoFile,
        persisted: UploadSession,
    ) -> VideoResult<UploadSession> {
        self.expect_state(&[TransferState::Idle], "resume")?;
        self.pause.reset();

        if persisted.provider != self.provider.kind() {
            return Err(VideoError::InvalidState(format!(
                "session {} belongs to {}, not {}",
                persisted.session_id,
                persisted.provider,
                self.provider.kind()
            )));
        }

        if persisted.file_fingerprint != *file.fingerprint() {
            tracing::warn!(
                session_id = %persisted.session_id,
                expected = %persisted.file_fingerprint,
                actual = %file.fingerprint(),
                "File does not match persisted session, discarding it"
            );
            self.state = TransferState::Failed;
            self.store.clear().await?;
            return Err(VideoError::FileMismatch {
                expected: persisted.file_fingerprint.to_string(),
                actual: file.fingerprint().to_string(),
            });
        }

        let mut session = persisted;
        if self.provider.transfer_mode() == TransferMode::Resumable
            && !session.is_transfer_complete()
        {
            match self.provider.confirmed_offset(&session).await {
                Ok(Some(offset)) => {
                    let persisted_offset = session.acknowledged_offset;
                    if session.reconcile(offset) {
                        tracing::info!(
                            session_id = %session.session_id,
                            persisted_offset = persisted_offset,
                            confirmed_offset = session.acknowledged_offset,
                            "Backend holds more than the persisted offset"
                        );
                        self.store.save(&session).await?;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Could not confirm backend offset, resuming from persisted offset"
                ),
            }
        }

        tracing::info!(
            session_id = %session.session_id,
            offset = session.acknowledged_offset,
            total = session.total_size,
            "Transfer resumed"
        );

        self.session = Some(session.clone());
        self.state = TransferState::Transferring;
        Ok(session)
    }

    /// Leave `Paused` so the next `run` continues from the persisted offset.
    pub fn resume_paused(&mut self) -> VideoResult<()> {
        self.expect_state(&[TransferState::Paused], "resume a paused transfer")?;
        self.pause.reset();
        self.state = TransferState::Transferring;
        Ok(())
    }

    /// Send bytes until the session is complete or a pause is requested.
    pub async fn run(&mut self, file: &VideoFile) -> VideoResult<TransferOutcome> {
        self.expect_state(&[TransferState::Transferring], "run")?;

        let mut session = self
            .session
            .take()
            .ok_or_else(|| VideoError::InvalidState("no active session".to_string()))?;

        let result = if session.file_fingerprint != *file.fingerprint() {
            Err(VideoError::FileMismatch {
                expected: session.file_fingerprint.to_string(),
                actual: file.fingerprint().to_string(),
            })
        } else {
            match self.provider.transfer_mode() {
                TransferMode::Resumable => self.send_chunks(&mut session, file).await,
                TransferMode::WholeFile => self.send_whole(&mut session, file).await,
            }
        };
        self.session = Some(session.clone());

        match result {
            Ok(true) => {
                self.state = TransferState::Completed;
                tracing::info!(
                    session_id = %session.session_id,
                    total = session.total_size,
                    "Transfer completed"
                );
                Ok(TransferOutcome::Completed(session))
            }
            Ok(false) => {
                self.state = TransferState::Paused;
                tracing::info!(
                    session_id = %session.session_id,
                    offset = session.acknowledged_offset,
                    "Transfer paused"
                );
                Ok(TransferOutcome::Paused(session))
            }
            Err(e) => {
                self.state = TransferState::Failed;
                tracing::warn!(
                    session_id = %session.session_id,
                    offset = session.acknowledged_offset,
                    error = %e,
                    "Transfer failed"
                );
                Err(e)
            }
        }
    }

    /// Clear the persisted record once the asset is playable.
    pub async fn finish(&mut self) -> VideoResult<()> {
        self.expect_state(&[TransferState::Completed], "finish")?;
        self.store.clear().await?;
        tracing::debug!("Persisted session cleared");
        Ok(())
    }

    /// Drop the session and its persisted record.
    pub async fn abandon(&mut self) -> VideoResult<()> {
        self.store.clear().await?;
        if let Some(session) = self.session.take() {
            tracing::info!(session_id = %session.session_id, "Transfer abandoned");
        }
        self.pause.reset();
        self.state = TransferState::Idle;
        Ok(())
    }

    /// Chunk loop. Returns `false` when stopped by a pause request.
    async fn send_chunks(
        &self,
        session: &mut UploadSession,
        file: &VideoFile,
    ) -> VideoResult<bool> {
        let started = Instant::now();
        let resumed_from = session.acknowledged_offset;

        while !session.is_transfer_complete() {
            if self.pause.is_requested() {
                return Ok(false);
            }

            let offset = session.acknowledged_offset;
            let len = self.chunk_size.min(session.remaining());
            let chunk = file.read_range(offset, len).await?;

            let provider = &self.provider;
            let current: &UploadSession = session;
            let confirmed = self
                .retry
                .run(&current.session_id, offset, move || {
                    provider.transfer_bytes(current, chunk.clone(), offset, None)
                })
                .await?;

            session.advance(confirmed)?;
            self.store.save(session).await?;

            tracing::debug!(
                session_id = %session.session_id,
                offset = offset,
                sent = len,
                acknowledged = session.acknowledged_offset,
                "Chunk acknowledged"
            );
            self.report(
                session.acknowledged_offset,
                session.total_size,
                resumed_from,
                started,
            );
        }

        Ok(true)
    }

    /// Single streamed call carrying the whole file.
    async fn send_whole(
        &self,
        session: &mut UploadSession,
        file: &VideoFile,
    ) -> VideoResult<bool> {
        if session.is_transfer_complete() {
            return Ok(true);
        }
        if self.pause.is_requested() {
            return Ok(false);
        }

        let total = session.total_size;
        let byte_progress: Option<ByteProgress> = self.progress.clone().map(|callback| {
            let started = Instant::now();
            Arc::new(move |sent: u64| {
                callback(TransferProgress {
                    acknowledged: sent,
                    total,
                    bytes_per_sec: rate(sent, started),
                })
            }) as ByteProgress
        });

        let provider = &self.provider;
        let current: &UploadSession = session;
        let confirmed = self
            .retry
            .run(&current.session_id, 0, move || {
                let progress = byte_progress.clone();
                async move {
                    // Every attempt streams from the start of the file
                    let body = file.stream().await?;
                    provider
                        .transfer_stream(current, body, total, progress)
                        .await
                }
            })
            .await?;

        session.advance(confirmed)?;
        self.store.save(session).await?;
        Ok(true)
    }

    fn report(&self, acknowledged: u64, total: u64, resumed_from: u64, started: Instant) {
        if let Some(callback) = &self.progress {
            callback(TransferProgress {
                acknowledged,
                total,
                bytes_per_sec: rate(acknowledged - resumed_from, started),
            });
        }
    }

    fn expect_state(&self, allowed: &[TransferState], operation: &str) -> VideoResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(VideoError::InvalidState(format!(
                "cannot {} while {:?}",
                operation, self.state
            )))
        }
    }
}

fn rate(bytes: u64, started: Instant) -> f64 {
    let secs = started.elapsed().as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}
