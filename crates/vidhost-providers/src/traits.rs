//! Provider abstraction trait
//!
//! This module defines the contract that all video hosting backends implement.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt::Debug;
use std::pin::Pin;
use std::sync::Arc;

use vidhost_core::models::{
    AssetStatus, DeleteOutcome, FileFingerprint, PlaybackDescriptor, UploadInstructions,
    UploadSession, VideoAsset, VideoList, VideoMetadata,
};
use vidhost_core::{ProviderKind, TransferMode, VideoError, VideoResult};

/// Callback receiving the number of bytes of the current call handed to the
/// transport so far.
pub type ByteProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Payload read lazily from disk for whole-file transfers.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Video hosting backend contract
///
/// Every backend maps its own request shapes and status vocabulary onto this
/// trait, so the transfer engine and status poller never branch on which
/// provider they are talking to.
#[async_trait]
pub trait ProviderClient: Send + Sync + Debug {
    /// Which backend this client speaks to
    fn kind(&self) -> ProviderKind;

    /// Whether bytes can be written in resumable ranges or only in one call
    fn transfer_mode(&self) -> TransferMode;

    /// Create an upload session for a file of `fingerprint.size` bytes.
    ///
    /// Fails with `RemoteRejected` (carrying the backend status and body)
    /// when the backend refuses.
    async fn create_session(
        &self,
        metadata: &VideoMetadata,
        fingerprint: &FileFingerprint,
    ) -> VideoResult<UploadSession>;

    /// How a third party holding only the session's transfer URL writes the
    /// remaining bytes to it.
    fn upload_instructions(&self, session: &UploadSession) -> UploadInstructions;

    /// Send one contiguous byte range starting at `offset`.
    ///
    /// Returns the offset the backend confirms it now holds, which may differ
    /// from `offset + chunk.len()`. Fails with `TransferRejected` on a
    /// non-success response and `RemoteUnavailable` on transport errors.
    async fn transfer_bytes(
        &self,
        session: &UploadSession,
        chunk: Bytes,
        offset: u64,
        progress: Option<ByteProgress>,
    ) -> VideoResult<u64>;

    /// Send an entire file of `len` bytes as one streamed request.
    ///
    /// Whole-file providers implement this so the payload never has to be
    /// buffered in memory. Returns the confirmed size.
    async fn transfer_stream(
        &self,
        session: &UploadSession,
        _body: ByteStream,
        _len: u64,
        _progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        Err(VideoError::InvalidState(format!(
            "{} does not accept streamed uploads (session {})",
            self.kind(),
            session.session_id
        )))
    }

    /// Offset the backend already holds for a session, for providers that
    /// can report it. Used to reconcile a persisted session before resuming.
    async fn confirmed_offset(&self, _session: &UploadSession) -> VideoResult<Option<u64>> {
        Ok(None)
    }

    /// Fetch the processing state of an upload session or asset id.
    ///
    /// Fails with `NotFound` for unknown ids and `RemoteUnavailable` on
    /// transport or 5xx errors.
    async fn fetch_status(&self, id: &str) -> VideoResult<AssetStatus>;

    /// Resolve the playable renditions of an asset.
    ///
    /// Fails with `NotReady` while no playable rendition exists.
    async fn resolve_playback(&self, asset_id: &str) -> VideoResult<PlaybackDescriptor>;

    /// Delete an asset. Deleting an asset that does not exist succeeds.
    async fn delete(&self, asset_id: &str) -> VideoResult<DeleteOutcome>;

    /// Look up a single hosted video
    async fn get_video(&self, id: &str) -> VideoResult<VideoAsset>;

    /// First page of hosted videos
    async fn list_videos(&self) -> VideoResult<VideoList>;
}
