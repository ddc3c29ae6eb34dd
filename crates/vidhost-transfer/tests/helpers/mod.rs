//! Shared fixtures for transfer integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vidhost_core::models::{
    AssetPhase, AssetStatus, DeleteOutcome, FileFingerprint, Pagination, PlayableAsset,
    PlaybackDescriptor, PlaybackFile, UploadInstructions, UploadSession, VideoAsset, VideoList,
    VideoMetadata,
};
use vidhost_core::{ProviderKind, TransferMode, UploadConfig, VideoError, VideoResult};
use vidhost_providers::{ByteProgress, ByteStream, ProviderClient, ProviderRegistry};
use vidhost_transfer::PauseHandle;

pub const MIB: u64 = 1024 * 1024;
pub const SESSION_ID: &str = "session-1";

/// Scriptable in-memory provider.
#[derive(Debug)]
pub struct FakeProvider {
    kind: ProviderKind,
    mode: TransferMode,
    transfers: Mutex<Vec<(u64, u64)>>,
    transfer_failures: Mutex<VecDeque<VideoError>>,
    short_ack: Mutex<Option<u64>>,
    backend_offset: Mutex<Option<u64>>,
    phases: Mutex<VecDeque<AssetPhase>>,
    fetch_failures: Mutex<VecDeque<VideoError>>,
    fetches: AtomicUsize,
    assets: Mutex<HashSet<String>>,
    pause_on_call: Mutex<Option<PauseHandle>>,
}

impl FakeProvider {
    fn with_mode(kind: ProviderKind, mode: TransferMode) -> Self {
        Self {
            kind,
            mode,
            transfers: Mutex::new(Vec::new()),
            transfer_failures: Mutex::new(VecDeque::new()),
            short_ack: Mutex::new(None),
            backend_offset: Mutex::new(None),
            phases: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            fetches: AtomicUsize::new(0),
            assets: Mutex::new(HashSet::new()),
            pause_on_call: Mutex::new(None),
        }
    }

    /// Byte-range provider, registered as Vimeo
    pub fn resumable() -> Self {
        Self::with_mode(ProviderKind::Vimeo, TransferMode::Resumable)
    }

    /// Single-request provider, registered as Mux
    pub fn whole_file() -> Self {
        Self::with_mode(ProviderKind::Mux, TransferMode::WholeFile)
    }

    /// The next transfer calls fail with these errors, in order
    pub fn fail_next_transfers(&self, errors: impl IntoIterator<Item = VideoError>) {
        self.transfer_failures.lock().unwrap().extend(errors);
    }

    /// The next successful transfer confirms only `bytes` of what was sent
    pub fn confirm_short_once(&self, bytes: u64) {
        *self.short_ack.lock().unwrap() = Some(bytes);
    }

    pub fn set_backend_offset(&self, offset: Option<u64>) {
        *self.backend_offset.lock().unwrap() = offset;
    }

    /// Phases returned by successive status fetches; the last one repeats
    pub fn script_phases(&self, phases: impl IntoIterator<Item = AssetPhase>) {
        self.phases.lock().unwrap().extend(phases);
    }

    pub fn fail_next_fetches(&self, errors: impl IntoIterator<Item = VideoError>) {
        self.fetch_failures.lock().unwrap().extend(errors);
    }

    /// Request a pause on `handle` from inside the next session call
    /// (`create_session` or `confirmed_offset`), while it is still awaited
    pub fn pause_during_next_session_call(&self, handle: PauseHandle) {
        *self.pause_on_call.lock().unwrap() = Some(handle);
    }

    fn pause_if_scripted(&self) {
        if let Some(handle) = self.pause_on_call.lock().unwrap().take() {
            handle.pause();
        }
    }

    pub fn add_asset(&self, id: &str) {
        self.assets.lock().unwrap().insert(id.to_string());
    }

    /// `(offset, len)` of every transfer call, failed attempts included
    pub fn transfers(&self) -> Vec<(u64, u64)> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn current_phase(&self) -> AssetPhase {
        let mut phases = self.phases.lock().unwrap();
        if phases.len() > 1 {
            phases.pop_front().unwrap_or(AssetPhase::Processing)
        } else {
            phases.front().cloned().unwrap_or(AssetPhase::Processing)
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn transfer_mode(&self) -> TransferMode {
        self.mode
    }

    async fn create_session(
        &self,
        metadata: &VideoMetadata,
        fingerprint: &FileFingerprint,
    ) -> VideoResult<UploadSession> {
        self.pause_if_scripted();
        self.add_asset(SESSION_ID);
        Ok(UploadSession::new(
            self.kind,
            SESSION_ID,
            format!("fake://upload/{}", SESSION_ID),
            fingerprint.clone(),
            Some(metadata.title.clone()),
        ))
    }

    fn upload_instructions(&self, session: &UploadSession) -> UploadInstructions {
        UploadInstructions {
            method: "PATCH".to_string(),
            headers: [(
                "Upload-Offset".to_string(),
                session.acknowledged_offset.to_string(),
            )]
            .into_iter()
            .collect(),
            note: "fake".to_string(),
        }
    }

    async fn transfer_bytes(
        &self,
        _session: &UploadSession,
        chunk: Bytes,
        offset: u64,
        progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        let len = chunk.len() as u64;
        self.transfers.lock().unwrap().push((offset, len));

        if let Some(err) = self.transfer_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(progress) = progress {
            progress(len);
        }
        match self.short_ack.lock().unwrap().take() {
            Some(bytes) => Ok(offset + bytes.min(len)),
            None => Ok(offset + len),
        }
    }

    async fn transfer_stream(
        &self,
        _session: &UploadSession,
        mut body: ByteStream,
        len: u64,
        progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        if let Some(err) = self.transfer_failures.lock().unwrap().pop_front() {
            self.transfers.lock().unwrap().push((0, len));
            return Err(err);
        }

        let mut received = 0u64;
        while let Some(piece) = body.next().await {
            received += piece?.len() as u64;
            if let Some(progress) = &progress {
                progress(received);
            }
        }
        self.transfers.lock().unwrap().push((0, received));
        Ok(received)
    }

    async fn confirmed_offset(&self, _session: &UploadSession) -> VideoResult<Option<u64>> {
        self.pause_if_scripted();
        Ok(*self.backend_offset.lock().unwrap())
    }

    async fn fetch_status(&self, id: &str) -> VideoResult<AssetStatus> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let phase = self.current_phase();
        Ok(AssetStatus {
            provider: self.kind,
            session_id: id.to_string(),
            asset_id: match &phase {
                AssetPhase::Ready(asset) => Some(asset.asset_id.clone()),
                _ => None,
            },
            provider_status: phase.name().to_string(),
            phase,
        })
    }

    async fn resolve_playback(&self, asset_id: &str) -> VideoResult<PlaybackDescriptor> {
        match self.current_phase() {
            AssetPhase::Ready(asset) => Ok(PlaybackDescriptor {
                files: vec![PlaybackFile {
                    url: asset.link,
                    quality: "hd".to_string(),
                    width: 1920,
                    height: 1080,
                    content_type: "video/mp4".to_string(),
                }],
            }),
            _ => Err(VideoError::NotReady(asset_id.to_string())),
        }
    }

    async fn delete(&self, asset_id: &str) -> VideoResult<DeleteOutcome> {
        if self.assets.lock().unwrap().remove(asset_id) {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyAbsent)
        }
    }

    async fn get_video(&self, id: &str) -> VideoResult<VideoAsset> {
        Err(VideoError::NotFound(id.to_string()))
    }

    async fn list_videos(&self) -> VideoResult<VideoList> {
        Ok(VideoList {
            videos: Vec::new(),
            pagination: Pagination {
                total: Some(0),
                page: Some(1),
                limit: Some(100),
                has_next: false,
            },
            provider: self.kind,
        })
    }
}

pub fn ready(asset_id: &str) -> AssetPhase {
    AssetPhase::Ready(PlayableAsset {
        asset_id: asset_id.to_string(),
        duration: Some(12.0),
        embed_html: format!("<video src=\"https://play.example/{}\"></video>", asset_id),
        link: format!("https://play.example/{}", asset_id),
    })
}

pub fn errored(detail: &str) -> AssetPhase {
    AssetPhase::Errored {
        detail: detail.to_string(),
    }
}

pub fn server_error(status: u16) -> VideoError {
    VideoError::TransferRejected {
        provider: ProviderKind::Vimeo,
        status,
        body: "backend says no".to_string(),
    }
}

/// Write a file of `size` bytes with a repeating pattern.
pub fn write_video(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    let contents: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn metadata(name: &str) -> VideoMetadata {
    VideoMetadata::from_filename(name, "*")
}

/// Reference tuning: 5 MiB chunks, 3 attempts, 1 s backoff, 2 s polls, 4 min ceiling
pub fn settings(store_dir: &Path) -> UploadConfig {
    UploadConfig {
        session_store_dir: store_dir.to_path_buf(),
        ..UploadConfig::default()
    }
}

pub async fn registry_with(provider: Arc<FakeProvider>) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry.register(provider).await;
    registry
}
