//! Mux provider client
//!
//! Mux hands out a direct-upload URL that accepts the whole file in one `PUT`.
//! The upload id and the asset id are distinct: the asset only exists once Mux
//! has ingested the upload, and `fetch_status` follows the upload to its asset.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use vidhost_core::models::{
    content_type_for, AssetPhase, AssetStatus, DeleteOutcome, FileFingerprint, Pagination,
    PlayableAsset, PlaybackDescriptor, PlaybackFile, UploadInstructions, UploadSession,
    VideoAsset, VideoList, VideoMetadata,
};
use vidhost_core::{MuxCredentials, ProviderKind, TransferMode, VideoError, VideoResult};

use crate::http::{
    build_client, error_body, lookup_error, read_json, transport_error, trim_base_url,
};
use crate::traits::{ByteProgress, ByteStream, ProviderClient};

const PROVIDER: ProviderKind = ProviderKind::Mux;
const STREAM_BASE_URL: &str = "https://stream.mux.com";
const LIST_LIMIT: u32 = 100;
/// Slice size used to report progress while the whole-file body streams out
const PROGRESS_SLICE_BYTES: usize = 256 * 1024;
const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

pub struct MuxClient {
    http_client: Client,
    base_url: String,
    credentials: MuxCredentials,
}

impl Debug for MuxClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MuxClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MuxClient {
    pub fn new(
        credentials: MuxCredentials,
        base_url: &str,
        timeout: Duration,
    ) -> VideoResult<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: trim_base_url(base_url),
            credentials,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            &self.credentials.token_id,
            Some(&self.credentials.token_secret),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/video/v1/{}", self.base_url, path)
    }

    /// Fetch a direct upload. `Ok(None)` when Mux does not know the id.
    async fn find_upload(&self, upload_id: &str) -> VideoResult<Option<MuxUpload>> {
        let response = self
            .authed(self.http_client.get(self.url(&format!("uploads/{}", upload_id))))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, upload_id, response).await);
        }

        let envelope: MuxEnvelope<MuxUpload> = read_json(PROVIDER, response).await?;
        Ok(Some(envelope.data))
    }

    /// Fetch an asset. `Ok(None)` when Mux does not know the id.
    async fn find_asset(&self, asset_id: &str) -> VideoResult<Option<MuxAsset>> {
        let response = self
            .authed(self.http_client.get(self.url(&format!("assets/{}", asset_id))))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, asset_id, response).await);
        }

        let envelope: MuxEnvelope<MuxAsset> = read_json(PROVIDER, response).await?;
        Ok(Some(envelope.data))
    }

    /// Resolve an id that may name either an upload or an asset to its asset.
    async fn asset_for(&self, id: &str) -> VideoResult<MuxAsset> {
        if let Some(asset) = self.find_asset(id).await? {
            return Ok(asset);
        }

        match self.find_upload(id).await? {
            Some(upload) => match upload.asset_id {
                Some(asset_id) => self.find_asset(&asset_id).await?.ok_or_else(|| {
                    VideoError::NotReady(format!("Mux asset {} not created yet", asset_id))
                }),
                None => Err(VideoError::NotReady(format!(
                    "Mux upload {} has no asset yet",
                    id
                ))),
            },
            None => Err(VideoError::NotFound(format!("{} video {}", PROVIDER, id))),
        }
    }

    fn upload_status(&self, upload: &MuxUpload) -> Option<AssetStatus> {
        let phase = match upload.status.as_str() {
            "waiting" => AssetPhase::Uploading,
            "errored" => AssetPhase::Errored {
                detail: upload
                    .error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "Mux upload errored".to_string()),
            },
            "cancelled" => AssetPhase::Errored {
                detail: "Mux upload was cancelled".to_string(),
            },
            "timed_out" => AssetPhase::Errored {
                detail: "Mux upload timed out".to_string(),
            },
            // asset_created (or anything newer) without an asset id yet
            _ if upload.asset_id.is_none() => AssetPhase::Processing,
            _ => return None,
        };

        Some(AssetStatus {
            provider: PROVIDER,
            session_id: upload.id.clone(),
            asset_id: upload.asset_id.clone(),
            phase,
            provider_status: upload.status.clone(),
        })
    }

    fn asset_status(session_id: &str, asset: &MuxAsset) -> AssetStatus {
        let phase = match asset.status.as_str() {
            "ready" => match asset.public_playback_id() {
                Some(playback_id) => AssetPhase::Ready(PlayableAsset {
                    asset_id: asset.id.clone(),
                    duration: asset.duration,
                    embed_html: embed_html(playback_id),
                    link: stream_url(playback_id),
                }),
                None => AssetPhase::Errored {
                    detail: format!("Mux asset {} has no public playback id", asset.id),
                },
            },
            "errored" => AssetPhase::Errored {
                detail: asset.error_detail(),
            },
            _ => AssetPhase::Processing,
        };

        AssetStatus {
            provider: PROVIDER,
            session_id: session_id.to_string(),
            asset_id: Some(asset.id.clone()),
            phase,
            provider_status: asset.status.clone(),
        }
    }

    fn to_video_asset(asset: MuxAsset) -> VideoAsset {
        let playback_id = asset.public_playback_id().map(str::to_string);
        let (title, description) = match asset.meta {
            Some(meta) => (meta.title.or(asset.passthrough), meta.description),
            None => (asset.passthrough, None),
        };

        VideoAsset {
            id: asset.id,
            title,
            description,
            duration: asset.duration,
            status: asset.status,
            created_at: asset.created_at,
            embed_html: playback_id.as_deref().map(embed_html),
            link: playback_id.as_deref().map(stream_url),
            provider: PROVIDER,
        }
    }
}

fn stream_url(playback_id: &str) -> String {
    format!("{}/{}.m3u8", STREAM_BASE_URL, playback_id)
}

fn embed_html(playback_id: &str) -> String {
    format!(
        r#"<video id="video" controls><source src="{}" type="application/x-mpegURL"></video>"#,
        stream_url(playback_id)
    )
}

/// Split an in-memory payload into slices so progress advances as it streams.
fn sliced(chunk: Bytes) -> ByteStream {
    let mut slices = Vec::with_capacity(chunk.len() / PROGRESS_SLICE_BYTES + 1);
    let mut rest = chunk;
    while rest.len() > PROGRESS_SLICE_BYTES {
        slices.push(rest.split_to(PROGRESS_SLICE_BYTES));
    }
    slices.push(rest);
    Box::pin(futures::stream::iter(
        slices.into_iter().map(Ok::<Bytes, std::io::Error>),
    ))
}

/// Request body reporting the running byte count as pieces reach the transport.
fn counting_body(body: ByteStream, progress: Option<ByteProgress>) -> Body {
    match progress {
        Some(progress) => {
            let mut sent = 0u64;
            Body::wrap_stream(body.inspect(move |piece| {
                if let Ok(piece) = piece {
                    sent += piece.len() as u64;
                    progress(sent);
                }
            }))
        }
        None => Body::wrap_stream(body),
    }
}

#[async_trait]
impl ProviderClient for MuxClient {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn transfer_mode(&self) -> TransferMode {
        TransferMode::WholeFile
    }

    async fn create_session(
        &self,
        metadata: &VideoMetadata,
        fingerprint: &FileFingerprint,
    ) -> VideoResult<UploadSession> {
        let body = json!({
            "cors_origin": metadata.cors_origin,
            "new_asset_settings": {
                "playback_policy": ["public"],
                "passthrough": metadata.title,
                "meta": {
                    "title": metadata.title,
                    "description": metadata.description,
                },
            },
        });

        let response = self
            .authed(self.http_client.post(self.url("uploads")))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VideoError::RemoteRejected {
                provider: PROVIDER,
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let envelope: MuxEnvelope<MuxUpload> = read_json(PROVIDER, response).await?;
        let upload = envelope.data;
        let transfer_url = upload.url.ok_or_else(|| VideoError::InvalidResponse {
            provider: PROVIDER,
            message: format!("upload {} has no upload url", upload.id),
        })?;

        tracing::info!(
            provider = %PROVIDER,
            session_id = %upload.id,
            total_size = fingerprint.size,
            "Upload session created"
        );

        Ok(UploadSession::new(
            PROVIDER,
            upload.id,
            transfer_url,
            fingerprint.clone(),
            Some(metadata.title.clone()),
        ))
    }

    fn upload_instructions(&self, session: &UploadSession) -> UploadInstructions {
        UploadInstructions {
            method: "PUT".to_string(),
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                content_type_for(&session.file_fingerprint.name).to_string(),
            )]),
            note: "PUT the whole file to upload_url in a single request".to_string(),
        }
    }

    async fn transfer_bytes(
        &self,
        session: &UploadSession,
        chunk: Bytes,
        offset: u64,
        progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        let len = chunk.len() as u64;
        if offset != 0 {
            return Err(VideoError::InvalidState(format!(
                "Mux accepts only the whole file in one request (offset {})",
                offset
            )));
        }
        self.transfer_stream(session, sliced(chunk), len, progress)
            .await
    }

    async fn transfer_stream(
        &self,
        session: &UploadSession,
        body: ByteStream,
        len: u64,
        progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        if len != session.total_size {
            return Err(VideoError::InvalidState(format!(
                "Mux accepts only the whole file in one request ({} of {} bytes)",
                len, session.total_size
            )));
        }

        tracing::debug!(
            session_id = %session.session_id,
            bytes = len,
            "Streaming file to Mux upload URL"
        );

        // The upload URL is pre-signed, so no credentials are sent with it.
        let response = self
            .http_client
            .put(&session.transfer_url)
            .header(
                CONTENT_TYPE,
                content_type_for(&session.file_fingerprint.name),
            )
            .header(CONTENT_LENGTH, len)
            .body(counting_body(body, progress))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VideoError::TransferRejected {
                provider: PROVIDER,
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        Ok(session.total_size)
    }

    async fn fetch_status(&self, id: &str) -> VideoResult<AssetStatus> {
        let Some(upload) = self.find_upload(id).await? else {
            // Callers may hold an asset id rather than an upload id.
            return match self.find_asset(id).await? {
                Some(asset) => Ok(Self::asset_status(id, &asset)),
                None => Err(VideoError::NotFound(format!("{} video {}", PROVIDER, id))),
            };
        };

        if let Some(status) = self.upload_status(&upload) {
            return Ok(status);
        }

        // upload_status only defers when an asset id is present
        let asset_id = upload.asset_id.clone().unwrap_or_default();
        match self.find_asset(&asset_id).await? {
            Some(asset) => Ok(Self::asset_status(&upload.id, &asset)),
            None => Ok(AssetStatus {
                provider: PROVIDER,
                session_id: upload.id,
                asset_id: Some(asset_id),
                phase: AssetPhase::Processing,
                provider_status: upload.status,
            }),
        }
    }

    async fn resolve_playback(&self, asset_id: &str) -> VideoResult<PlaybackDescriptor> {
        let asset = self.asset_for(asset_id).await?;

        if asset.status != "ready" {
            return Err(VideoError::NotReady(format!(
                "Mux asset {} is {}",
                asset.id, asset.status
            )));
        }
        let playback_id = asset.public_playback_id().ok_or_else(|| {
            VideoError::NotReady(format!("Mux asset {} has no public playback id", asset.id))
        })?;

        let (width, height) = asset.dimensions();
        Ok(PlaybackDescriptor {
            files: vec![PlaybackFile {
                url: stream_url(playback_id),
                quality: "auto".to_string(),
                width,
                height,
                content_type: "application/x-mpegURL".to_string(),
            }],
        })
    }

    async fn delete(&self, asset_id: &str) -> VideoResult<DeleteOutcome> {
        let response = self
            .authed(
                self.http_client
                    .delete(self.url(&format!("assets/{}", asset_id))),
            )
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(provider = %PROVIDER, asset_id = %asset_id, "Asset deleted");
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(provider = %PROVIDER, asset_id = %asset_id, "Asset already absent");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            _ => Err(lookup_error(PROVIDER, asset_id, response).await),
        }
    }

    async fn get_video(&self, id: &str) -> VideoResult<VideoAsset> {
        let asset = self
            .find_asset(id)
            .await?
            .ok_or_else(|| VideoError::NotFound(format!("{} video {}", PROVIDER, id)))?;
        Ok(Self::to_video_asset(asset))
    }

    async fn list_videos(&self) -> VideoResult<VideoList> {
        let response = self
            .authed(self.http_client.get(self.url("assets")))
            .query(&[("limit", LIST_LIMIT)])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, "assets", response).await);
        }

        let list: MuxAssetList = read_json(PROVIDER, response).await?;
        let count = list.data.len() as u64;
        let total = list.total_row_count.unwrap_or(count);

        Ok(VideoList {
            videos: list.data.into_iter().map(Self::to_video_asset).collect(),
            pagination: Pagination {
                total: Some(total),
                page: Some(1),
                limit: Some(LIST_LIMIT as u64),
                has_next: total > count,
            },
            provider: PROVIDER,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MuxEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MuxUpload {
    id: String,
    #[serde(default)]
    url: Option<String>,
    status: String,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    error: Option<MuxUploadError>,
}

#[derive(Debug, Deserialize)]
struct MuxUploadError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MuxAsset {
    id: String,
    status: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    playback_ids: Vec<MuxPlaybackId>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    passthrough: Option<String>,
    #[serde(default)]
    meta: Option<MuxMeta>,
    #[serde(default)]
    errors: Option<MuxAssetErrors>,
    #[serde(default)]
    tracks: Vec<MuxTrack>,
}

impl MuxAsset {
    fn public_playback_id(&self) -> Option<&str> {
        self.playback_ids
            .iter()
            .find(|p| p.policy == "public")
            .map(|p| p.id.as_str())
    }

    fn dimensions(&self) -> (u32, u32) {
        self.tracks
            .iter()
            .find(|t| t.r#type == "video")
            .map(|t| {
                (
                    t.max_width.unwrap_or(DEFAULT_WIDTH),
                    t.max_height.unwrap_or(DEFAULT_HEIGHT),
                )
            })
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT))
    }

    fn error_detail(&self) -> String {
        self.errors
            .as_ref()
            .and_then(|e| {
                if e.messages.is_empty() {
                    e.r#type.clone()
                } else {
                    Some(e.messages.join("; "))
                }
            })
            .unwrap_or_else(|| format!("Mux asset {} errored", self.id))
    }
}

#[derive(Debug, Deserialize)]
struct MuxPlaybackId {
    id: String,
    policy: String,
}

#[derive(Debug, Deserialize)]
struct MuxMeta {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MuxAssetErrors {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    messages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MuxTrack {
    r#type: String,
    #[serde(default)]
    max_width: Option<u32>,
    #[serde(default)]
    max_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MuxAssetList {
    data: Vec<MuxAsset>,
    #[serde(default)]
    total_row_count: Option<u64>,
}
