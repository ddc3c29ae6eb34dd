//! Vimeo provider client
//!
//! Vimeo uploads go through the tus resumable protocol: the create call returns
//! an upload link, each `PATCH` carries `Upload-Offset` and the response echoes
//! the offset the server now holds. A `HEAD` on the same link reports that
//! offset without sending data. The video id doubles as the session id.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use vidhost_core::models::{
    AssetPhase, AssetStatus, DeleteOutcome, FileFingerprint, Pagination, PlayableAsset,
    PlaybackDescriptor, PlaybackFile, UploadInstructions, UploadSession, VideoAsset, VideoList,
    VideoMetadata,
};
use vidhost_core::{ProviderKind, TransferMode, VideoError, VideoResult};

use crate::http::{
    build_client, error_body, lookup_error, read_json, transport_error, trim_base_url,
};
use crate::traits::{ByteProgress, ProviderClient};

const PROVIDER: ProviderKind = ProviderKind::Vimeo;
const API_ACCEPT: &str = "application/vnd.vimeo.*+json;version=3.4";
const TUS_VERSION: &str = "1.0.0";
const TUS_CONTENT_TYPE: &str = "application/offset+octet-stream";
const PLAYER_BASE_URL: &str = "https://player.vimeo.com/video";
const PAGE_SIZE: u32 = 100;
const STATUS_FIELDS: &str = "uri,status,duration,link,upload";
const VIDEO_FIELDS: &str = "uri,name,description,duration,status,created_time,link";

pub struct VimeoClient {
    http_client: Client,
    base_url: String,
    access_token: String,
    folder_id: String,
}

impl Debug for VimeoClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VimeoClient")
            .field("base_url", &self.base_url)
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

impl VimeoClient {
    pub fn new(
        access_token: String,
        base_url: &str,
        folder_id: String,
        timeout: Duration,
    ) -> VideoResult<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
            base_url: trim_base_url(base_url),
            access_token,
            folder_id,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .header(ACCEPT, API_ACCEPT)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_fields<T: serde::de::DeserializeOwned>(
        &self,
        id: &str,
        fields: &str,
    ) -> VideoResult<T> {
        let response = self
            .authed(self.http_client.get(self.url(&format!("/videos/{}", id))))
            .query(&[("fields", fields)])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, id, response).await);
        }
        read_json(PROVIDER, response).await
    }

    fn to_video_asset(video: VimeoVideo) -> VideoAsset {
        let id = video_id(&video.uri).to_string();
        VideoAsset {
            embed_html: Some(embed_html(&id)),
            id,
            title: video.name,
            description: video.description,
            duration: video.duration,
            status: video.status.unwrap_or_else(|| "unknown".to_string()),
            created_at: video.created_time,
            link: video.link,
            provider: PROVIDER,
        }
    }
}

/// `/videos/123456` -> `123456`
fn video_id(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn embed_html(id: &str) -> String {
    format!(
        r#"<iframe src="{}/{}" width="640" height="360" frameborder="0" allow="autoplay; fullscreen; picture-in-picture" allowfullscreen></iframe>"#,
        PLAYER_BASE_URL, id
    )
}

fn upload_offset(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("upload-offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Map Vimeo's status vocabulary onto the shared phases.
fn phase_for(id: &str, video: &VimeoStatus) -> AssetPhase {
    let status = video.status.as_deref().unwrap_or("unknown");
    match status {
        "available" => AssetPhase::Ready(PlayableAsset {
            asset_id: id.to_string(),
            duration: video.duration,
            embed_html: embed_html(id),
            link: video
                .link
                .clone()
                .unwrap_or_else(|| format!("https://vimeo.com/{}", id)),
        }),
        "uploading" => AssetPhase::Uploading,
        "uploading_error" | "transcoding_error" | "error" | "quota_exceeded"
        | "total_cap_exceeded" => AssetPhase::Errored {
            detail: format!("Vimeo reported {}", status),
        },
        _ => {
            if video.upload.as_ref().and_then(|u| u.status.as_deref()) == Some("error") {
                AssetPhase::Errored {
                    detail: "Vimeo upload failed".to_string(),
                }
            } else {
                AssetPhase::Processing
            }
        }
    }
}

#[async_trait]
impl ProviderClient for VimeoClient {
    fn kind(&self) -> ProviderKind {
        PROVIDER
    }

    fn transfer_mode(&self) -> TransferMode {
        TransferMode::Resumable
    }

    async fn create_session(
        &self,
        metadata: &VideoMetadata,
        fingerprint: &FileFingerprint,
    ) -> VideoResult<UploadSession> {
        let body = json!({
            "upload": {
                "approach": "tus",
                "size": fingerprint.size,
            },
            "name": metadata.title,
            "description": metadata.description,
            "folder_uri": format!("/{}", self.folder_id),
        });

        let response = self
            .authed(self.http_client.post(self.url("/me/videos")))
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

        let created: VimeoCreated = read_json(PROVIDER, response).await?;
        let upload_link = created
            .upload
            .and_then(|u| u.upload_link)
            .ok_or_else(|| VideoError::InvalidResponse {
                provider: PROVIDER,
                message: format!("video {} has no upload link", created.uri),
            })?;
        let id = video_id(&created.uri).to_string();

        tracing::info!(
            provider = %PROVIDER,
            session_id = %id,
            total_size = fingerprint.size,
            "Upload session created"
        );

        Ok(UploadSession::new(
            PROVIDER,
            id,
            upload_link,
            fingerprint.clone(),
            Some(metadata.title.clone()),
        ))
    }

    fn upload_instructions(&self, session: &UploadSession) -> UploadInstructions {
        UploadInstructions {
            method: "PATCH".to_string(),
            headers: BTreeMap::from([
                ("Content-Type".to_string(), TUS_CONTENT_TYPE.to_string()),
                ("Tus-Resumable".to_string(), TUS_VERSION.to_string()),
                (
                    "Upload-Offset".to_string(),
                    session.acknowledged_offset.to_string(),
                ),
            ]),
            note: "PATCH bytes to upload_url with the tus protocol, starting at Upload-Offset; \
                   HEAD the same URL to learn the offset after an interruption"
                .to_string(),
        }
    }

    async fn transfer_bytes(
        &self,
        session: &UploadSession,
        chunk: Bytes,
        offset: u64,
        _progress: Option<ByteProgress>,
    ) -> VideoResult<u64> {
        let len = chunk.len() as u64;

        // The tus upload link carries its own authorization.
        let response = self
            .http_client
            .patch(&session.transfer_url)
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Offset", offset)
            .header(CONTENT_TYPE, TUS_CONTENT_TYPE)
            .body(chunk)
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

        let confirmed = upload_offset(response.headers()).unwrap_or(offset + len);
        tracing::debug!(
            provider = %PROVIDER,
            session_id = %session.session_id,
            offset = offset,
            confirmed = confirmed,
            "Chunk acknowledged"
        );
        Ok(confirmed)
    }

    async fn confirmed_offset(&self, session: &UploadSession) -> VideoResult<Option<u64>> {
        let response = self
            .http_client
            .head(&session.transfer_url)
            .header("Tus-Resumable", TUS_VERSION)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, &session.session_id, response).await);
        }
        Ok(upload_offset(response.headers()))
    }

    async fn fetch_status(&self, id: &str) -> VideoResult<AssetStatus> {
        let video: VimeoStatus = self.get_fields(id, STATUS_FIELDS).await?;
        let phase = phase_for(id, &video);

        Ok(AssetStatus {
            provider: PROVIDER,
            session_id: id.to_string(),
            asset_id: Some(id.to_string()),
            phase,
            provider_status: video.status.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn resolve_playback(&self, asset_id: &str) -> VideoResult<PlaybackDescriptor> {
        let video: VimeoFiles = self.get_fields(asset_id, "files").await?;

        let files: Vec<PlaybackFile> = video
            .files
            .into_iter()
            .filter_map(|f| {
                let url = f.link?;
                let quality = f.quality?;
                Some(PlaybackFile {
                    url,
                    quality,
                    width: f.width.unwrap_or(0),
                    height: f.height.unwrap_or(0),
                    content_type: f.r#type.unwrap_or_else(|| "video/mp4".to_string()),
                })
            })
            .collect();

        if files.is_empty() {
            return Err(VideoError::NotReady(format!(
                "Vimeo video {} has no playable files yet",
                asset_id
            )));
        }
        Ok(PlaybackDescriptor { files })
    }

    async fn delete(&self, asset_id: &str) -> VideoResult<DeleteOutcome> {
        let response = self
            .authed(
                self.http_client
                    .delete(self.url(&format!("/videos/{}", asset_id))),
            )
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(provider = %PROVIDER, asset_id = %asset_id, "Video deleted");
                Ok(DeleteOutcome::Deleted)
            }
            StatusCode::NOT_FOUND => {
                tracing::debug!(provider = %PROVIDER, asset_id = %asset_id, "Video already absent");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            _ => Err(lookup_error(PROVIDER, asset_id, response).await),
        }
    }

    async fn get_video(&self, id: &str) -> VideoResult<VideoAsset> {
        let video: VimeoVideo = self.get_fields(id, VIDEO_FIELDS).await?;
        Ok(Self::to_video_asset(video))
    }

    async fn list_videos(&self) -> VideoResult<VideoList> {
        let response = self
            .authed(self.http_client.get(self.url("/me/videos")))
            .query(&[("per_page", PAGE_SIZE.to_string().as_str()), ("fields", VIDEO_FIELDS)])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(lookup_error(PROVIDER, "me/videos", response).await);
        }

        let page: VimeoPage = read_json(PROVIDER, response).await?;
        Ok(VideoList {
            videos: page.data.into_iter().map(Self::to_video_asset).collect(),
            pagination: Pagination {
                total: page.total,
                page: page.page,
                limit: page.per_page,
                has_next: page.paging.and_then(|p| p.next).is_some(),
            },
            provider: PROVIDER,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VimeoCreated {
    uri: String,
    #[serde(default)]
    upload: Option<VimeoUpload>,
}

#[derive(Debug, Deserialize)]
struct VimeoUpload {
    #[serde(default)]
    upload_link: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VimeoStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    upload: Option<VimeoUpload>,
}

#[derive(Debug, Deserialize)]
struct VimeoFiles {
    #[serde(default)]
    files: Vec<VimeoFile>,
}

#[derive(Debug, Deserialize)]
struct VimeoFile {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r#type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VimeoVideo {
    uri: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VimeoPage {
    #[serde(default)]
    data: Vec<VimeoVideo>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    per_page: Option<u64>,
    #[serde(default)]
    paging: Option<VimeoPaging>,
}

#[derive(Debug, Deserialize)]
struct VimeoPaging {
    #[serde(default)]
    next: Option<String>,
}
