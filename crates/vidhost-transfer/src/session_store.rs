//! Persisted upload session record
//!
//! The record is the only state shared across process restarts. Absence of a
//! record means no resumable upload is outstanding.

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use vidhost_core::models::UploadSession;
use vidhost_core::{VideoError, VideoResult};

/// Fixed identifier the persisted record is stored under
pub const DEFAULT_SESSION_KEY: &str = "vidhost.upload_session";

/// Durable key-value slot holding at most one upload session.
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    async fn load(&self) -> VideoResult<Option<UploadSession>>;

    /// Overwrite the record
    async fn save(&self, session: &UploadSession) -> VideoResult<()>;

    /// Remove the record. Clearing an empty store is a no-op.
    async fn clear(&self) -> VideoResult<()>;
}

/// JSON file under a directory, written atomically via rename.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, DEFAULT_SESSION_KEY)
    }

    pub fn with_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> VideoResult<Option<UploadSession>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VideoError::SessionStore(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let session: UploadSession = serde_json::from_slice(&raw)?;
        Ok(Some(session))
    }

    async fn save(&self, session: &UploadSession) -> VideoResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                VideoError::SessionStore(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await.map_err(|e| {
            VideoError::SessionStore(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            VideoError::SessionStore(format!(
                "Failed to move session record into {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            session_id = %session.session_id,
            offset = session.acknowledged_offset,
            "Session persisted"
        );
        Ok(())
    }

    async fn clear(&self) -> VideoResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VideoError::SessionStore(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-process store, for tests and for callers that do not need restarts.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<UploadSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> VideoResult<Option<UploadSession>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, session: &UploadSession) -> VideoResult<()> {
        *self.slot.lock().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> VideoResult<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhost_core::models::FileFingerprint;
    use vidhost_core::ProviderKind;

    fn session() -> UploadSession {
        let mut session = UploadSession::new(
            ProviderKind::Vimeo,
            "987",
            "https://tus.example/987",
            FileFingerprint {
                name: "clip.mp4".to_string(),
                size: 100,
                last_modified: 1_700_000_000_000,
            },
            Some("clip".to_string()),
        );
        session.advance(40).unwrap();
        session
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested"));

        assert!(store.load().await.unwrap().is_none());

        let saved = session();
        store.save(&saved).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(saved));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_uses_camel_case_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&session()).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["sessionId"], "987");
        assert_eq!(value["acknowledgedOffset"], 40);
        assert_eq!(value["totalSize"], 100);
        assert_eq!(value["fileFingerprint"]["lastModified"], 1_700_000_000_000i64);
        assert_eq!(value["provider"], "vimeo");
        assert_eq!(value["displayName"], "clip");
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(matches!(
            store.load().await,
            Err(VideoError::SessionStore(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySessionStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&session()).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().acknowledged_offset, 40);
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
