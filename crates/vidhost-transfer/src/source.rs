//! Local source file handle

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use vidhost_core::models::{content_type_for, FileFingerprint};
use vidhost_core::{VideoError, VideoResult};
use vidhost_providers::ByteStream;

/// Read buffer for streamed whole-file transfers
const STREAM_BUFFER_BYTES: usize = 256 * 1024;

/// A video file on local disk, identified by its fingerprint.
///
/// The fingerprint is captured once at open time; reads go back to disk so
/// large files are never held in memory beyond one chunk.
#[derive(Debug, Clone)]
pub struct VideoFile {
    path: PathBuf,
    fingerprint: FileFingerprint,
}

impl VideoFile {
    pub async fn open(path: impl AsRef<Path>) -> VideoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await?;

        if !metadata.is_file() {
            return Err(VideoError::InvalidState(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| {
                VideoError::InvalidState(format!("{} has no usable file name", path.display()))
            })?;

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Self {
            fingerprint: FileFingerprint {
                name,
                size: metadata.len(),
                last_modified,
            },
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> &FileFingerprint {
        &self.fingerprint
    }

    pub fn name(&self) -> &str {
        &self.fingerprint.name
    }

    pub fn size(&self) -> u64 {
        self.fingerprint.size
    }

    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.fingerprint.name)
    }

    /// Read `len` bytes starting at `offset`.
    pub async fn read_range(&self, offset: u64, len: u64) -> VideoResult<Bytes> {
        if offset + len > self.size() {
            return Err(VideoError::InvalidState(format!(
                "range {}..{} is past the end of {} ({} bytes)",
                offset,
                offset + len,
                self.name(),
                self.size()
            )));
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let len = usize::try_from(len).map_err(|_| {
            VideoError::InvalidState(format!("range of {} bytes does not fit in memory", len))
        })?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    /// Stream the whole file from disk, capped at the fingerprinted size.
    ///
    /// Each call opens the file anew, so a failed transfer can be retried
    /// with a fresh stream.
    pub async fn stream(&self) -> VideoResult<ByteStream> {
        let file = File::open(&self.path).await?;
        let reader = file.take(self.size());
        Ok(Box::pin(ReaderStream::with_capacity(
            reader,
            STREAM_BUFFER_BYTES,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;

    fn temp_video(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".webm").tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_open_captures_fingerprint() {
        let temp = temp_video(b"0123456789");
        let video = VideoFile::open(temp.path()).await.unwrap();

        assert_eq!(video.size(), 10);
        assert!(video.name().ends_with(".webm"));
        assert_eq!(video.content_type(), "video/webm");
        assert!(video.fingerprint().last_modified > 0);
    }

    #[tokio::test]
    async fn test_read_range() {
        let temp = temp_video(b"0123456789");
        let video = VideoFile::open(temp.path()).await.unwrap();

        assert_eq!(&video.read_range(3, 4).await.unwrap()[..], b"3456");
        assert_eq!(&video.read_range(0, 10).await.unwrap()[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_stream_yields_whole_file_in_bounded_pieces() {
        let contents: Vec<u8> = (0..600 * 1024).map(|i| (i % 251) as u8).collect();
        let temp = temp_video(&contents);
        let video = VideoFile::open(temp.path()).await.unwrap();

        let pieces: Vec<Bytes> = video.stream().await.unwrap().try_collect().await.unwrap();
        assert!(pieces.len() >= 3);
        assert!(pieces.iter().all(|p| p.len() <= STREAM_BUFFER_BYTES));
        assert_eq!(pieces.concat(), contents);
    }

    #[tokio::test]
    async fn test_stream_stops_at_fingerprinted_size() {
        let mut temp = temp_video(b"0123456789");
        let video = VideoFile::open(temp.path()).await.unwrap();
        temp.write_all(b"appended").unwrap();
        temp.flush().unwrap();

        let pieces: Vec<Bytes> = video.stream().await.unwrap().try_collect().await.unwrap();
        assert_eq!(pieces.concat(), b"0123456789");
    }

    #[tokio::test]
    async fn test_each_stream_starts_from_the_beginning() {
        let temp = temp_video(b"abc");
        let video = VideoFile::open(temp.path()).await.unwrap();

        let first: Vec<Bytes> = video.stream().await.unwrap().try_collect().await.unwrap();
        let second: Vec<Bytes> = video.stream().await.unwrap().try_collect().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_read_past_end_fails() {
        let temp = temp_video(b"0123");
        let video = VideoFile::open(temp.path()).await.unwrap();
        assert!(matches!(
            video.read_range(2, 5).await,
            Err(VideoError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_file_is_io_error() {
        let err = VideoFile::open("/definitely/not/here.mp4").await.unwrap_err();
        assert!(matches!(err, VideoError::Io(_)));
    }
}
