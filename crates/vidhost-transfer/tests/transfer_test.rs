//! Transfer engine integration tests.
//!
//! Run with: `cargo test -p vidhost-transfer --test transfer_test`

mod helpers;

use helpers::{metadata, server_error, write_video, FakeProvider, MIB};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidhost_core::models::FileFingerprint;
use vidhost_core::VideoError;
use vidhost_transfer::{
    MemorySessionStore, RetryPolicy, SessionStore, TransferEngine, TransferOutcome,
    TransferProgress, TransferState, VideoFile,
};

struct Fixture {
    _dir: tempfile::TempDir,
    provider: Arc<FakeProvider>,
    store: Arc<MemorySessionStore>,
    file: VideoFile,
}

impl Fixture {
    async fn new(provider: FakeProvider, size: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = write_video(dir.path(), "clip.mp4", size);
        Self {
            provider: Arc::new(provider),
            store: Arc::new(MemorySessionStore::new()),
            file: VideoFile::open(&path).await.unwrap(),
            _dir: dir,
        }
    }

    fn engine(&self) -> TransferEngine {
        TransferEngine::new(
            self.provider.clone(),
            self.store.clone(),
            5 * MIB,
            RetryPolicy::default(),
        )
    }

    async fn persisted_offset(&self) -> Option<u64> {
        self.store
            .load()
            .await
            .unwrap()
            .map(|s| s.acknowledged_offset)
    }
}

#[tokio::test(start_paused = true)]
async fn test_twelve_mib_file_goes_out_in_three_chunks() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();

    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let outcome = engine.run(&fx.file).await.unwrap();

    assert_eq!(
        fx.provider.transfers(),
        vec![(0, 5 * MIB), (5 * MIB, 5 * MIB), (10 * MIB, 2 * MIB)]
    );
    assert!(outcome.is_completed());
    assert_eq!(outcome.session().acknowledged_offset, 12 * MIB);
    assert_eq!(engine.state(), TransferState::Completed);
    // Cleared only once the asset is playable
    assert_eq!(fx.persisted_offset().await, Some(12 * MIB));

    engine.finish().await.unwrap();
    assert_eq!(fx.persisted_offset().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_whole_file_provider_gets_one_call() {
    let fx = Fixture::new(FakeProvider::whole_file(), 12 * MIB).await;
    let reported = Arc::new(Mutex::new(Vec::<TransferProgress>::new()));
    let sink = reported.clone();
    let mut engine = fx
        .engine()
        .with_progress(Arc::new(move |p: TransferProgress| sink.lock().unwrap().push(p)));

    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let outcome = engine.run(&fx.file).await.unwrap();

    assert_eq!(fx.provider.transfers(), vec![(0, 12 * MIB)]);
    assert_eq!(outcome.session().acknowledged_offset, 12 * MIB);

    let reported = reported.lock().unwrap();
    assert_eq!(reported.last().map(|p| p.acknowledged), Some(12 * MIB));
    assert_eq!(reported.last().map(|p| p.total), Some(12 * MIB));
}

#[tokio::test(start_paused = true)]
async fn test_whole_file_retry_streams_from_the_start_again() {
    let fx = Fixture::new(FakeProvider::whole_file(), 12 * MIB).await;
    fx.provider.fail_next_transfers([VideoError::RemoteUnavailable(
        "connection reset".to_string(),
    )]);

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let outcome = engine.run(&fx.file).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(fx.provider.transfers(), vec![(0, 12 * MIB), (0, 12 * MIB)]);
    assert_eq!(fx.persisted_offset().await, Some(12 * MIB));
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported_after_each_chunk() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    let mut engine = fx
        .engine()
        .with_progress(Arc::new(move |p: TransferProgress| {
            sink.lock().unwrap().push(p.acknowledged)
        }));

    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    engine.run(&fx.file).await.unwrap();

    assert_eq!(*reported.lock().unwrap(), vec![5 * MIB, 10 * MIB, 12 * MIB]);
}

#[tokio::test(start_paused = true)]
async fn test_session_is_persisted_after_every_chunk() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    fx.provider
        .fail_next_transfers([server_error(500), server_error(500), server_error(500)]);

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    assert_eq!(fx.persisted_offset().await, Some(0));

    let err = engine.run(&fx.file).await.unwrap_err();
    assert!(matches!(err, VideoError::TransferFailed { .. }));
    assert_eq!(engine.state(), TransferState::Failed);
    // The failed session stays resumable
    assert_eq!(fx.persisted_offset().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_with_linear_backoff() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    fx.provider
        .fail_next_transfers([server_error(503), server_error(502)]);

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = engine.run(&fx.file).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(
        fx.provider.transfers(),
        vec![
            (0, 5 * MIB),
            (0, 5 * MIB),
            (0, 5 * MIB),
            (5 * MIB, 5 * MIB),
            (10 * MIB, 2 * MIB)
        ]
    );
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_surfaces_transfer_failed() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    fx.provider.fail_next_transfers(
        std::iter::repeat_with(|| VideoError::RemoteUnavailable("reset".to_string())).take(10),
    );

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let err = engine.run(&fx.file).await.unwrap_err();

    assert_eq!(fx.provider.transfers().len(), 3);
    match err {
        VideoError::TransferFailed {
            attempts, offset, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(offset, 0);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_rejection_is_not_retried() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    fx.provider.fail_next_transfers([server_error(412)]);

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let err = engine.run(&fx.file).await.unwrap_err();

    assert_eq!(fx.provider.transfers().len(), 1);
    assert!(matches!(err, VideoError::TransferRejected { status: 412, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_short_acknowledgment_resends_from_confirmed_offset() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    fx.provider.confirm_short_once(3 * MIB);

    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    engine.run(&fx.file).await.unwrap();

    assert_eq!(
        fx.provider.transfers(),
        vec![(0, 5 * MIB), (3 * MIB, 5 * MIB), (8 * MIB, 4 * MIB)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_at_chunk_boundary() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    let handle = engine.pause_handle();
    engine = engine.with_progress(Arc::new(move |_: TransferProgress| handle.pause()));

    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    let outcome = engine.run(&fx.file).await.unwrap();

    match &outcome {
        TransferOutcome::Paused(session) => assert_eq!(session.acknowledged_offset, 5 * MIB),
        other => panic!("expected pause, got {:?}", other),
    }
    assert_eq!(engine.state(), TransferState::Paused);
    assert_eq!(fx.provider.transfers(), vec![(0, 5 * MIB)]);
    assert_eq!(fx.persisted_offset().await, Some(5 * MIB));

    // Running again without resuming is refused
    assert!(matches!(
        engine.run(&fx.file).await,
        Err(VideoError::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_pause_continues_from_persisted_offset() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();

    engine.pause();
    let outcome = engine.run(&fx.file).await.unwrap();
    assert_eq!(outcome.session().acknowledged_offset, 0);
    assert!(fx.provider.transfers().is_empty());

    engine.resume_paused().unwrap();
    let outcome = engine.run(&fx.file).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(fx.provider.transfers().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_session_creation_holds_first_chunk() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    fx.provider
        .pause_during_next_session_call(engine.pause_handle());

    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    assert!(engine.pause_handle().is_requested());

    let outcome = engine.run(&fx.file).await.unwrap();
    assert!(!outcome.is_completed());
    assert_eq!(engine.state(), TransferState::Paused);
    assert!(fx.provider.transfers().is_empty());
    assert_eq!(fx.persisted_offset().await, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_resume_reconciliation_holds_next_chunk() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;

    let mut first = fx.engine();
    let handle = first.pause_handle();
    first = first.with_progress(Arc::new(move |_: TransferProgress| handle.pause()));
    first.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    first.run(&fx.file).await.unwrap();

    let persisted = fx.store.load().await.unwrap().unwrap();
    let mut second = fx.engine();
    fx.provider
        .pause_during_next_session_call(second.pause_handle());
    second.resume(&fx.file, persisted).await.unwrap();

    let outcome = second.run(&fx.file).await.unwrap();
    assert!(!outcome.is_completed());
    assert_eq!(outcome.session().acknowledged_offset, 5 * MIB);
    assert_eq!(fx.provider.transfers(), vec![(0, 5 * MIB)]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_continues_from_exact_offset() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;

    let mut first = fx.engine();
    let handle = first.pause_handle();
    first = first.with_progress(Arc::new(move |_: TransferProgress| handle.pause()));
    first.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    first.run(&fx.file).await.unwrap();

    // A fresh engine, as after a restart
    let persisted = fx.store.load().await.unwrap().unwrap();
    let mut second = fx.engine();
    let session = second.resume(&fx.file, persisted).await.unwrap();
    assert_eq!(session.acknowledged_offset, 5 * MIB);

    second.run(&fx.file).await.unwrap();
    assert_eq!(
        fx.provider.transfers(),
        vec![(0, 5 * MIB), (5 * MIB, 5 * MIB), (10 * MIB, 2 * MIB)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resume_with_different_file_fails_without_transfer() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    let mut persisted = engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();

    persisted.file_fingerprint = FileFingerprint {
        last_modified: persisted.file_fingerprint.last_modified + 1,
        ..persisted.file_fingerprint
    };
    fx.store.save(&persisted).await.unwrap();

    let mut resumed = fx.engine();
    let err = resumed.resume(&fx.file, persisted).await.unwrap_err();

    assert!(matches!(err, VideoError::FileMismatch { .. }));
    assert!(fx.provider.transfers().is_empty());
    assert_eq!(resumed.state(), TransferState::Failed);
    assert_eq!(fx.persisted_offset().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_resume_moves_forward_to_backend_offset() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    let mut persisted = engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    persisted.advance(5 * MIB).unwrap();

    fx.provider.set_backend_offset(Some(10 * MIB));
    let mut resumed = fx.engine();
    let session = resumed.resume(&fx.file, persisted).await.unwrap();
    assert_eq!(session.acknowledged_offset, 10 * MIB);
    assert_eq!(fx.persisted_offset().await, Some(10 * MIB));

    resumed.run(&fx.file).await.unwrap();
    assert_eq!(fx.provider.transfers(), vec![(10 * MIB, 2 * MIB)]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_never_moves_backwards() {
    let fx = Fixture::new(FakeProvider::resumable(), 12 * MIB).await;
    let mut engine = fx.engine();
    let mut persisted = engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();
    persisted.advance(5 * MIB).unwrap();

    fx.provider.set_backend_offset(Some(MIB));
    let mut resumed = fx.engine();
    let session = resumed.resume(&fx.file, persisted).await.unwrap();
    assert_eq!(session.acknowledged_offset, 5 * MIB);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_refused() {
    let fx = Fixture::new(FakeProvider::resumable(), MIB).await;
    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();

    assert!(matches!(
        engine.start(&fx.file, &metadata("clip.mp4")).await,
        Err(VideoError::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_empty_file_is_refused() {
    let fx = Fixture::new(FakeProvider::resumable(), 0).await;
    let mut engine = fx.engine();

    assert!(matches!(
        engine.start(&fx.file, &metadata("clip.mp4")).await,
        Err(VideoError::InvalidState(_))
    ));
    assert_eq!(fx.persisted_offset().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_clears_persisted_session() {
    let fx = Fixture::new(FakeProvider::resumable(), MIB).await;
    let mut engine = fx.engine();
    engine.start(&fx.file, &metadata("clip.mp4")).await.unwrap();

    engine.abandon().await.unwrap();
    assert_eq!(engine.state(), TransferState::Idle);
    assert!(engine.session().is_none());
    assert_eq!(fx.persisted_offset().await, None);
}
