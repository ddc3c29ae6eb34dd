//! vidhost transfer
//!
//! Drives an upload from a local file to a remote video host and waits for
//! the host to finish transcoding it:
//!
//! - `TransferEngine` sends the file in sequential chunks (or in one request
//!   for whole-file providers), persisting the session after every
//!   acknowledged chunk so an interrupted upload resumes from the last
//!   confirmed byte.
//! - `StatusPoller` waits for the remote asset to become playable.
//! - `UploadOrchestrator` sequences both and owns session cleanup.

pub mod engine;
pub mod orchestrator;
pub mod poller;
pub mod retry;
pub mod session_store;
pub mod source;

pub use engine::{
    PauseHandle, ProgressCallback, TransferEngine, TransferOutcome, TransferProgress,
    TransferState,
};
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadResult};
pub use poller::{PollState, StatusPoller};
pub use retry::RetryPolicy;
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore, DEFAULT_SESSION_KEY};
pub use source::VideoFile;
