//! vidhost provider clients
//!
//! This crate defines the `ProviderClient` contract every video hosting backend
//! implements, the Mux and Vimeo clients, and the registry that resolves a
//! provider name to a client.
//!
//! # Provider differences
//!
//! - **Mux** mints an upload id first and an asset id only after ingesting the
//!   file; it accepts the payload as a single authenticated `PUT`.
//! - **Vimeo** uses one id for both, and accepts bytes through the tus
//!   resumable protocol (`PATCH` with `Upload-Offset`).
//!
//! Callers never branch on these differences: the engine asks the client for
//! its `TransferMode` and the shared `AssetStatus` carries both ids.

pub(crate) mod http;
pub mod mux;
pub mod registry;
pub mod traits;
pub mod vimeo;

// Re-export commonly used types
pub use mux::MuxClient;
pub use registry::ProviderRegistry;
pub use traits::{ByteProgress, ByteStream, ProviderClient};
pub use vidhost_core::{ProviderKind, TransferMode, VideoError, VideoResult};
pub use vimeo::VimeoClient;
