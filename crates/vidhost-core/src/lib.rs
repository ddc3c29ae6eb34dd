//! vidhost core library
//!
//! Domain models, the error taxonomy and configuration shared by the provider
//! clients, the transfer engine and the command-line client.

pub mod config;
pub mod error;
pub mod models;
pub mod provider_types;

// Re-export commonly used types
pub use config::{Config, MuxConfig, MuxCredentials, UploadConfig, VimeoConfig};
pub use error::{ErrorMetadata, LogLevel, VideoError, VideoResult};
pub use provider_types::{ProviderKind, TransferMode};
