//! Data models shared by the provider clients and the transfer engine.

mod asset;
mod direct_upload;
mod metadata;
mod playback;
mod session;

pub use asset::*;
pub use direct_upload::*;
pub use metadata::*;
pub use playback::*;
pub use session::*;
