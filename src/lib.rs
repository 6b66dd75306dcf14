//! Client-side coordinator for the MusicAI stem separation and mashup backend.
//!
//! Uploads audio, starts separation jobs, polls them to completion, turns the
//! returned stems into mixable tracks and keeps transport, editor and mashup
//! state in one store. Rendering and audio output are left to whatever
//! implements [`playback::WaveformEngine`].

pub mod commands;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod playback;
pub mod services;
pub mod store;

pub use commands::AppContext;
pub use engine::client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use services::settings::Settings;
pub use store::{AppStore, SharedStore};
