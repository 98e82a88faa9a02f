//! Playback coordination for a local media player with a radio tuner.
//!
//! `PlayerCore` owns the playlist, the station list, the subtitle binding and
//! the playback session, and drives a `MediaEngine` supplied by the host.

pub mod core;
pub mod engine;
pub mod error;
pub mod playlist;
pub mod resources;
pub mod session;
pub mod state;
pub mod stations;
pub mod subtitle;

pub use crate::core::{BroadcastMessage, PlayerCore, PlayerEvent};
pub use engine::{EngineEvent, MediaEngine, TextTrackId, TrackMode};
pub use error::{EngineError, FetchError, PlayRejection};
