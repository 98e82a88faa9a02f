//! The media engine capability consumed by the core.
//!
//! The core never decodes or renders anything itself.  It drives exactly one
//! engine instance through this trait and learns about transport changes only
//! through `EngineEvent`s delivered on the core's event channel.

use async_trait::async_trait;
use player_proto::protocol::AspectRatio;

use crate::error::{EngineError, PlayRejection};

/// Identifier of a text track registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextTrackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Disabled,
    Showing,
}

/// Unsolicited notifications from the engine (or the host window it lives in).
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playback position moved.  `duration` may be non-finite for live streams.
    TimeUpdate { current_time: f64, duration: f64 },
    LoadedMetadata { duration: f64 },
    Play,
    Pause,
    Ended,
    /// The host entered or left fullscreen, for whatever reason.
    FullscreenChanged(bool),
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Point the engine at a playable path or URL, or unload with `None`.
    /// Does not start playback.
    async fn set_source(&self, source: Option<&str>) -> Result<(), EngineError>;

    /// Start or resume playback.  May be rejected.
    async fn play(&self) -> Result<(), PlayRejection>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn seek(&self, seconds: f64) -> Result<(), EngineError>;

    /// Output volume, `0.0..=1.0`.
    async fn set_volume(&self, volume: f64) -> Result<(), EngineError>;

    async fn set_muted(&self, muted: bool) -> Result<(), EngineError>;

    async fn set_playback_rate(&self, rate: f64) -> Result<(), EngineError>;

    /// Display hint; engines without video output can ignore it.
    async fn set_aspect_ratio(&self, _mode: AspectRatio) -> Result<(), EngineError> {
        Ok(())
    }

    /// Ask the host to enter/leave fullscreen.  Success does not mean the
    /// state changed; wait for `EngineEvent::FullscreenChanged`.
    async fn request_fullscreen(&self, fullscreen: bool) -> Result<(), EngineError>;

    async fn add_text_track(&self, label: &str, language: &str)
        -> Result<TextTrackId, EngineError>;

    async fn add_cue(
        &self,
        track: TextTrackId,
        start: f64,
        end: f64,
        text: &str,
    ) -> Result<(), EngineError>;

    /// Engines may snapshot a track's cues when it is switched to `Showing`;
    /// callers set `Showing` again after registering cues.
    async fn set_track_mode(&self, track: TextTrackId, mode: TrackMode)
        -> Result<(), EngineError>;
}
