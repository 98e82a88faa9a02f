//! Error types for the player core.
//!
//! Nothing here is fatal: every failure degrades to "no media", "no subtitle"
//! or "unchanged selection" in the core loop.

use player_proto::protocol::BlobHandle;

use crate::engine::TextTrackId;

/// A command sent to the media engine failed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("media engine unavailable: {0}")]
    Unavailable(String),

    #[error("media engine rejected command: {0}")]
    Command(String),

    #[error("unknown text track {0:?}")]
    UnknownTrack(TextTrackId),

    #[error("fullscreen request refused: {0}")]
    FullscreenRefused(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a play request did not start playback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayRejection {
    /// A newer load replaced the source while the request was in flight.
    #[error("play request superseded by a newer load")]
    Superseded,

    /// The host refused to start playback (e.g. autoplay policy).
    #[error("playback not allowed: {0}")]
    NotAllowed(String),

    /// Decode or transport failure.
    #[error("playback failed: {0}")]
    Failed(String),
}

impl PlayRejection {
    pub fn is_superseded(&self) -> bool {
        matches!(self, PlayRejection::Superseded)
    }
}

impl From<EngineError> for PlayRejection {
    fn from(e: EngineError) -> Self {
        PlayRejection::Failed(e.to_string())
    }
}

/// Fetching subtitle content failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("blob handle {0} is not registered")]
    UnknownBlob(BlobHandle),

    #[error("unsupported subtitle locator: {0}")]
    Unsupported(String),

    #[error("failed to read subtitle file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to fetch subtitle: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subtitle fetch returned HTTP {0}")]
    Status(reqwest::StatusCode),
}
