use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible player.
pub const PROTOCOL_VERSION: u32 = 1;

// ── locators ──────────────────────────────────────────────────────────────────

/// Handle to a locally created playable resource (media file or subtitle file).
/// Only the resource manager mints these; they render as `blob:<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobHandle(pub u64);

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

/// Where playable content lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Locally created handle; must be released exactly once.
    Blob(BlobHandle),
    /// Remote URI (radio streams, remote subtitle files).  Never released.
    Remote(String),
}

impl Locator {
    pub fn blob_handle(&self) -> Option<BlobHandle> {
        match self {
            Locator::Blob(h) => Some(*h),
            Locator::Remote(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Blob(h) => h.fmt(f),
            Locator::Remote(url) => f.write_str(url),
        }
    }
}

// ── media model ───────────────────────────────────────────────────────────────

/// Stable identity of a playlist entry; survives reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub locator: Locator,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: EntryId,
    pub display_name: String,
    pub locator: Locator,
    /// MIME type, e.g. `video/mp4`.  Empty when unknown.
    pub mime_kind: String,
    #[serde(default)]
    pub is_live_stream: bool,
    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

impl MediaEntry {
    pub fn has_subtitles(&self) -> bool {
        !self.subtitle_tracks.is_empty()
    }

    /// Index of the subtitle that becomes active when this entry is selected.
    pub fn default_subtitle(&self) -> Option<usize> {
        self.has_subtitles().then_some(0)
    }

    /// Every locally created handle owned by this entry, media first.
    pub fn blob_handles(&self) -> Vec<BlobHandle> {
        std::iter::once(&self.locator)
            .chain(self.subtitle_tracks.iter().map(|t| &t.locator))
            .filter_map(Locator::blob_handle)
            .collect()
    }
}

/// A radio station.  Identity is the stream URL.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RadioStation {
    pub name: String,
    pub url: String,
    /// Country the station broadcasts from; used for display grouping only.
    #[serde(default)]
    pub country: String,
}

impl PartialEq for RadioStation {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for RadioStation {}

impl RadioStation {
    pub fn new(name: &str, url: &str, country: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            country: country.to_string(),
        }
    }
}

/// What is currently loaded.  File and station selection are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaybackSelection {
    #[default]
    None,
    File {
        entry_index: usize,
    },
    Station {
        station_index: usize,
    },
}

impl PlaybackSelection {
    pub fn is_none(&self) -> bool {
        matches!(self, PlaybackSelection::None)
    }

    pub fn file_index(&self) -> Option<usize> {
        match self {
            PlaybackSelection::File { entry_index } => Some(*entry_index),
            _ => None,
        }
    }

    pub fn station_index(&self) -> Option<usize> {
        match self {
            PlaybackSelection::Station { station_index } => Some(*station_index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "fill")]
    Fill,
}

impl AspectRatio {
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Original => "original",
            AspectRatio::Wide => "16:9",
            AspectRatio::Standard => "4:3",
            AspectRatio::Fill => "fill",
        }
    }
}

/// Transient transport state.  Rebuilt whenever the source changes; transport
/// fields mirror the engine's own events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time_secs: f64,
    /// May be non-finite for live streams; serialised as `null` then.
    pub duration_secs: Option<f64>,
    /// Fraction of the media played, `0.0..=1.0`.  Held at 0 for live streams.
    pub progress: f64,
    /// User-chosen volume.  The engine gets 0 while muted.
    pub volume: f64,
    pub is_muted: bool,
    pub playback_rate: f64,
    pub active_subtitle: Option<usize>,
    /// Cues of the active subtitle are loaded into the engine.  Stays false
    /// while content is in flight and after a failed fetch.
    #[serde(default)]
    pub subtitle_rendering: bool,
    pub subtitle_offset_secs: f64,
    pub subtitle_position_px: i32,
    pub aspect_ratio: AspectRatio,
    pub is_fullscreen: bool,
    pub is_live_stream: bool,
    pub has_next: bool,
    pub has_previous: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time_secs: 0.0,
            duration_secs: None,
            progress: 0.0,
            volume: 1.0,
            is_muted: false,
            playback_rate: 1.0,
            active_subtitle: None,
            subtitle_rendering: false,
            subtitle_offset_secs: 0.0,
            subtitle_position_px: 0,
            aspect_ratio: AspectRatio::Original,
            is_fullscreen: false,
            is_live_stream: false,
            has_next: false,
            has_previous: false,
            last_error: None,
        }
    }
}

impl PlaybackState {
    /// Volume the engine should actually play at.
    pub fn effective_volume(&self) -> f64 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// Choices the presentation layer offers, taken from the player config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlOptions {
    pub playback_rates: Vec<f64>,
    /// Seconds added or removed per subtitle-offset step.
    pub subtitle_offset_step: f64,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            playback_rates: vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0],
            subtitle_offset_step: 0.1,
        }
    }
}

/// Full read-only view handed to the presentation layer.  `rev` is a
/// monotonically increasing counter incremented on every state change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub selection: PlaybackSelection,
    pub playback: PlaybackState,
    pub playlist: Vec<MediaEntry>,
    pub stations: Vec<RadioStation>,
    #[serde(default)]
    pub controls: ControlOptions,
}

impl PlayerSnapshot {
    /// Display name of whatever is loaded, if anything.
    pub fn now_playing(&self) -> Option<&str> {
        match self.selection {
            PlaybackSelection::None => None,
            PlaybackSelection::File { entry_index } => self
                .playlist
                .get(entry_index)
                .map(|e| e.display_name.as_str()),
            PlaybackSelection::Station { station_index } => {
                self.stations.get(station_index).map(|s| s.name.as_str())
            }
        }
    }
}

// ── wire messages ─────────────────────────────────────────────────────────────

/// Messages sent from a client to the player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    AddFiles { paths: Vec<PathBuf> },
    /// Attach subtitle files to the current playlist entry.
    AddSubtitles { paths: Vec<PathBuf> },
    SelectFile { index: usize },
    RemoveFile { index: usize },
    Reorder { from: usize, to: usize },
    SelectStation { index: usize },
    NextStation,
    PrevStation,
    /// Next/previous playlist entry.
    Next,
    Prev,
    TogglePause,
    Stop,
    SeekToFraction { fraction: f64 },
    Volume { value: f64 },
    ToggleMute,
    PlaybackRate { rate: f64 },
    ToggleFullscreen,
    SwitchSubtitle { index: Option<usize> },
    SubtitleOffset { seconds: f64 },
    SubtitlePosition { pixels: i32 },
    AspectRatio { mode: AspectRatio },
    GetState,
}

/// Messages sent from the player to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full snapshot.
    Hello {
        protocol_version: u32,
        rev: u64,
        state: PlayerSnapshot,
    },
    State {
        data: PlayerSnapshot,
    },
    Log {
        message: String,
    },
    /// A user-visible failure (playback rejected, fullscreen refused, ...).
    Error {
        message: String,
    },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = u32::try_from(json.len())?;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
