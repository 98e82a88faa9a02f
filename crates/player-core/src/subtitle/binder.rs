use player_proto::protocol::{Locator, SubtitleTrack};
use tracing::{debug, info, warn};

use super::parser::{parse_srt, SubtitleCue};
use crate::engine::{MediaEngine, TextTrackId, TrackMode};
use crate::error::{EngineError, FetchError};

/// Language tag given to every text track registered with the engine.
const TRACK_LANGUAGE: &str = "en";

/// Content fetch the caller must run for the track just bound.  The result goes
/// back through `SubtitleBinder::apply_loaded` with the same generation.
#[derive(Debug, Clone)]
pub struct SubtitleFetch {
    pub generation: u64,
    pub track: TextTrackId,
    pub locator: Locator,
    pub label: String,
}

/// What `SubtitleBinder::apply_loaded` did with a fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Cues were registered; carries how many.
    Rendered(usize),
    /// The result belonged to an older bind and was dropped.
    Stale,
    /// The content could not be fetched; the track was disabled.
    Failed(String),
}

/// Keeps exactly one subtitle track bound into the engine.
///
/// Every rebind disables all tracks bound so far before registering a new
/// one, and bumps a generation counter so content that arrives for an older
/// bind is dropped instead of being rendered on top of the current one.
#[derive(Debug, Default)]
pub struct SubtitleBinder {
    generation: u64,
    bound: Vec<TextTrackId>,
    active: Option<TextTrackId>,
    offset_secs: f64,
    cues: Vec<SubtitleCue>,
    rendering: bool,
}

impl SubtitleBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Parsed cues of the current track, as in the source file.
    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    /// True once cues for the current bind have been registered.
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Unbind whatever is bound, then bind `track` (if any) with `offset_secs`.
    pub async fn rebind(
        &mut self,
        engine: &dyn MediaEngine,
        track: Option<&SubtitleTrack>,
        offset_secs: f64,
    ) -> Result<Option<SubtitleFetch>, EngineError> {
        self.generation += 1;
        self.disable_bound(engine).await;
        self.cues.clear();
        self.rendering = false;
        self.offset_secs = offset_secs;

        let Some(track) = track else {
            return Ok(None);
        };

        let id = engine.add_text_track(&track.label, TRACK_LANGUAGE).await?;
        self.bound.push(id);
        self.active = Some(id);
        engine.set_track_mode(id, TrackMode::Showing).await?;
        debug!(
            "subtitle: bound '{}' as {:?} (gen {}, offset {:+.2}s)",
            track.label, id, self.generation, offset_secs
        );

        Ok(Some(SubtitleFetch {
            generation: self.generation,
            track: id,
            locator: track.locator.clone(),
            label: track.label.clone(),
        }))
    }

    /// Register fetched content for the bind identified by `generation`.
    pub async fn apply_loaded(
        &mut self,
        engine: &dyn MediaEngine,
        generation: u64,
        track: TextTrackId,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, EngineError> {
        if generation != self.generation || self.active != Some(track) {
            debug!(
                "subtitle: dropping stale content for {:?} (gen {} != {})",
                track, generation, self.generation
            );
            return Ok(LoadOutcome::Stale);
        }

        let content = match result {
            Ok(content) => content,
            Err(e) => {
                warn!("Error loading subtitle file: {}", e);
                self.active = None;
                engine.set_track_mode(track, TrackMode::Disabled).await?;
                return Ok(LoadOutcome::Failed(e.to_string()));
            }
        };

        let cues = parse_srt(&content);
        for cue in &cues {
            let (start, end) = cue.shifted(self.offset_secs);
            engine.add_cue(track, start, end, &cue.text).await?;
        }
        engine.set_track_mode(track, TrackMode::Showing).await?;
        info!("subtitle: {} cues registered on {:?}", cues.len(), track);

        let count = cues.len();
        self.cues = cues;
        self.rendering = true;
        Ok(LoadOutcome::Rendered(count))
    }

    /// Disable every bound track.  Used on teardown.
    pub async fn release(&mut self, engine: &dyn MediaEngine) {
        self.generation += 1;
        self.disable_bound(engine).await;
        self.cues.clear();
        self.rendering = false;
    }

    async fn disable_bound(&mut self, engine: &dyn MediaEngine) {
        self.active = None;
        for id in self.bound.drain(..) {
            if let Err(e) = engine.set_track_mode(id, TrackMode::Disabled).await {
                warn!("subtitle: failed to disable {:?}: {}", id, e);
            }
        }
    }
}
