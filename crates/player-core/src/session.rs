//! Playback session: the one live "now playing" source and its transport state.
//!
//! The session drives the engine but only believes what the engine reports:
//! `is_playing`, position, duration and fullscreen are updated from
//! `EngineEvent`s, never from the success of a request.  Play requests are
//! asynchronous; each load bumps a generation so that a rejection belonging
//! to a superseded load is recognised and ignored.

use std::sync::Arc;

use player_proto::protocol::{AspectRatio, PlaybackState};
use tracing::{debug, info, warn};

use crate::engine::{EngineEvent, MediaEngine};
use crate::error::{EngineError, PlayRejection};

/// A source ready to hand to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub display_name: String,
    /// Path or URL the engine can open.
    pub source: String,
    pub is_live_stream: bool,
}

/// A play request the caller must issue (usually on a spawned task) and
/// report back through `PlaybackSession::on_play_resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayTicket {
    pub generation: u64,
    pub origin: PlayOrigin,
}

/// Why a play request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOrigin {
    /// Autoplay after a new source was loaded.
    Load,
    /// The user resumed paused media.  Rejections are only logged.
    Resume,
}

/// Follow-up the caller has to act on after an engine event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    None,
    /// Media finished; the caller decides what plays next.
    Ended,
}

pub struct PlaybackSession {
    engine: Arc<dyn MediaEngine>,
    state: PlaybackState,
    loaded: Option<LoadRequest>,
    load_generation: u64,
}

impl PlaybackSession {
    pub fn new(engine: Arc<dyn MediaEngine>, initial_volume: f64) -> Self {
        let state = PlaybackState {
            volume: initial_volume.clamp(0.0, 1.0),
            ..PlaybackState::default()
        };
        Self {
            engine,
            state,
            loaded: None,
            load_generation: 0,
        }
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn loaded(&self) -> Option<&LoadRequest> {
        self.loaded.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.load_generation
    }

    /// Push volume, mute and rate to a fresh engine.
    pub async fn sync_engine(&self) -> Result<(), EngineError> {
        self.engine.set_muted(self.state.is_muted).await?;
        self.engine.set_volume(self.state.effective_volume()).await?;
        self.engine.set_playback_rate(self.state.playback_rate).await?;
        Ok(())
    }

    /// Replace the source.  Subtitle offset and position reset on every load.
    /// Returns the ticket for the autoplay request, if there is a source.
    pub async fn load_source(
        &mut self,
        request: Option<LoadRequest>,
    ) -> Result<Option<PlayTicket>, EngineError> {
        self.load_generation += 1;
        self.state.subtitle_offset_secs = 0.0;
        self.state.subtitle_position_px = 0;
        self.state.current_time_secs = 0.0;
        self.state.duration_secs = None;
        self.state.progress = 0.0;
        self.state.last_error = None;
        self.state.is_live_stream = request.as_ref().is_some_and(|r| r.is_live_stream);

        match request {
            Some(request) => {
                info!(
                    "session: loading '{}' (gen {}, live={})",
                    request.display_name, self.load_generation, request.is_live_stream
                );
                self.engine.set_source(Some(&request.source)).await?;
                self.loaded = Some(request);
                Ok(Some(PlayTicket {
                    generation: self.load_generation,
                    origin: PlayOrigin::Load,
                }))
            }
            None => {
                info!("session: unloading (gen {})", self.load_generation);
                self.loaded = None;
                self.state.is_playing = false;
                self.engine.set_source(None).await?;
                Ok(None)
            }
        }
    }

    /// Apply the outcome of a play request.  Returns a message to surface to
    /// the user when the rejection is a real failure.
    pub fn on_play_resolved(
        &mut self,
        ticket: PlayTicket,
        result: Result<(), PlayRejection>,
    ) -> Option<String> {
        let generation = ticket.generation;
        let rejection = match result {
            Ok(()) => {
                debug!("session: play request gen {} started", generation);
                return None;
            }
            Err(rejection) => rejection,
        };

        if rejection.is_superseded() || generation != self.load_generation {
            debug!(
                "session: ignoring rejection of superseded play (gen {} / current {}): {}",
                generation, self.load_generation, rejection
            );
            return None;
        }

        self.state.is_playing = false;
        if ticket.origin == PlayOrigin::Resume {
            warn!("Resume rejected: {}", rejection);
            return None;
        }

        warn!("Playback error: {}", rejection);
        let message = rejection.to_string();
        self.state.last_error = Some(message.clone());
        Some(message)
    }

    /// Pause when playing; otherwise hand back a ticket to request play.
    pub async fn toggle_play_pause(&mut self) -> Result<Option<PlayTicket>, EngineError> {
        if !self.has_source() {
            return Ok(None);
        }
        if self.state.is_playing {
            self.engine.pause().await?;
            Ok(None)
        } else {
            Ok(Some(PlayTicket {
                generation: self.load_generation,
                origin: PlayOrigin::Resume,
            }))
        }
    }

    /// Pause and rewind.  Unavailable for live streams.  Returns whether
    /// anything happened.
    pub async fn stop(&mut self) -> Result<bool, EngineError> {
        if !self.has_source() || self.state.is_live_stream {
            return Ok(false);
        }
        self.engine.pause().await?;
        self.engine.seek(0.0).await?;
        self.state.current_time_secs = 0.0;
        self.state.progress = 0.0;
        Ok(true)
    }

    /// Seek to a fraction of the duration.  Ignored while the duration is
    /// unknown or non-finite.
    pub async fn seek_to_fraction(&mut self, fraction: f64) -> Result<bool, EngineError> {
        let Some(duration) = self.state.duration_secs.filter(|d| d.is_finite() && *d > 0.0) else {
            return Ok(false);
        };
        if !fraction.is_finite() {
            return Ok(false);
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let target = fraction * duration;
        self.engine.seek(target).await?;
        self.state.current_time_secs = target;
        self.state.progress = fraction;
        Ok(true)
    }

    /// Set the chosen volume.  A non-zero volume while muted unmutes.
    pub async fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        if !volume.is_finite() {
            return Ok(());
        }
        self.state.volume = volume.clamp(0.0, 1.0);
        if self.state.is_muted && self.state.volume > 0.0 {
            self.state.is_muted = false;
            self.engine.set_muted(false).await?;
        }
        self.engine.set_volume(self.state.effective_volume()).await
    }

    /// Mute or unmute without losing the chosen volume.
    pub async fn toggle_mute(&mut self) -> Result<(), EngineError> {
        self.state.is_muted = !self.state.is_muted;
        self.engine.set_muted(self.state.is_muted).await?;
        self.engine.set_volume(self.state.effective_volume()).await
    }

    pub async fn set_playback_rate(&mut self, rate: f64) -> Result<bool, EngineError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Ok(false);
        }
        self.engine.set_playback_rate(rate).await?;
        self.state.playback_rate = rate;
        Ok(true)
    }

    /// Ask for the opposite fullscreen state.  `is_fullscreen` only changes
    /// when the engine reports `FullscreenChanged`.
    pub async fn toggle_fullscreen(&mut self) -> Result<(), EngineError> {
        let wanted = !self.state.is_fullscreen;
        if let Err(e) = self.engine.request_fullscreen(wanted).await {
            warn!("Error attempting to change fullscreen mode: {}", e);
            self.state.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    pub async fn set_aspect_ratio(&mut self, mode: AspectRatio) -> Result<(), EngineError> {
        self.engine.set_aspect_ratio(mode).await?;
        debug!("session: aspect ratio {}", mode.label());
        self.state.aspect_ratio = mode;
        Ok(())
    }

    /// Load whatever `resolve` says comes next.  The session has no notion of
    /// playlist or station order.
    pub async fn advance<F>(&mut self, resolve: F) -> Result<Option<PlayTicket>, EngineError>
    where
        F: FnOnce() -> Option<LoadRequest>,
    {
        match resolve() {
            Some(request) => self.load_source(Some(request)).await,
            None => Ok(None),
        }
    }

    /// Load whatever `resolve` says comes before.
    pub async fn retreat<F>(&mut self, resolve: F) -> Result<Option<PlayTicket>, EngineError>
    where
        F: FnOnce() -> Option<LoadRequest>,
    {
        self.advance(resolve).await
    }

    /// Returns `true` when the offset actually changed.
    pub fn set_subtitle_offset(&mut self, seconds: f64) -> bool {
        if !seconds.is_finite() || seconds == self.state.subtitle_offset_secs {
            return false;
        }
        self.state.subtitle_offset_secs = seconds;
        true
    }

    pub fn set_subtitle_position(&mut self, pixels: i32) {
        self.state.subtitle_position_px = pixels;
    }

    pub fn set_active_subtitle(&mut self, index: Option<usize>) {
        self.state.active_subtitle = index;
    }

    pub fn set_navigation(&mut self, has_next: bool, has_previous: bool) {
        self.state.has_next = has_next;
        self.state.has_previous = has_previous;
    }

    pub fn set_error(&mut self, message: Option<String>) {
        self.state.last_error = message;
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) -> SessionSignal {
        match event {
            EngineEvent::TimeUpdate {
                current_time,
                duration,
            } => {
                self.state.current_time_secs = current_time;
                self.state.progress = if duration.is_finite() && duration > 0.0 {
                    (current_time / duration).clamp(0.0, 1.0)
                } else {
                    0.0
                };
            }
            EngineEvent::LoadedMetadata { duration } => {
                self.state.duration_secs = duration.is_finite().then_some(duration);
            }
            EngineEvent::Play => self.state.is_playing = true,
            EngineEvent::Pause => self.state.is_playing = false,
            EngineEvent::Ended => {
                self.state.is_playing = false;
                return SessionSignal::Ended;
            }
            EngineEvent::FullscreenChanged(fullscreen) => {
                debug!("session: fullscreen → {}", fullscreen);
                self.state.is_fullscreen = fullscreen;
            }
        }
        SessionSignal::None
    }
}
