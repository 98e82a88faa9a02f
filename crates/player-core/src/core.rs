/// PlayerCore: single-owner event loop for all mutable player state.
///
/// Commands from clients, engine notifications, play request outcomes and
/// subtitle fetch results all arrive as `PlayerEvent`s on one mpsc channel.
/// PlayerCore owns the playlist, the station navigator, the blob tracker, the
/// subtitle binder and the playback session exclusively; no other task
/// touches them.
///
/// Work that has to wait on the engine or the network (play requests,
/// subtitle fetches) runs on spawned tasks that send their result back into
/// the loop tagged with a generation, so a result that arrives after the
/// source or subtitle has changed again is recognised as stale.
///
/// After every event the core publishes a fresh `PlayerSnapshot` and
/// announces it with `BroadcastMessage::StateUpdated`.
use std::path::PathBuf;
use std::sync::Arc;

use player_proto::config::PlayerConfig;
use player_proto::protocol::{
    Command, ControlOptions, Locator, MediaEntry, PlaybackSelection, PlayerSnapshot, RadioStation,
    SubtitleTrack,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::engine::{EngineEvent, MediaEngine, TextTrackId};
use crate::error::{EngineError, FetchError, PlayRejection};
use crate::playlist::{mime_kind_for_path, CurrentChange, Playlist, Removed};
use crate::resources::{BlobKind, ResourceTracker};
use crate::session::{LoadRequest, PlayTicket, PlaybackSession, SessionSignal};
use crate::state::SnapshotStore;
use crate::stations::StationNavigator;
use crate::subtitle::{fetch_subtitle, FetchSource, LoadOutcome, SubtitleBinder, SubtitleFetch};

// ── PlayerEvent ───────────────────────────────────────────────────────────────

/// All inputs into the PlayerCore loop.
#[derive(Debug)]
pub enum PlayerEvent {
    /// A command from a connected client.
    Command(Command),
    /// Notification from the media engine.
    Engine(EngineEvent),
    /// Outcome of a spawned play request.
    PlayResolved {
        ticket: PlayTicket,
        result: Result<(), PlayRejection>,
    },
    /// Outcome of a spawned subtitle fetch.
    SubtitleLoaded {
        generation: u64,
        track: TextTrackId,
        result: Result<String, FetchError>,
    },
    /// Shutdown requested.
    Shutdown,
}

/// Announcements fanned out to every listener.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    Log(String),
    /// A failure the user should see.
    Error(String),
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    session: PlaybackSession,
    playlist: Playlist,
    stations: StationNavigator,
    resources: ResourceTracker,
    subtitles: SubtitleBinder,
    /// Channel spawned tasks use to report back into our own loop.
    event_tx: mpsc::Sender<PlayerEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    store: SnapshotStore,
    rev: u64,
    controls: ControlOptions,
}

impl PlayerCore {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        stations: Vec<RadioStation>,
        config: &PlayerConfig,
        event_tx: mpsc::Sender<PlayerEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        let mut core = Self {
            session: PlaybackSession::new(engine, config.default_volume),
            playlist: Playlist::new(),
            stations: StationNavigator::new(stations),
            resources: ResourceTracker::new(),
            subtitles: SubtitleBinder::new(),
            event_tx,
            broadcast_tx,
            store: SnapshotStore::default(),
            rev: 1,
            controls: ControlOptions {
                playback_rates: config.playback_rates.clone(),
                subtitle_offset_step: config.subtitle_offset_step,
            },
        };
        core.store = SnapshotStore::new(core.build_snapshot());
        core
    }

    /// Handle for readers (socket clients) of the published snapshot.
    pub fn snapshot_store(&self) -> SnapshotStore {
        self.store.clone()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.build_snapshot()
    }

    pub fn selection(&self) -> PlaybackSelection {
        if let Some(station_index) = self.stations.current_index() {
            PlaybackSelection::Station { station_index }
        } else if let Some(entry_index) = self.playlist.current_index() {
            PlaybackSelection::File { entry_index }
        } else {
            PlaybackSelection::None
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn stations(&self) -> &StationNavigator {
        &self.stations
    }

    pub fn resources(&self) -> &ResourceTracker {
        &self.resources
    }

    pub fn subtitles(&self) -> &SubtitleBinder {
        &self.subtitles
    }

    /// Run the event loop.  Returns after a `Shutdown` event or once every
    /// sender is gone; either way the player is torn down first.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("PlayerCore: starting event loop");

        if let Err(e) = self.session.sync_engine().await {
            warn!("PlayerCore: initial engine sync failed: {}", e);
        }
        self.publish().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("PlayerCore: event channel closed, shutting down");
                    break;
                }
                Some(event) => {
                    if !self.handle_event(event).await {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Apply one event and publish the result.  Returns `false` on `Shutdown`.
    pub async fn handle_event(&mut self, event: PlayerEvent) -> bool {
        match event {
            PlayerEvent::Shutdown => {
                info!("PlayerCore: shutdown requested");
                return false;
            }

            PlayerEvent::Command(cmd) => {
                info!("PlayerCore: command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("PlayerCore: command error: {}", e);
                }
            }

            PlayerEvent::Engine(evt) => {
                if let Err(e) = self.handle_engine_event(evt).await {
                    error!("PlayerCore: engine event error: {}", e);
                }
            }

            PlayerEvent::PlayResolved { ticket, result } => {
                if let Some(message) = self.session.on_play_resolved(ticket, result) {
                    let _ = self.broadcast_tx.send(BroadcastMessage::Error(message));
                }
            }

            PlayerEvent::SubtitleLoaded {
                generation,
                track,
                result,
            } => {
                let engine = Arc::clone(self.session.engine());
                match self
                    .subtitles
                    .apply_loaded(engine.as_ref(), generation, track, result)
                    .await
                {
                    Ok(LoadOutcome::Failed(reason)) => {
                        let message = format!("Subtitle unavailable: {}", reason);
                        self.session.set_error(Some(message.clone()));
                        let _ = self.broadcast_tx.send(BroadcastMessage::Error(message));
                    }
                    Ok(LoadOutcome::Rendered(_) | LoadOutcome::Stale) => {}
                    Err(e) => error!("PlayerCore: registering subtitle cues failed: {}", e),
                }
            }
        }

        self.publish().await;
        true
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> Result<(), EngineError> {
        match cmd {
            Command::AddFiles { paths } => self.add_files(paths).await?,
            Command::AddSubtitles { paths } => self.add_subtitles(paths).await?,
            Command::SelectFile { index } => self.select_file(index).await?,
            Command::RemoveFile { index } => self.remove_file(index).await?,
            Command::Reorder { from, to } => {
                if let CurrentChange::Moved { from, to } = self.playlist.reorder(from, to) {
                    debug!("PlayerCore: current entry moved {} → {}", from, to);
                }
            }
            Command::SelectStation { index } => self.select_station(index).await?,
            Command::NextStation => self.step_station(true).await?,
            Command::PrevStation => self.step_station(false).await?,
            Command::Next => self.step_file(true).await?,
            Command::Prev => self.step_file(false).await?,
            Command::TogglePause => {
                if let Some(ticket) = self.session.toggle_play_pause().await? {
                    self.request_play(ticket);
                }
            }
            Command::Stop => {
                if !self.session.stop().await? {
                    debug!("PlayerCore: stop ignored (no source or live stream)");
                }
            }
            Command::SeekToFraction { fraction } => {
                if !self.session.seek_to_fraction(fraction).await? {
                    debug!("PlayerCore: seek ignored, duration unknown");
                }
            }
            Command::Volume { value } => self.session.set_volume(value).await?,
            Command::ToggleMute => self.session.toggle_mute().await?,
            Command::PlaybackRate { rate } => {
                if !self.session.set_playback_rate(rate).await? {
                    warn!("PlayerCore: ignoring invalid playback rate {}", rate);
                }
            }
            Command::ToggleFullscreen => {
                if let Err(e) = self.session.toggle_fullscreen().await {
                    let _ = self.broadcast_tx.send(BroadcastMessage::Error(e.to_string()));
                }
            }
            Command::SwitchSubtitle { index } => self.switch_subtitle(index).await?,
            Command::SubtitleOffset { seconds } => {
                if self.session.set_subtitle_offset(seconds) {
                    self.rebind_subtitles().await?;
                }
            }
            Command::SubtitlePosition { pixels } => self.session.set_subtitle_position(pixels),
            Command::AspectRatio { mode } => self.session.set_aspect_ratio(mode).await?,
            Command::GetState => {
                // the snapshot is republished after every event
            }
        }
        Ok(())
    }

    async fn add_files(&mut self, paths: Vec<PathBuf>) -> Result<(), EngineError> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            if !is_regular_file(&path).await {
                warn!("Skipping {}: not a readable file", path.display());
                continue;
            }
            let display_name = display_name_for(&path);
            let mime_kind = mime_kind_for_path(&path);
            let locator = self.resources.register(path, BlobKind::Media);
            entries.push(self.playlist.new_local_entry(display_name, locator, mime_kind));
        }
        if entries.is_empty() {
            return Ok(());
        }

        info!("PlayerCore: adding {} file(s) to the playlist", entries.len());
        let idle = self.selection().is_none();
        if let Some(index) = self.playlist.append(entries, idle) {
            self.load_file(index).await?;
        }
        Ok(())
    }

    async fn add_subtitles(&mut self, paths: Vec<PathBuf>) -> Result<(), EngineError> {
        if self.playlist.current_entry().is_none() {
            warn!("PlayerCore: no file selected, ignoring subtitles");
            return Ok(());
        }

        let mut tracks = Vec::with_capacity(paths.len());
        for path in paths {
            if !is_regular_file(&path).await {
                warn!("Skipping subtitle {}: not a readable file", path.display());
                continue;
            }
            let label = display_name_for(&path);
            let locator = self.resources.register(path, BlobKind::Subtitle);
            tracks.push(SubtitleTrack { locator, label });
        }
        if tracks.is_empty() {
            return Ok(());
        }

        let first_new = self.playlist.add_subtitles(tracks);
        if self.session.state().active_subtitle.is_none() && first_new.is_some() {
            self.session.set_active_subtitle(first_new);
            self.rebind_subtitles().await?;
        }
        Ok(())
    }

    async fn select_file(&mut self, index: usize) -> Result<(), EngineError> {
        let Some(entry) = self.playlist.get(index) else {
            debug!("PlayerCore: select of stale index {} ignored", index);
            return Ok(());
        };
        let default_subtitle = entry.default_subtitle();

        let already_current =
            self.selection() == (PlaybackSelection::File { entry_index: index });
        self.stations.clear();
        self.playlist.select(index);

        if already_current {
            if self.session.state().active_subtitle != default_subtitle {
                self.session.set_active_subtitle(default_subtitle);
                self.rebind_subtitles().await?;
            }
            return Ok(());
        }
        self.load_file(index).await
    }

    async fn remove_file(&mut self, index: usize) -> Result<(), EngineError> {
        let Some(Removed { entry, change }) = self.playlist.remove(index) else {
            debug!("PlayerCore: remove of stale index {} ignored", index);
            return Ok(());
        };
        info!("PlayerCore: removed '{}' from the playlist", entry.display_name);

        let reload = match change {
            CurrentChange::Replaced(None) => {
                self.session.set_active_subtitle(None);
                let ticket = self.session.load_source(None).await;
                let rebind = self.rebind_subtitles().await;
                ticket.and(rebind)
            }
            CurrentChange::Replaced(Some(next)) => self.load_file(next).await,
            CurrentChange::Moved { .. } | CurrentChange::Unchanged => Ok(()),
        };

        let released = self.resources.release_entry(&entry);
        debug!("PlayerCore: released {} blob(s) of '{}'", released, entry.display_name);
        reload
    }

    async fn switch_subtitle(&mut self, index: Option<usize>) -> Result<(), EngineError> {
        let track_count = self
            .playlist
            .current_entry()
            .map_or(0, |e| e.subtitle_tracks.len());
        if index.is_some_and(|i| i >= track_count) {
            debug!("PlayerCore: subtitle index {:?} out of range", index);
            return Ok(());
        }
        if self.session.state().active_subtitle == index {
            return Ok(());
        }
        self.session.set_active_subtitle(index);
        self.rebind_subtitles().await
    }

    async fn select_station(&mut self, index: usize) -> Result<(), EngineError> {
        if self.stations.current_index() == Some(index) && self.session.has_source() {
            return Ok(());
        }
        let Some(station) = self.stations.select(index) else {
            debug!("PlayerCore: select of stale station {} ignored", index);
            return Ok(());
        };
        info!("Tuning station: {}", station.name);
        let request = station_request(station);
        let ticket = self.session.load_source(Some(request)).await?;
        self.after_station_tuned(ticket).await
    }

    async fn step_station(&mut self, forward: bool) -> Result<(), EngineError> {
        let stations = &mut self.stations;
        let resolve = || {
            if forward {
                stations.next()?;
            } else {
                stations.previous()?;
            }
            stations.current().map(station_request)
        };
        let ticket = if forward {
            self.session.advance(resolve).await?
        } else {
            self.session.retreat(resolve).await?
        };
        if ticket.is_some() {
            self.after_station_tuned(ticket).await?;
        }
        Ok(())
    }

    async fn after_station_tuned(&mut self, ticket: Option<PlayTicket>) -> Result<(), EngineError> {
        self.playlist.clear_selection();
        self.session.set_active_subtitle(None);
        self.after_load(ticket).await
    }

    async fn step_file(&mut self, forward: bool) -> Result<(), EngineError> {
        let playlist = &mut self.playlist;
        let resources = &self.resources;
        let resolve = || {
            let index = if forward {
                playlist.next_index()?
            } else {
                playlist.previous_index()?
            };
            playlist
                .select(index)
                .and_then(|entry| file_request(entry, resources))
        };
        let ticket = if forward {
            self.session.advance(resolve).await?
        } else {
            self.session.retreat(resolve).await?
        };
        if ticket.is_some() {
            let default_subtitle = self
                .playlist
                .current_entry()
                .and_then(MediaEntry::default_subtitle);
            self.session.set_active_subtitle(default_subtitle);
            self.after_load(ticket).await?;
        }
        Ok(())
    }

    // ── loading ───────────────────────────────────────────────────────────────

    async fn load_file(&mut self, index: usize) -> Result<(), EngineError> {
        let (request, default_subtitle) = match self.playlist.get(index) {
            Some(entry) => (file_request(entry, &self.resources), entry.default_subtitle()),
            None => (None, None),
        };
        self.session.set_active_subtitle(default_subtitle);
        let ticket = self.session.load_source(request).await?;
        self.after_load(ticket).await
    }

    async fn after_load(&mut self, ticket: Option<PlayTicket>) -> Result<(), EngineError> {
        if let Some(ticket) = ticket {
            self.request_play(ticket);
        }
        self.rebind_subtitles().await
    }

    fn request_play(&self, ticket: PlayTicket) {
        let engine = Arc::clone(self.session.engine());
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = engine.play().await;
            let event = PlayerEvent::PlayResolved { ticket, result };
            if tx.send(event).await.is_err() {
                debug!("PlayerCore: loop gone before play request {} resolved", ticket.generation);
            }
        });
    }

    async fn rebind_subtitles(&mut self) -> Result<(), EngineError> {
        let track = self
            .session
            .state()
            .active_subtitle
            .and_then(|i| {
                self.playlist
                    .current_entry()
                    .and_then(|e| e.subtitle_tracks.get(i))
            })
            .cloned();
        let offset = self.session.state().subtitle_offset_secs;
        let engine = Arc::clone(self.session.engine());

        if let Some(fetch) = self
            .subtitles
            .rebind(engine.as_ref(), track.as_ref(), offset)
            .await?
        {
            self.spawn_fetch(fetch);
        }
        Ok(())
    }

    fn spawn_fetch(&self, fetch: SubtitleFetch) {
        let source = match &fetch.locator {
            Locator::Blob(handle) => self
                .resources
                .resolve(*handle)
                .map(|p| FetchSource::File(p.to_path_buf()))
                .ok_or(FetchError::UnknownBlob(*handle)),
            Locator::Remote(url) => FetchSource::from_remote(url),
        };
        debug!("PlayerCore: fetching subtitle '{}' (gen {})", fetch.label, fetch.generation);

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = match source {
                Ok(source) => fetch_subtitle(source).await,
                Err(e) => Err(e),
            };
            let event = PlayerEvent::SubtitleLoaded {
                generation: fetch.generation,
                track: fetch.track,
                result,
            };
            let _ = tx.send(event).await;
        });
    }

    // ── engine events ─────────────────────────────────────────────────────────

    async fn handle_engine_event(&mut self, evt: EngineEvent) -> Result<(), EngineError> {
        if self.session.handle_engine_event(evt) == SessionSignal::Ended {
            if self.selection().file_index().is_some() {
                debug!("PlayerCore: media ended, advancing");
                self.step_file(true).await?;
            } else {
                debug!("PlayerCore: media ended with no playlist entry current");
            }
        }
        Ok(())
    }

    // ── publishing ────────────────────────────────────────────────────────────

    async fn publish(&mut self) {
        self.session.set_navigation(
            self.playlist.next_index().is_some(),
            self.playlist.previous_index().is_some(),
        );
        self.rev += 1;
        self.store.replace(self.build_snapshot()).await;
        // no receivers is fine
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    fn build_snapshot(&self) -> PlayerSnapshot {
        let mut playback = self.session.state().clone();
        playback.subtitle_rendering = self.subtitles.is_rendering();
        PlayerSnapshot {
            rev: self.rev,
            selection: self.selection(),
            playback,
            playlist: self.playlist.entries().to_vec(),
            stations: self.stations.stations().to_vec(),
            controls: self.controls.clone(),
        }
    }

    /// Unbind subtitles, unload the engine and release every blob handle.
    pub async fn shutdown(&mut self) {
        info!("PlayerCore: tearing down");
        let engine = Arc::clone(self.session.engine());
        self.subtitles.release(engine.as_ref()).await;
        if let Err(e) = self.session.load_source(None).await {
            warn!("PlayerCore: unloading engine failed: {}", e);
        }

        self.stations.clear();
        let mut released = 0;
        for entry in self.playlist.drain() {
            released += self.resources.release_entry(&entry);
        }
        released += self.resources.release_all();
        info!("PlayerCore: released {} blob handle(s)", released);
        self.publish().await;
    }
}

fn file_request(entry: &MediaEntry, resources: &ResourceTracker) -> Option<LoadRequest> {
    let source = resources.playable(&entry.locator)?;
    Some(LoadRequest {
        display_name: entry.display_name.clone(),
        source,
        is_live_stream: entry.is_live_stream,
    })
}

fn station_request(station: &RadioStation) -> LoadRequest {
    LoadRequest {
        display_name: station.name.clone(),
        source: station.url.clone(),
        is_live_stream: true,
    }
}

fn display_name_for(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn is_regular_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
