#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use player_core::{
    BroadcastMessage, EngineError, EngineEvent, MediaEngine, PlayRejection, PlayerCore,
    PlayerEvent, TextTrackId, TrackMode,
};
use player_proto::config::PlayerConfig;
use player_proto::protocol::{AspectRatio, Command, PlayerSnapshot, RadioStation};
use tokio::sync::{broadcast, mpsc};

pub const HELLO_SRT: &str = "1\n00:00:01,000 --> 00:00:03,500\nHello\n\n";

/// Every call the core made on the engine, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetSource(Option<String>),
    Play,
    Pause,
    Seek(f64),
    Volume(f64),
    Muted(bool),
    Rate(f64),
    Aspect(AspectRatio),
    Fullscreen(bool),
    AddTrack(TextTrackId),
    AddCue(TextTrackId),
    TrackMode(TextTrackId, TrackMode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeTrack {
    pub label: String,
    pub language: String,
    pub mode: TrackMode,
    pub cues: Vec<(f64, f64, String)>,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    next_track: u64,
    tracks: BTreeMap<TextTrackId, FakeTrack>,
    play_outcomes: VecDeque<Result<(), PlayRejection>>,
    refuse_fullscreen: bool,
    events: Option<mpsc::Sender<PlayerEvent>>,
}

/// In-memory engine.  Successful play/pause/fullscreen requests echo the
/// matching `EngineEvent` back into the core, the way a real engine does.
#[derive(Default)]
pub struct FakeEngine {
    inner: Mutex<Inner>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, events: mpsc::Sender<PlayerEvent>) {
        self.inner.lock().unwrap().events = Some(events);
    }

    /// Outcome of the next play request (default: success).
    pub fn script_play(&self, outcome: Result<(), PlayRejection>) {
        self.inner.lock().unwrap().play_outcomes.push_back(outcome);
    }

    pub fn refuse_fullscreen(&self) {
        self.inner.lock().unwrap().refuse_fullscreen = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn last_source(&self) -> Option<Option<String>> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::SetSource(s) => Some(s),
            _ => None,
        })
    }

    pub fn last_volume(&self) -> Option<f64> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::Volume(v) => Some(v),
            _ => None,
        })
    }

    pub fn track(&self, id: TextTrackId) -> Option<FakeTrack> {
        self.inner.lock().unwrap().tracks.get(&id).cloned()
    }

    pub fn showing_tracks(&self) -> Vec<TextTrackId> {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .iter()
            .filter(|(_, t)| t.mode == TrackMode::Showing)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().unwrap().tracks.len()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.inner.lock().unwrap().events {
            let _ = tx.try_send(PlayerEvent::Engine(event));
        }
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn set_source(&self, source: Option<&str>) -> Result<(), EngineError> {
        self.record(Call::SetSource(source.map(str::to_string)));
        Ok(())
    }

    async fn play(&self) -> Result<(), PlayRejection> {
        self.record(Call::Play);
        let outcome = self
            .inner
            .lock()
            .unwrap()
            .play_outcomes
            .pop_front()
            .unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.emit(EngineEvent::Play);
        }
        outcome
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.record(Call::Pause);
        self.emit(EngineEvent::Pause);
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<(), EngineError> {
        self.record(Call::Seek(seconds));
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<(), EngineError> {
        self.record(Call::Volume(volume));
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), EngineError> {
        self.record(Call::Muted(muted));
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<(), EngineError> {
        self.record(Call::Rate(rate));
        Ok(())
    }

    async fn set_aspect_ratio(&self, mode: AspectRatio) -> Result<(), EngineError> {
        self.record(Call::Aspect(mode));
        Ok(())
    }

    async fn request_fullscreen(&self, fullscreen: bool) -> Result<(), EngineError> {
        self.record(Call::Fullscreen(fullscreen));
        if self.inner.lock().unwrap().refuse_fullscreen {
            return Err(EngineError::FullscreenRefused("not allowed here".into()));
        }
        self.emit(EngineEvent::FullscreenChanged(fullscreen));
        Ok(())
    }

    async fn add_text_track(&self, label: &str, language: &str) -> Result<TextTrackId, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_track += 1;
        let id = TextTrackId(inner.next_track);
        inner.tracks.insert(
            id,
            FakeTrack {
                label: label.to_string(),
                language: language.to_string(),
                mode: TrackMode::Disabled,
                cues: Vec::new(),
            },
        );
        inner.calls.push(Call::AddTrack(id));
        Ok(id)
    }

    async fn add_cue(&self, track: TextTrackId, start: f64, end: f64, text: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let t = inner
            .tracks
            .get_mut(&track)
            .ok_or(EngineError::UnknownTrack(track))?;
        t.cues.push((start, end, text.to_string()));
        inner.calls.push(Call::AddCue(track));
        Ok(())
    }

    async fn set_track_mode(&self, track: TextTrackId, mode: TrackMode) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let t = inner
            .tracks
            .get_mut(&track)
            .ok_or(EngineError::UnknownTrack(track))?;
        t.mode = mode;
        inner.calls.push(Call::TrackMode(track, mode));
        Ok(())
    }
}

pub fn test_stations() -> Vec<RadioStation> {
    vec![
        RadioStation::new("Alpha FM", "https://alpha.example/live", "USA"),
        RadioStation::new("Beta Radio", "https://beta.example/live", "France"),
        RadioStation::new("Gamma", "https://gamma.example/live", "USA"),
    ]
}

/// Write a fixture file and return its path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// A `PlayerCore` driven event by event, with its own receiver so tests can
/// pump whatever spawned tasks and the fake engine send back.
pub struct Harness {
    pub core: PlayerCore,
    pub engine: Arc<FakeEngine>,
    pub broadcasts: broadcast::Receiver<BroadcastMessage>,
    rx: mpsc::Receiver<PlayerEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stations(test_stations())
    }

    pub fn with_stations(stations: Vec<RadioStation>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (broadcast_tx, broadcasts) = broadcast::channel(1024);
        let engine = FakeEngine::new();
        engine.attach(tx.clone());
        let core = PlayerCore::new(
            engine.clone(),
            stations,
            &PlayerConfig::default(),
            tx,
            broadcast_tx,
        );
        Self {
            core,
            engine,
            broadcasts,
            rx,
        }
    }

    pub async fn command(&mut self, cmd: Command) {
        self.send(cmd).await;
        self.settle().await;
    }

    /// Apply a command without waiting for the work it spawns.
    pub async fn send(&mut self, cmd: Command) {
        self.core.handle_event(PlayerEvent::Command(cmd)).await;
    }

    pub async fn engine_event(&mut self, event: EngineEvent) {
        self.core.handle_event(PlayerEvent::Engine(event)).await;
        self.settle().await;
    }

    /// Feed back everything spawned tasks report until the channel is quiet.
    pub async fn settle(&mut self) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), self.rx.recv()).await
        {
            self.core.handle_event(event).await;
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.core.snapshot()
    }

    /// Error broadcasts received so far.
    pub fn errors(&mut self) -> Vec<String> {
        let mut errors = Vec::new();
        loop {
            match self.broadcasts.try_recv() {
                Ok(BroadcastMessage::Error(message)) => errors.push(message),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        errors
    }
}
