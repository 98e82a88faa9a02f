/// mpv-backed `MediaEngine`.
///
/// Architecture:
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── event / property-change   → event_tx channel
/// ```
///
/// `MpvEngine` wraps the handle and implements the core's engine trait.
/// Unsolicited mpv events are turned into `EngineEvent`s by
/// `MpvEventTranslator`, which runs on the forwarding task in `main`.
///
/// Text tracks are kept in memory until they are shown; showing one writes
/// the cues to a SubRip file in a private temp dir and hands it to mpv with
/// `sub-add`.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use player_core::engine::{EngineEvent, MediaEngine, TextTrackId, TrackMode};
use player_core::error::{EngineError, PlayRejection};
use player_core::subtitle::parser::format_timestamp;
use player_proto::config::MpvConfig;
use player_proto::protocol::AspectRatio;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_PAUSE: u64 = 1;
pub const OBS_TIME_POS: u64 = 2;
pub const OBS_DURATION: u64 = 3;
pub const OBS_FULLSCREEN: u64 = 4;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── event translation ─────────────────────────────────────────────────────────

/// Turns observed mpv properties into engine events.
#[derive(Debug, Default)]
pub struct MpvEventTranslator {
    duration: Option<f64>,
}

impl MpvEventTranslator {
    pub fn translate(&mut self, evt: &MpvEvent) -> Option<EngineEvent> {
        if let Some((id, data)) = evt.as_property_change() {
            return match id {
                OBS_PAUSE => data.as_bool().map(|paused| {
                    if paused {
                        EngineEvent::Pause
                    } else {
                        EngineEvent::Play
                    }
                }),
                OBS_TIME_POS => data.as_f64().map(|current_time| EngineEvent::TimeUpdate {
                    current_time,
                    // live streams report no duration
                    duration: self.duration.unwrap_or(f64::INFINITY),
                }),
                OBS_DURATION => {
                    self.duration = data.as_f64();
                    Some(EngineEvent::LoadedMetadata {
                        duration: self.duration.unwrap_or(f64::INFINITY),
                    })
                }
                OBS_FULLSCREEN => data.as_bool().map(EngineEvent::FullscreenChanged),
                _ => None,
            };
        }

        match evt.event_name()? {
            "end-file" if evt.raw.get("reason").and_then(Value::as_str) == Some("eof") => {
                Some(EngineEvent::Ended)
            }
            "start-file" => {
                self.duration = None;
                None
            }
            _ => None,
        }
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    /// Register observe_property for everything the translator understands.
    /// Must be called after every fresh connection.
    pub async fn observe_all_properties(&self) {
        let props = [
            (OBS_PAUSE, "pause"),
            (OBS_TIME_POS, "time-pos"),
            (OBS_DURATION, "duration"),
            (OBS_FULLSCREEN, "fullscreen"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    pub socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: player_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("mpv process exited: {}", status);
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn command(&self, config: &MpvConfig) -> anyhow::Result<tokio::process::Command> {
        let mpv_binary = player_proto::platform::find_mpv_binary(config.binary.as_deref())
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let mut cmd = tokio::process::Command::new(mpv_binary);
        if config.video {
            cmd.arg("--force-window=yes");
        } else {
            cmd.arg("--no-video");
        }
        cmd.arg("--idle=yes")
            .arg("--keep-open=no")
            .arg(player_proto::platform::mpv_socket_arg(&self.socket_name))
            .arg("--quiet")
            .args(&config.extra_args)
            .stdout(std::process::Stdio::null());
        Ok(cmd)
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        config: &MpvConfig,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        let stderr_path = player_proto::platform::data_dir().join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;
        info!("mpv: logging stderr to {:?}", stderr_path);

        let child = self.command(config)?.stderr(stderr_file).spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        config: &MpvConfig,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let child = self
            .command(config)?
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                    debug!("mpv reader: event receiver gone");
                    break;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // register before writing so the reader can match the reply
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── text tracks ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TextTrack {
    label: String,
    language: String,
    cues: Vec<(f64, f64, String)>,
    /// mpv subtitle id while the track is loaded.
    sid: Option<i64>,
}

#[derive(Debug, Default)]
struct TrackStore {
    next_id: u64,
    tracks: HashMap<TextTrackId, TextTrack>,
}

/// Render cues as SubRip text.
pub fn render_srt(cues: &[(f64, f64, String)]) -> String {
    let mut out = String::new();
    for (i, (start, end, text)) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(*start),
            format_timestamp(*end),
            text
        ));
    }
    out
}

// ── engine ────────────────────────────────────────────────────────────────────

pub struct MpvEngine {
    handle: MpvHandle,
    driver: Mutex<MpvDriver>,
    tracks: std::sync::Mutex<TrackStore>,
    subtitle_dir: tempfile::TempDir,
}

impl MpvEngine {
    /// Spawn mpv, connect and start observing properties.
    pub async fn start(config: &MpvConfig, event_tx: mpsc::Sender<MpvEvent>) -> anyhow::Result<Self> {
        let mut driver = MpvDriver::new();
        let handle = driver.spawn_and_connect(config, event_tx).await?;
        handle.observe_all_properties().await;

        let subtitle_dir = tempfile::Builder::new()
            .prefix("media-player-subs")
            .tempdir_in(player_proto::platform::temp_dir())?;
        debug!("mpv: subtitle files in {:?}", subtitle_dir.path());

        Ok(Self {
            handle,
            driver: Mutex::new(driver),
            tracks: std::sync::Mutex::new(TrackStore::default()),
            subtitle_dir,
        })
    }

    pub async fn shutdown(&self) {
        let _ = self.handle.send(json!(["quit"])).await;
        self.driver.lock().await.kill().await;
        info!("mpv: stopped");
    }

    pub async fn process_alive(&self) -> bool {
        self.driver.lock().await.process_alive()
    }

    fn with_track<T>(
        &self,
        id: TextTrackId,
        f: impl FnOnce(&mut TextTrack) -> T,
    ) -> Result<T, EngineError> {
        let mut store = self
            .tracks
            .lock()
            .map_err(|_| EngineError::Unavailable("text track store poisoned".into()))?;
        store
            .tracks
            .get_mut(&id)
            .map(f)
            .ok_or(EngineError::UnknownTrack(id))
    }

    async fn show_track(&self, id: TextTrackId) -> Result<(), EngineError> {
        let (old_sid, label, language, content) = self.with_track(id, |t| {
            (t.sid.take(), t.label.clone(), t.language.clone(), render_srt(&t.cues))
        })?;
        if let Some(sid) = old_sid {
            let _ = self.handle.send(json!(["sub-remove", sid])).await;
        }
        if content.is_empty() {
            // nothing to render yet; cues arrive before the next Showing
            return Ok(());
        }

        let path = self.subtitle_dir.path().join(format!("track-{}.srt", id.0));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| EngineError::Command(format!("writing {}: {}", path.display(), e)))?;
        let path_str = path.to_string_lossy().into_owned();
        self.handle
            .send(json!(["sub-add", path_str, "select", label, language]))
            .await?;

        let sid = self
            .handle
            .send(json!(["get_property", "sid"]))
            .await?
            .get("data")
            .and_then(Value::as_i64);
        debug!("mpv: text track {:?} loaded as sid {:?}", id, sid);
        self.with_track(id, |t| t.sid = sid)
    }

    async fn hide_track(&self, id: TextTrackId) -> Result<(), EngineError> {
        if let Some(sid) = self.with_track(id, |t| t.sid.take())? {
            // mpv drops external subtitles on loadfile, so the sid may be gone
            if let Err(e) = self.handle.send(json!(["sub-remove", sid])).await {
                debug!("mpv: sub-remove {} failed: {}", sid, e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for MpvEngine {
    async fn set_source(&self, source: Option<&str>) -> Result<(), EngineError> {
        match source {
            Some(url) => {
                debug!("mpv: loadfile {}", url);
                self.handle.set_property("pause", json!(true)).await?;
                self.handle.send(json!(["loadfile", url, "replace"])).await?;
            }
            None => {
                self.handle.send(json!(["stop"])).await?;
            }
        }
        Ok(())
    }

    async fn play(&self) -> Result<(), PlayRejection> {
        self.handle
            .set_property("pause", json!(false))
            .await
            .map_err(|e| PlayRejection::Failed(e.to_string()))
    }

    async fn pause(&self) -> Result<(), EngineError> {
        Ok(self.handle.set_property("pause", json!(true)).await?)
    }

    async fn seek(&self, seconds: f64) -> Result<(), EngineError> {
        Ok(self.handle.send(json!(["seek", seconds, "absolute"])).await.map(|_| ())?)
    }

    async fn set_volume(&self, volume: f64) -> Result<(), EngineError> {
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        Ok(self.handle.set_property("volume", json!(vol_pct)).await?)
    }

    async fn set_muted(&self, muted: bool) -> Result<(), EngineError> {
        Ok(self.handle.set_property("mute", json!(muted)).await?)
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<(), EngineError> {
        Ok(self.handle.set_property("speed", json!(rate)).await?)
    }

    async fn set_aspect_ratio(&self, mode: AspectRatio) -> Result<(), EngineError> {
        let (override_value, keep_aspect) = match mode {
            AspectRatio::Original => ("-1", true),
            AspectRatio::Wide => ("16:9", true),
            AspectRatio::Standard => ("4:3", true),
            AspectRatio::Fill => ("-1", false),
        };
        self.handle
            .set_property("video-aspect-override", json!(override_value))
            .await?;
        Ok(self.handle.set_property("keepaspect", json!(keep_aspect)).await?)
    }

    async fn request_fullscreen(&self, fullscreen: bool) -> Result<(), EngineError> {
        self.handle
            .set_property("fullscreen", json!(fullscreen))
            .await
            .map_err(|e| EngineError::FullscreenRefused(e.to_string()))
    }

    async fn add_text_track(&self, label: &str, language: &str) -> Result<TextTrackId, EngineError> {
        let mut store = self
            .tracks
            .lock()
            .map_err(|_| EngineError::Unavailable("text track store poisoned".into()))?;
        store.next_id += 1;
        let id = TextTrackId(store.next_id);
        store.tracks.insert(
            id,
            TextTrack {
                label: label.to_string(),
                language: language.to_string(),
                ..Default::default()
            },
        );
        Ok(id)
    }

    async fn add_cue(&self, track: TextTrackId, start: f64, end: f64, text: &str) -> Result<(), EngineError> {
        self.with_track(track, |t| t.cues.push((start, end, text.to_string())))
    }

    async fn set_track_mode(&self, track: TextTrackId, mode: TrackMode) -> Result<(), EngineError> {
        match mode {
            TrackMode::Showing => self.show_track(track).await,
            TrackMode::Disabled => self.hide_track(track).await,
        }
    }
}
