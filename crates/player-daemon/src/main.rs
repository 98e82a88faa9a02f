mod mpv;
mod socket;

use std::path::PathBuf;
use std::sync::Arc;

use player_core::{BroadcastMessage, PlayerCore, PlayerEvent};
use player_proto::config::Config;
use player_proto::protocol::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::mpv::{MpvEngine, MpvEvent, MpvEventTranslator};

/// Forwards WARN and ERROR events to connected clients as log lines.
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // no receivers is fine
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Broadcast channel first so logging can use it
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(256);

    let data_dir = player_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,media_player=debug,player_core=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let stations = player_proto::stations::load_stations(&config.stations.stations_toml);
    info!("{} stations available", stations.len());

    // Event channel: every input funnels into PlayerCore
    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);

    let (mpv_event_tx, mpv_event_rx) = mpsc::channel::<MpvEvent>(256);
    let engine = Arc::new(MpvEngine::start(&config.mpv, mpv_event_tx).await?);
    tokio::spawn(forward_mpv_events(mpv_event_rx, event_tx.clone()));
    tokio::spawn(watch_mpv(Arc::clone(&engine)));

    let core = PlayerCore::new(
        engine.clone(),
        stations,
        &config.player,
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    let _socket_handle = socket::start_server(
        config.control.bind_address.clone(),
        config.control.port,
        core.snapshot_store(),
        event_tx.clone(),
        broadcast_tx.clone(),
    );

    // Files given on the command line are queued like an AddFiles command
    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if !paths.is_empty() {
        event_tx
            .send(PlayerEvent::Command(Command::AddFiles { paths }))
            .await?;
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = shutdown_tx.send(PlayerEvent::Shutdown).await;
            }
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });
    drop(event_tx);

    info!("Player initialised, running event loop");
    core.run(event_rx).await?;
    engine.shutdown().await;

    Ok(())
}

async fn forward_mpv_events(mut rx: mpsc::Receiver<MpvEvent>, event_tx: mpsc::Sender<PlayerEvent>) {
    let mut translator = MpvEventTranslator::default();
    while let Some(evt) = rx.recv().await {
        let Some(engine_event) = translator.translate(&evt) else {
            continue;
        };
        if event_tx.send(PlayerEvent::Engine(engine_event)).await.is_err() {
            break;
        }
    }
}

/// Liveness check; there is no restart, the player is useless without mpv.
async fn watch_mpv(engine: Arc<MpvEngine>) {
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
        if !engine.process_alive().await {
            warn!("mpv process is gone; playback commands will fail");
            break;
        }
    }
}
