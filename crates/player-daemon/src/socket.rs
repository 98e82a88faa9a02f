use player_core::state::SnapshotStore;
use player_core::{BroadcastMessage, PlayerEvent};
use player_proto::protocol::{Broadcast, Command, Message, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

pub fn start_server(
    bind_address: String,
    port: u16,
    store: SnapshotStore,
    event_tx: mpsc::Sender<PlayerEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("Control socket listening at {}", addr);

        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let store = store.clone();
                    let evt_tx = event_tx.clone();
                    let bcast_rx = broadcast_tx.subscribe();

                    tokio::spawn(async move {
                        handle_client(stream, store, id, evt_tx, bcast_rx).await;
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    store: SnapshotStore,
    client_id: usize,
    event_tx: mpsc::Sender<PlayerEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Hello with the current snapshot on connect
    if let Ok(encoded) = encode_hello(&store).await {
        if write_half.write_all(&encoded).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        while read_buf.len() >= 4 {
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(Command::GetState), consumed)) => {
                                    read_buf.drain(..consumed);
                                    if let Ok(encoded) = encode_state(&store).await {
                                        if write_half.write_all(&encoded).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    debug!("Client {} sent command: {:?}", client_id, cmd);
                                    if event_tx.send(PlayerEvent::Command(cmd)).await.is_err() {
                                        warn!("PlayerEvent channel closed");
                                        return;
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                Err(_) => break,
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                let encoded = match msg {
                    Ok(BroadcastMessage::StateUpdated) => encode_state(&store).await,
                    Ok(BroadcastMessage::Log(message)) => {
                        Message::Broadcast(Broadcast::Log { message }).encode()
                    }
                    Ok(BroadcastMessage::Error(message)) => {
                        Message::Broadcast(Broadcast::Error { message }).encode()
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        encode_state(&store).await
                    }
                    Err(_) => break,
                };
                if let Ok(encoded) = encoded {
                    if write_half.write_all(&encoded).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

async fn encode_hello(store: &SnapshotStore) -> anyhow::Result<Vec<u8>> {
    let state = store.get().await;
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        rev: state.rev,
        state,
    })
    .encode()
}

async fn encode_state(store: &SnapshotStore) -> anyhow::Result<Vec<u8>> {
    let data = store.get().await;
    Message::Broadcast(Broadcast::State { data }).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use player_proto::protocol::PlayerSnapshot;

    async fn read_message(stream: &mut TcpStream) -> Message {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes(header) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        let mut frame = header.to_vec();
        frame.extend_from_slice(&body);
        Message::decode(&frame).unwrap().0
    }

    #[tokio::test]
    async fn test_client_gets_hello_and_commands_are_forwarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = SnapshotStore::new(PlayerSnapshot {
            rev: 5,
            ..Default::default()
        });
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (broadcast_tx, _) = broadcast::channel(8);

        let bcast_rx = broadcast_tx.subscribe();
        let server_store = store.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_client(stream, server_store, 1, event_tx, bcast_rx).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        match read_message(&mut client).await {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                rev,
                ..
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(rev, 5);
            }
            other => panic!("expected Hello, got {:?}", other),
        }

        let frame = Message::Command(Command::ToggleMute).encode().unwrap();
        client.write_all(&frame).await.unwrap();
        match event_rx.recv().await {
            Some(PlayerEvent::Command(Command::ToggleMute)) => {}
            other => panic!("unexpected {:?}", other),
        }

        broadcast_tx
            .send(BroadcastMessage::Error("fullscreen refused".into()))
            .unwrap();
        match read_message(&mut client).await {
            Message::Broadcast(Broadcast::Error { message }) => {
                assert_eq!(message, "fullscreen refused")
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }
}
