use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gudpals_types::events::{FeedCommand, FeedEvent, FeedFilter};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Filters = Arc<std::sync::RwLock<Vec<FeedFilter>>>;

/// Serve one authenticated feed WebSocket until either side goes away.
///
/// The client starts with no filters and receives nothing but `Ready` until
/// it sends `Subscribe`. Each command is answered with `Subscribed` once its
/// filters are in effect. Filters naming another user's private rows are
/// dropped.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to feed", user_id);

    let ready = FeedEvent::Ready {
        user_id: user_id.clone(),
    };
    match serde_json::to_string(&ready) {
        Ok(text) => {
            if sender.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        Err(e) => {
            warn!("Failed to encode Ready for {}: {}", user_id, e);
            return;
        }
    }

    // Subscribe before reading commands so nothing committed after
    // Subscribe can be missed
    let mut broadcast_rx = dispatcher.subscribe();

    let filters: Filters = Arc::new(std::sync::RwLock::new(Vec::new()));
    let send_filters = filters.clone();

    // The send task is the socket's only writer; acks go out through it
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<FeedEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                Some(ack) = ack_rx.recv() => {
                    let text = match serde_json::to_string(&ack) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode feed ack: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Feed receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    let wanted = send_filters
                        .read()
                        .map(|filters| filters.iter().any(|f| f.matches(&event)))
                        .unwrap_or(false);
                    if !wanted {
                        continue;
                    }

                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode feed event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let user_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<FeedCommand>(&text) {
                    Ok(cmd) => {
                        let installed = apply_command(&filters, &user_recv, cmd);
                        if ack_tx.send(FeedEvent::Subscribed { filters: installed }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} bad feed command: {} -- raw: {}",
                            user_recv,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from feed", user_id);
}

/// Install the filters `cmd` asks for, keeping only those `user_id` may
/// see. Returns the filters now in effect.
fn apply_command(filters: &Filters, user_id: &str, cmd: FeedCommand) -> Vec<FeedFilter> {
    let next: Vec<FeedFilter> = match cmd {
        FeedCommand::Subscribe { filters } => {
            let requested = filters.len();
            let allowed: Vec<FeedFilter> = filters
                .into_iter()
                .filter(|f| {
                    let visible = f.visible_to(user_id);
                    if !visible {
                        warn!("{} denied feed filter {:?}", user_id, f);
                    }
                    visible
                })
                .collect();
            info!("{} subscribing with {} of {} filters", user_id, allowed.len(), requested);
            allowed
        }
        FeedCommand::Unsubscribe => {
            info!("{} dropped all feed filters", user_id);
            Vec::new()
        }
    };

    match filters.write() {
        Ok(mut current) => *current = next.clone(),
        Err(_) => {
            warn!("Feed filter lock poisoned for {}", user_id);
            return Vec::new();
        }
    }
    next
}
