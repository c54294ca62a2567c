//! WebSocket server handler using Axum.
//!
//! The connection gateway: accepts persistent connections, registers
//! each as a client or translator, dispatches inbound protocol
//! messages to the matching engine / relay, and cleans up presence
//! and rooms on disconnect.

use crate::client::{ClientRegistry, ClientState, ConnId, CLIENT_CHANNEL_BUFFER_SIZE};
use crate::error::{Result, SignalingError};
use crate::matching::MatchingEngine;
use crate::presence::{PresenceRegistry, TranslatorPresence};
use crate::protocol::{ClientMessage, Role, ServerMessage};
use crate::relay::{NegotiationKind, SignalingRelay};
use crate::room::RoomStore;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use external_services::RecordStore;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ClientRegistry>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomStore>,
    pub engine: Arc<MatchingEngine>,
    pub relay: Arc<SignalingRelay>,
    pub records: Arc<dyn RecordStore>,
}

/// Interval between stale-connection sweeps.
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Idle limit after which a connection counts as dead (three missed
/// ping rounds).
const STALE_IDLE_LIMIT_MS: i64 = 90_000;

/// Create the WebSocket router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connections = state.registry.client_count();
    let online = state.presence.online_count();
    let active_calls = state.rooms.active_count();
    format!(
        r#"{{"status":"ok","connections":{},"online":{},"active_calls":{}}}"#,
        connections, online, active_calls
    )
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Split the socket into sender and receiver
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Bounded channel for outgoing messages
    let (tx, mut rx) = mpsc::channel::<Message>(CLIENT_CHANNEL_BUFFER_SIZE);

    let client = Arc::new(ClientState::new(tx));
    let conn_id = state.registry.register(client.clone());

    counter!("signaling_connections_total").increment(1);
    gauge!("signaling_active_connections").set(state.registry.client_count() as f64);

    info!("Connection {} established", conn_id);

    // Forward messages from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Ping interval for keepalive
    let mut ping_interval = interval(Duration::from_secs(30));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_message(&state, &client, msg).await {
                            warn!("Error handling message from {}: {:?}", conn_id, e);
                            let _ = client.send(ServerMessage::Error {
                                message: e.to_string(),
                                code: "PROCESSING_ERROR".to_string(),
                            });
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {:?}", conn_id, e);
                        break;
                    }
                    None => {
                        // Connection closed
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if !client.try_send_raw(Message::Ping(Vec::new().into())) {
                    break;
                }
            }
        }
    }

    // Disconnect is a first-class transition: resolve presence and
    // any bound rooms before dropping the connection.
    state.engine.handle_disconnect(conn_id).await;
    state.registry.unregister(&conn_id);
    send_task.abort();

    counter!("signaling_disconnections_total").increment(1);
    gauge!("signaling_active_connections").set(state.registry.client_count() as f64);

    info!("Connection {} closed", conn_id);
}

/// Handle a single WebSocket message.
async fn handle_message(
    state: &Arc<AppState>,
    client: &Arc<ClientState>,
    msg: Message,
) -> Result<()> {
    match msg {
        Message::Text(text) => {
            let client_msg: ClientMessage = serde_json::from_str(&text)?;
            handle_client_message(state, client, client_msg).await
        }
        Message::Binary(data) => {
            let client_msg: ClientMessage = serde_json::from_slice(&data)?;
            handle_client_message(state, client, client_msg).await
        }
        Message::Ping(data) => {
            client.update_ping();
            client
                .tx
                .try_send(Message::Pong(data))
                .map_err(|_| SignalingError::ChannelSend)?;
            Ok(())
        }
        Message::Pong(_) => {
            client.update_ping();
            Ok(())
        }
        Message::Close(_) => {
            // Handled by the connection loop
            Ok(())
        }
    }
}

/// Handle a parsed protocol message.
async fn handle_client_message(
    state: &Arc<AppState>,
    client: &Arc<ClientState>,
    msg: ClientMessage,
) -> Result<()> {
    match msg {
        ClientMessage::Register {
            role,
            participant_id,
        } => {
            match role {
                Role::Client => {
                    state.presence.register_client(client.id, &participant_id);
                    info!("Client {} registered on {}", participant_id, client.id);
                }
                Role::Translator => {
                    register_translator(state, client, &participant_id).await;
                }
            }
            Ok(())
        }
        ClientMessage::SetAvailability { available } => {
            // no-op when the connection has no translator entry
            if let Some(translator_id) = state.presence.set_availability(&client.id, available) {
                debug!(
                    "Translator {} availability set to {}",
                    translator_id, available
                );
                if let Err(e) = state
                    .records
                    .update_translator_online(&translator_id, available)
                    .await
                {
                    warn!(
                        "Failed to persist availability for {}: {}",
                        translator_id, e
                    );
                }
                state.registry.broadcast_all(&ServerMessage::OnlineCount {
                    count: state.presence.online_count(),
                });
            }
            Ok(())
        }
        ClientMessage::RequestTranslator {
            requester_id,
            source_lang,
            target_lang,
            category,
            kind,
            scheduled_at: _,
        } => {
            let _room = state
                .engine
                .submit_request(
                    client.id,
                    &requester_id,
                    &source_lang,
                    &target_lang,
                    &category,
                    kind,
                )
                .await;
            Ok(())
        }
        ClientMessage::AcceptRequest { room_id } => {
            state.engine.accept_request(client.id, room_id).await;
            Ok(())
        }
        ClientMessage::RejectRequest { room_id } => {
            state.engine.reject_request(client.id, room_id);
            Ok(())
        }
        ClientMessage::CancelRequest { room_id } => {
            state.engine.cancel_request(client.id, room_id);
            Ok(())
        }
        ClientMessage::Offer { room_id, payload } => {
            state
                .relay
                .relay(room_id, client.id, NegotiationKind::Offer, payload);
            Ok(())
        }
        ClientMessage::Answer { room_id, payload } => {
            state
                .relay
                .relay(room_id, client.id, NegotiationKind::Answer, payload);
            Ok(())
        }
        ClientMessage::IceCandidate { room_id, payload } => {
            state
                .relay
                .relay(room_id, client.id, NegotiationKind::IceCandidate, payload);
            Ok(())
        }
        ClientMessage::CallConnected { room_id } => {
            state.engine.call_connected(room_id).await;
            Ok(())
        }
        ClientMessage::EndCall {
            room_id,
            duration_seconds,
        } => {
            state.engine.end_call(room_id, duration_seconds).await;
            Ok(())
        }
        ClientMessage::Ping => {
            client.update_ping();
            client.send(ServerMessage::Pong)?;
            Ok(())
        }
    }
}

/// Start the periodic sweep that disconnects connections whose pings
/// stopped arriving.
pub fn spawn_stale_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = interval(STALE_SWEEP_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            sweep_stale(&state.registry, &state.engine, STALE_IDLE_LIMIT_MS).await;
        }
    });
}

/// One sweep pass. Every stale connection goes through the engine's
/// disconnect path first, so presence entries and bound rooms are
/// resolved exactly as they would be for a closed socket.
pub async fn sweep_stale(
    registry: &ClientRegistry,
    engine: &MatchingEngine,
    max_idle_ms: i64,
) -> Vec<ConnId> {
    let stale = registry.stale_connections(max_idle_ms);
    for conn_id in &stale {
        warn!("Connection {} stopped answering pings, disconnecting", conn_id);
        engine.handle_disconnect(*conn_id).await;
        registry.unregister(conn_id);
        counter!("signaling_stale_disconnects_total").increment(1);
    }
    stale
}

/// Translator registration: the capability profile must already exist
/// in the record store. A failed lookup is logged and swallowed so
/// the connection itself stays up.
async fn register_translator(state: &Arc<AppState>, client: &Arc<ClientState>, id: &str) {
    match state.records.get_translator(id).await {
        Ok(record) => {
            state.presence.register_translator(
                client.id,
                TranslatorPresence {
                    translator_id: record.id.clone(),
                    languages: record.languages,
                    categories: record.categories,
                    available: true,
                },
            );
            info!("Translator {} registered on {}", record.id, client.id);

            if let Err(e) = state.records.update_translator_online(id, true).await {
                warn!("Failed to mark translator {} online: {}", id, e);
            }
            state.registry.broadcast_all(&ServerMessage::OnlineCount {
                count: state.presence.online_count(),
            });
        }
        Err(e) => {
            warn!("Translator profile lookup failed for {}: {}", id, e);
        }
    }
}
