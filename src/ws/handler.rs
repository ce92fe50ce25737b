//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{CombatantId, ConnectionId, Envelope, PlayerAction};
use crate::matchmaking::{JoinTicket, MatchRegistry, RegistryError};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Messages queued for the socket writer
const OUTBOUND_BUFFER: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id: ConnectionId = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        connection_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(connection_id = %connection_id, error = %e, "Failed to send welcome");
        return;
    }

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let writer_handle = tokio::spawn(write_loop(connection_id, ws_sink, out_rx));

    let mut session = Session {
        connection_id,
        registry: state.registry.clone(),
        out_tx,
        rate_limiter: ConnectionRateLimiter::new(),
        forwarder: None,
    };
    session.run(ws_stream).await;

    // Cleanup on disconnect
    session.leave().await;
    writer_handle.abort();

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Outbound queue -> WebSocket
async fn write_loop(
    connection_id: ConnectionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Match broadcast -> outbound queue, keeping only what this combatant should see
async fn forward_events(
    combatant_id: CombatantId,
    mut events: broadcast::Receiver<Envelope>,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match events.recv().await {
            Ok(envelope) => {
                if !envelope.is_for(combatant_id) {
                    continue;
                }
                if out_tx.send(envelope.msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Continue - don't disconnect for lag
                warn!(combatant_id = %combatant_id, lagged_count = n, "Client lagged, skipped match events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(combatant_id = %combatant_id, "Match event channel closed");
                break;
            }
        }
    }
}

/// Per-connection state
struct Session {
    connection_id: ConnectionId,
    registry: Arc<MatchRegistry>,
    out_tx: mpsc::Sender<ServerMsg>,
    rate_limiter: ConnectionRateLimiter,
    forwarder: Option<JoinHandle<()>>,
}

impl Session {
    /// Reader loop: WebSocket -> registry
    async fn run(&mut self, mut ws_stream: SplitStream<WebSocket>) {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if !self.rate_limiter.check_action() {
                        warn!(connection_id = %self.connection_id, "Rate limited client message");
                        continue;
                    }
                    match serde_json::from_str::<ClientMsg>(&text) {
                        Ok(msg) => self.handle_msg(msg).await,
                        Err(e) => {
                            warn!(connection_id = %self.connection_id, error = %e, "Failed to parse client message");
                            self.send(ServerMsg::Error {
                                code: "invalid_message".to_string(),
                                message: e.to_string(),
                            })
                            .await;
                        }
                    }
                }
                Ok(Message::Binary(_)) => {
                    warn!(connection_id = %self.connection_id, "Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    info!(connection_id = %self.connection_id, "Client initiated close");
                    break;
                }
                Err(e) => {
                    error!(connection_id = %self.connection_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    async fn handle_msg(&mut self, msg: ClientMsg) {
        let result = match msg {
            ClientMsg::Ping { t } => {
                self.send(ServerMsg::Pong {
                    t,
                    server_time: unix_millis(),
                })
                .await;
                Ok(())
            }
            ClientMsg::CreateMatch {
                nickname,
                class_id,
                settings,
            } => {
                let created = self
                    .registry
                    .create_match(self.connection_id, nickname, class_id, &settings);
                self.take_seat(created, true).await
            }
            ClientMsg::JoinMatch {
                join_code,
                nickname,
                class_id,
            } => {
                let joined = self
                    .registry
                    .join_match(self.connection_id, &join_code, nickname, class_id)
                    .await;
                self.take_seat(joined, false).await
            }
            ClientMsg::LeaveMatch => self.leave_match().await,
            other => match PlayerAction::from_client(other) {
                Some(action) => self.registry.forward(self.connection_id, action).await,
                None => Ok(()),
            },
        };

        if let Err(e) = result {
            debug!(connection_id = %self.connection_id, error = %e, "Request rejected");
            self.send(e.to_server_msg()).await;
        }
    }

    /// Confirm the seat to the client, then start relaying match events
    async fn take_seat(
        &mut self,
        result: Result<JoinTicket, RegistryError>,
        created: bool,
    ) -> Result<(), RegistryError> {
        let JoinTicket {
            match_id,
            join_code,
            combatant_id,
            settings,
            events,
        } = result?;

        let reply = if created {
            ServerMsg::MatchCreated {
                match_id,
                join_code,
                combatant_id,
                settings,
            }
        } else {
            ServerMsg::MatchJoined {
                match_id,
                join_code,
                combatant_id,
                settings,
            }
        };
        self.send(reply).await;

        self.stop_forwarding();
        self.forwarder = Some(tokio::spawn(forward_events(
            combatant_id,
            events,
            self.out_tx.clone(),
        )));
        Ok(())
    }

    async fn leave_match(&mut self) -> Result<(), RegistryError> {
        self.stop_forwarding();
        self.registry.leave(self.connection_id).await.map(|_| ())
    }

    /// Disconnect path, nothing to report if not seated
    async fn leave(&mut self) {
        if let Err(e) = self.leave_match().await {
            debug!(connection_id = %self.connection_id, error = %e, "No seat to release");
        }
    }

    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    async fn send(&self, msg: ServerMsg) {
        if self.out_tx.send(msg).await.is_err() {
            debug!(connection_id = %self.connection_id, "Outbound channel closed");
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
