//! Per-connection gateway: handshake, action routing, and event fanout.
//!
//! Each accepted connection gets its own Tokio task running this
//! gateway. The flow is:
//!   1. Receive `hello` → validate protocol version → send `welcome`
//!   2. Spawn a writer task draining the player's event channel
//!   3. Loop: decode requests → resolve the room → await its reply
//!   4. On disconnect, leave the joined room (departure, not a pause)
//!
//! Every outbound event — direct replies included — goes through the
//! player's event channel, so replies and room broadcasts reach the
//! client in the order the room produced them.

use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{
    ClientAction, ClientRequest, Codec, PlayerId, ProtocolError, RoomCode,
    ServerEvent, PROTOCOL_VERSION,
};
use parlor_room::{PlayerSender, RoomError, RoomHandle};
use parlor_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::ParlorError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ParlorError> {
    let conn_id = conn.id();
    let player_id = PlayerId(conn_id.into_inner());
    tracing::debug!(%conn_id, "handling new connection");

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    perform_handshake(&conn, &state, player_id).await?;
    tracing::info!(%conn_id, %player_id, "player connected");

    // Writer task: everything the client sees after `welcome` flows
    // through this single channel drain.
    let writer = tokio::spawn(write_events(
        conn.clone(),
        Arc::clone(&state),
        events_rx,
    ));

    let mut session = Session {
        state: &state,
        player_id,
        events: events_tx,
        joined: None,
    };

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%player_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                break;
            }
        };

        let request: ClientRequest = match state.codec.decode(&data) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(
                    %player_id, error = %e, "failed to decode request"
                );
                session.send_error(None, 400, "malformed request");
                continue;
            }
        };

        session.dispatch(request).await;
    }

    // Disconnect is departure: vacate whatever room the player was in.
    session.leave_current_room().await;

    drop(session);
    let _ = writer.await;
    Ok(())
}

/// Receives the `hello`, checks the version, and answers `welcome`.
async fn perform_handshake(
    conn: &WebSocketConnection,
    state: &Arc<ServerState>,
    player_id: PlayerId,
) -> Result<(), ParlorError> {
    let data =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(ProtocolError::InvalidMessage(
                    "connection closed before hello".into(),
                )
                .into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::InvalidMessage(
                    "hello timed out".into(),
                )
                .into());
            }
        };

    let request: ClientRequest = state.codec.decode(&data)?;
    let version = match request.action {
        ClientAction::Hello { version } => version,
        _ => {
            send_direct(
                conn,
                state,
                &ServerEvent::Error {
                    seq: request.seq,
                    code: 400,
                    message: "expected hello".into(),
                },
            )
            .await?;
            return Err(ProtocolError::InvalidMessage(
                "first message must be hello".into(),
            )
            .into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_direct(
            conn,
            state,
            &ServerEvent::Error {
                seq: request.seq,
                code: 400,
                message: format!(
                    "protocol mismatch: expected {PROTOCOL_VERSION}, got {version}"
                ),
            },
        )
        .await?;
        return Err(ProtocolError::InvalidMessage(
            "protocol version mismatch".into(),
        )
        .into());
    }

    send_direct(
        conn,
        state,
        &ServerEvent::Welcome {
            player_id,
            protocol: PROTOCOL_VERSION,
        },
    )
    .await
}

/// Encodes and sends one event on the socket, bypassing the event
/// channel. Only used before the writer task exists.
async fn send_direct(
    conn: &WebSocketConnection,
    state: &Arc<ServerState>,
    event: &ServerEvent,
) -> Result<(), ParlorError> {
    let bytes = state.codec.encode(event)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Drains a player's event channel onto their socket.
async fn write_events(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = events.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event");
                continue;
            }
        };
        if conn.send(&bytes).await.is_err() {
            break;
        }
    }
}

/// One player's connection-scoped view of the server.
struct Session<'a> {
    state: &'a Arc<ServerState>,
    player_id: PlayerId,
    events: PlayerSender,
    /// The room this connection is currently a member of, if any. A
    /// connection can be in at most one room.
    joined: Option<RoomCode>,
}

impl Session<'_> {
    /// Routes one decoded request to the registry or its room.
    async fn dispatch(&mut self, request: ClientRequest) {
        let seq = request.seq;
        let result = self.perform(request.action, seq).await;
        if let Err(e) = result {
            self.send_error(seq, error_code(&e), &e.to_string());
        }
    }

    async fn perform(
        &mut self,
        action: ClientAction,
        seq: Option<u64>,
    ) -> Result<(), RoomError> {
        match action {
            ClientAction::Hello { .. } => {
                self.send_error(seq, 400, "already said hello");
            }

            ClientAction::CreateRoom { display_name } => {
                self.ensure_unjoined()?;
                let code = {
                    let mut registry = self.state.registry.lock().await;
                    registry.create_room(
                        self.player_id,
                        display_name,
                        self.events.clone(),
                    )
                };
                self.joined = Some(code.clone());
                self.send(ServerEvent::RoomCreated { seq, code });
            }

            ClientAction::JoinRoom { code, display_name } => {
                self.ensure_unjoined()?;
                let handle = self.room(&code).await?;
                handle
                    .join(self.player_id, display_name, self.events.clone())
                    .await?;
                self.joined = Some(code);
                self.send(ServerEvent::Ack { seq });
            }

            ClientAction::SetGame { code, game } => {
                let handle = self.room(&code).await?;
                handle.set_game(self.player_id, game).await?;
                self.send(ServerEvent::Ack { seq });
            }

            ClientAction::SubmitSecret { code, secret } => {
                let handle = self.room(&code).await?;
                handle.submit_secret(self.player_id, secret).await?;
                self.send(ServerEvent::Ack { seq });
            }

            ClientAction::GridMove { code, cell } => {
                let handle = self.room(&code).await?;
                let state = handle.grid_move(self.player_id, cell).await?;
                self.send(ServerEvent::Accepted { seq, state });
            }

            ClientAction::RaceRoll { code } => {
                let handle = self.room(&code).await?;
                let value = handle.race_roll(self.player_id).await?;
                self.send(ServerEvent::RollResult { seq, value });
            }

            ClientAction::RaceMove { code, token } => {
                let handle = self.room(&code).await?;
                let state = handle.race_move(self.player_id, token).await?;
                self.send(ServerEvent::Accepted { seq, state });
            }

            ClientAction::RulesMove { code, from, to } => {
                let handle = self.room(&code).await?;
                let state =
                    handle.rules_move(self.player_id, from, to).await?;
                self.send(ServerEvent::Accepted { seq, state });
            }

            ClientAction::RoomInfo { code } => {
                let handle = self.room(&code).await?;
                let snap = handle.snapshot().await?;
                self.send(ServerEvent::RoomInfo {
                    seq,
                    code: snap.code,
                    players: snap.players,
                    host: snap.host,
                    game: snap.game,
                });
            }

            ClientAction::LeaveRoom { code } => {
                let handle = self.room(&code).await?;
                let outcome = handle.leave(self.player_id).await?;
                self.state.registry.lock().await.reap(&code, outcome);
                if self.joined.as_ref() == Some(&code) {
                    self.joined = None;
                }
                self.send(ServerEvent::Ack { seq });
            }
        }
        Ok(())
    }

    /// Clones the room's handle out of the registry. The lock is gone
    /// before the caller awaits anything on the handle.
    async fn room(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.state.registry.lock().await.handle(code)
    }

    fn ensure_unjoined(&self) -> Result<(), RoomError> {
        match &self.joined {
            Some(_) => Err(RoomError::AlreadyJoined(self.player_id)),
            None => Ok(()),
        }
    }

    /// Leaves the joined room, if any. Called on disconnect.
    async fn leave_current_room(&mut self) {
        let Some(code) = self.joined.take() else {
            return;
        };
        let handle = match self.room(&code).await {
            Ok(handle) => handle,
            Err(_) => return,
        };
        match handle.leave(self.player_id).await {
            Ok(outcome) => {
                self.state.registry.lock().await.reap(&code, outcome);
            }
            Err(e) => {
                tracing::debug!(
                    player_id = %self.player_id,
                    %code,
                    error = %e,
                    "leave on disconnect failed"
                );
            }
        }
    }

    fn send(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    fn send_error(&self, seq: Option<u64>, code: u16, message: &str) {
        self.send(ServerEvent::Error {
            seq,
            code,
            message: message.to_string(),
        });
    }
}

/// Maps a room error to an HTTP-ish wire code: 404 for lookups that
/// found nothing, 409 for capacity and membership conflicts, 500 for
/// server-side faults, 400 for everything the client got wrong.
fn error_code(err: &RoomError) -> u16 {
    match err {
        RoomError::NotFound(_) | RoomError::NotInRoom(_) => 404,
        RoomError::RoomFull(_)
        | RoomError::AlreadyJoined(_)
        | RoomError::InvalidForPlayerCount { .. } => 409,
        RoomError::Internal(_)
        | RoomError::Oracle(_)
        | RoomError::Unavailable(_) => 500,
        _ => 400,
    }
}
