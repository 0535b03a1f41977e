use tokio::sync::mpsc;
use uuid::Uuid;

use quizparty_common::protocol::{ClientMessage, ErrorCode, ServerMessage};
use quizparty_common::room::{RoomError, RoomStatus};
use quizparty_common::round::now_ms;

use crate::room::{GuessGate, StartOutcome};
use crate::rounds;
use crate::server::SharedState;

pub async fn handle_message(
    conn_id: Uuid,
    msg: ClientMessage,
    state: &SharedState,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::CreateRoom {
            owner_name,
            max_players,
        } => {
            let owner_name = owner_name.trim().to_string();
            let (code, room) = match state.registry.create(&owner_name, max_players).await {
                Ok(created) => created,
                Err(e) => {
                    send_error(conn_id, &e, state).await;
                    return Ok(());
                }
            };
            tracing::info!("Room {} created by '{}'", code, owner_name);

            let tx = match conn_tx(conn_id, state).await {
                Some(tx) => tx,
                None => return Ok(()),
            };

            let room_state = room.lock().await;
            send_to_conn(
                conn_id,
                ServerMessage::RoomCreated {
                    room: room_state.room.clone(),
                },
                state,
            )
            .await;
            state
                .broadcaster
                .subscribe(&code, conn_id, tx, room_state.snapshot())
                .await;
            drop(room_state);

            attach_conn(conn_id, state, &code, Some(owner_name)).await;
        }

        ClientMessage::JoinRoom { code, name } => {
            let room = match state.registry.get(&code).await {
                Some(r) => r,
                None => {
                    send_error(conn_id, &RoomError::NotFound, state).await;
                    return Ok(());
                }
            };
            let tx = match conn_tx(conn_id, state).await {
                Some(tx) => tx,
                None => return Ok(()),
            };

            let mut room_state = room.lock().await;
            if let Err(e) = room_state.join(&name) {
                send_error(conn_id, &e, state).await;
                return Ok(());
            }
            let code = room_state.room.code.clone();

            state
                .broadcaster
                .subscribe(&code, conn_id, tx, room_state.snapshot())
                .await;
            state
                .broadcaster
                .publish(
                    &code,
                    &ServerMessage::PlayerJoined {
                        players: room_state.players.clone(),
                    },
                )
                .await;
            drop(room_state);

            attach_conn(conn_id, state, &code, Some(name.trim().to_string())).await;
        }

        ClientMessage::WatchRoom { code } => {
            let room = match state.registry.get(&code).await {
                Some(r) => r,
                None => {
                    send_error(conn_id, &RoomError::NotFound, state).await;
                    return Ok(());
                }
            };
            let tx = match conn_tx(conn_id, state).await {
                Some(tx) => tx,
                None => return Ok(()),
            };

            let room_state = room.lock().await;
            let code = room_state.room.code.clone();
            state
                .broadcaster
                .subscribe(&code, conn_id, tx, room_state.snapshot())
                .await;
            drop(room_state);

            attach_conn(conn_id, state, &code, None).await;
        }

        ClientMessage::SetReady { code, name, ready } => {
            let room = match state.registry.get(&code).await {
                Some(r) => r,
                None => {
                    send_error(conn_id, &RoomError::NotFound, state).await;
                    return Ok(());
                }
            };
            let mut room_state = room.lock().await;
            match room_state.set_ready(&name, ready) {
                Ok(()) => {
                    state
                        .broadcaster
                        .publish(
                            &room_state.room.code.clone(),
                            &ServerMessage::ReadyChanged {
                                players: room_state.players.clone(),
                            },
                        )
                        .await;
                }
                Err(e) => send_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::StartRoom { code, owner_name } => {
            let room = match state.registry.get(&code).await {
                Some(r) => r,
                None => {
                    send_error(conn_id, &RoomError::NotFound, state).await;
                    return Ok(());
                }
            };
            let mut room_state = room.lock().await;

            // Owner and roster checks come first, so a non-owner is
            // told Forbidden even when quiz content is down.
            if let Err(e) = room_state.check_start(&owner_name) {
                send_error(conn_id, &e, state).await;
                return Ok(());
            }
            // Do not transition into a game that cannot issue a round.
            if room_state.room.status == RoomStatus::Waiting
                && !state.quiz.available(state.rules.level)
            {
                let e = RoomError::PreconditionFailed("quiz content unavailable".into());
                send_error(conn_id, &e, state).await;
                return Ok(());
            }

            match room_state.start(&owner_name) {
                Err(e) => send_error(conn_id, &e, state).await,
                Ok(StartOutcome::AlreadyStarted) => {
                    // Concurrent duplicate start: reply with the current
                    // state instead of an error.
                    send_to_conn(conn_id, room_state.snapshot(), state).await;
                }
                Ok(StartOutcome::Started) => {
                    let code = room_state.room.code.clone();
                    tracing::info!("Room {} started by '{}'", code, owner_name);
                    state.broadcaster.publish(&code, &room_state.snapshot()).await;

                    match rounds::next_round(&mut room_state, &state.rules, state.quiz.as_ref()) {
                        Ok(round) => {
                            let round_no = round.round_no;
                            state
                                .broadcaster
                                .publish(&code, &ServerMessage::RoundStarted { round })
                                .await;
                            drop(room_state);
                            rounds::spawn_round_timer(
                                room.clone(),
                                state.broadcaster.clone(),
                                state.quiz.clone(),
                                code,
                                round_no,
                            );
                        }
                        Err(e) => {
                            tracing::error!("Room {}: failed to issue round 1: {}", code, e);
                            send_error(conn_id, &e, state).await;
                        }
                    }
                }
            }
        }

        ClientMessage::SubmitGuess { code, name, guess } => {
            let room = match state.registry.get(&code).await {
                Some(r) => r,
                None => {
                    send_error(conn_id, &RoomError::NotFound, state).await;
                    return Ok(());
                }
            };
            let mut room_state = room.lock().await;

            match room_state.guess_gate(&name, now_ms()) {
                Err(e) => send_error(conn_id, &e, state).await,
                Ok(GuessGate::Ignored) => {
                    // Late or eliminated: acked, never scored, never broadcast.
                    send_to_conn(conn_id, ServerMessage::GuessAck { accepted: false }, state)
                        .await;
                }
                Ok(GuessGate::Eligible) => {
                    let round = match room_state.round.clone() {
                        Some(r) => r,
                        None => {
                            // Cannot happen while guess_gate requires an
                            // active round, but never leave the client
                            // without a reply.
                            let e = RoomError::PreconditionFailed("no active round".into());
                            send_error(conn_id, &e, state).await;
                            return Ok(());
                        }
                    };
                    let correct = state.quiz.check(&round.quiz_id, &round.quiz_token, &guess);
                    send_to_conn(conn_id, ServerMessage::GuessAck { accepted: true }, state)
                        .await;

                    let code = room_state.room.code.clone();
                    let name = name.trim().to_string();

                    if correct {
                        room_state.apply_correct(&name, state.rules.score_increment);
                        state
                            .broadcaster
                            .publish(
                                &code,
                                &ServerMessage::GuessResult {
                                    name,
                                    guess,
                                    correct: true,
                                    players: room_state.players.clone(),
                                },
                            )
                            .await;

                        // First correct guess ends the round; the next
                        // one starts immediately with a fresh budget.
                        match rounds::next_round(&mut room_state, &state.rules, state.quiz.as_ref())
                        {
                            Ok(next) => {
                                let round_no = next.round_no;
                                state
                                    .broadcaster
                                    .publish(&code, &ServerMessage::RoundStarted { round: next })
                                    .await;
                                drop(room_state);
                                rounds::spawn_round_timer(
                                    room.clone(),
                                    state.broadcaster.clone(),
                                    state.quiz.clone(),
                                    code,
                                    round_no,
                                );
                            }
                            Err(e) => {
                                tracing::error!("Room {}: failed to advance round: {}", code, e);
                                let (winner, leaderboard) = room_state.finish();
                                state.broadcaster.publish(&code, &room_state.snapshot()).await;
                                state
                                    .broadcaster
                                    .publish(&code, &ServerMessage::GameOver { winner, leaderboard })
                                    .await;
                            }
                        }
                    } else {
                        state
                            .broadcaster
                            .publish(
                                &code,
                                &ServerMessage::GuessResult {
                                    name,
                                    guess,
                                    correct: false,
                                    players: room_state.players.clone(),
                                },
                            )
                            .await;
                    }
                }
            }
        }

        ClientMessage::LeaveRoom { code, name } => {
            // Leaving is idempotent; an unknown room or absent player
            // still gets a clean ack.
            if let Some(room) = state.registry.get(&code).await {
                let mut room_state = room.lock().await;
                let code = room_state.room.code.clone();
                let name = name.trim().to_string();
                let outcome = room_state.remove_player(&name);

                if outcome.removed {
                    if outcome.empty {
                        if let Some(round) = &room_state.round {
                            state.quiz.retire(&round.quiz_token);
                        }
                        state.broadcaster.publish(&code, &ServerMessage::RoomClosed).await;
                        drop(room_state);
                        state.broadcaster.drop_room(&code).await;
                        state.registry.remove(&code).await;
                        tracing::info!("Room {} retired (empty)", code);
                    } else {
                        state
                            .broadcaster
                            .publish(
                                &code,
                                &ServerMessage::PlayerLeft {
                                    name,
                                    players: room_state.players.clone(),
                                },
                            )
                            .await;
                        if outcome.owner_changed {
                            state
                                .broadcaster
                                .publish(
                                    &code,
                                    &ServerMessage::OwnerChanged {
                                        players: room_state.players.clone(),
                                    },
                                )
                                .await;
                        }
                        drop(room_state);
                    }
                } else {
                    drop(room_state);
                }

                state.broadcaster.unsubscribe(&code, conn_id).await;
                detach_conn(conn_id, state, &code).await;
            }
            send_to_conn(conn_id, ServerMessage::RoomLeft, state).await;
        }

        ClientMessage::ListRooms => {
            let rooms = state.registry.list().await;
            send_to_conn(conn_id, ServerMessage::RoomList { rooms }, state).await;
        }

        ClientMessage::QuizPreview { level } => {
            let reply = quiz_preview(state, level);
            send_to_conn(conn_id, reply, state).await;
        }

        ClientMessage::HealthCheck => {
            send_to_conn(conn_id, health_status(state), state).await;
        }

        ClientMessage::Ping => {
            send_to_conn(conn_id, ServerMessage::Pong, state).await;
        }

        ClientMessage::Disconnect => {
            handle_disconnect(conn_id, state).await;
        }

        // Hello is only valid as the first message.
        ClientMessage::Hello { .. } => {}
    }

    Ok(())
}

pub async fn handle_disconnect(conn_id: Uuid, state: &SharedState) {
    let handle = match state.connections.write().await.remove(&conn_id) {
        Some(h) => h,
        None => return,
    };
    let code = match handle.room_code {
        Some(c) => c,
        None => return,
    };
    state.broadcaster.unsubscribe(&code, conn_id).await;

    let name = match handle.joined_name {
        Some(n) => n,
        None => return, // watcher, nothing on the roster
    };
    let room = match state.registry.get(&code).await {
        Some(r) => r,
        None => return,
    };

    let mut room_state = room.lock().await;
    if room_state.room.status == RoomStatus::Playing {
        // Mid-game drop: keep the seat but stop it scoring.
        if room_state.mark_out(&name) {
            state
                .broadcaster
                .publish(
                    &code,
                    &ServerMessage::PlayerOut {
                        name,
                        players: room_state.players.clone(),
                    },
                )
                .await;
        }
        if room_state.all_out() {
            if let Some(round) = &room_state.round {
                state.quiz.retire(&round.quiz_token);
            }
            drop(room_state);
            state.broadcaster.drop_room(&code).await;
            state.registry.remove(&code).await;
            tracing::info!("Room {} retired (all players gone mid-game)", code);
        }
        return;
    }

    let outcome = room_state.remove_player(&name);
    if outcome.removed {
        if outcome.empty {
            state.broadcaster.publish(&code, &ServerMessage::RoomClosed).await;
            drop(room_state);
            state.broadcaster.drop_room(&code).await;
            state.registry.remove(&code).await;
            tracing::info!("Room {} retired (empty)", code);
        } else {
            state
                .broadcaster
                .publish(
                    &code,
                    &ServerMessage::PlayerLeft {
                        name,
                        players: room_state.players.clone(),
                    },
                )
                .await;
            if outcome.owner_changed {
                state
                    .broadcaster
                    .publish(
                        &code,
                        &ServerMessage::OwnerChanged {
                            players: room_state.players.clone(),
                        },
                    )
                    .await;
            }
        }
    }
}

pub fn health_status(state: &SharedState) -> ServerMessage {
    let status = if state.quiz.available(state.rules.level) {
        "ok"
    } else {
        "degraded"
    };
    ServerMessage::HealthStatus {
        status: status.into(),
    }
}

pub fn quiz_preview(state: &SharedState, level: u32) -> ServerMessage {
    if state.quiz.available(level) {
        ServerMessage::QuizReady { level }
    } else {
        ServerMessage::Error {
            code: ErrorCode::NotFound,
            message: format!("no quiz content for level {}", level),
        }
    }
}

async fn conn_tx(conn_id: Uuid, state: &SharedState) -> Option<mpsc::Sender<ServerMessage>> {
    state
        .connections
        .read()
        .await
        .get(&conn_id)
        .map(|c| c.tx.clone())
}

async fn send_to_conn(conn_id: Uuid, msg: ServerMessage, state: &SharedState) {
    let conns = state.connections.read().await;
    if let Some(conn) = conns.get(&conn_id) {
        let _ = conn.tx.send(msg).await;
    }
}

async fn send_error(conn_id: Uuid, err: &RoomError, state: &SharedState) {
    send_to_conn(conn_id, ServerMessage::from_error(err), state).await;
}

async fn attach_conn(conn_id: Uuid, state: &SharedState, code: &str, joined_name: Option<String>) {
    let mut conns = state.connections.write().await;
    if let Some(conn) = conns.get_mut(&conn_id) {
        conn.room_code = Some(code.to_string());
        if joined_name.is_some() {
            conn.joined_name = joined_name;
        }
    }
}

async fn detach_conn(conn_id: Uuid, state: &SharedState, code: &str) {
    let mut conns = state.connections.write().await;
    if let Some(conn) = conns.get_mut(&conn_id) {
        if conn.room_code.as_deref() == Some(code) {
            conn.room_code = None;
            conn.joined_name = None;
        }
    }
}
