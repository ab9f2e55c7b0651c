use crate::config::ServerConfig;
use crate::matchmaker::{Matchmaker, ReadyOutcome};
use crate::physics;
use crate::protocol::{
    GameStateMsg, PaddleMoveMsg, PlayerAssignedMsg, RoomClosedMsg, StartGameMsg,
};
use crate::registry::RoomRegistry;
use crate::state::{PlayerSlot, RoomState};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Commands from client connections to the session engine. Room tickers
/// feed their `Tick`s through the same channel, so everything that touches
/// match state runs on one task in arrival order.
pub enum GameCommand {
    Ready {
        client_id: u32,
        response: oneshot::Sender<PlayerAssignedMsg>,
    },
    PaddleMove {
        client_id: u32,
        msg: PaddleMoveMsg,
    },
    Disconnect {
        client_id: u32,
    },
    Tick {
        room_id: u32,
    },
}

/// Broadcasts from the session engine to all connections. Every connection
/// task sees every broadcast and forwards only what addresses it.
#[derive(Debug, Clone)]
pub enum GameBroadcast {
    MatchStarted {
        room_id: u32,
        players: [u32; 2],
        msg: StartGameMsg,
    },
    GameState {
        room_id: u32,
        msg: GameStateMsg,
    },
    PaddleRelay {
        to: u32,
        msg: PaddleMoveMsg,
    },
    RoomClosed {
        room_id: u32,
        msg: RoomClosedMsg,
    },
}

/// Per-room bookkeeping the engine keeps next to the match state itself.
struct RoomHandle {
    /// Connection ids by seat. A seat empties when its player disconnects;
    /// the room keeps simulating until both are gone.
    members: [Option<u32>; 2],
    ticker: tokio::task::JoinHandle<()>,
    last_activity: Instant,
}

struct SessionEngine {
    config: ServerConfig,
    matchmaker: Matchmaker,
    registry: RoomRegistry,
    rooms: HashMap<u32, RoomHandle>,
    clients: HashMap<u32, (u32, PlayerSlot)>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    cmd_tx: mpsc::Sender<GameCommand>,
}

/// Run the session engine. Owns all rooms and their match states.
///
/// `cmd_tx` is the same channel the connections send on; the engine keeps a
/// copy to hand to the room tickers it spawns, which means the channel never
/// closes on its own and the loop runs for the life of the process.
pub async fn run_game_loop(
    cmd_tx: mpsc::Sender<GameCommand>,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<GameBroadcast>,
    config: ServerConfig,
) {
    let mut engine = SessionEngine {
        config,
        matchmaker: Matchmaker::new(),
        registry: RoomRegistry::new(),
        rooms: HashMap::new(),
        clients: HashMap::new(),
        broadcast_tx,
        cmd_tx,
    };

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            GameCommand::Ready {
                client_id,
                response,
            } => engine.handle_ready(client_id, response),
            GameCommand::PaddleMove { client_id, msg } => {
                engine.handle_paddle_move(client_id, msg)
            }
            GameCommand::Disconnect { client_id } => engine.handle_disconnect(client_id),
            GameCommand::Tick { room_id } => engine.handle_tick(room_id),
        }
    }

    tracing::info!("Session engine stopped");
}

/// Drives one room at the configured rate by queueing `Tick` commands.
///
/// Late ticks burst instead of being skipped: the simulation advances the
/// same number of steps per wall-clock second even through a stall, it just
/// catches up in a clump.
fn spawn_room_ticker(
    cmd_tx: mpsc::Sender<GameCommand>,
    room_id: u32,
    tick_rate_hz: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / tick_rate_hz as f64);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
        loop {
            interval.tick().await;
            if cmd_tx.send(GameCommand::Tick { room_id }).await.is_err() {
                break;
            }
        }
    })
}

impl SessionEngine {
    fn handle_ready(&mut self, client_id: u32, response: oneshot::Sender<PlayerAssignedMsg>) {
        // A repeated ready from a seated player re-announces the seat it
        // already holds.
        if let Some(&(_, slot)) = self.clients.get(&client_id) {
            let _ = response.send(PlayerAssignedMsg {
                player_index: slot.index(),
            });
            return;
        }

        match self.matchmaker.on_ready(client_id) {
            ReadyOutcome::Waiting { room_id, slot } => {
                tracing::info!("Player {} ready, waiting to fill room {}", client_id, room_id);
                let _ = response.send(PlayerAssignedMsg {
                    player_index: slot.index(),
                });
            }
            ReadyOutcome::Paired {
                room_id,
                slot,
                partner,
            } => {
                if let Err(e) = self.registry.create(room_id, RoomState::new(&self.config.game)) {
                    tracing::error!("Room {} could not be created: {}", room_id, e);
                    return;
                }
                let _ = response.send(PlayerAssignedMsg {
                    player_index: slot.index(),
                });
                self.clients.insert(partner, (room_id, PlayerSlot::Bottom));
                self.clients.insert(client_id, (room_id, slot));
                let ticker =
                    spawn_room_ticker(self.cmd_tx.clone(), room_id, self.config.tick_rate_hz);
                self.rooms.insert(
                    room_id,
                    RoomHandle {
                        members: [Some(partner), Some(client_id)],
                        ticker,
                        last_activity: Instant::now(),
                    },
                );
                tracing::info!(
                    "Room {} started for players {} and {} ({} rooms active)",
                    room_id,
                    partner,
                    client_id,
                    self.registry.len()
                );
                let _ = self.broadcast_tx.send(GameBroadcast::MatchStarted {
                    room_id,
                    players: [partner, client_id],
                    msg: StartGameMsg {
                        referee_id: client_id,
                    },
                });
            }
        }
    }

    fn handle_paddle_move(&mut self, client_id: u32, msg: PaddleMoveMsg) {
        let Some(&(room_id, seat)) = self.clients.get(&client_id) else {
            tracing::debug!("Dropping paddle input from unpaired client {}", client_id);
            return;
        };
        // The claimed index is trusted as long as it names a real seat; the
        // x position is never range-checked. Clients clamp for themselves.
        let Some(slot) = PlayerSlot::from_index(msg.player_index) else {
            tracing::debug!(
                "Dropping paddle input with bad index {} from client {}",
                msg.player_index,
                client_id
            );
            return;
        };
        let Some(state) = self.registry.get_mut(room_id) else {
            return;
        };
        state.set_paddle(slot, msg.x_position);

        if let Some(handle) = self.rooms.get_mut(&room_id) {
            handle.last_activity = Instant::now();
            // Relayed across the sender's own seat, whatever index it claimed.
            if let Some(to) = handle.members[seat.opponent().index()] {
                let _ = self.broadcast_tx.send(GameBroadcast::PaddleRelay { to, msg });
            }
        }
    }

    fn handle_disconnect(&mut self, client_id: u32) {
        if self.matchmaker.withdraw(client_id) {
            tracing::info!("Player {} left while waiting for a partner", client_id);
            return;
        }
        let Some((room_id, slot)) = self.clients.remove(&client_id) else {
            return;
        };
        let Some(handle) = self.rooms.get_mut(&room_id) else {
            return;
        };
        handle.members[slot.index()] = None;
        if handle.members.iter().all(Option::is_none) {
            tracing::info!("Room {} emptied", room_id);
            self.teardown_room(room_id);
        } else {
            tracing::info!(
                "Player {} left room {}, match continues for the remaining player",
                client_id,
                room_id
            );
        }
    }

    fn handle_tick(&mut self, room_id: u32) {
        // A ticker can fire once more while its abort is in flight.
        let Some(handle) = self.rooms.get_mut(&room_id) else {
            return;
        };

        if handle.last_activity.elapsed() >= self.config.idle_timeout {
            tracing::info!("Room {} saw no input for {:?}, closing", room_id, self.config.idle_timeout);
            let _ = self.broadcast_tx.send(GameBroadcast::RoomClosed {
                room_id,
                msg: RoomClosedMsg {
                    reason: "idle".to_string(),
                },
            });
            self.teardown_room(room_id);
            return;
        }

        let Some(state) = self.registry.get_mut(room_id) else {
            return;
        };
        // The final score was broadcast on the tick that reached it; after
        // that the room sits quiet until players leave or the idle close.
        if state.is_game_over() {
            return;
        }

        let started = Instant::now();
        physics::step(state, &self.config.game);
        let msg = GameStateMsg::from_state(state);
        if let Some(winner) = state.winner {
            tracing::info!(
                "Room {} finished {}:{}, {:?} side wins",
                room_id,
                state.score[0],
                state.score[1],
                winner
            );
        }
        let _ = self.broadcast_tx.send(GameBroadcast::GameState { room_id, msg });

        let elapsed = started.elapsed();
        let remaining = self.config.frame_budget.saturating_sub(elapsed);
        if remaining < self.config.frame_warn_headroom {
            tracing::warn!(
                "Room {} tick took {:?}, only {:?} of the frame budget left",
                room_id,
                elapsed,
                remaining
            );
        }
    }

    fn teardown_room(&mut self, room_id: u32) {
        if let Some(handle) = self.rooms.remove(&room_id) {
            handle.ticker.abort();
            for member in handle.members.into_iter().flatten() {
                self.clients.remove(&member);
            }
        }
        if let Err(e) = self.registry.delete(room_id) {
            tracing::warn!("Room {} cleanup: {}", room_id, e);
        }
        tracing::info!("Room {} closed ({} rooms active)", room_id, self.registry.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_engine(
        config: ServerConfig,
    ) -> (mpsc::Sender<GameCommand>, broadcast::Receiver<GameBroadcast>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(config.broadcast_buffer);
        tokio::spawn(run_game_loop(cmd_tx.clone(), cmd_rx, broadcast_tx, config));
        (cmd_tx, broadcast_rx)
    }

    async fn join(cmd_tx: &mpsc::Sender<GameCommand>, client_id: u32) -> PlayerAssignedMsg {
        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(GameCommand::Ready {
                client_id,
                response: tx,
            })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    async fn recv_until<F>(
        rx: &mut broadcast::Receiver<GameBroadcast>,
        mut pred: F,
    ) -> GameBroadcast
    where
        F: FnMut(&GameBroadcast) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let b = rx.recv().await.expect("broadcast channel closed");
                if pred(&b) {
                    return b;
                }
            }
        })
        .await
        .expect("no matching broadcast before timeout")
    }

    fn drain(rx: &mut broadcast::Receiver<GameBroadcast>) -> Vec<GameBroadcast> {
        let mut out = Vec::new();
        while let Ok(b) = rx.try_recv() {
            out.push(b);
        }
        out
    }

    #[tokio::test]
    async fn pairing_assigns_slots_in_arrival_order() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());

        assert_eq!(join(&cmd_tx, 1).await.player_index, 0);
        assert_eq!(join(&cmd_tx, 2).await.player_index, 1);

        let started =
            recv_until(&mut rx, |b| matches!(b, GameBroadcast::MatchStarted { .. })).await;
        match started {
            GameBroadcast::MatchStarted {
                room_id,
                players,
                msg,
            } => {
                assert_eq!(room_id, 0);
                assert_eq!(players, [1, 2]);
                assert_eq!(msg.referee_id, 2);
            }
            _ => unreachable!(),
        }

        // The simulation starts without further prompting.
        recv_until(&mut rx, |b| matches!(b, GameBroadcast::GameState { .. })).await;
    }

    #[tokio::test]
    async fn paddle_moves_update_state_and_relay_to_opponent() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;

        cmd_tx
            .send(GameCommand::PaddleMove {
                client_id: 1,
                msg: PaddleMoveMsg {
                    x_position: 300.0,
                    player_index: 0,
                },
            })
            .await
            .unwrap();

        let relay = recv_until(&mut rx, |b| matches!(b, GameBroadcast::PaddleRelay { .. })).await;
        match relay {
            GameBroadcast::PaddleRelay { to, msg } => {
                assert_eq!(to, 2);
                assert_eq!(msg.x_position, 300.0);
                assert_eq!(msg.player_index, 0);
            }
            _ => unreachable!(),
        }

        recv_until(&mut rx, |b| {
            matches!(b, GameBroadcast::GameState { msg, .. } if msg.paddle_x[0] == 300.0)
        })
        .await;
    }

    #[tokio::test]
    async fn input_before_pairing_is_dropped() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        cmd_tx
            .send(GameCommand::PaddleMove {
                client_id: 9,
                msg: PaddleMoveMsg {
                    x_position: 100.0,
                    player_index: 0,
                },
            })
            .await
            .unwrap();

        // Barrier: once the ready is answered the paddle command has been
        // processed, and it must not have produced a broadcast.
        join(&cmd_tx, 9).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn bad_player_index_neither_applies_nor_relays() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;

        cmd_tx
            .send(GameCommand::PaddleMove {
                client_id: 1,
                msg: PaddleMoveMsg {
                    x_position: 50.0,
                    player_index: 7,
                },
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        for b in drain(&mut rx) {
            match b {
                GameBroadcast::PaddleRelay { .. } => panic!("bad index was relayed"),
                GameBroadcast::GameState { msg, .. } => {
                    assert_eq!(msg.paddle_x, [255.0, 255.0]);
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn emptied_room_ignores_late_ticks() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;
        recv_until(&mut rx, |b| matches!(b, GameBroadcast::MatchStarted { .. })).await;

        cmd_tx
            .send(GameCommand::Disconnect { client_id: 1 })
            .await
            .unwrap();
        cmd_tx
            .send(GameCommand::Disconnect { client_id: 2 })
            .await
            .unwrap();

        // Barrier, then flush whatever the room broadcast before it died.
        join(&cmd_tx, 5).await;
        drain(&mut rx);

        cmd_tx
            .send(GameCommand::Tick { room_id: 0 })
            .await
            .unwrap();
        join(&cmd_tx, 5).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn match_continues_for_the_survivor_of_a_disconnect() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;
        recv_until(&mut rx, |b| matches!(b, GameBroadcast::MatchStarted { .. })).await;

        cmd_tx
            .send(GameCommand::Disconnect { client_id: 1 })
            .await
            .unwrap();
        // Barrier, then flush the frames from before the seat emptied.
        join(&cmd_tx, 5).await;
        drain(&mut rx);

        // The room is still ticking for the remaining player.
        for _ in 0..5 {
            recv_until(&mut rx, |b| matches!(b, GameBroadcast::GameState { .. })).await;
        }

        // Their input still lands in the state, and with the opposing seat
        // empty there is nobody left to relay it to.
        cmd_tx
            .send(GameCommand::PaddleMove {
                client_id: 2,
                msg: PaddleMoveMsg {
                    x_position: 111.0,
                    player_index: 1,
                },
            })
            .await
            .unwrap();
        let mut relayed = false;
        recv_until(&mut rx, |b| {
            if matches!(b, GameBroadcast::PaddleRelay { .. }) {
                relayed = true;
            }
            matches!(b, GameBroadcast::GameState { msg, .. } if msg.paddle_x[1] == 111.0)
        })
        .await;
        assert!(!relayed, "paddle input was relayed toward the empty seat");
    }

    #[tokio::test]
    async fn waiting_player_disconnect_frees_the_queue() {
        let (cmd_tx, mut rx) = start_engine(ServerConfig::default());
        assert_eq!(join(&cmd_tx, 1).await.player_index, 0);
        cmd_tx
            .send(GameCommand::Disconnect { client_id: 1 })
            .await
            .unwrap();

        // The vacated seat goes to the next arrival, and the two players
        // present after the withdrawal pair with each other.
        assert_eq!(join(&cmd_tx, 2).await.player_index, 0);
        assert_eq!(join(&cmd_tx, 3).await.player_index, 1);
        let started =
            recv_until(&mut rx, |b| matches!(b, GameBroadcast::MatchStarted { .. })).await;
        match started {
            GameBroadcast::MatchStarted {
                room_id, players, ..
            } => {
                assert_eq!(room_id, 0);
                assert_eq!(players, [2, 3]);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn idle_room_closes_and_players_can_requeue() {
        let config = ServerConfig {
            idle_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let (cmd_tx, mut rx) = start_engine(config);
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;

        let closed = recv_until(&mut rx, |b| matches!(b, GameBroadcast::RoomClosed { .. })).await;
        match closed {
            GameBroadcast::RoomClosed { room_id, msg } => {
                assert_eq!(room_id, 0);
                assert_eq!(msg.reason, "idle");
            }
            _ => unreachable!(),
        }

        // The seats were released: the same player starts a fresh pairing.
        assert_eq!(join(&cmd_tx, 1).await.player_index, 0);
    }

    #[tokio::test]
    async fn paddle_input_defers_the_idle_close() {
        let config = ServerConfig {
            idle_timeout: Duration::from_millis(150),
            ..Default::default()
        };
        let (cmd_tx, mut rx) = start_engine(config);
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;

        // Keep nudging the paddle for a while; the close must not fire.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            cmd_tx
                .send(GameCommand::PaddleMove {
                    client_id: 1,
                    msg: PaddleMoveMsg {
                        x_position: 240.0,
                        player_index: 0,
                    },
                })
                .await
                .unwrap();
            for b in drain(&mut rx) {
                assert!(!matches!(b, GameBroadcast::RoomClosed { .. }));
            }
        }

        // Now go quiet and let it close.
        recv_until(&mut rx, |b| matches!(b, GameBroadcast::RoomClosed { .. })).await;
    }

    #[tokio::test]
    async fn match_stops_at_winning_score() {
        let mut config = ServerConfig::default();
        config.game.winning_score = 1;
        let (cmd_tx, mut rx) = start_engine(config);
        join(&cmd_tx, 1).await;
        join(&cmd_tx, 2).await;

        // Untouched serves slip past the bottom paddle, so the top player
        // reaches the winning score on their own.
        let last = recv_until(&mut rx, |b| {
            matches!(b, GameBroadcast::GameState { msg, .. } if msg.score != [0, 0])
        })
        .await;
        match last {
            GameBroadcast::GameState { msg, .. } => assert_eq!(msg.score, [0, 1]),
            _ => unreachable!(),
        }

        // The room stays up but the simulation is done.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drain(&mut rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
