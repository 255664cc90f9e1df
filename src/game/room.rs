//! Room lifecycle and the per-room broadcast loop

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::registry::{ConnectionId, ConnectionTable};
use crate::util::time::clamp_dt;
use crate::ws::protocol::{GameOverReason, ServerMsg};

use super::engine::{MatchResult, SimulationEngine, TickOutcome};
use super::snapshot::SnapshotBuilder;
use super::state::{MatchState, PlayerSlot};
use super::PlayerInput;

pub type RoomId = Uuid;

/// How long lifecycle notifications may wait on a slow client
const NOTIFY_TIMEOUT: Duration = Duration::from_millis(500);

/// Room lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Created by the matchmaker, task not yet started
    Created,
    /// Ticking
    Running,
    /// Stopped for good
    Terminated,
}

/// Why a room stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Finished(MatchResult),
    /// The participant in this slot went away
    Disconnected(PlayerSlot),
    Shutdown,
}

/// Room errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} has terminated")]
    Terminated(RoomId),

    #[error("input queue for room {0} is full")]
    InputQueueFull(RoomId),
}

/// A connection taking part in a room
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub outbound: mpsc::Sender<ServerMsg>,
}

#[derive(Debug)]
struct Lifecycle {
    phase: RoomPhase,
    /// `None` while running; set exactly once
    termination: Option<TerminationReason>,
}

/// State shared between a room task and its handles
#[derive(Debug)]
struct RoomShared {
    lifecycle: Mutex<Lifecycle>,
    wake: Notify,
}

impl RoomShared {
    fn is_running(&self) -> bool {
        self.lifecycle.lock().termination.is_none()
    }

    fn terminate(&self, reason: TerminationReason) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.termination.is_some() {
                return false;
            }
            lifecycle.termination = Some(reason);
        }
        self.wake.notify_one();
        true
    }

    /// Move Created -> Running unless the room was stopped first
    fn start(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.termination.is_some() {
            return false;
        }
        lifecycle.phase = RoomPhase::Running;
        true
    }
}

/// Handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub participants: [ConnectionId; 2],
    input_tx: mpsc::Sender<PlayerInput>,
    shared: Arc<RoomShared>,
}

impl RoomHandle {
    /// Queue a card play for the next tick
    pub fn submit_input(&self, input: PlayerInput) -> Result<(), RoomError> {
        if !self.shared.is_running() {
            return Err(RoomError::Terminated(self.id));
        }
        self.input_tx.try_send(input).map_err(|e| match e {
            TrySendError::Full(_) => RoomError::InputQueueFull(self.id),
            TrySendError::Closed(_) => RoomError::Terminated(self.id),
        })
    }

    /// Stop the room. Returns `true` only for the call that actually stopped
    /// it; every later call is a no-op.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        self.shared.terminate(reason)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn phase(&self) -> RoomPhase {
        self.shared.lifecycle.lock().phase
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.shared.lifecycle.lock().termination
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn insert(&self, handle: RoomHandle) {
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Terminate every room; returns how many were still running
    pub fn shutdown_all(&self) -> usize {
        let handles: Vec<RoomHandle> = self.rooms.iter().map(|r| r.value().clone()).collect();
        handles
            .iter()
            .filter(|h| h.terminate(TerminationReason::Shutdown))
            .count()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for a room's outbound traffic
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastStats {
    pub snapshots_sent: u64,
    pub snapshots_dropped: u64,
}

/// The authoritative match room. Owned by its task; nothing else touches
/// the match state.
pub struct Room {
    id: RoomId,
    shared: Arc<RoomShared>,
    state: MatchState,
    engine: SimulationEngine,
    input_rx: mpsc::Receiver<PlayerInput>,
    participants: [Participant; 2],
    tick_interval: Duration,
    last_tick: Instant,
    connections: Arc<ConnectionTable>,
    registry: Arc<RoomRegistry>,
    stats: BroadcastStats,
}

impl Room {
    /// Create a room; `participants[0]` plays as player1
    pub fn new(
        id: RoomId,
        participants: [Participant; 2],
        engine: SimulationEngine,
        config: &GameConfig,
        connections: Arc<ConnectionTable>,
        registry: Arc<RoomRegistry>,
    ) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(config.input_queue_capacity);
        let shared = Arc::new(RoomShared {
            lifecycle: Mutex::new(Lifecycle {
                phase: RoomPhase::Created,
                termination: None,
            }),
            wake: Notify::new(),
        });

        let handle = RoomHandle {
            id,
            participants: [
                participants[0].connection_id,
                participants[1].connection_id,
            ],
            input_tx,
            shared: shared.clone(),
        };

        let room = Self {
            id,
            shared,
            state: MatchState::new(config.starting_elixir),
            engine,
            input_rx,
            participants,
            tick_interval: config.tick_interval(),
            last_tick: Instant::now(),
            connections,
            registry,
            stats: BroadcastStats::default(),
        };

        (room, handle)
    }

    /// Run the room until it terminates
    pub async fn run(mut self) {
        if self.shared.is_running() {
            self.send_start().await;
        }

        if self.shared.start() {
            info!(room_id = %self.id, "Room started");
        }

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.last_tick = Instant::now();

        while self.shared.is_running() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shared.wake.notified() => {}
            }
            if !self.shared.is_running() {
                break;
            }

            let now = Instant::now();
            let dt = clamp_dt(now - self.last_tick, self.tick_interval);
            self.last_tick = now;

            let outcome = self.tick(dt);
            let result = outcome.result;
            let messages = SnapshotBuilder::build(
                &self.state,
                self.engine.elixir_interval(),
                outcome.events,
            );
            self.broadcast(messages);

            if let Some(result) = result {
                self.shared.terminate(TerminationReason::Finished(result));
            }
        }

        self.finish().await;
    }

    /// Drain everything queued so far and advance the simulation once.
    /// Inputs that arrive after the drain wait for the next tick.
    fn tick(&mut self, dt: f32) -> TickOutcome {
        let mut inputs = Vec::new();
        while let Ok(input) = self.input_rx.try_recv() {
            inputs.push(input);
        }
        self.engine.step(&mut self.state, dt, inputs)
    }

    async fn send_start(&self) {
        for slot in PlayerSlot::BOTH {
            let participant = &self.participants[slot.index()];
            let msg = ServerMsg::GameStart { player: slot };
            if participant
                .outbound
                .send_timeout(msg, NOTIFY_TIMEOUT)
                .await
                .is_err()
            {
                warn!(room_id = %self.id, player = %slot, "Failed to deliver game start");
                self.shared.terminate(TerminationReason::Disconnected(slot));
            }
        }
    }

    /// Push this tick's snapshots. A full queue drops the snapshot; a closed
    /// one means the client is gone.
    fn broadcast(&mut self, messages: [ServerMsg; 2]) {
        for (slot, msg) in PlayerSlot::BOTH.into_iter().zip(messages) {
            match self.participants[slot.index()].outbound.try_send(msg) {
                Ok(()) => self.stats.snapshots_sent += 1,
                Err(TrySendError::Full(_)) => {
                    self.stats.snapshots_dropped += 1;
                    warn!(room_id = %self.id, player = %slot, "Client lagging, snapshot dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(room_id = %self.id, player = %slot, "Outbound channel closed");
                    self.shared.terminate(TerminationReason::Disconnected(slot));
                }
            }
        }
    }

    /// Release both placements and unregister, then notify whoever is left.
    /// A client reading `game_over` is already free to queue again.
    async fn finish(mut self) {
        let reason = self
            .shared
            .lifecycle
            .lock()
            .termination
            .unwrap_or(TerminationReason::Shutdown);
        self.shared.lifecycle.lock().phase = RoomPhase::Terminated;
        self.input_rx.close();

        for participant in &self.participants {
            self.connections.release(participant.connection_id, self.id);
        }
        self.registry.remove(&self.id);

        let (winner, game_over_reason) = match reason {
            TerminationReason::Finished(MatchResult::Winner(slot)) => {
                (Some(slot), GameOverReason::TowerDestroyed)
            }
            TerminationReason::Finished(MatchResult::Draw) => (None, GameOverReason::Draw),
            TerminationReason::Disconnected(gone) => {
                (Some(gone.opponent()), GameOverReason::OpponentDisconnected)
            }
            TerminationReason::Shutdown => (None, GameOverReason::Shutdown),
        };
        let recipients: Vec<PlayerSlot> = match reason {
            TerminationReason::Disconnected(gone) => vec![gone.opponent()],
            _ => PlayerSlot::BOTH.to_vec(),
        };

        for slot in recipients {
            let msg = ServerMsg::GameOver {
                winner,
                reason: game_over_reason,
            };
            if self.participants[slot.index()]
                .outbound
                .send_timeout(msg, NOTIFY_TIMEOUT)
                .await
                .is_err()
            {
                debug!(room_id = %self.id, player = %slot, "Could not deliver game over");
            }
        }

        info!(
            room_id = %self.id,
            reason = ?reason,
            ticks = self.state.tick,
            snapshots_sent = self.stats.snapshots_sent,
            snapshots_dropped = self.stats.snapshots_dropped,
            "Room terminated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::CardCatalog;
    use crate::game::state::Position;
    use crate::ws::protocol::GameEvent;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        handle: RoomHandle,
        registry: Arc<RoomRegistry>,
        rx: [mpsc::Receiver<ServerMsg>; 2],
    }

    fn fast_config() -> GameConfig {
        GameConfig {
            tick_rate_hz: 100,
            ..GameConfig::default()
        }
    }

    fn start_room() -> Harness {
        let config = fast_config();
        let (tx1, rx1) = mpsc::channel(1024);
        let (tx2, rx2) = mpsc::channel(1024);
        let participants = [
            Participant {
                connection_id: Uuid::new_v4(),
                outbound: tx1,
            },
            Participant {
                connection_id: Uuid::new_v4(),
                outbound: tx2,
            },
        ];
        let registry = Arc::new(RoomRegistry::new());
        let engine = SimulationEngine::new(Arc::new(CardCatalog::standard()), &config);
        let (room, handle) = Room::new(
            Uuid::new_v4(),
            participants,
            engine,
            &config,
            Arc::new(ConnectionTable::default()),
            registry.clone(),
        );
        registry.insert(handle.clone());
        tokio::spawn(room.run());

        Harness {
            handle,
            registry,
            rx: [rx1, rx2],
        }
    }

    async fn next_msg(rx: &mut mpsc::Receiver<ServerMsg>) -> ServerMsg {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("channel closed")
    }

    async fn wait_for_game_over(rx: &mut mpsc::Receiver<ServerMsg>) -> (ServerMsg, usize) {
        let mut states_before = 0;
        loop {
            match next_msg(rx).await {
                msg @ ServerMsg::GameOver { .. } => return (msg, states_before),
                ServerMsg::GameState { .. } => states_before += 1,
                _ => {}
            }
        }
    }

    async fn assert_silent(rx: &mut mpsc::Receiver<ServerMsg>) {
        let res = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(
            matches!(res, Err(_) | Ok(None)),
            "unexpected message after game over: {res:?}"
        );
    }

    #[tokio::test]
    async fn game_start_precedes_first_snapshot() {
        let mut h = start_room();

        assert_eq!(
            next_msg(&mut h.rx[0]).await,
            ServerMsg::GameStart {
                player: PlayerSlot::Player1
            }
        );
        assert_eq!(
            next_msg(&mut h.rx[1]).await,
            ServerMsg::GameStart {
                player: PlayerSlot::Player2
            }
        );
        assert!(matches!(
            next_msg(&mut h.rx[0]).await,
            ServerMsg::GameState { tick: 1, .. }
        ));
        assert_eq!(h.handle.phase(), RoomPhase::Running);
    }

    #[tokio::test]
    async fn both_snapshots_of_a_tick_agree() {
        let mut h = start_room();
        next_msg(&mut h.rx[0]).await;
        next_msg(&mut h.rx[1]).await;

        for _ in 0..5 {
            let a = next_msg(&mut h.rx[0]).await;
            let b = next_msg(&mut h.rx[1]).await;
            match (a, b) {
                (
                    ServerMsg::GameState {
                        tick: ta,
                        you: you_a,
                        opponent: opp_a,
                        events: ev_a,
                    },
                    ServerMsg::GameState {
                        tick: tb,
                        you: you_b,
                        opponent: opp_b,
                        events: ev_b,
                    },
                ) => {
                    assert_eq!(ta, tb);
                    assert_eq!(opp_a, you_b);
                    assert_eq!(opp_b, you_a);
                    assert_eq!(ev_a, ev_b);
                }
                other => panic!("expected two snapshots, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn submitted_play_shows_up_in_next_snapshot() {
        let mut h = start_room();
        next_msg(&mut h.rx[0]).await;

        assert_ok!(h.handle.submit_input(PlayerInput {
            slot: PlayerSlot::Player1,
            card_id: "knight".to_string(),
            placement: Position { x: 9.0, y: 4.0 },
            received_at: 0,
        }));

        loop {
            if let ServerMsg::GameState { you, events, .. } = next_msg(&mut h.rx[0]).await {
                if you.units.is_empty() {
                    continue;
                }
                assert_eq!(you.units.len(), 1);
                assert_eq!(you.elixir, 2);
                assert!(events
                    .iter()
                    .any(|e| matches!(e, GameEvent::Spawned { card_id, .. } if card_id == "knight")));
                break;
            }
        }
    }

    #[tokio::test]
    async fn termination_is_idempotent_and_notifies_survivor_once() {
        let mut h = start_room();
        next_msg(&mut h.rx[1]).await;

        assert!(h
            .handle
            .terminate(TerminationReason::Disconnected(PlayerSlot::Player1)));
        assert!(!h
            .handle
            .terminate(TerminationReason::Finished(MatchResult::Winner(
                PlayerSlot::Player1
            ))));
        assert_err!(h.handle.submit_input(PlayerInput {
            slot: PlayerSlot::Player2,
            card_id: "knight".to_string(),
            placement: Position { x: 9.0, y: 4.0 },
            received_at: 0,
        }));

        let (msg, _) = wait_for_game_over(&mut h.rx[1]).await;
        assert_eq!(
            msg,
            ServerMsg::GameOver {
                winner: Some(PlayerSlot::Player2),
                reason: GameOverReason::OpponentDisconnected,
            }
        );
        assert_silent(&mut h.rx[1]).await;
        assert_eq!(h.handle.phase(), RoomPhase::Terminated);
        assert!(h.registry.get(&h.handle.id).is_none());

        // The disconnected side is not notified
        while let Ok(msg) = h.rx[0].try_recv() {
            assert!(!matches!(msg, ServerMsg::GameOver { .. }));
        }
    }

    #[tokio::test]
    async fn concurrent_terminations_pick_one_winner() {
        let h = start_room();
        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let handle = h.handle.clone();
                tokio::spawn(async move {
                    let reason = if i % 2 == 0 {
                        TerminationReason::Disconnected(PlayerSlot::Player2)
                    } else {
                        TerminationReason::Finished(MatchResult::Draw)
                    };
                    handle.terminate(reason)
                })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(h.handle.termination_reason().is_some());
    }

    #[tokio::test]
    async fn closed_outbound_counts_as_disconnect() {
        let Harness {
            handle,
            registry: _registry,
            rx: [rx1, mut rx2],
        } = start_room();
        drop(rx1);

        let (msg, _) = wait_for_game_over(&mut rx2).await;
        assert_eq!(
            msg,
            ServerMsg::GameOver {
                winner: Some(PlayerSlot::Player2),
                reason: GameOverReason::OpponentDisconnected,
            }
        );
        assert_eq!(
            handle.termination_reason(),
            Some(TerminationReason::Disconnected(PlayerSlot::Player1))
        );
    }
}
