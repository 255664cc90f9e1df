//! Matchmaking service - pairs queued connections and starts rooms

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::room::{Participant, Room, RoomId};
use crate::game::{CardCatalog, PlayerSlot, RoomRegistry, SimulationEngine};
use crate::registry::{Connection, ConnectionId, ConnectionTable, Placement};

use super::queue::{MatchmakingQueue, QueuedPlayer};

/// Result of a `find_game` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Waiting for an opponent
    Queued,
    /// Paired immediately; the room is running
    Paired(RoomId),
    /// Connection unknown or already queued/seated
    Ignored,
}

/// Matchmaker. Queue changes, placement changes and room creation all
/// happen under one lock, so a connection is never paired twice and never
/// paired after it has been removed.
pub struct Matchmaker {
    queue: Mutex<MatchmakingQueue>,
    connections: Arc<ConnectionTable>,
    rooms: Arc<RoomRegistry>,
    catalog: Arc<CardCatalog>,
    config: GameConfig,
}

impl Matchmaker {
    pub fn new(
        connections: Arc<ConnectionTable>,
        rooms: Arc<RoomRegistry>,
        catalog: Arc<CardCatalog>,
        config: GameConfig,
    ) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            connections,
            rooms,
            catalog,
            config,
        }
    }

    /// Put an unassigned connection in the queue and pair if possible.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, id: ConnectionId) -> EnqueueOutcome {
        let mut queue = self.queue.lock();

        if !self
            .connections
            .set_placement(&id, Placement::Unassigned, Placement::Queued)
        {
            return EnqueueOutcome::Ignored;
        }
        queue.enqueue(QueuedPlayer::new(id));
        info!(connection_id = %id, queue_size = queue.len(), "Joined matchmaking queue");

        let mut outcome = EnqueueOutcome::Queued;
        while let Some((first, second)) = queue.try_pair() {
            match self.create_room(&first, &second) {
                Some(room_id) => {
                    if first.connection_id == id || second.connection_id == id {
                        outcome = EnqueueOutcome::Paired(room_id);
                    }
                }
                None => {
                    // Put back whoever is still waiting, in their original order
                    for player in [second, first] {
                        if self.connections.placement(&player.connection_id)
                            == Some(Placement::Queued)
                        {
                            queue.push_front(player);
                        }
                    }
                    break;
                }
            }
        }
        outcome
    }

    /// Take a connection out of the queue. Returns false if it wasn't queued.
    pub fn leave(&self, id: ConnectionId) -> bool {
        let mut queue = self.queue.lock();
        if queue.dequeue(id).is_none() {
            return false;
        }
        self.connections
            .set_placement(&id, Placement::Queued, Placement::Unassigned);
        info!(connection_id = %id, queue_size = queue.len(), "Left matchmaking queue");
        true
    }

    /// Remove a connection from the table and the queue in one step
    pub fn remove_connection(&self, id: ConnectionId) -> Option<Connection> {
        let mut queue = self.queue.lock();
        queue.dequeue(id);
        self.connections.remove(&id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Seat both players in a fresh room and spawn its task.
    /// Caller holds the queue lock.
    fn create_room(&self, first: &QueuedPlayer, second: &QueuedPlayer) -> Option<RoomId> {
        let room_id = Uuid::new_v4();
        let players = [first, second];

        let mut participants = Vec::with_capacity(2);
        for (slot, player) in PlayerSlot::BOTH.into_iter().zip(players) {
            let Some(outbound) = self.connections.outbound(&player.connection_id) else {
                warn!(connection_id = %player.connection_id, "Paired connection vanished");
                self.unseat(&participants, room_id);
                return None;
            };
            let seated = Placement::InRoom { room_id, slot };
            if !self
                .connections
                .set_placement(&player.connection_id, Placement::Queued, seated)
            {
                warn!(connection_id = %player.connection_id, "Paired connection not queued");
                self.unseat(&participants, room_id);
                return None;
            }
            participants.push(Participant {
                connection_id: player.connection_id,
                outbound,
            });
        }

        let participants: [Participant; 2] = participants.try_into().ok()?;
        let engine = SimulationEngine::new(self.catalog.clone(), &self.config);
        let (room, handle) = Room::new(
            room_id,
            participants,
            engine,
            &self.config,
            self.connections.clone(),
            self.rooms.clone(),
        );
        self.rooms.insert(handle);
        tokio::spawn(room.run());

        info!(
            room_id = %room_id,
            player1 = %first.connection_id,
            player2 = %second.connection_id,
            player1_wait_ms = first.wait_time().as_millis() as u64,
            player2_wait_ms = second.wait_time().as_millis() as u64,
            active_rooms = self.rooms.active_rooms(),
            "Created room"
        );
        Some(room_id)
    }

    /// Undo a partially seated pair
    fn unseat(&self, seated: &[Participant], room_id: RoomId) {
        for participant in seated {
            if self.connections.release(participant.connection_id, room_id) {
                self.connections.set_placement(
                    &participant.connection_id,
                    Placement::Unassigned,
                    Placement::Queued,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn matchmaker() -> (Matchmaker, Arc<ConnectionTable>, Arc<RoomRegistry>) {
        let connections = Arc::new(ConnectionTable::default());
        let rooms = Arc::new(RoomRegistry::new());
        let matchmaker = Matchmaker::new(
            connections.clone(),
            rooms.clone(),
            Arc::new(CardCatalog::standard()),
            GameConfig::default(),
        );
        (matchmaker, connections, rooms)
    }

    fn add_connection(
        connections: &ConnectionTable,
    ) -> (ConnectionId, mpsc::Receiver<crate::ws::protocol::ServerMsg>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(64);
        connections.insert(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn pairs_first_two_in_order() {
        let (mm, connections, rooms) = matchmaker();
        let (a, _ra) = add_connection(&connections);
        let (b, _rb) = add_connection(&connections);

        assert_eq!(mm.enqueue(a), EnqueueOutcome::Queued);
        let room_id = match mm.enqueue(b) {
            EnqueueOutcome::Paired(room_id) => room_id,
            other => panic!("expected pairing, got {other:?}"),
        };

        assert_eq!(
            connections.placement(&a),
            Some(Placement::InRoom {
                room_id,
                slot: PlayerSlot::Player1
            })
        );
        assert_eq!(
            connections.placement(&b),
            Some(Placement::InRoom {
                room_id,
                slot: PlayerSlot::Player2
            })
        );
        assert_eq!(rooms.get(&room_id).map(|h| h.participants), Some([a, b]));
        assert_eq!(mm.queue_len(), 0);
        rooms.shutdown_all();
    }

    #[tokio::test]
    async fn unknown_connection_is_ignored() {
        let (mm, _connections, _rooms) = matchmaker();
        assert_eq!(mm.enqueue(Uuid::new_v4()), EnqueueOutcome::Ignored);
        assert_eq!(mm.queue_len(), 0);
    }

    #[tokio::test]
    async fn removed_connection_is_never_paired() {
        let (mm, connections, rooms) = matchmaker();
        let (a, _ra) = add_connection(&connections);
        let (b, _rb) = add_connection(&connections);
        let (c, _rc) = add_connection(&connections);

        mm.enqueue(a);
        assert!(mm.remove_connection(a).is_some());
        assert!(matches!(mm.enqueue(b), EnqueueOutcome::Queued));
        assert!(matches!(mm.enqueue(c), EnqueueOutcome::Paired(_)));

        assert_eq!(rooms.active_rooms(), 1);
        assert_eq!(connections.placement(&a), None);
        rooms.shutdown_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_find_game_pairs_everyone_exactly_once() {
        let (mm, connections, rooms) = matchmaker();
        let mm = Arc::new(mm);
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..10 {
            let (id, rx) = add_connection(&connections);
            ids.push(id);
            receivers.push(rx);
        }

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let mm = mm.clone();
                let id = *id;
                tokio::spawn(async move { mm.enqueue(id) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(rooms.active_rooms(), 5);
        assert_eq!(mm.queue_len(), 0);

        let mut seen = std::collections::HashMap::new();
        for id in &ids {
            match connections.placement(id) {
                Some(Placement::InRoom { room_id, .. }) => {
                    *seen.entry(room_id).or_insert(0) += 1;
                }
                other => panic!("connection not seated: {other:?}"),
            }
        }
        assert!(seen.values().all(|&n| n == 2));
        rooms.shutdown_all();
    }
}
